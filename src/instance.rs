//! Benchmark instance descriptors and dataset loading
//!
//! Instances come from a local JSON cache of the SWE-bench Lite split
//! (an array of objects). They are immutable once loaded.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One benchmark task: one issue against one repository at one commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    /// Repository identity as `owner/name`.
    pub repo: String,
    #[serde(default)]
    pub base_commit: String,
    #[serde(default)]
    pub problem_statement: String,
    /// Gold test identifiers, carried for reporting only. The solving path
    /// never reads these. The dataset stores them either as a JSON array or
    /// as a JSON-encoded string, so keep the raw value.
    #[serde(default, alias = "FAIL_TO_PASS", skip_serializing_if = "Option::is_none")]
    pub fail_to_pass: Option<serde_json::Value>,
}

impl Instance {
    /// Issue title: first line of the problem statement, bounded.
    pub fn title(&self) -> String {
        let first = self.problem_statement.lines().next().unwrap_or("Unknown Issue");
        crate::util::truncate(first, 100)
    }

    /// Gold test identifiers for reporting, tolerant of both encodings.
    pub fn gold_tests(&self) -> Vec<String> {
        match &self.fail_to_pass {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_json::Value::String(raw)) => {
                serde_json::from_str::<Vec<String>>(raw).unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }
}

/// Load instances from a local JSON cache file, optionally truncated.
pub fn load_instances(path: &Path, limit: Option<usize>) -> Result<Vec<Instance>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    let mut instances: Vec<Instance> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse dataset {}", path.display()))?;
    if let Some(limit) = limit {
        instances.truncate(limit);
    }
    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn sample_instance(id: &str, repo: &str) -> Instance {
        Instance {
            instance_id: id.to_string(),
            repo: repo.to_string(),
            base_commit: "abc123".to_string(),
            problem_statement: "Crash in frobnicate\nSteps to reproduce...".to_string(),
            fail_to_pass: None,
        }
    }

    #[test]
    fn test_load_instances_with_limit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"instance_id":"a-1","repo":"x/y","problem_statement":"p"}},
                {{"instance_id":"a-2","repo":"x/y","problem_statement":"q"}}]"#
        )
        .unwrap();

        let all = load_instances(file.path(), None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].instance_id, "a-1");

        let limited = load_instances(file.path(), Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_gold_tests_accepts_both_encodings() {
        let mut inst = sample_instance("a-1", "x/y");
        inst.fail_to_pass = Some(serde_json::json!(["test_a", "test_b"]));
        assert_eq!(inst.gold_tests(), vec!["test_a", "test_b"]);

        inst.fail_to_pass = Some(serde_json::Value::String(r#"["test_c"]"#.to_string()));
        assert_eq!(inst.gold_tests(), vec!["test_c"]);

        inst.fail_to_pass = None;
        assert!(inst.gold_tests().is_empty());
    }

    #[test]
    fn test_title_is_first_line() {
        let inst = sample_instance("a-1", "x/y");
        assert_eq!(inst.title(), "Crash in frobnicate");
    }
}
