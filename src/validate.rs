//! Patch well-formedness classification
//!
//! Pure and deterministic: the same candidate text always yields the same
//! verdict, and verdicts are recomputed (never patched) on retry. This
//! checks structural validity only - it says nothing about whether the
//! patch is correct or even applies.

use serde::{Deserialize, Serialize};

/// Candidates shorter than this are noise, not patches.
pub const MIN_PATCH_CHARS: usize = 20;

/// Structural verdict for one candidate patch.
///
/// `well_formed` requires all four marker rules plus the length floor.
/// `has_git_header` and `suspicious_path` are soft signals: tracked and
/// reported, but never part of `well_formed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchVerdict {
    pub has_source_marker: bool,
    pub has_target_marker: bool,
    pub has_hunk_header: bool,
    pub has_change_lines: bool,
    /// `diff --git` header present. Its absence leaves the patch on the
    /// weaker two-line-header form that some apply tooling rejects; we
    /// track the gap rather than hide it.
    pub has_git_header: bool,
    /// A `---`/`+++` header names an absolute path, parent traversal, or a
    /// URL. Soft warning only - a legitimate multi-file patch with plain
    /// relative paths never trips this.
    pub suspicious_path: bool,
    pub well_formed: bool,
}

/// Classify a candidate patch. An absent candidate is always malformed,
/// with every rule false.
pub fn validate(candidate: Option<&str>) -> PatchVerdict {
    let Some(text) = candidate else {
        return PatchVerdict::default();
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return PatchVerdict::default();
    }

    let lines: Vec<&str> = trimmed.lines().collect();
    let has_source_marker = lines.iter().any(|l| l.starts_with("--- "));
    let has_target_marker = lines.iter().any(|l| l.starts_with("+++ "));
    let has_hunk_header = lines.iter().any(|l| l.starts_with("@@"));
    let has_change_lines = lines
        .iter()
        .filter(|l| !l.starts_with("---") && !l.starts_with("+++"))
        .any(|l| l.starts_with('+') || l.starts_with('-'));
    let has_git_header = lines.iter().any(|l| l.starts_with("diff --git"));
    let suspicious_path = lines
        .iter()
        .filter(|l| l.starts_with("--- ") || l.starts_with("+++ "))
        .any(|l| header_path_is_suspicious(l));

    let well_formed = has_source_marker
        && has_target_marker
        && has_hunk_header
        && has_change_lines
        && trimmed.len() >= MIN_PATCH_CHARS;

    PatchVerdict {
        has_source_marker,
        has_target_marker,
        has_hunk_header,
        has_change_lines,
        has_git_header,
        suspicious_path,
        well_formed,
    }
}

fn header_path_is_suspicious(header: &str) -> bool {
    let raw = header[4..].trim();
    // Strip the customary a/ b/ prefixes and timestamp suffix.
    let path = raw.split('\t').next().unwrap_or(raw);
    let path = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    if path == "/dev/null" {
        return false;
    }
    path.starts_with('/')
        || path.contains("://")
        || path.split('/').any(|seg| seg == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_patch_passes_all_rules() {
        let text = "Sure, here's the fix:\n--- a/foo.py\n+++ b/foo.py\n@@ -1,1 +1,1 @@\n-old\n+new\n";
        let verdict = validate(Some(text));
        assert!(verdict.has_source_marker);
        assert!(verdict.has_target_marker);
        assert!(verdict.has_hunk_header);
        assert!(verdict.has_change_lines);
        assert!(verdict.well_formed);
    }

    #[test]
    fn test_prose_fails_every_rule() {
        let verdict = validate(Some("I think you should change the function."));
        assert!(!verdict.has_source_marker);
        assert!(!verdict.has_target_marker);
        assert!(!verdict.has_hunk_header);
        assert!(!verdict.has_change_lines);
        assert!(!verdict.well_formed);
    }

    #[test]
    fn test_markers_without_change_lines_is_malformed() {
        // Markers inside a quoted explanation but zero +/- change lines.
        let text = "--- a/foo.py says one thing\n+++ b/foo.py says another\n@@ the hunk syntax @@ means a range\nno changes here at all";
        let verdict = validate(Some(text));
        assert!(verdict.has_source_marker);
        assert!(verdict.has_target_marker);
        assert!(verdict.has_hunk_header);
        assert!(!verdict.has_change_lines);
        assert!(!verdict.well_formed);
    }

    #[test]
    fn test_absent_candidate_is_always_malformed() {
        let verdict = validate(None);
        assert_eq!(verdict, PatchVerdict::default());
        assert!(!verdict.well_formed);
    }

    #[test]
    fn test_near_empty_text_is_malformed() {
        assert!(!validate(Some("")).well_formed);
        assert!(!validate(Some("  \n ")).well_formed);
        // All four markers but under the length floor
        assert!(!validate(Some("--- a\n+++ b\n@@\n-x")).well_formed);
    }

    #[test]
    fn test_validator_is_deterministic_and_idempotent() {
        let text = "--- a/foo.py\n+++ b/foo.py\n@@ -1,1 +1,1 @@\n-old\n+new\n";
        assert_eq!(validate(Some(text)), validate(Some(text)));
    }

    #[test]
    fn test_git_header_is_soft_signal() {
        let without = "--- a/foo.py\n+++ b/foo.py\n@@ -1,1 +1,1 @@\n-old\n+new\n";
        let verdict = validate(Some(without));
        assert!(!verdict.has_git_header);
        assert!(verdict.well_formed);

        let with = format!("diff --git a/foo.py b/foo.py\n{}", without);
        let verdict = validate(Some(&with));
        assert!(verdict.has_git_header);
        assert!(verdict.well_formed);
    }

    #[test]
    fn test_suspicious_path_warns_but_does_not_reject() {
        let abs = "--- /etc/passwd\n+++ b/foo.py\n@@ -1,1 +1,1 @@\n-old\n+new\n";
        let verdict = validate(Some(abs));
        assert!(verdict.suspicious_path);
        assert!(verdict.well_formed);

        let traversal = "--- a/../outside.py\n+++ b/foo.py\n@@ -1,1 +1,1 @@\n-old\n+new\n";
        assert!(validate(Some(traversal)).suspicious_path);

        let clean = "--- a/src/foo.py\n+++ b/src/foo.py\n@@ -1,1 +1,1 @@\n-old\n+new\n";
        assert!(!validate(Some(clean)).suspicious_path);

        let dev_null = "--- /dev/null\n+++ b/new_file.py\n@@ -0,0 +1,1 @@\n+new\n";
        assert!(!validate(Some(dev_null)).suspicious_path);
    }
}
