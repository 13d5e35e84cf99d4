//! Typed per-instance outcome records.

use crate::llm::Usage;
use crate::validate::PatchVerdict;
use serde::{Deserialize, Serialize};

/// Why an instance did not produce a well-formed patch.
///
/// `Gateway`, `Planning` and `RunnerFault` are executor/runner-level
/// failures carried in `InstanceResult::error`; `no_patch` (extraction
/// miss) and `malformed_patch` are derived from the candidate and verdict.
/// Reports keep all of these distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport retry budget exhausted or other gateway-level error.
    Gateway,
    /// Plan-solve's planning call failed or returned nothing usable.
    Planning,
    /// Workspace could not be prepared (clone/checkout).
    Workspace,
    /// Safety net: an uncaught fault escaped the executor pipeline.
    RunnerFault,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Gateway => "gateway",
            FailureKind::Planning => "planning",
            FailureKind::Workspace => "workspace",
            FailureKind::RunnerFault => "runner_fault",
        }
    }
}

/// An executor-level failure attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: FailureKind,
    pub message: String,
}

impl RunError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// The outcome of one (instance, pass). A retry pass produces a second
/// result for the same id which supersedes this one only if it succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceResult {
    pub instance_id: String,
    pub repo: String,
    pub strategy: crate::strategy::Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    pub verdict: PatchVerdict,
    pub usage: Usage,
    pub elapsed_sec: f64,
    /// Strictly `verdict.well_formed` - a generated-but-malformed patch is
    /// not a success.
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    /// Repo-relative paths of the files injected into prompts, recorded so
    /// the retry pass can re-inject the same context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_files: Vec<String>,
}

impl InstanceResult {
    /// Bucket for the failure-mode breakdown; `None` for successes.
    /// Distinguishes "no patch produced" from "patch produced but
    /// malformed" from executor-level failures.
    pub fn failure_class(&self) -> Option<&'static str> {
        if self.success {
            return None;
        }
        if let Some(error) = &self.error {
            return Some(error.kind.as_str());
        }
        if self.patch.is_none() {
            Some("no_patch")
        } else {
            Some("malformed_patch")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;

    pub(crate) fn result_with(
        id: &str,
        success: bool,
        patch: Option<&str>,
        error: Option<RunError>,
    ) -> InstanceResult {
        InstanceResult {
            instance_id: id.to_string(),
            repo: "owner/name".to_string(),
            strategy: Strategy::PlanSolve,
            patch: patch.map(str::to_string),
            verdict: crate::validate::validate(patch),
            usage: Usage::default(),
            elapsed_sec: 1.0,
            success,
            error,
            context_files: Vec::new(),
        }
    }

    #[test]
    fn test_failure_class_distinguishes_modes() {
        let ok = result_with("a", true, Some("--- a/x\n+++ b/x\n@@\n-o\n+n"), None);
        assert_eq!(ok.failure_class(), None);

        let no_patch = result_with("b", false, None, None);
        assert_eq!(no_patch.failure_class(), Some("no_patch"));

        let malformed = result_with("c", false, Some("not a diff"), None);
        assert_eq!(malformed.failure_class(), Some("malformed_patch"));

        let planning = result_with(
            "d",
            false,
            None,
            Some(RunError::new(FailureKind::Planning, "plan call failed")),
        );
        assert_eq!(planning.failure_class(), Some("planning"));

        let fault = result_with(
            "e",
            false,
            None,
            Some(RunError::new(FailureKind::RunnerFault, "task panicked")),
        );
        assert_eq!(fault.failure_class(), Some("runner_fault"));
    }

    #[test]
    fn test_result_serializes_without_absent_fields() {
        let res = result_with("a", false, None, None);
        let json = serde_json::to_string(&res).unwrap();
        assert!(!json.contains("\"patch\""));
        assert!(!json.contains("\"error\""));
        assert!(json.contains("\"strategy\":\"plan_solve\""));
    }
}
