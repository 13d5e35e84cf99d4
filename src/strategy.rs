//! Strategy variants and the executor that runs them
//!
//! One closed set of invocation patterns, selected explicitly by the
//! caller. Each variant turns an instance plus a prepared checkout into
//! zero-or-one candidate patch and the usage it cost.

use crate::config::RunConfig;
use crate::context;
use crate::instance::Instance;
use crate::llm::{ChatMessage, LlmClient, Usage};
use crate::patch;
use crate::prompts;
use crate::result::{FailureKind, RunError};
use crate::util::truncate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Invocation pattern for one solving attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One call: issue text plus ranked code context.
    SingleShot,
    /// Two dependent calls: plan, then solve with the plan injected.
    PlanSolve,
    /// Retry-pass only: strict format instructions plus verbatim file
    /// content from the prior attempt.
    RetryStrict,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::SingleShot => "single_shot",
            Strategy::PlanSolve => "plan_solve",
            Strategy::RetryStrict => "retry_strict",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context carried from a failed first attempt into the retry pass.
#[derive(Debug, Clone, Default)]
pub struct PriorAttempt {
    /// Repo-relative paths recorded by the original attempt.
    pub context_files: Vec<String>,
}

/// What one strategy execution produced. `candidate: None` means "no
/// patch-shaped output" and is distinct from an empty string; `failure`
/// is set only for executor-level errors, never for extraction misses.
#[derive(Debug, Default)]
pub struct ExecOutcome {
    pub candidate: Option<String>,
    pub usage: Usage,
    pub failure: Option<RunError>,
    pub context_files: Vec<String>,
}

/// Runs one strategy variant against one instance.
pub struct Executor {
    llm: Arc<LlmClient>,
    config: Arc<RunConfig>,
}

impl Executor {
    pub fn new(llm: Arc<LlmClient>, config: Arc<RunConfig>) -> Self {
        Self { llm, config }
    }

    /// Execute `strategy` for `instance` against the checkout at
    /// `repo_path`. Never retries at this level - instance-level retry is
    /// the retry orchestrator's job.
    pub async fn execute(
        &self,
        instance: &Instance,
        repo_path: &Path,
        strategy: Strategy,
        prior: Option<&PriorAttempt>,
    ) -> ExecOutcome {
        match strategy {
            Strategy::SingleShot => self.single_shot(instance, repo_path).await,
            Strategy::PlanSolve => self.plan_solve(instance, repo_path).await,
            Strategy::RetryStrict => self.retry_strict(instance, repo_path, prior).await,
        }
    }

    async fn single_shot(&self, instance: &Instance, repo_path: &Path) -> ExecOutcome {
        let problem = truncate(&instance.problem_statement, 3000);
        let keywords = context::extract_keywords(&instance.problem_statement);
        let files = context::find_relevant_files(repo_path, &keywords, 5);
        let code_context = context::build_code_context(repo_path, &files, 8000);
        let context_files = relative_paths(repo_path, &files);

        let user = prompts::single_shot_user(&instance.repo, &instance.title(), &problem, &code_context);
        match self
            .llm
            .chat(prompts::SYSTEM_PROMPT, &user, self.config.temperature)
            .await
        {
            Ok(response) => ExecOutcome {
                candidate: patch::extract_patch(&response.content),
                usage: response.usage,
                failure: None,
                context_files,
            },
            Err(err) => ExecOutcome {
                failure: Some(RunError::new(FailureKind::Gateway, err.to_string())),
                context_files,
                ..Default::default()
            },
        }
    }

    async fn plan_solve(&self, instance: &Instance, repo_path: &Path) -> ExecOutcome {
        let problem = truncate(&instance.problem_statement, 2500);
        let keywords = context::extract_keywords(&instance.problem_statement);
        let files = context::find_relevant_files(repo_path, &keywords, 8);
        let listing = context::relative_listing(repo_path, &files);
        let grep_ctx = context::grep_context(repo_path, &keywords, 2000);
        let context_files = relative_paths(repo_path, &files[..files.len().min(4)]);

        let plan_user = prompts::plan_user(&instance.repo, &problem, &listing, &grep_ctx);

        // Phase 1: plan. The response is not validated as a patch; it is
        // passed verbatim into the solve call. A failed or empty plan is a
        // planning failure - never a silent fallback to single_shot.
        let mut usage = Usage::default();
        let plan = match self
            .llm
            .chat(prompts::PLAN_SOLVE_SYSTEM_PROMPT, &plan_user, self.config.temperature)
            .await
        {
            Ok(response) => {
                usage.add(&response.usage);
                if response.content.trim().is_empty() {
                    return ExecOutcome {
                        usage,
                        failure: Some(RunError::new(
                            FailureKind::Planning,
                            "planning call returned empty output",
                        )),
                        context_files,
                        ..Default::default()
                    };
                }
                response.content
            }
            Err(err) => {
                return ExecOutcome {
                    usage,
                    failure: Some(RunError::new(
                        FailureKind::Planning,
                        format!("planning call failed: {}", err),
                    )),
                    context_files,
                    ..Default::default()
                };
            }
        };

        // Phase 2: solve with the plan as an assistant turn plus the full
        // content of the top-ranked files.
        let code_context =
            context::build_code_context(repo_path, &files[..files.len().min(4)], 6000);
        let messages = vec![
            ChatMessage::system(prompts::PLAN_SOLVE_SYSTEM_PROMPT),
            ChatMessage::user(plan_user),
            ChatMessage::assistant(plan),
            ChatMessage::user(prompts::solve_user(&code_context)),
        ];

        match self.llm.chat_messages(&messages, self.config.temperature).await {
            Ok(response) => {
                usage.add(&response.usage);
                ExecOutcome {
                    candidate: patch::extract_patch(&response.content),
                    usage,
                    failure: None,
                    context_files,
                }
            }
            Err(err) => ExecOutcome {
                usage,
                failure: Some(RunError::new(FailureKind::Gateway, err.to_string())),
                context_files,
                ..Default::default()
            },
        }
    }

    async fn retry_strict(
        &self,
        instance: &Instance,
        repo_path: &Path,
        prior: Option<&PriorAttempt>,
    ) -> ExecOutcome {
        let problem = truncate(&instance.problem_statement, 2000);
        let mut usage = Usage::default();
        let mut last_error: Option<String> = None;

        // Prefer the files the original attempt actually read; re-rank
        // only when nothing was recorded.
        let files: Vec<PathBuf> = match prior.filter(|p| !p.context_files.is_empty()) {
            Some(prior) => prior
                .context_files
                .iter()
                .map(|rel| repo_path.join(rel))
                .filter(|p| p.is_file())
                .collect(),
            None => {
                let keywords = context::extract_keywords(&instance.problem_statement);
                context::find_relevant_files(repo_path, &keywords, 3)
            }
        };
        let context_files = relative_paths(repo_path, &files);

        for path in files.iter().take(2) {
            let Some(content) = context::read_file_bounded(path, 4000) else {
                continue;
            };
            let rel = path.strip_prefix(repo_path).unwrap_or(path).display().to_string();
            let user = prompts::retry_user(&instance.repo, &problem, &rel, &content);

            // Temperature pinned to zero for format compliance.
            match self.llm.chat(prompts::RETRY_SYSTEM_PROMPT, &user, 0.0).await {
                Ok(response) => {
                    usage.add(&response.usage);
                    if let Some(candidate) = patch::extract_patch_aggressive(&response.content) {
                        return ExecOutcome {
                            candidate: Some(candidate),
                            usage,
                            failure: None,
                            context_files,
                        };
                    }
                }
                Err(err) => {
                    tracing::debug!(instance = %instance.instance_id, file = %rel, error = %err,
                        "retry attempt failed for file");
                    last_error = Some(err.to_string());
                }
            }
        }

        // Last resort: ask for a minimal fix without file context.
        let user = prompts::retry_minimal_user(&instance.repo, &truncate(&instance.problem_statement, 1500));
        match self.llm.chat(prompts::RETRY_SYSTEM_PROMPT, &user, 0.0).await {
            Ok(response) => {
                usage.add(&response.usage);
                ExecOutcome {
                    candidate: patch::extract_patch_aggressive(&response.content),
                    usage,
                    failure: None,
                    context_files,
                }
            }
            Err(err) => ExecOutcome {
                usage,
                failure: Some(RunError::new(
                    FailureKind::Gateway,
                    last_error.unwrap_or_else(|| err.to_string()),
                )),
                context_files,
                ..Default::default()
            },
        }
    }
}

fn relative_paths(repo_path: &Path, files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .map(|p| p.strip_prefix(repo_path).unwrap_or(p).display().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_names_are_stable() {
        assert_eq!(Strategy::SingleShot.as_str(), "single_shot");
        assert_eq!(Strategy::PlanSolve.as_str(), "plan_solve");
        assert_eq!(Strategy::RetryStrict.as_str(), "retry_strict");
    }

    #[test]
    fn test_strategy_serde_round_trip() {
        let json = serde_json::to_string(&Strategy::PlanSolve).unwrap();
        assert_eq!(json, "\"plan_solve\"");
        let back: Strategy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Strategy::PlanSolve);
    }
}
