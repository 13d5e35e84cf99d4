//! Per-instance driver
//!
//! Wraps exactly one strategy execution with fault isolation: whatever
//! goes wrong inside workspace preparation, the executor, or validation,
//! one `InstanceResult` comes out and the batch keeps moving. Side effect:
//! well-formed patches are persisted one file per instance id, overwritten
//! when a retry pass supersedes the original.

use crate::config::RunConfig;
use crate::instance::Instance;
use crate::result::{FailureKind, InstanceResult, RunError};
use crate::strategy::{Executor, PriorAttempt, Strategy};
use crate::validate;
use crate::workspace::RepoCache;
use std::sync::Arc;
use std::time::Instant;

pub struct Runner {
    executor: Executor,
    repos: Arc<RepoCache>,
    config: Arc<RunConfig>,
}

impl Runner {
    pub fn new(executor: Executor, repos: Arc<RepoCache>, config: Arc<RunConfig>) -> Self {
        Self { executor, repos, config }
    }

    /// Drive one instance through one strategy. Never returns an error;
    /// failures become result-level records.
    pub async fn run(
        &self,
        instance: Instance,
        strategy: Strategy,
        prior: Option<PriorAttempt>,
    ) -> InstanceResult {
        let start = Instant::now();
        tracing::info!(instance = %instance.instance_id, strategy = %strategy, "Solving");

        let repo_path = match self.repos.ensure(&instance.repo, &instance.base_commit).await {
            Ok(path) => path,
            Err(err) => {
                return self.finish(
                    &instance,
                    strategy,
                    None,
                    crate::llm::Usage::default(),
                    Some(RunError::new(FailureKind::Workspace, err.to_string())),
                    Vec::new(),
                    start,
                );
            }
        };

        let outcome = self
            .executor
            .execute(&instance, &repo_path, strategy, prior.as_ref())
            .await;

        self.finish(
            &instance,
            strategy,
            outcome.candidate,
            outcome.usage,
            outcome.failure,
            outcome.context_files,
            start,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        instance: &Instance,
        strategy: Strategy,
        candidate: Option<String>,
        usage: crate::llm::Usage,
        error: Option<RunError>,
        context_files: Vec<String>,
        start: Instant,
    ) -> InstanceResult {
        let verdict = validate::validate(candidate.as_deref());
        let success = verdict.well_formed;

        if success {
            if let Some(patch) = &candidate {
                if let Err(err) = self.persist_patch(&instance.instance_id, patch) {
                    // Persistence trouble is logged, not a failure: the
                    // result record still carries the patch text.
                    tracing::warn!(instance = %instance.instance_id, error = %err,
                        "Failed to persist patch file");
                }
            }
        }

        InstanceResult {
            instance_id: instance.instance_id.clone(),
            repo: instance.repo.clone(),
            strategy,
            patch: candidate,
            verdict,
            usage,
            elapsed_sec: start.elapsed().as_secs_f64(),
            success,
            error,
            context_files,
        }
    }

    fn persist_patch(&self, instance_id: &str, patch: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.config.patches_dir)?;
        let path = self.config.patches_dir.join(format!("{}.patch", instance_id));
        std::fs::write(&path, patch)?;
        tracing::info!(instance = instance_id, path = %path.display(), "Saved patch");
        Ok(())
    }
}
