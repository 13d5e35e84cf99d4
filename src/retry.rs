//! Second-chance pass over failed instances
//!
//! Runs the strict-format strategy over the failures of a completed batch
//! and merges the outcomes back in. The merge is monotonic: a retry result
//! replaces the original only when the retry itself succeeded, so a batch
//! can only improve. Exactly one retry pass per batch; retry results are
//! never retried again.

use crate::instance::Instance;
use crate::result::InstanceResult;
use crate::runner::Runner;
use crate::scheduler;
use crate::strategy::{PriorAttempt, Strategy};
use std::collections::HashMap;
use std::sync::Arc;

/// Instances from `instances` whose result in `results` was not a success.
/// Instances with no result at all are not retried; the scheduler
/// guarantees that set is empty in practice.
pub fn failed_subset(instances: &[Instance], results: &[InstanceResult]) -> Vec<Instance> {
    let failed_ids: std::collections::HashSet<&str> = results
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.instance_id.as_str())
        .collect();
    instances
        .iter()
        .filter(|i| failed_ids.contains(i.instance_id.as_str()))
        .cloned()
        .collect()
}

/// Run the retry pass and return the merged result set.
pub async fn run_retry_pass(
    runner: Arc<Runner>,
    instances: &[Instance],
    results: Vec<InstanceResult>,
    workers: usize,
) -> Vec<InstanceResult> {
    let failed = failed_subset(instances, &results);
    if failed.is_empty() {
        tracing::info!("No failed instances, skipping retry pass");
        return results;
    }
    tracing::info!(count = failed.len(), "Retrying failed instances");

    // Hand each retry the context files its original attempt recorded.
    let priors: HashMap<String, PriorAttempt> = results
        .iter()
        .filter(|r| !r.success)
        .map(|r| {
            (
                r.instance_id.clone(),
                PriorAttempt { context_files: r.context_files.clone() },
            )
        })
        .collect();
    let priors = Arc::new(priors);

    let retried = scheduler::run_batch(
        failed,
        Strategy::RetryStrict,
        workers,
        {
            let runner = runner.clone();
            move |inst: Instance| {
                let runner = runner.clone();
                let prior = priors.get(&inst.instance_id).cloned();
                async move { runner.run(inst, Strategy::RetryStrict, prior).await }
            }
        },
        |result, done, total| {
            tracing::info!(
                instance = %result.instance_id,
                success = result.success,
                "Retry {}/{}",
                done,
                total
            );
        },
    )
    .await;

    merge_results(results, retried)
}

/// Merge retry outcomes into the original result set. The instance id set
/// is preserved exactly; only successful retries replace their originals.
pub fn merge_results(
    originals: Vec<InstanceResult>,
    retried: Vec<InstanceResult>,
) -> Vec<InstanceResult> {
    let mut improvements: HashMap<String, InstanceResult> = retried
        .into_iter()
        .filter(|r| r.success)
        .map(|r| (r.instance_id.clone(), r))
        .collect();

    originals
        .into_iter()
        .map(|orig| improvements.remove(&orig.instance_id).unwrap_or(orig))
        .collect()
}
