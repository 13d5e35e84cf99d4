//! Bounded concurrent batch execution
//!
//! Fans a fixed-size pool out over the instance list and collects one
//! result per instance, in completion order. The pool size is bounded by
//! expected gateway rate limits, not local CPU. Panicking tasks are caught
//! at the join boundary and fabricated into runner-fault results, so the
//! liveness guarantee holds: every submitted instance yields exactly one
//! result.

use crate::instance::Instance;
use crate::result::{FailureKind, InstanceResult, RunError};
use crate::strategy::Strategy;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;

/// Default worker count; tuned to rate limits, not cores.
pub const DEFAULT_WORKERS: usize = 2;

/// Run `solve` over every instance with at most `workers` in flight.
///
/// `on_result` observes completions as they land (completion order is
/// non-deterministic); callers use it for progress lines and
/// checkpointing. Results must be correlated by id, never position.
pub async fn run_batch<F, Fut>(
    instances: Vec<Instance>,
    strategy: Strategy,
    workers: usize,
    solve: F,
    mut on_result: impl FnMut(&InstanceResult, usize, usize),
) -> Vec<InstanceResult>
where
    F: Fn(Instance) -> Fut,
    Fut: Future<Output = InstanceResult> + Send + 'static,
{
    let total = instances.len();
    let mut results = Vec::with_capacity(total);
    let mut queue = instances.into_iter();
    let mut in_flight = FuturesUnordered::new();

    let submit = |inst: Instance| {
        let meta = (inst.instance_id.clone(), inst.repo.clone());
        let handle = tokio::spawn(solve(inst));
        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => fault_result(meta.0, meta.1, strategy, &join_err),
            }
        }
    };

    for inst in queue.by_ref().take(workers.max(1)) {
        in_flight.push(submit(inst));
    }

    while let Some(result) = in_flight.next().await {
        if let Some(next) = queue.next() {
            in_flight.push(submit(next));
        }
        on_result(&result, results.len() + 1, total);
        results.push(result);
    }

    debug_assert_eq!(results.len(), total);
    results
}

/// Safety net for category-(e) faults: a panic escaping the runner still
/// produces a result, flagged distinctly from ordinary failures.
fn fault_result(
    instance_id: String,
    repo: String,
    strategy: Strategy,
    join_err: &tokio::task::JoinError,
) -> InstanceResult {
    tracing::error!(instance = %instance_id, error = %join_err, "Worker task fault");
    InstanceResult {
        instance_id,
        repo,
        strategy,
        patch: None,
        verdict: Default::default(),
        usage: Default::default(),
        elapsed_sec: 0.0,
        success: false,
        error: Some(RunError::new(
            FailureKind::RunnerFault,
            format!("worker task fault: {}", join_err),
        )),
        context_files: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn instances(n: usize) -> Vec<Instance> {
        (0..n)
            .map(|i| Instance {
                instance_id: format!("inst-{}", i),
                repo: "owner/name".to_string(),
                base_commit: String::new(),
                problem_statement: "bug".to_string(),
                fail_to_pass: None,
            })
            .collect()
    }

    fn ok_result(inst: &Instance) -> InstanceResult {
        let patch = "--- a/x.py\n+++ b/x.py\n@@ -1 +1 @@\n-a\n+b\n";
        InstanceResult {
            instance_id: inst.instance_id.clone(),
            repo: inst.repo.clone(),
            strategy: Strategy::SingleShot,
            patch: Some(patch.to_string()),
            verdict: validate(Some(patch)),
            usage: Default::default(),
            elapsed_sec: 0.1,
            success: true,
            error: None,
            context_files: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_every_instance_yields_exactly_one_result() {
        let batch = instances(7);
        let results = run_batch(batch, Strategy::SingleShot, 3, |inst| async move {
            ok_result(&inst)
        }, |_, _, _| {})
        .await;

        assert_eq!(results.len(), 7);
        let ids: HashSet<_> = results.iter().map(|r| r.instance_id.clone()).collect();
        assert_eq!(ids.len(), 7);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let c = current.clone();
        let p = peak.clone();
        let results = run_batch(instances(10), Strategy::SingleShot, 2, move |inst| {
            let current = c.clone();
            let peak = p.clone();
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                ok_result(&inst)
            }
        }, |_, _, _| {})
        .await;

        assert_eq!(results.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_runner_fault_result() {
        let results = run_batch(instances(3), Strategy::SingleShot, 2, |inst| async move {
            if inst.instance_id == "inst-1" {
                panic!("boom");
            }
            ok_result(&inst)
        }, |_, _, _| {})
        .await;

        assert_eq!(results.len(), 3);
        let fault = results.iter().find(|r| r.instance_id == "inst-1").unwrap();
        assert!(!fault.success);
        assert_eq!(fault.failure_class(), Some("runner_fault"));
        assert_eq!(results.iter().filter(|r| r.success).count(), 2);
    }

    #[tokio::test]
    async fn test_on_result_sees_every_completion() {
        let mut seen = Vec::new();
        let results = run_batch(
            instances(4),
            Strategy::SingleShot,
            2,
            |inst| async move { ok_result(&inst) },
            |result, done, total| {
                seen.push((result.instance_id.clone(), done, total));
            },
        )
        .await;

        assert_eq!(results.len(), 4);
        assert_eq!(seen.len(), 4);
        assert_eq!(seen.last().unwrap().1, 4);
        assert!(seen.iter().all(|(_, _, total)| *total == 4));
    }
}
