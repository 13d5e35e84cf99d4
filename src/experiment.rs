//! Pilot strategy comparison
//!
//! Runs each candidate strategy over a small instance subset, computes
//! per-strategy metrics, and picks the variant to use for the full batch.
//! Pilot runs skip the retry pass; its benefit is strategy-independent.

use crate::instance::Instance;
use crate::report::{self, StrategyMetrics};
use crate::result::InstanceResult;
use crate::runner::Runner;
use crate::scheduler;
use crate::strategy::Strategy;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Strategies eligible for the pilot. `retry_strict` is excluded: it only
/// makes sense with a prior failed attempt to build on.
pub const PILOT_STRATEGIES: [Strategy; 2] = [Strategy::SingleShot, Strategy::PlanSolve];

/// Outcome of a pilot run.
#[derive(Debug, Serialize)]
pub struct PilotOutcome {
    pub metrics: BTreeMap<Strategy, StrategyMetrics>,
    pub best_strategy: Strategy,
    #[serde(skip)]
    pub results: BTreeMap<Strategy, Vec<InstanceResult>>,
}

/// Run every pilot strategy over `subset` and select the best.
///
/// Strategies run sequentially so their gateway load does not interleave;
/// instances within one strategy still run concurrently.
pub async fn run_pilot(
    runner: Arc<Runner>,
    subset: &[Instance],
    workers: usize,
) -> PilotOutcome {
    let mut results: BTreeMap<Strategy, Vec<InstanceResult>> = BTreeMap::new();

    for strategy in PILOT_STRATEGIES {
        tracing::info!(strategy = %strategy, count = subset.len(), "Pilot pass");
        let batch = scheduler::run_batch(
            subset.to_vec(),
            strategy,
            workers,
            {
                let runner = runner.clone();
                move |inst: Instance| {
                    let runner = runner.clone();
                    async move { runner.run(inst, strategy, None).await }
                }
            },
            |result, done, total| {
                tracing::info!(
                    instance = %result.instance_id,
                    success = result.success,
                    "Pilot {}/{}",
                    done,
                    total
                );
            },
        )
        .await;
        results.insert(strategy, batch);
    }

    let metrics: BTreeMap<Strategy, StrategyMetrics> = results
        .iter()
        .map(|(s, r)| (*s, report::compute_strategy_metrics(r)))
        .collect();
    let best_strategy = report::select_best_strategy(&results);
    tracing::info!(best = %best_strategy, "Pilot complete");

    PilotOutcome { metrics, best_strategy, results }
}

/// Persist the pilot metrics next to the other analysis artifacts.
pub fn save_pilot_results(dir: &Path, outcome: &PilotOutcome) -> Result<std::path::PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join("pilot_results.json");
    let json = serde_json::to_string_pretty(outcome)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pilot_strategies_exclude_retry() {
        assert!(!PILOT_STRATEGIES.contains(&Strategy::RetryStrict));
        assert_eq!(PILOT_STRATEGIES.len(), 2);
    }

    #[test]
    fn test_pilot_outcome_serializes_metrics_and_best() {
        let outcome = PilotOutcome {
            metrics: BTreeMap::from([(Strategy::SingleShot, StrategyMetrics::default())]),
            best_strategy: Strategy::SingleShot,
            results: BTreeMap::new(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"best_strategy\":\"single_shot\""));
        assert!(json.contains("\"metrics\""));
        assert!(!json.contains("\"results\""));
    }
}
