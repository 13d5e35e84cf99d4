use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use patchbench::config::RunConfig;
use patchbench::experiment;
use patchbench::instance::{load_instances, Instance};
use patchbench::llm::LlmClient;
use patchbench::report;
use patchbench::result::InstanceResult;
use patchbench::retry;
use patchbench::runner::Runner;
use patchbench::scheduler;
use patchbench::strategy::{Executor, Strategy};
use patchbench::workspace::RepoCache;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "patchbench",
    about = "LLM patch-generation harness for SWE-bench-style issue instances",
    version
)]
struct Cli {
    /// Output directory for patches and analysis artifacts
    #[arg(long, global = true, default_value = "out")]
    out_dir: PathBuf,

    /// Directory repositories are cloned under
    #[arg(long, global = true, default_value = "work")]
    work_dir: PathBuf,

    /// Instances solved concurrently
    #[arg(long, global = true, default_value_t = scheduler::DEFAULT_WORKERS)]
    workers: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Solve one ad-hoc issue and print the patch
    Solve {
        /// Repository in owner/name form
        #[arg(long)]
        repo: String,

        /// Commit to check out before reading context
        #[arg(long, default_value = "")]
        base_commit: String,

        /// Issue text
        #[arg(long, conflicts_with = "problem_file")]
        problem: Option<String>,

        /// Read the issue text from a file
        #[arg(long)]
        problem_file: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = Strategy::PlanSolve)]
        strategy: Strategy,

        /// Also write the full result record as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compare strategies on a small pilot subset
    Experiment {
        /// Path to the cached dataset JSON
        dataset: PathBuf,

        /// Pilot subset size
        #[arg(short, long, default_value_t = 5)]
        n: usize,
    },

    /// Run the full batch, retry failures, and write the report
    Evaluate {
        /// Path to the cached dataset JSON
        dataset: PathBuf,

        /// Cap the number of instances
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, value_enum, default_value_t = Strategy::PlanSolve)]
        strategy: Strategy,

        /// Skip the retry pass over failed instances
        #[arg(long)]
        no_retry: bool,

        /// Resume from an existing checkpoint, skipping completed ids
        #[arg(long)]
        resume: bool,
    },

    /// Re-run the retry pass over the failures in saved results
    Retry {
        /// Path to the cached dataset JSON the results came from
        dataset: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Arc::new(RunConfig::from_env(cli.out_dir, cli.work_dir));
    let workers = cli.workers.max(1);

    match cli.command {
        Command::Solve { repo, base_commit, problem, problem_file, strategy, output } => {
            let problem_statement = match (problem, problem_file) {
                (Some(text), None) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                _ => bail!("provide exactly one of --problem or --problem-file"),
            };
            let instance = Instance {
                instance_id: format!("adhoc-{}", repo.replace('/', "__")),
                repo,
                base_commit,
                problem_statement,
                fail_to_pass: None,
            };

            let (runner, _llm) = build_runner(&config)?;
            let result = runner.run(instance, strategy, None).await;

            if let Some(path) = output {
                std::fs::write(&path, serde_json::to_string_pretty(&result)?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                eprintln!("Result saved to {}", path.display());
            }
            match (&result.success, &result.patch) {
                (true, Some(patch)) => println!("{}", patch),
                _ => {
                    println!(
                        "No well-formed patch ({})",
                        result.failure_class().unwrap_or("unknown")
                    );
                    std::process::exit(1);
                }
            }
        }

        Command::Experiment { dataset, n } => {
            let instances = load_instances(&dataset, Some(n))?;
            if instances.is_empty() {
                bail!("dataset {} contains no instances", dataset.display());
            }
            let (runner, _llm) = build_runner(&config)?;

            let outcome = experiment::run_pilot(runner, &instances, workers).await;
            let path = experiment::save_pilot_results(&config.analysis_dir, &outcome)?;

            for (strategy, m) in &outcome.metrics {
                println!(
                    "{}: valid {}/{} ({:.1}%), avg tokens {:.0}, avg time {:.1}s",
                    strategy,
                    m.well_formed,
                    m.total,
                    m.valid_rate * 100.0,
                    m.avg_tokens,
                    m.avg_time_sec
                );
            }
            println!("Best strategy: {}", outcome.best_strategy);
            println!("Pilot results: {}", path.display());
        }

        Command::Evaluate { dataset, limit, strategy, no_retry, resume } => {
            if strategy == Strategy::RetryStrict {
                bail!("retry_strict is reserved for the retry pass; use single_shot or plan_solve");
            }
            let instances = load_instances(&dataset, limit)?;
            if instances.is_empty() {
                bail!("dataset {} contains no instances", dataset.display());
            }
            let (runner, llm) = build_runner(&config)?;

            let mut completed: Vec<InstanceResult> = if resume {
                report::load_checkpoint(&config.analysis_dir, strategy)?
            } else {
                Vec::new()
            };
            let done_ids: HashSet<String> =
                completed.iter().map(|r| r.instance_id.clone()).collect();
            let pending: Vec<Instance> = instances
                .iter()
                .filter(|i| !done_ids.contains(&i.instance_id))
                .cloned()
                .collect();
            tracing::info!(
                total = instances.len(),
                pending = pending.len(),
                strategy = %strategy,
                "Starting evaluation"
            );

            let analysis_dir = config.analysis_dir.clone();
            scheduler::run_batch(
                pending,
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
                        "Completed {}/{}",
                        done,
                        total
                    );
                    completed.push(result.clone());
                    if done % report::CHECKPOINT_INTERVAL == 0 {
                        if let Err(err) =
                            report::save_checkpoint(&analysis_dir, strategy, &completed)
                        {
                            tracing::warn!(error = %err, "Checkpoint save failed");
                        }
                    }
                },
            )
            .await;
            report::save_checkpoint(&config.analysis_dir, strategy, &completed)?;

            let results = if no_retry {
                completed
            } else {
                retry::run_retry_pass(runner, &instances, completed, workers).await
            };

            finish_batch(&config, &results, &llm)?;
        }

        Command::Retry { dataset } => {
            let instances = load_instances(&dataset, None)?;
            let results = report::load_results_json(&config.analysis_dir)?;
            let (runner, llm) = build_runner(&config)?;

            let merged = retry::run_retry_pass(runner, &instances, results, workers).await;
            finish_batch(&config, &merged, &llm)?;
        }
    }

    Ok(())
}

fn build_runner(config: &Arc<RunConfig>) -> Result<(Arc<Runner>, Arc<LlmClient>)> {
    let llm = Arc::new(LlmClient::new(config.clone())?);
    let executor = Executor::new(llm.clone(), config.clone());
    let repos = Arc::new(RepoCache::new(config.work_dir.clone()));
    Ok((Arc::new(Runner::new(executor, repos, config.clone())), llm))
}

/// Write the final artifacts and print the human summary.
fn finish_batch(config: &RunConfig, results: &[InstanceResult], llm: &LlmClient) -> Result<()> {
    let results_path = report::write_results_json(&config.analysis_dir, results)?;
    let batch = report::aggregate(results, config);
    let report_path = report::write_report_markdown(&config.analysis_dir, &batch, None)?;

    let stats = llm.usage_stats();
    println!("Instances:           {}", batch.total_instances);
    println!(
        "Well-formed patches: {} ({:.2}%)",
        batch.well_formed_patches,
        batch.pass_at_1_proxy * 100.0
    );
    for (mode, count) in &batch.failure_breakdown {
        println!("  {}: {}", mode, count);
    }
    println!(
        "Tokens:              {} across {} calls",
        stats.total_tokens, stats.total_calls
    );
    println!("Estimated cost:      ${:.4}", batch.total_cost_usd);
    println!("Results:             {}", results_path.display());
    println!("Report:              {}", report_path.display());
    Ok(())
}
