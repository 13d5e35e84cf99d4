//! Run configuration
//!
//! Everything the harness needs is resolved once at startup into an
//! immutable `RunConfig` that is shared by `Arc`. Nothing reads ambient
//! state after construction.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "moonshotai/kimi-k2.5";

/// Immutable configuration for one harness run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Model identifier sent to the gateway.
    pub model: String,
    /// Chat-completions base URL.
    pub base_url: String,
    /// Completion token ceiling per call.
    pub max_tokens_per_call: u32,
    /// Sampling temperature for initial-pass calls.
    pub temperature: f32,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Transport retry budget inside the gateway (429/5xx/timeout).
    pub max_retries: u32,
    /// Base backoff delay between transport retries.
    pub retry_delay: Duration,
    /// USD per million prompt tokens, used when the gateway reports no cost.
    pub prompt_cost_per_mtok: f64,
    /// USD per million completion tokens.
    pub completion_cost_per_mtok: f64,
    /// Where well-formed patches are persisted, one file per instance id.
    pub patches_dir: PathBuf,
    /// Where reports, result lists and checkpoints land.
    pub analysis_dir: PathBuf,
    /// Where repositories are cloned.
    pub work_dir: PathBuf,
}

impl RunConfig {
    /// Build the configuration from the environment plus CLI-provided paths.
    ///
    /// `OPENROUTER_BASE_URL` and `MODEL_NAME` override the defaults;
    /// the API key itself is read lazily by the gateway so that commands
    /// which never call the model (e.g. re-aggregation) work without one.
    pub fn from_env(out_dir: PathBuf, work_dir: PathBuf) -> Self {
        let base_url = std::env::var("OPENROUTER_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model =
            std::env::var("MODEL_NAME").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self {
            model,
            base_url,
            max_tokens_per_call: 8192,
            temperature: 0.0,
            request_timeout: Duration::from_secs(120),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            // kimi-k2.5 via OpenRouter, flat in/out rate
            prompt_cost_per_mtok: 0.14,
            completion_cost_per_mtok: 0.14,
            patches_dir: out_dir.join("patches"),
            analysis_dir: out_dir.join("analysis"),
            work_dir,
        }
    }

    /// Chat-completions endpoint for this run.
    pub fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Resolve the API key from the environment.
    pub fn api_key() -> Option<String> {
        std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}
