//! OpenRouter chat-completions transport
//!
//! Transient transport failures (429, 5xx, timeouts) are retried here with
//! exponential backoff and jitter, bounded by the configured attempt budget.
//! Exhausting that budget surfaces as a single error to the caller; the
//! harness never retries at the call level above this boundary.

use crate::config::RunConfig;
use crate::llm::models::{Usage, UsageStats};
use anyhow::{anyhow, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One turn of a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Response from the gateway including content and usage stats.
#[derive(Debug)]
pub struct LlmResponse {
    pub content: String,
    pub usage: Usage,
    pub elapsed: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: Option<String>,
}

/// Shared gateway client. Usage counters are atomic so one client can be
/// handed to every worker.
pub struct LlmClient {
    http: reqwest::Client,
    config: Arc<RunConfig>,
    api_key: String,
    total_calls: AtomicU64,
    total_prompt_tokens: AtomicU64,
    total_completion_tokens: AtomicU64,
}

impl LlmClient {
    pub fn new(config: Arc<RunConfig>) -> Result<Self> {
        let api_key = RunConfig::api_key().ok_or_else(|| {
            anyhow!("No API key configured. Set the OPENROUTER_API_KEY environment variable.")
        })?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            api_key,
            total_calls: AtomicU64::new(0),
            total_prompt_tokens: AtomicU64::new(0),
            total_completion_tokens: AtomicU64::new(0),
        })
    }

    /// Convenience wrapper for the common system + user shape.
    pub async fn chat(&self, system: &str, user: &str, temperature: f32) -> Result<LlmResponse> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        self.chat_messages(&messages, temperature).await
    }

    /// Send a chat-completions request, retrying transient transport
    /// failures with exponential backoff and jitter.
    pub async fn chat_messages(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<LlmResponse> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens_per_call,
            temperature,
            stream: false,
        };

        let start = Instant::now();
        let mut last_error = String::new();

        for attempt in 0..self.config.max_retries {
            let sent = self
                .http
                .post(self.config.chat_url())
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(err) => {
                    // Connect errors and timeouts are transient; keep trying.
                    last_error = format!("transport error: {}", err);
                    tracing::warn!(attempt, error = %err, "LLM request failed, retrying");
                    tokio::time::sleep(self.config.retry_delay).await;
                    continue;
                }
            };

            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            if status.is_success() {
                return self.parse_success(&text, start.elapsed());
            }

            last_error = crate::util::truncate(&text, 300);
            match status.as_u16() {
                429 => {
                    // Honor any retry-after hint the body carries, else
                    // exponential backoff with jitter.
                    let wait = parse_retry_after(&text)
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| backoff_delay(self.config.retry_delay, attempt + 1));
                    tracing::warn!(attempt, wait_secs = wait.as_secs(), "Rate limited, backing off");
                    tokio::time::sleep(wait).await;
                }
                500..=599 => {
                    tracing::warn!(attempt, status = status.as_u16(), "Gateway server error");
                    tokio::time::sleep(self.config.retry_delay.saturating_mul(attempt + 1)).await;
                }
                401 => return Err(anyhow!("Invalid API key (HTTP 401)")),
                _ => {
                    return Err(anyhow!("API error {}: {}", status, last_error));
                }
            }
        }

        Err(anyhow!(
            "LLM call failed after {} attempts: {}",
            self.config.max_retries,
            last_error
        ))
    }

    fn parse_success(&self, body: &str, elapsed: Duration) -> Result<LlmResponse> {
        let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
            anyhow!(
                "Failed to parse gateway response: {}\n{}",
                e,
                crate::util::truncate(body, 300)
            )
        })?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        let usage = parsed.usage.unwrap_or_default();
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_prompt_tokens
            .fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.total_completion_tokens
            .fetch_add(usage.completion_tokens, Ordering::Relaxed);

        Ok(LlmResponse { content, usage, elapsed })
    }

    /// Cumulative token usage across every call made through this client.
    pub fn usage_stats(&self) -> UsageStats {
        let prompt = self.total_prompt_tokens.load(Ordering::Relaxed);
        let completion = self.total_completion_tokens.load(Ordering::Relaxed);
        UsageStats {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_prompt_tokens: prompt,
            total_completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }
}

/// Exponential backoff with up to one base-delay of jitter. Workers back
/// off independently; there is no shared rate-limit counter.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    let jitter = rand::rng().random_range(0.0..base.as_secs_f64().max(0.001));
    exp + Duration::from_secs_f64(jitter)
}

/// Extract a retry-after hint from a rate-limit response body, if present.
/// Looks for patterns like "retry after 12 seconds".
fn parse_retry_after(text: &str) -> Option<u64> {
    let lower = text.to_lowercase();
    let pos = lower.find("retry")?;
    for word in lower[pos..].split_whitespace().skip(1).take(5) {
        if let Ok(secs) = word.trim_matches(|c: char| !c.is_numeric()).parse::<u64>() {
            if secs > 0 && secs < 300 {
                return Some(secs);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after_finds_hint() {
        assert_eq!(
            parse_retry_after("Rate limited. Please retry after 12 seconds."),
            Some(12)
        );
        assert_eq!(parse_retry_after("Rate limited, retry in 5s"), Some(5));
    }

    #[test]
    fn test_parse_retry_after_ignores_noise() {
        assert_eq!(parse_retry_after("no hint here"), None);
        assert_eq!(parse_retry_after("retry after a while"), None);
        // Out-of-range hints are rejected
        assert_eq!(parse_retry_after("retry after 5000 seconds"), None);
    }

    #[test]
    fn test_backoff_delay_grows_with_attempts() {
        let base = Duration::from_secs(2);
        let first = backoff_delay(base, 1);
        let third = backoff_delay(base, 3);
        assert!(first >= base);
        // 2s * 2^2 = 8s floor for attempt 3
        assert!(third >= Duration::from_secs(8));
        assert!(third < Duration::from_secs(11));
    }
}
