//! LLM gateway: transport, retry/backoff, and usage accounting.

pub mod client;
pub mod models;

pub use client::{ChatMessage, LlmClient, LlmResponse};
pub use models::{Usage, UsageStats};
