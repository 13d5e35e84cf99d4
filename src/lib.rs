//! Patchbench library crate
//!
//! Exposes the harness modules so integration tooling can drive batches,
//! aggregation and reporting without going through CLI startup.

pub mod config;
pub mod context;
pub mod experiment;
pub mod instance;
pub mod llm;
pub mod patch;
pub mod prompts;
pub mod report;
pub mod result;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod strategy;
pub mod util;
pub mod validate;
pub mod workspace;
