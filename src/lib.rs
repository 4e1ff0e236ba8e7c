//! # code-refiner
//!
//! Batch-refactors a source tree with an LLM, generates unit tests for both the
//! original and the refactored code, and keeps CSV run statistics.
//!
//! ## Features
//!
//! - Three sequential passes over the project with deterministic ordering
//! - Bounded exponential-backoff retry with classified API errors
//! - Response cleaning (reasoning blocks, code fences, conversational preambles)
//! - Append-only modification log and a cumulative cross-run report
//!
//! ## Quick Start
//!
//! ```no_run
//! use code_refiner::{Config, GroqClient, Pipeline};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::from_env_file(".env")?.build()?;
//! let client = GroqClient::new(&config.api)?;
//!
//! let summary = Pipeline::new(config, client)?.run()?;
//! summary.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. **Walker**: Discovers eligible files, pruning output trees
//! 2. **Processor**: Sends each file to the model and writes the cleaned result
//! 3. **Report**: Logs every refined file and merges run totals into history

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod filter;
mod pipeline;
mod processor;
mod report;
mod source;
mod stats;
mod walker;

pub mod client;
pub mod prompt;
pub mod response;
pub mod retry;

pub use client::{ApiError, ApiErrorKind, CompletionClient, CompletionRequest, GroqClient};
pub use config::{ApiConfig, Config, ConfigBuilder};
pub use error::{Error, Result};
pub use filter::{ExclusionReason, PathClass, PathFilter};
pub use pipeline::{PassStats, Pipeline, RunSummary};
pub use processor::{ArtifactKind, FileProcessor, ProcessOutcome, Target};
pub use prompt::PromptKind;
pub use report::{
    FinalReport, HistoricalTotals, MetricKey, MetricValue, ModificationLog, ModificationRecord,
    ReportRow, ReportTables, sanitize,
};
pub use retry::{RetryOn, RetryPolicy, RetryingCaller};
pub use source::{SourceFile, count_lines};
pub use stats::{RunStats, minutes_rounded};

/// Runs a complete refinement against the Groq API.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The HTTP client cannot be built
/// - Output directories cannot be prepared
///
/// # Examples
///
/// ```no_run
/// use code_refiner::{Config, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .project_root(".")
///     .api_key("gsk_...")
///     .build()?;
///
/// run(config)?;
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<RunSummary> {
    let client = GroqClient::new(&config.api)?;
    Pipeline::new(config, client)?.run()
}
