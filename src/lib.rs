//! tesults: submit test results and upload their artifact files.
//!
//! This crate posts a test run's results to the results service and, when the
//! service permits it, uploads the files attached to each test case to the
//! artifact bucket using short-lived, rotating credentials.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Api**: HTTP client for the results and upload-permit endpoints
//! - **Credentials**: Time-boxed storage grants and the broker issuing them
//! - **Storage**: Object store sessions (S3)
//! - **Upload**: Concurrency-capped scheduler with drain-before-rotate renewal
//! - **Submit**: Ties submission and upload together
//! - **Report**: Console progress and summaries
//!
//! # Example
//!
//! ```no_run
//! use tesults::config::load_config_or_default;
//! use tesults::results::ResultsPayload;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config_or_default(std::path::Path::new("tesults.toml"))?;
//!     let payload = ResultsPayload::from_path(std::path::Path::new("results.json"))?;
//!
//!     let result = tesults::submit::submit(&payload, &config).await;
//!     println!("{}", result.message);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod report;
pub mod results;
pub mod storage;
pub mod submit;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{Config, load_config};
pub use credentials::{CredentialBroker, CredentialGrant};
pub use report::UploadReporter;
pub use results::{ResultsPayload, UploadTask, extract_files};
pub use storage::{SessionFactory, TransferSession};
pub use submit::{SubmitResult, Submitter};
pub use upload::{UploadOutcome, UploadScheduler};
