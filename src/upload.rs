//! Artifact upload orchestration.
//!
//! This module drains a batch of [`UploadTask`]s into the object store under
//! a concurrency cap, rotating short-lived credentials as they approach
//! expiry.
//!
//! # Architecture
//!
//! ```text
//!   UploadBatch (tasks, key prefix, first grant)
//!        │
//!        ▼
//!   UploadScheduler ──── open() ────► SessionFactory ──► TransferSession
//!        │    ▲                                              │
//!        │    └──────── completions (JoinSet) ◄── upload() ──┘
//!        │
//!        │ grant near expiry and nothing in flight
//!        ▼
//!   CredentialBroker::request_credentials()
//!        │
//!        ▼
//!   UploadOutcome (files, bytes, warnings)
//! ```
//!
//! # Failure Handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Missing file or directory | Warning, batch continues |
//! | Transfer error | Warning(s), batch continues |
//! | Credential request failed or refused | Warning, batch stops |
//! | Renewed credentials already expiring | Batch stops after repeated attempts |

pub mod scheduler;

use serde::Serialize;

use crate::credentials::CredentialGrant;

pub use crate::results::UploadTask;
pub use scheduler::UploadScheduler;

/// Everything the scheduler needs to upload one batch.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    /// Target token, sent along with credential renewals.
    pub target: String,

    /// Key prefix every object in the batch is stored under.
    pub key_prefix: String,

    /// Credentials issued with the results submission.
    pub grant: CredentialGrant,

    /// Files in upload order.
    pub tasks: Vec<UploadTask>,
}

/// Aggregated result of an upload batch.
///
/// Every task of the batch ends up in exactly one of `files_uploaded`,
/// `files_failed`, `files_missing` or `abandoned`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    /// Files that finished transferring.
    pub files_uploaded: usize,

    /// Total bytes of the uploaded files.
    pub bytes_uploaded: u64,

    /// Files whose transfer failed.
    pub files_failed: usize,

    /// Files that did not exist or were directories.
    pub files_missing: usize,

    /// Files never attempted because the batch stopped early.
    pub abandoned: usize,

    /// Warnings in the order they occurred.
    pub warnings: Vec<String>,
}

impl UploadOutcome {
    /// Summary line reported back to the caller.
    ///
    /// ```
    /// use tesults::upload::UploadOutcome;
    ///
    /// let outcome = UploadOutcome {
    ///     files_uploaded: 3,
    ///     bytes_uploaded: 1024,
    ///     ..Default::default()
    /// };
    /// assert_eq!(outcome.message(), "Success. 3 files uploaded. 1024 bytes uploaded.");
    /// ```
    pub fn message(&self) -> String {
        format!(
            "Success. {} files uploaded. {} bytes uploaded.",
            self.files_uploaded, self.bytes_uploaded
        )
    }

    /// Number of tasks accounted for so far.
    pub fn tasks_seen(&self) -> usize {
        self.files_uploaded + self.files_failed + self.files_missing + self.abandoned
    }
}
