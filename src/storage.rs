//! Object store sessions for artifact transfers.
//!
//! A [`TransferSession`] is a live connection to the object store bound to a
//! single [`CredentialGrant`]. Sessions are produced by a [`SessionFactory`]
//! and replaced, never updated, when credentials rotate.
//!
//! ```text
//!   CredentialGrant ──► SessionFactory::open() ──► Arc<dyn TransferSession>
//!                                                        │
//!                                    upload(key, path) ──┤ (one spawned task per file)
//!                                                        │
//!                                             close() ◄──┘ (on rotation / batch end)
//! ```
//!
//! # Built-in Backends
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | S3 | [`s3`] | AWS S3 or any S3-compatible store via `aws-sdk-s3` |

pub mod s3;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::credentials::CredentialGrant;

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Warning recorded for every failed transfer.
pub const UPLOAD_FAILED: &str = "Failed to upload file.";

/// Where a transfer failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorKind {
    /// The object store rejected the request.
    Service,
    /// The request never got a service answer (I/O, DNS, TLS, dispatch).
    Client,
    /// Anything else, including a transfer task that panicked.
    Unknown,
}

impl fmt::Display for TransferErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferErrorKind::Service => write!(f, "service"),
            TransferErrorKind::Client => write!(f, "client"),
            TransferErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A single file transfer failure.
///
/// Transfer failures never stop a batch; the scheduler turns each into
/// warnings via [`warnings`](Self::warnings).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {}", .detail.as_deref().unwrap_or("no details"))]
pub struct TransferError {
    pub kind: TransferErrorKind,
    pub detail: Option<String>,
}

impl TransferError {
    pub fn service(detail: impl Into<String>) -> Self {
        Self {
            kind: TransferErrorKind::Service,
            detail: Some(detail.into()),
        }
    }

    pub fn client(detail: impl Into<String>) -> Self {
        Self {
            kind: TransferErrorKind::Client,
            detail: Some(detail.into()),
        }
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self {
            kind: TransferErrorKind::Unknown,
            detail: Some(detail.into()),
        }
    }

    /// User-facing warnings for this failure.
    ///
    /// Service errors contribute their message ahead of the generic
    /// [`UPLOAD_FAILED`] line. Client and unknown details only go to logs.
    pub fn warnings(&self) -> Vec<String> {
        match (&self.kind, &self.detail) {
            (TransferErrorKind::Service, Some(detail)) => {
                vec![detail.clone(), UPLOAD_FAILED.to_string()]
            }
            _ => vec![UPLOAD_FAILED.to_string()],
        }
    }
}

/// A live object store connection bound to one credential grant.
#[async_trait]
pub trait TransferSession: Send + Sync {
    /// Uploads the file at `path` to `key`, returning the bytes transferred.
    async fn upload(&self, key: &str, path: &Path) -> TransferResult<u64>;

    /// Releases the session. Called once no transfer is using it.
    async fn close(&self) {}
}

/// Opens transfer sessions from credential grants.
pub trait SessionFactory: Send + Sync {
    fn open(&self, grant: &CredentialGrant) -> Arc<dyn TransferSession>;
}

impl<T: SessionFactory + ?Sized> SessionFactory for Arc<T> {
    fn open(&self, grant: &CredentialGrant) -> Arc<dyn TransferSession> {
        (**self).open(grant)
    }
}
