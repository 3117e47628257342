//! The upload scheduling loop.
//!
//! [`UploadScheduler::run`] keeps a queue of pending files and a bounded set
//! of in-flight transfers. Each pass of the loop:
//!
//! 1. **Admission**: with a free slot and pending work, check the active
//!    grant. A grant within the expiry buffer is rotated, but only once no
//!    transfer is in flight (drain-before-rotate); until then admission
//!    pauses. With a usable grant, one file is dequeued and either rejected
//!    as missing or spawned as a transfer.
//! 2. **Sweep**: finished transfers are collected in completion order. When
//!    nothing was admitted the loop waits for the next completion rather
//!    than spinning.
//!
//! Only one session exists at a time, and it is closed before its
//! replacement is opened.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use super::{UploadBatch, UploadOutcome, UploadTask};
use crate::clock::Clock;
use crate::config::UploadConfig;
use crate::credentials::{CredentialBroker, CredentialGrant};
use crate::report::UploadReporter;
use crate::storage::{SessionFactory, TransferError, TransferResult, TransferSession};

/// Warning recorded when renewals keep returning credentials that are
/// already inside the expiry buffer.
pub const STALE_CREDENTIALS: &str = "Upload credentials expired before they could be used.";

type Transfer = (UploadTask, TransferResult<u64>);

/// Drives one upload batch to completion.
///
/// The scheduler borrows its collaborators, so the same broker, session
/// factory and reporter can serve several batches.
pub struct UploadScheduler<'a> {
    broker: &'a dyn CredentialBroker,
    sessions: &'a dyn SessionFactory,
    clock: &'a dyn Clock,
    reporter: &'a dyn UploadReporter,
    config: &'a UploadConfig,
}

impl<'a> UploadScheduler<'a> {
    pub fn new(
        broker: &'a dyn CredentialBroker,
        sessions: &'a dyn SessionFactory,
        clock: &'a dyn Clock,
        reporter: &'a dyn UploadReporter,
        config: &'a UploadConfig,
    ) -> Self {
        Self {
            broker,
            sessions,
            clock,
            reporter,
            config,
        }
    }

    /// Uploads every file of `batch` and returns the aggregated outcome.
    ///
    /// Never fails: per-file problems and credential failures are reported
    /// as warnings in the outcome.
    pub async fn run(&self, batch: UploadBatch) -> UploadOutcome {
        let UploadBatch {
            target,
            key_prefix,
            mut grant,
            tasks,
        } = batch;

        let max_active = self.config.max_active_uploads.max(1);
        let buffer = self.config.expire_buffer_secs;

        let mut pending: VecDeque<UploadTask> = tasks.into();
        let mut in_flight: JoinSet<Transfer> = JoinSet::new();
        let mut outcome = UploadOutcome::default();
        let mut session = self.sessions.open(&grant);
        let mut stale_renewals = 0;

        info!(
            "Uploading {} files under {} ({} at a time)",
            pending.len(),
            key_prefix,
            max_active
        );
        self.reporter.on_batch_start(pending.len()).await;

        while !pending.is_empty() || !in_flight.is_empty() {
            let now = self.clock.now_epoch_secs();
            let mut admitted = false;

            if in_flight.len() < max_active && !pending.is_empty() {
                if !grant.is_usable(now, buffer) && in_flight.is_empty() {
                    match self.renew(&target, &key_prefix).await {
                        Ok(fresh) => {
                            session.close().await;
                            session = self.sessions.open(&fresh);
                            grant = fresh;

                            if grant.is_usable(now, buffer) {
                                stale_renewals = 0;
                            } else {
                                stale_renewals += 1;
                                warn!(
                                    "Renewed credentials expire at {}, already inside the {}s buffer",
                                    grant.expires_at, buffer
                                );
                                if stale_renewals >= self.config.max_stale_renewals.max(1) {
                                    self.warn(&mut outcome, STALE_CREDENTIALS).await;
                                    break;
                                }
                            }
                        }
                        Err(message) => {
                            self.warn(&mut outcome, message).await;
                            break;
                        }
                    }
                }

                if grant.is_usable(now, buffer)
                    && let Some(task) = pending.pop_front()
                {
                    admitted = true;
                    self.dispatch(task, &key_prefix, &session, &mut in_flight, &mut outcome)
                        .await;
                }
            }

            if !admitted && let Some(joined) = in_flight.join_next().await {
                self.complete(joined, &mut outcome).await;
            }
            while let Some(joined) = in_flight.try_join_next() {
                self.complete(joined, &mut outcome).await;
            }
        }

        self.abandon(pending, &mut outcome).await;
        session.close().await;

        info!(
            "Upload finished: {} files, {} bytes, {} warnings",
            outcome.files_uploaded,
            outcome.bytes_uploaded,
            outcome.warnings.len()
        );
        self.reporter.on_batch_complete(&outcome).await;

        outcome
    }

    /// Requests a fresh grant, mapping failure to its warning text.
    async fn renew(&self, target: &str, key_prefix: &str) -> Result<CredentialGrant, String> {
        debug!("Upload credentials near expiry, requesting new ones");

        match self.broker.request_credentials(target, key_prefix).await {
            Ok(grant) => {
                if grant.key_prefix != key_prefix {
                    debug!(
                        "Renewed credentials carry key prefix {}, keeping {}",
                        grant.key_prefix, key_prefix
                    );
                }
                Ok(grant)
            }
            Err(e) => {
                warn!("Stopping upload, credential renewal failed: {}", e);
                Err(e.to_string())
            }
        }
    }

    async fn dispatch(
        &self,
        task: UploadTask,
        key_prefix: &str,
        session: &Arc<dyn TransferSession>,
        in_flight: &mut JoinSet<Transfer>,
        outcome: &mut UploadOutcome,
    ) {
        match tokio::fs::metadata(&task.local_path).await {
            Ok(metadata) if !metadata.is_dir() => {
                let key = task.object_key(key_prefix);
                debug!("Uploading {} to {}", task.local_path.display(), key);

                let session = Arc::clone(session);
                in_flight.spawn(async move {
                    let result = session.upload(&key, &task.local_path).await;
                    (task, result)
                });
            }
            _ => {
                outcome.files_missing += 1;
                self.warn(outcome, format!("File not found: {}", task.file_name()))
                    .await;
            }
        }
    }

    async fn complete(&self, joined: Result<Transfer, JoinError>, outcome: &mut UploadOutcome) {
        let error = match joined {
            Ok((task, Ok(bytes))) => {
                outcome.files_uploaded += 1;
                outcome.bytes_uploaded += bytes;
                self.reporter.on_file_uploaded(&task, bytes).await;
                return;
            }
            Ok((task, Err(e))) => {
                warn!("Failed to upload {}: {}", task.local_path.display(), e);
                e
            }
            Err(e) => {
                warn!("Upload task did not finish: {}", e);
                TransferError::unknown(e.to_string())
            }
        };

        outcome.files_failed += 1;
        for message in error.warnings() {
            self.warn(outcome, message).await;
        }
    }

    async fn abandon(&self, pending: VecDeque<UploadTask>, outcome: &mut UploadOutcome) {
        if pending.is_empty() {
            return;
        }

        warn!("{} files were not uploaded", pending.len());
        outcome.abandoned = pending.len();

        for task in pending {
            warn!("Not uploaded: {}", task.local_path.display());
            if self.config.warn_abandoned {
                self.warn(outcome, format!("File not uploaded: {}", task.file_name()))
                    .await;
            }
        }
    }

    async fn warn(&self, outcome: &mut UploadOutcome, message: impl Into<String>) {
        let message = message.into();
        self.reporter.on_warning(&message).await;
        outcome.warnings.push(message);
    }
}
