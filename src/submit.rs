//! Results submission.
//!
//! The [`Submitter`] posts a results payload and, when the service answers
//! with an upload permit, hands the payload's artifact files to an
//! [`UploadScheduler`] along with the first credential grant.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiResult};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, UploadConfig};
use crate::credentials::{CredentialBroker, CredentialGrant, HttpCredentialBroker};
use crate::report::{NullReporter, UploadReporter};
use crate::results::{ResultsPayload, extract_files};
use crate::storage::SessionFactory;
use crate::storage::s3::S3SessionFactory;
use crate::upload::{UploadBatch, UploadScheduler};

/// Final status of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitResult {
    pub success: bool,
    pub message: String,
    pub warnings: Vec<String>,
    /// Holds exactly `message` when `success` is false, otherwise empty.
    pub errors: Vec<String>,
}

impl SubmitResult {
    pub fn succeeded(message: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            warnings,
            errors: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            errors: vec![message.clone()],
            message,
            warnings: Vec::new(),
        }
    }
}

/// Submits results and uploads their artifact files.
pub struct Submitter<B, F, R> {
    api: ApiClient,
    broker: B,
    sessions: F,
    reporter: R,
    clock: Arc<dyn Clock>,
    config: UploadConfig,
}

impl<R: UploadReporter> Submitter<HttpCredentialBroker, S3SessionFactory, R> {
    /// Builds a submitter talking to the configured service and bucket.
    pub fn from_config(config: &Config, reporter: R) -> ApiResult<Self> {
        let api = ApiClient::new(config.service.clone())?;
        let broker = HttpCredentialBroker::new(api.clone());
        let sessions = S3SessionFactory::new(&config.upload);

        Ok(Self::new(
            api,
            broker,
            sessions,
            reporter,
            config.upload.clone(),
        ))
    }
}

impl<B, F, R> Submitter<B, F, R>
where
    B: CredentialBroker,
    F: SessionFactory,
    R: UploadReporter,
{
    pub fn new(api: ApiClient, broker: B, sessions: F, reporter: R, config: UploadConfig) -> Self {
        Self {
            api,
            broker,
            sessions,
            reporter,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replaces the wall clock used for credential expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Submits `payload` and uploads its files if the service permits it.
    ///
    /// Only a failed submission is unsuccessful. Once the results are
    /// accepted, upload problems (including a refused permit) come back as
    /// warnings on a successful result.
    pub async fn submit(&self, payload: &ResultsPayload) -> SubmitResult {
        let data = match self.api.submit_results(payload).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Results submission failed: {:?}", e);
                return SubmitResult::failed(e.to_string());
            }
        };

        info!("Results accepted: {}", data.message);

        let Some(permit) = data.upload else {
            return SubmitResult::succeeded(data.message, Vec::new());
        };

        let grant = match CredentialGrant::from_permit(permit, "") {
            Ok(grant) => grant,
            Err(e) => {
                info!("Files will not be uploaded: {}", e);
                return SubmitResult::succeeded(data.message, vec![e.to_string()]);
            }
        };

        let batch = UploadBatch {
            target: payload.target.clone(),
            key_prefix: grant.key_prefix.clone(),
            grant,
            tasks: extract_files(payload),
        };

        let outcome = UploadScheduler::new(
            &self.broker,
            &self.sessions,
            self.clock.as_ref(),
            &self.reporter,
            &self.config,
        )
        .run(batch)
        .await;

        SubmitResult::succeeded(outcome.message(), outcome.warnings)
    }
}

/// Submits `payload` using the service and bucket from `config`, without
/// progress output.
pub async fn submit(payload: &ResultsPayload, config: &Config) -> SubmitResult {
    match Submitter::from_config(config, NullReporter) {
        Ok(submitter) => submitter.submit(payload).await,
        Err(e) => SubmitResult::failed(e.to_string()),
    }
}
