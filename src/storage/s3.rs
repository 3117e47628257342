//! S3 transfer sessions.
//!
//! Each session builds its own `aws_sdk_s3::Client` from the grant's static
//! session credentials, so a rotated grant gets a fresh connection pool and
//! the old one is dropped with the previous session.
//!
//! # Example Configuration
//!
//! ```toml
//! [upload]
//! bucket = "tesults-results"
//! region = "us-east-1"
//!
//! # S3-compatible store (path-style addressing)
//! endpoint_url = "http://localhost:9000"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use super::{SessionFactory, TransferError, TransferResult, TransferSession};
use crate::config::UploadConfig;
use crate::credentials::CredentialGrant;

const PROVIDER_NAME: &str = "tesults";

/// Opens [`S3Session`]s against the configured bucket.
#[derive(Debug, Clone)]
pub struct S3SessionFactory {
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
}

impl S3SessionFactory {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint_url: config.endpoint_url.clone(),
        }
    }

    fn client(&self, grant: &CredentialGrant) -> Client {
        let credentials = Credentials::new(
            grant.access_key_id.clone(),
            grant.secret_access_key.clone(),
            Some(grant.session_token.clone()),
            expiry_time(grant.expires_at),
            PROVIDER_NAME,
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &self.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Client::from_conf(builder.build())
    }
}

impl SessionFactory for S3SessionFactory {
    fn open(&self, grant: &CredentialGrant) -> Arc<dyn TransferSession> {
        debug!(
            "Opening S3 session for bucket {} with credentials {}",
            self.bucket, grant.access_key_id
        );

        Arc::new(S3Session {
            client: self.client(grant),
            bucket: self.bucket.clone(),
            access_key_id: grant.access_key_id.clone(),
        })
    }
}

/// A transfer session holding one S3 client.
pub struct S3Session {
    client: Client,
    bucket: String,
    access_key_id: String,
}

#[async_trait]
impl TransferSession for S3Session {
    async fn upload(&self, key: &str, path: &Path) -> TransferResult<u64> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| TransferError::client(format!("{}: {}", path.display(), e)))?
            .len();

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| TransferError::client(format!("{}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(size as i64)
            .body(body)
            .send()
            .await
            .map_err(transfer_error)?;

        debug!("Uploaded {} ({} bytes)", key, size);
        Ok(size)
    }

    async fn close(&self) {
        debug!("Closing S3 session {}", self.access_key_id);
    }
}

fn expiry_time(expires_at: i64) -> Option<SystemTime> {
    u64::try_from(expires_at)
        .ok()
        .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
}

/// Classifies an SDK failure: anything the service answered is a service
/// error carrying its code and message, everything else is client-side.
fn transfer_error<E, R>(err: SdkError<E, R>) -> TransferError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err.as_service_error() {
        Some(service) => {
            let detail = match (service.code(), service.message()) {
                (Some(code), Some(message)) => format!("{}: {}", code, message),
                (Some(code), None) => code.to_string(),
                (None, Some(message)) => message.to_string(),
                (None, None) => service.to_string(),
            };
            TransferError::service(detail)
        }
        None => TransferError::client(DisplayErrorContext(&err).to_string()),
    }
}
