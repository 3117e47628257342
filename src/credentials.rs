//! Short-lived storage credentials and the broker that issues them.
//!
//! The results service hands out scoped, time-boxed credentials for the
//! artifact bucket. A [`CredentialGrant`] is never modified: when it nears
//! expiry the upload scheduler asks a [`CredentialBroker`] for a new one and
//! replaces the old grant wholesale.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::api::wire::UploadPermit;
use crate::api::{ApiClient, ApiError};

/// Result type for credential requests.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Why a credential request produced no usable grant.
///
/// Both variants end the current upload batch; neither is retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// The request failed or the response could not be understood.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The service answered but declined to permit further uploads
    /// (for example, the storage quota is used up).
    #[error("{0}")]
    Refused(String),
}

/// A time-boxed credential for writing to the artifact bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialGrant {
    /// Namespace the service assigned to this batch.
    pub key_prefix: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// Expiry in seconds since the Unix epoch.
    pub expires_at: i64,
}

impl CredentialGrant {
    /// Returns `true` while the grant can still be used for new transfers,
    /// i.e. `now + buffer` is strictly before the expiry.
    pub fn is_usable(&self, now: i64, buffer_secs: i64) -> bool {
        now.saturating_add(buffer_secs) < self.expires_at
    }

    /// Builds a grant from an upload permit.
    ///
    /// `fallback_key` is used when the permit carries no key prefix.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::Refused`] with the permit's message when `permit`
    ///   is false
    /// - [`BrokerError::Api`] when a permitted response has no credentials
    pub fn from_permit(permit: UploadPermit, fallback_key: &str) -> BrokerResult<Self> {
        if !permit.permit {
            return Err(BrokerError::Refused(permit.message));
        }

        let auth = permit.auth.ok_or_else(|| ApiError::Response {
            detail: "upload permitted without credentials".to_string(),
        })?;

        let key_prefix = if permit.key.is_empty() {
            fallback_key.to_string()
        } else {
            permit.key
        };

        Ok(Self {
            key_prefix,
            access_key_id: auth.access_key_id,
            secret_access_key: auth.secret_access_key,
            session_token: auth.session_token,
            expires_at: auth.expiration,
        })
    }
}

impl fmt::Debug for CredentialGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialGrant")
            .field("key_prefix", &self.key_prefix)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Issues fresh credential grants.
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    /// Requests a new grant for `key_prefix` under `target`.
    ///
    /// One call is one request: failures are reported, never retried here.
    async fn request_credentials(
        &self,
        target: &str,
        key_prefix: &str,
    ) -> BrokerResult<CredentialGrant>;
}

#[async_trait]
impl<T: CredentialBroker + ?Sized> CredentialBroker for Arc<T> {
    async fn request_credentials(
        &self,
        target: &str,
        key_prefix: &str,
    ) -> BrokerResult<CredentialGrant> {
        (**self).request_credentials(target, key_prefix).await
    }
}

/// Broker backed by the results service's permit endpoint.
#[derive(Debug, Clone)]
pub struct HttpCredentialBroker {
    api: ApiClient,
}

impl HttpCredentialBroker {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl CredentialBroker for HttpCredentialBroker {
    async fn request_credentials(
        &self,
        target: &str,
        key_prefix: &str,
    ) -> BrokerResult<CredentialGrant> {
        let data = self.api.request_upload(target, key_prefix).await?;

        let permit = data.upload.ok_or_else(|| ApiError::Response {
            detail: "credential response without upload section".to_string(),
        })?;

        let grant = CredentialGrant::from_permit(permit, key_prefix)?;
        debug!(
            "Received credentials {} expiring at {}",
            grant.access_key_id, grant.expires_at
        );

        Ok(grant)
    }
}
