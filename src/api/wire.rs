//! JSON envelopes exchanged with the results service.
//!
//! Successful responses wrap their payload in `data`, failures in `error`:
//!
//! ```json
//! {"data": {"message": "Success", "upload": {"key": "...", "message": "...", "permit": true,
//!           "auth": {"AccessKeyId": "...", "SecretAccessKey": "...",
//!                    "SessionToken": "...", "Expiration": 1700000000}}}}
//! {"error": {"message": "Invalid target token."}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct SuccessEnvelope {
    pub data: SuccessData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
}

/// The `data` object of a successful response.
#[derive(Debug, Clone, Deserialize)]
pub struct SuccessData {
    #[serde(default)]
    pub message: String,

    /// Present when the service wants artifact files uploaded.
    #[serde(default)]
    pub upload: Option<UploadPermit>,
}

/// Upload permission and credentials issued by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadPermit {
    /// Key prefix the batch must be stored under.
    #[serde(default)]
    pub key: String,

    /// Human-readable explanation, used when `permit` is false.
    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub permit: bool,

    #[serde(default)]
    pub auth: Option<UploadAuth>,
}

/// Temporary storage credentials in the service's wire casing.
#[derive(Clone, Deserialize)]
pub struct UploadAuth {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,

    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,

    #[serde(rename = "SessionToken")]
    pub session_token: String,

    /// Expiry in seconds since the Unix epoch.
    #[serde(rename = "Expiration")]
    pub expiration: i64,
}

impl fmt::Debug for UploadAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadAuth")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Body of a credential renewal request.
#[derive(Debug, Serialize)]
pub(crate) struct PermitRequest<'a> {
    pub target: &'a str,
    pub key: &'a str,
}
