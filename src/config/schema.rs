//! Configuration schema definitions for tesults.
//!
//! This module defines all configuration types that can be deserialized from
//! TOML configuration files. Every field has a default, so an empty file (or
//! no file at all) yields a working configuration pointed at the public
//! results service.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── ServiceConfig          - Results service endpoints and HTTP timeout
//! └── UploadConfig           - Object store and upload scheduling settings
//! ```

use serde::{Deserialize, Serialize};

/// Root configuration structure for tesults.
///
/// # TOML Structure
///
/// ```toml
/// [service]
/// base_url = "https://www.tesults.com"
/// timeout_secs = 300
///
/// [upload]
/// bucket = "tesults-results"
/// max_active_uploads = 10
/// ```
///
/// # Example
///
/// ```
/// use tesults::config::Config;
///
/// let config: Config = toml::from_str(r#"
///     [upload]
///     max_active_uploads = 4
/// "#).unwrap();
///
/// assert_eq!(config.upload.max_active_uploads, 4);
/// assert_eq!(config.service.results_path, "/results");
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Results service settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Artifact upload settings.
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Results service settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `base_url` | `https://www.tesults.com` |
/// | `results_path` | `/results` |
/// | `permit_path` | `/permitupload` |
/// | `timeout_secs` | 300 |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Base URL of the results service, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path that accepts results submissions.
    #[serde(default = "default_results_path")]
    pub results_path: String,

    /// Path that issues fresh upload credentials.
    #[serde(default = "default_permit_path")]
    pub permit_path: String,

    /// Timeout applied to each HTTP request to the service.
    ///
    /// Submitting a large results payload can take a while, so this is
    /// generous by default. It does not apply to artifact transfers.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            results_path: default_results_path(),
            permit_path: default_permit_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServiceConfig {
    /// Full URL of the results submission endpoint.
    pub fn results_url(&self) -> String {
        join_url(&self.base_url, &self.results_path)
    }

    /// Full URL of the credential endpoint.
    pub fn permit_url(&self) -> String {
        join_url(&self.base_url, &self.permit_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn default_base_url() -> String {
    "https://www.tesults.com".to_string()
}

fn default_results_path() -> String {
    "/results".to_string()
}

fn default_permit_path() -> String {
    "/permitupload".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

/// Object store and upload scheduling settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `bucket` | `tesults-results` |
/// | `region` | `us-east-1` |
/// | `endpoint_url` | None (AWS) |
/// | `max_active_uploads` | 10 |
/// | `expire_buffer_secs` | 30 |
/// | `max_stale_renewals` | 3 |
/// | `warn_abandoned` | false |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Bucket that receives result artifacts.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Region of the bucket.
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint for S3-compatible stores (MinIO, localstack).
    ///
    /// When set, path-style addressing is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    /// Maximum number of files transferred at the same time.
    ///
    /// Bounds socket and memory use on the client machine. Values below 1
    /// are treated as 1.
    #[serde(default = "default_max_active_uploads")]
    pub max_active_uploads: usize,

    /// Seconds before credential expiry at which a grant stops being used.
    #[serde(default = "default_expire_buffer_secs")]
    pub expire_buffer_secs: i64,

    /// Consecutive renewals returning already-expiring credentials before
    /// the batch is abandoned.
    #[serde(default = "default_max_stale_renewals")]
    pub max_stale_renewals: usize,

    /// Emit one warning per file left behind when a batch stops early.
    ///
    /// Abandoned files are always counted and logged; this only controls
    /// whether each one is also listed in the returned warnings.
    #[serde(default)]
    pub warn_abandoned: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            region: default_region(),
            endpoint_url: None,
            max_active_uploads: default_max_active_uploads(),
            expire_buffer_secs: default_expire_buffer_secs(),
            max_stale_renewals: default_max_stale_renewals(),
            warn_abandoned: false,
        }
    }
}

fn default_bucket() -> String {
    "tesults-results".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_active_uploads() -> usize {
    10
}

fn default_expire_buffer_secs() -> i64 {
    30
}

fn default_max_stale_renewals() -> usize {
    3
}
