//! HTTP client for the results service.
//!
//! [`ApiClient`] owns a single `reqwest` connection pool and is created once
//! per invocation, then shared (it is cheap to clone) by the submitter and
//! the credential broker. Both endpoints take a JSON body and answer with the
//! envelopes described in [`wire`].

pub mod wire;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::results::ResultsPayload;
use wire::{ErrorEnvelope, PermitRequest, SuccessData, SuccessEnvelope};

/// Result type for results service calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors talking to the results service.
///
/// The `Display` text of each transport variant is the short message shown
/// to users; the `detail` field keeps the underlying cause for logs.
/// [`Server`](ApiError::Server) carries the service's own error message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// The request body could not be serialized.
    #[error("Incorrect data format.")]
    Encode { detail: String },

    /// The service could not be reached.
    #[error("Unable to connect.")]
    Connect { detail: String },

    /// The request did not complete within the configured timeout.
    #[error("Request timed out.")]
    Timeout { detail: String },

    /// The request could not be sent after the connection was made.
    #[error("Unable to write data.")]
    Send { detail: String },

    /// The response body was unreadable or did not match the envelope.
    #[error("Error processing response.")]
    Response { detail: String },

    /// The service answered with a non-success status.
    #[error("{0}")]
    Server(String),
}

impl ApiError {
    fn from_transport(err: reqwest::Error) -> Self {
        let detail = err.to_string();
        if err.is_timeout() {
            ApiError::Timeout { detail }
        } else if err.is_connect() {
            ApiError::Connect { detail }
        } else if err.is_request() || err.is_body() {
            ApiError::Send { detail }
        } else {
            ApiError::Connect { detail }
        }
    }
}

/// Client for the results service endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    service: ServiceConfig,
}

impl ApiClient {
    /// Creates a client for the given service settings.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Connect`] if the HTTP client cannot be built
    /// (for example, TLS initialisation failed).
    pub fn new(service: ServiceConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(service.timeout_secs))
            .build()
            .map_err(|e| ApiError::Connect {
                detail: e.to_string(),
            })?;

        Ok(Self { http, service })
    }

    /// Submits a results payload.
    pub async fn submit_results(&self, payload: &ResultsPayload) -> ApiResult<SuccessData> {
        self.post(&self.service.results_url(), payload).await
    }

    /// Asks for fresh upload credentials for `key` under `target`.
    pub async fn request_upload(&self, target: &str, key: &str) -> ApiResult<SuccessData> {
        self.post(&self.service.permit_url(), &PermitRequest { target, key })
            .await
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> ApiResult<SuccessData> {
        let bytes = serde_json::to_vec(body).map_err(|e| ApiError::Encode {
            detail: e.to_string(),
        })?;

        debug!("POST {} ({} bytes)", url, bytes.len());

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .body(bytes)
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ApiError::Response {
            detail: e.to_string(),
        })?;

        debug!("{} answered {}", url, status);

        if status.is_success() {
            let envelope: SuccessEnvelope =
                serde_json::from_str(&text).map_err(|e| ApiError::Response {
                    detail: format!("invalid success body: {}", e),
                })?;
            Ok(envelope.data)
        } else {
            let envelope: ErrorEnvelope =
                serde_json::from_str(&text).map_err(|e| ApiError::Response {
                    detail: format!("HTTP {} with invalid error body: {}", status, e),
                })?;
            Err(ApiError::Server(envelope.error.message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestServer, closed_port_url};
    use serde_json::json;

    fn client(base_url: &str) -> ApiClient {
        ApiClient::new(ServiceConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            ..Default::default()
        })
        .unwrap()
    }

    fn payload() -> ResultsPayload {
        serde_json::from_value(json!({
            "target": "token",
            "results": {"cases": [{"name": "a", "result": "pass"}]}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_posts_payload_and_reads_data() {
        let server = TestServer::start()
            .await
            .respond("/results", 200, json!({"data": {"message": "Success"}}));

        let data = client(&server.base_url)
            .submit_results(&payload())
            .await
            .unwrap();

        assert_eq!(data.message, "Success");
        assert!(data.upload.is_none());

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/results");
        assert_eq!(requests[0].body["target"], "token");
        assert_eq!(requests[0].body["results"]["cases"][0]["name"], "a");
    }

    #[tokio::test]
    async fn test_error_status_returns_server_message() {
        let server = TestServer::start().await.respond(
            "/results",
            400,
            json!({"error": {"message": "Invalid target token."}}),
        );

        let err = client(&server.base_url)
            .submit_results(&payload())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Invalid target token.");
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_response_error() {
        let server = TestServer::start()
            .await
            .respond_raw("/results", 200, "<html>oops</html>");

        let err = client(&server.base_url)
            .submit_results(&payload())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Response { .. }));
        assert_eq!(err.to_string(), "Error processing response.");
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let url = closed_port_url().await;

        let err = client(&url).submit_results(&payload()).await.unwrap_err();

        assert!(matches!(err, ApiError::Connect { .. }));
        assert_eq!(err.to_string(), "Unable to connect.");
    }

    #[tokio::test]
    async fn test_request_upload_sends_target_and_key() {
        let server = TestServer::start().await.respond(
            "/permitupload",
            200,
            json!({"data": {"message": "", "upload": {"key": "k", "permit": false, "message": "No."}}}),
        );

        let data = client(&server.base_url)
            .request_upload("token", "k")
            .await
            .unwrap();

        assert!(!data.upload.unwrap().permit);
        let requests = server.requests();
        assert_eq!(requests[0].body, json!({"target": "token", "key": "k"}));
    }
}
