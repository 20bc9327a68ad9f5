// HTTP client for a remote Tabula server

use crate::rest::{CancelResponse, ErrorResponse, HealthResponse, RunResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tabula_core::{config::MAX_TIME_BUDGET_MS, Error, Result};
use tabula_query::QueryParams;
use tracing::debug;
use uuid::Uuid;

const MAX_ERROR_BODY: usize = 200;

/// Longest server time budget plus headroom for rendering and transfer.
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(MAX_TIME_BUDGET_MS + 10_000);

pub struct HttpClient {
    base_url: String,
    pub(crate) client: reqwest::Client,
}

impl HttpClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let lower = base_url.to_lowercase();
        if !lower.starts_with("http://") && !lower.starts_with("https://") {
            return Err(Error::Configuration(format!(
                "server URL must use http:// or https://, got \"{}\"",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.send_json(self.client.get(self.url("/health"))).await
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request and decode a JSON success body.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(body) => format!("HTTP {}: {} ({})", status, body.error, body.code),
                Err(_) if text.len() > MAX_ERROR_BODY => {
                    let cut = (0..=MAX_ERROR_BODY)
                        .rev()
                        .find(|i| text.is_char_boundary(*i))
                        .unwrap_or(0);
                    format!("HTTP {}: {}...", status, &text[..cut])
                }
                Err(_) => format!("HTTP {}: {}", status, text),
            };
            return Err(Error::Transport(message));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("Failed to parse JSON response: {}", e)))
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn run(&self, params: &QueryParams) -> Result<RunResponse> {
        debug!("POST /api/v1/queries/run");
        self.send_json(self.client.post(self.url("/api/v1/queries/run")).json(params))
            .await
    }

    async fn cancel(&self, run_id: Uuid) -> Result<()> {
        let response: CancelResponse = self
            .send_json(self.client.delete(self.url(&format!("/api/v1/queries/{}", run_id))))
            .await?;
        debug!("Cancel {}: {}", run_id, response.cancelled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_scheme() {
        assert!(matches!(HttpClient::new("file:///etc/passwd"), Err(Error::Configuration(_))));
        assert!(HttpClient::new("ftp://example.com").is_err());
    }

    #[test]
    fn test_request_timeout_outlasts_any_budget() {
        assert!(REQUEST_TIMEOUT > Duration::from_millis(MAX_TIME_BUDGET_MS));
    }

    #[test]
    fn test_url_joining() {
        let client = HttpClient::new("http://localhost:8080/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/api/v1/uploads/3"), "http://localhost:8080/api/v1/uploads/3");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Port 9 (discard) is not served on test machines
        let client = HttpClient::new("http://127.0.0.1:9").unwrap();
        let err = client.run(&QueryParams::new()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(msg) if msg.starts_with("HTTP request failed")));
    }
}
