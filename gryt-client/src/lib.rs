//! Gryt Agent HTTP Client
//!
//! A small, type-safe client for the agent API, shared by the CLI and by any
//! dispatcher that hands jobs to agents.
//!
//! # Example
//!
//! ```no_run
//! use gryt_client::AgentClient;
//! use gryt_core::dto::job::ExecuteJobRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = AgentClient::new("http://localhost:8080", "secret");
//!
//!     // print('ok')
//!     let result = client
//!         .execute_job(&ExecuteJobRequest::new(42, "cHJpbnQoJ29rJyk="))
//!         .await?;
//!
//!     println!("Job {} exited with {}", result.job_id, result.exit_code);
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use gryt_core::dto::health::{HealthResponse, ServiceInfo};
pub use gryt_core::dto::job::{ExecuteJobRequest, ExecuteJobResponse};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// Header carrying the agent's shared secret
pub const API_KEY_HEADER: &str = "X-API-Key";

/// HTTP client for one agent
#[derive(Debug, Clone)]
pub struct AgentClient {
    /// Base URL of the agent (e.g., "http://localhost:8080")
    base_url: String,
    /// Shared secret sent with authenticated requests
    api_key: String,
    /// HTTP client instance
    client: Client,
}

impl AgentClient {
    /// Create a new agent client
    ///
    /// # Example
    /// ```
    /// use gryt_client::AgentClient;
    ///
    /// let client = AgentClient::new("http://localhost:8080", "secret");
    /// ```
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_client(base_url, api_key, Client::new())
    }

    /// Create a new agent client with a custom HTTP client
    ///
    /// Jobs run synchronously inside the request, so callers submitting long
    /// pipelines should configure the timeout accordingly.
    pub fn with_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Get the base URL of the agent
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(
                status.as_u16(),
                extract_error_message(&error_text),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

/// Pulls the message out of an `{"error": "..."}` body, falling back to the
/// raw text
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = AgentClient::new("http://localhost:8080", "secret");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = AgentClient::new("http://localhost:8080/", "secret");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = AgentClient::with_client("http://agent:9000", "secret", http_client);
        assert_eq!(client.base_url(), "http://agent:9000");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            extract_error_message(r#"{"error":"Invalid API key"}"#),
            "Invalid API key"
        );
        assert_eq!(extract_error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(extract_error_message(r#"{"detail":1}"#), r#"{"detail":1}"#);
    }
}
