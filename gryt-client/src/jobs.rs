//! Agent API endpoints

use crate::error::Result;
use crate::{API_KEY_HEADER, AgentClient};
use gryt_core::dto::health::{HealthResponse, ServiceInfo};
use gryt_core::dto::job::{ExecuteJobRequest, ExecuteJobResponse};

impl AgentClient {
    /// Run a job on the agent and wait for its result
    ///
    /// A job that fails (clone error, nonzero exit, ...) is still `Ok`;
    /// inspect `success` on the response. `Err` means the request itself
    /// did not go through.
    pub async fn execute_job(&self, req: &ExecuteJobRequest) -> Result<ExecuteJobResponse> {
        let url = format!("{}/jobs/execute", self.base_url);
        tracing::debug!("Submitting job {} to {}", req.job_id, url);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Query agent health (no authentication)
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Query service name and version
    pub async fn info(&self) -> Result<ServiceInfo> {
        let url = format!("{}/", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;

    #[tokio::test]
    async fn test_unreachable_agent_is_request_failure() {
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let client = AgentClient::new("http://127.0.0.1:9", "secret");

        let err = client.health().await.unwrap_err();
        assert!(matches!(err, ClientError::RequestFailed(_)));
        assert!(!err.is_client_error());
    }
}
