//! Service status DTOs

use serde::{Deserialize, Serialize};

/// Response of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" when the container runtime answers, "degraded" otherwise
    pub status: String,
    pub version: String,
    pub docker_available: bool,
}

impl HealthResponse {
    pub fn new(version: impl Into<String>, docker_available: bool) -> Self {
        Self {
            status: if docker_available {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            version: version.into(),
            docker_available,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Response of `GET /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub status: String,
}
