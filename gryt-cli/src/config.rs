//! Configuration module
//!
//! Connection settings shared by every command.

use gryt_client::AgentClient;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the agent
    pub agent_url: String,

    /// Shared secret; may be empty for unauthenticated endpoints
    pub api_key: String,
}

impl Config {
    pub fn client(&self) -> AgentClient {
        AgentClient::new(&self.agent_url, &self.api_key)
    }
}
