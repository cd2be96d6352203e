//! Agent configuration
//!
//! Resolved once at start-up and shared read-only with the executor and the
//! HTTP layer. Nothing here is reloaded while jobs run.

use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::envrc::EnvSource;

pub const DEFAULT_IMAGE: &str = "ghcr.io/epyklab/gryt/pipeline:latest";
pub const DEFAULT_WORKSPACE_DIR: &str = "/tmp/gryt-agent-jobs";
pub const SUPPORTED_RUNTIMES: &[&str] = &["docker", "podman"];

/// Start-up configuration failures
///
/// Any of these keeps the agent from becoming ready.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "{0} environment variable not set. Set it in the system environment or in .envrc file."
    )]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("GRYT_ENCRYPTION_KEY is not a valid Fernet key")]
    InvalidEncryptionKey,
}

/// Agent configuration
#[derive(Debug)]
pub struct Config {
    /// Shared secret expected in the `X-API-Key` header
    pub api_key: SecretString,

    /// Fernet key used to decrypt repository tokens
    pub encryption_key: SecretString,

    pub host: String,
    pub port: u16,

    /// Image used when a request does not name one
    pub default_image: String,

    /// Parent directory of all job workspaces
    pub workspace_dir: PathBuf,

    /// Container CLI binary ("docker" or "podman")
    pub container_runtime: String,

    /// Upper bound on a single container run; `None` means unbounded
    pub job_timeout: Option<Duration>,
}

impl Config {
    /// Creates configuration from the environment
    ///
    /// Expected variables (process environment first, `.envrc` second):
    /// - GRYT_ENCRYPTION_KEY (required)
    /// - AGENT_API_KEY (required)
    /// - AGENT_HOST (optional, default: 0.0.0.0)
    /// - AGENT_PORT (optional, default: 8080)
    /// - GRYT_DOCKER_IMAGE (optional, default: ghcr.io/epyklab/gryt/pipeline:latest)
    /// - GRYT_WORKSPACE_DIR (optional, default: /tmp/gryt-agent-jobs)
    /// - GRYT_CONTAINER_RUNTIME (optional, default: docker)
    /// - GRYT_JOB_TIMEOUT (optional, seconds, default: unbounded)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&EnvSource::load())
    }

    pub fn from_source(env: &EnvSource) -> Result<Self, ConfigError> {
        let encryption_key = env
            .get("GRYT_ENCRYPTION_KEY")
            .ok_or(ConfigError::Missing("GRYT_ENCRYPTION_KEY"))?;

        let api_key = env
            .get("AGENT_API_KEY")
            .ok_or(ConfigError::Missing("AGENT_API_KEY"))?;

        let port = match env.get("AGENT_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "AGENT_PORT",
                message: e.to_string(),
            })?,
            None => 8080,
        };

        let job_timeout = match env.get("GRYT_JOB_TIMEOUT") {
            Some(raw) if !raw.trim().is_empty() => {
                let secs = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                    key: "GRYT_JOB_TIMEOUT",
                    message: e.to_string(),
                })?;
                Some(Duration::from_secs(secs))
            }
            _ => None,
        };

        Ok(Self {
            api_key: SecretString::from(api_key),
            encryption_key: SecretString::from(encryption_key),
            host: env.get("AGENT_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            default_image: env
                .get("GRYT_DOCKER_IMAGE")
                .unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            workspace_dir: env
                .get("GRYT_WORKSPACE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE_DIR)),
            container_runtime: env
                .get("GRYT_CONTAINER_RUNTIME")
                .unwrap_or_else(|| "docker".to_string()),
            job_timeout,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.expose_secret().is_empty() {
            return Err(ConfigError::Missing("AGENT_API_KEY"));
        }

        if fernet::Fernet::new(self.encryption_key.expose_secret()).is_none() {
            return Err(ConfigError::InvalidEncryptionKey);
        }

        if self.port == 0 {
            return Err(ConfigError::Invalid {
                key: "AGENT_PORT",
                message: "port must be greater than 0".to_string(),
            });
        }

        if self.default_image.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "GRYT_DOCKER_IMAGE",
                message: "default image cannot be empty".to_string(),
            });
        }

        if !SUPPORTED_RUNTIMES.contains(&self.container_runtime.as_str()) {
            return Err(ConfigError::Invalid {
                key: "GRYT_CONTAINER_RUNTIME",
                message: format!(
                    "'{}' is not one of {}",
                    self.container_runtime,
                    SUPPORTED_RUNTIMES.join(", ")
                ),
            });
        }

        if self.job_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Invalid {
                key: "GRYT_JOB_TIMEOUT",
                message: "timeout must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> Vec<(&'static str, String)> {
        vec![
            ("GRYT_ENCRYPTION_KEY", fernet::Fernet::generate_key()),
            ("AGENT_API_KEY", "test-key".to_string()),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_source(&EnvSource::from_vars(base_vars())).unwrap();

        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.default_image, DEFAULT_IMAGE);
        assert_eq!(config.workspace_dir, PathBuf::from(DEFAULT_WORKSPACE_DIR));
        assert_eq!(config.container_runtime, "docker");
        assert!(config.job_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut vars = base_vars();
        vars.push(("AGENT_HOST", "127.0.0.1".to_string()));
        vars.push(("AGENT_PORT", "9001".to_string()));
        vars.push(("GRYT_DOCKER_IMAGE", "python:3.12-slim".to_string()));
        vars.push(("GRYT_WORKSPACE_DIR", "/var/lib/gryt".to_string()));
        vars.push(("GRYT_CONTAINER_RUNTIME", "podman".to_string()));
        vars.push(("GRYT_JOB_TIMEOUT", "600".to_string()));

        let config = Config::from_source(&EnvSource::from_vars(vars)).unwrap();

        assert_eq!(config.bind_addr(), "127.0.0.1:9001");
        assert_eq!(config.default_image, "python:3.12-slim");
        assert_eq!(config.workspace_dir, PathBuf::from("/var/lib/gryt"));
        assert_eq!(config.container_runtime, "podman");
        assert_eq!(config.job_timeout, Some(Duration::from_secs(600)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_required_keys() {
        let err = Config::from_source(&EnvSource::from_vars([("AGENT_API_KEY", "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("GRYT_ENCRYPTION_KEY")));

        let err = Config::from_source(&EnvSource::from_vars([(
            "GRYT_ENCRYPTION_KEY",
            fernet::Fernet::generate_key(),
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("AGENT_API_KEY")));
    }

    #[test]
    fn test_invalid_port() {
        let mut vars = base_vars();
        vars.push(("AGENT_PORT", "http".to_string()));

        let err = Config::from_source(&EnvSource::from_vars(vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "AGENT_PORT", .. }));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::from_source(&EnvSource::from_vars(base_vars())).unwrap();

        config.encryption_key = SecretString::from("not-a-key".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEncryptionKey)
        ));

        config.encryption_key = SecretString::from(fernet::Fernet::generate_key());
        config.container_runtime = "lxc".to_string();
        assert!(config.validate().is_err());

        config.container_runtime = "docker".to_string();
        config.job_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());

        config.job_timeout = None;
        config.api_key = SecretString::from(String::new());
        assert!(config.validate().is_err());
    }
}
