//! Environment lookup with `.envrc` fallback
//!
//! Process environment variables always win. Keys missing from the process
//! environment are looked up in the first `.envrc` file found in the current
//! directory, one of its parents, or a known install location.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Install locations checked after the current directory and its parents
const INSTALL_PATHS: &[&str] = &["/opt/gryt-ci-agent/.envrc"];

/// Source of configuration values
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    file_vars: HashMap<String, String>,
    read_process_env: bool,
}

impl EnvSource {
    /// Process environment backed by the nearest `.envrc`, if any
    pub fn load() -> Self {
        let file_vars = match find_envrc() {
            Some(path) => {
                info!("Loading environment variables from {}", path.display());
                read_envrc(&path)
            }
            None => {
                warn!("No .envrc file found");
                HashMap::new()
            }
        };

        Self {
            file_vars,
            read_process_env: true,
        }
    }

    /// A fixed set of values that ignores the process environment
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            file_vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            read_process_env: false,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if self.read_process_env {
            if let Ok(value) = std::env::var(key) {
                return Some(value);
            }
        }
        self.file_vars.get(key).cloned()
    }
}

fn find_envrc() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;

    if let Some(found) = cwd.ancestors().map(|dir| dir.join(".envrc")).find(|p| p.exists()) {
        return Some(found);
    }

    let home = std::env::var("HOME")
        .ok()
        .map(|home| Path::new(&home).join("gryt-ci-agent").join(".envrc"));

    INSTALL_PATHS
        .iter()
        .map(PathBuf::from)
        .chain(home)
        .find(|p| p.exists())
}

/// Reads `KEY=VALUE` pairs from an env file
///
/// Malformed lines are skipped with a warning.
pub fn read_envrc(path: &Path) -> HashMap<String, String> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) => {
            error!("Error reading {}: {}", path.display(), e);
            return HashMap::new();
        }
    };

    let mut vars = HashMap::new();
    for item in iter {
        match item {
            Ok((key, value)) => {
                vars.insert(key, value);
            }
            Err(e) => warn!("Skipping invalid line in {}: {}", path.display(), e),
        }
    }
    vars
}
