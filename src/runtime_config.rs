//! # Runtime Configuration Module
//!
//! Settings that shape a deployment: where it is mounted, how methods are
//! scheduled and how the blocking worker pool is sized.
//!
//! ## Environment Variables
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `BRRTR_ROOT_PATH` | `root_path` | none |
//! | `BRRTR_APPLICATION_PATH` | `application_path` | none |
//! | `BRRTR_DEFAULT_BLOCKING` | `default_blocking` | `false` |
//! | `BRRTR_INPUT_BUFFER_SIZE` | `input_buffer_size` | `10000` |
//! | `BRRTR_BLOCKING_WORKERS` | `blocking_workers` | `4` |
//! | `BRRTR_STACK_SIZE` | `stack_size` | `0x10000` |
//!
//! `BRRTR_STACK_SIZE` accepts decimal (`65536`) or hex (`0x10000`).
//!
//! When `default_blocking` is set the whole deployment is assumed to run on
//! worker threads already, so chains carry no dispatch steps at all.
//!
//! ## Usage
//!
//! ```rust
//! use brrtrest::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("Stack size: {} bytes", config.stack_size);
//! ```
//!
//! The same settings can come from YAML, for example the `config:` section of a
//! deployment manifest:
//!
//! ```yaml
//! root_path: /api
//! default_blocking: false
//! stack_size: "0x8000"
//! ```

use crate::error::DeploymentError;
use crate::worker_pool::{parse_stack_size, WorkerPoolConfig};
use serde::{Deserialize, Deserializer, Serialize};
use std::env;

const DEFAULT_INPUT_BUFFER_SIZE: usize = 10_000;

/// Deployment settings loaded from the environment or YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Mount point of the whole server, e.g. `/api`.
    pub root_path: Option<String>,
    /// Appended to the root path.
    pub application_path: Option<String>,
    /// Every request already runs on a worker thread.
    pub default_blocking: bool,
    /// Chunk size used when a non-blocking method reads its body.
    pub input_buffer_size: usize,
    /// Worker coroutines for blocking methods.
    pub blocking_workers: usize,
    /// Coroutine stack size in bytes.
    #[serde(deserialize_with = "deserialize_stack_size")]
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            root_path: None,
            application_path: None,
            default_blocking: false,
            input_buffer_size: DEFAULT_INPUT_BUFFER_SIZE,
            blocking_workers: WorkerPoolConfig::default().num_workers,
            stack_size: WorkerPoolConfig::default().stack_size,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let text = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());
        let num = |key: &str| text(key).and_then(|v| v.trim().parse::<usize>().ok());
        Self {
            root_path: text("BRRTR_ROOT_PATH"),
            application_path: text("BRRTR_APPLICATION_PATH"),
            default_blocking: text("BRRTR_DEFAULT_BLOCKING")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.default_blocking),
            input_buffer_size: num("BRRTR_INPUT_BUFFER_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.input_buffer_size),
            blocking_workers: num("BRRTR_BLOCKING_WORKERS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.blocking_workers),
            stack_size: text("BRRTR_STACK_SIZE")
                .and_then(|v| parse_stack_size(&v))
                .unwrap_or(defaults.stack_size),
        }
    }

    /// Parse a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DeploymentError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Worker pool settings: pool size and stack size from this configuration,
    /// queue and backpressure settings from the environment.
    #[must_use]
    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            num_workers: self.blocking_workers.max(1),
            stack_size: self.stack_size,
            ..WorkerPoolConfig::from_env()
        }
    }
}

fn deserialize_stack_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(usize),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => parse_stack_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid stack size '{s}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_defaults_and_hex_stack() {
        let config = RuntimeConfig::from_yaml_str("root_path: /api\nstack_size: \"0x8000\"\n").unwrap();
        assert_eq!(config.root_path.as_deref(), Some("/api"));
        assert_eq!(config.stack_size, 0x8000);
        assert_eq!(config.input_buffer_size, DEFAULT_INPUT_BUFFER_SIZE);
        assert!(!config.default_blocking);

        let config = RuntimeConfig::from_yaml_str("stack_size: 32768\ndefault_blocking: true\n").unwrap();
        assert_eq!(config.stack_size, 32768);
        assert!(config.default_blocking);
    }

    #[test]
    fn test_yaml_rejects_bad_stack_size() {
        assert!(RuntimeConfig::from_yaml_str("stack_size: lots\n").is_err());
    }

    #[test]
    fn test_worker_pool_config_uses_sizes() {
        let config = RuntimeConfig {
            blocking_workers: 2,
            stack_size: 0x4000,
            ..RuntimeConfig::default()
        };
        let pool = config.worker_pool_config();
        assert_eq!(pool.num_workers, 2);
        assert_eq!(pool.stack_size, 0x4000);
    }
}
