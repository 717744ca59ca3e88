//! Server configuration
//!
//! Sources, lowest precedence first: built-in defaults, the YAML config file
//! (optional), then `NODEGRAPH_*` environment variables with `__` separating
//! nested keys, e.g. `NODEGRAPH_PROMETHEUS__ADDRESS`.
//!
//! Unknown keys are rejected, from the file and from `NODEGRAPH_*` variables
//! alike. Keys arrive lowercased, so only snake_case names are recognised.

use anyhow::{Context, Result};
use nodegraph_core::source::{PrometheusConfig, QuerySet};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "NODEGRAPH";

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpConfig,

    #[serde(default)]
    pub prometheus: PrometheusSettings,

    /// Log filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Deadline for one graph request, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Metrics backend settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusSettings {
    #[serde(default = "default_prometheus_address")]
    pub address: String,

    /// Extra label matchers appended to every query, e.g. `cluster="prod"`
    #[serde(default)]
    pub labels: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Extra CA bundle (PEM) for verifying the backend
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// Client certificate and key (PEM) for mutual TLS; set both or neither
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Resolution of windowed queries, in seconds
    #[serde(default = "default_step_secs")]
    pub step_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_addr() -> String {
    "0.0.0.0:5001".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_prometheus_address() -> String {
    "http://localhost:9090".to_string()
}

fn default_step_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PrometheusSettings {
    fn default() -> Self {
        Self {
            address: default_prometheus_address(),
            labels: String::new(),
            headers: HashMap::new(),
            insecure_skip_verify: false,
            ca_file: None,
            cert_file: None,
            key_file: None,
            step_secs: default_step_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: HttpConfig::default(),
            prometheus: PrometheusSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the config file (if it exists) and environment
    pub fn load(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        config
            .try_deserialize()
            .context("invalid configuration")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    pub fn step(&self) -> Duration {
        Duration::from_secs(self.prometheus.step_secs.max(1))
    }

    pub fn prometheus_config(&self) -> PrometheusConfig {
        PrometheusConfig {
            address: self.prometheus.address.clone(),
            headers: self.prometheus.headers.clone(),
            insecure_skip_verify: self.prometheus.insecure_skip_verify,
            ca_file: self.prometheus.ca_file.clone(),
            cert_file: self.prometheus.cert_file.clone(),
            key_file: self.prometheus.key_file.clone(),
            ..Default::default()
        }
    }

    pub fn query_set(&self) -> QuerySet {
        QuerySet::new(&self.prometheus.labels)
    }
}
