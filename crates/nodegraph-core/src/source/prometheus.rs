//! Prometheus HTTP API client
//!
//! Evaluates expressions against `/api/v1/query` (instant) or
//! `/api/v1/query_range` (windowed) and decodes the `vector` / `matrix`
//! result types. Any other result type is an error.

use super::{
    async_trait, Labels, MetricsSource, QueryContext, QueryResult, QueryWindow, Sample, Series,
    SourceError,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Certificate, Client, Identity};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Configuration for the Prometheus client
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Base URL, e.g. `http://prometheus:9090`
    pub address: String,
    /// Extra headers sent with every request (auth proxies, tenant ids)
    pub headers: HashMap<String, String>,
    /// Accept invalid TLS certificates
    pub insecure_skip_verify: bool,
    /// PEM bundle trusted on top of the built-in roots
    pub ca_file: Option<PathBuf>,
    /// Client certificate (PEM); needs `key_file`
    pub cert_file: Option<PathBuf>,
    /// Private key (PEM) for `cert_file`
    pub key_file: Option<PathBuf>,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:9090".to_string(),
            headers: HashMap::new(),
            insecure_skip_verify: false,
            ca_file: None,
            cert_file: None,
            key_file: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Metrics source backed by a Prometheus-compatible HTTP API
#[derive(Debug, Clone)]
pub struct PrometheusSource {
    client: Client,
    base_url: Url,
}

impl PrometheusSource {
    pub fn new(config: &PrometheusConfig) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SourceError::Decode(format!("header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SourceError::Decode(format!("header value for '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        let mut builder = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify);

        if let Some(path) = &config.ca_file {
            let ca = Certificate::from_pem(&read_pem(path)?).map_err(|e| {
                SourceError::TlsConfig(format!("CA bundle {}: {}", path.display(), e))
            })?;
            builder = builder.add_root_certificate(ca);
        }

        match (&config.cert_file, &config.key_file) {
            (Some(cert), Some(key)) => {
                let mut pem = read_pem(cert)?;
                pem.push(b'\n');
                pem.extend(read_pem(key)?);
                let identity = Identity::from_pem(&pem).map_err(|e| {
                    SourceError::TlsConfig(format!("client identity {}: {}", cert.display(), e))
                })?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(SourceError::TlsConfig(
                    "cert_file and key_file must be set together".to_string(),
                ))
            }
        }

        let client = builder.build()?;

        // Url::join drops the last path segment unless it ends with '/'
        let mut address = config.address.clone();
        if !address.ends_with('/') {
            address.push('/');
        }
        let base_url = Url::parse(&address)?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl MetricsSource for PrometheusSource {
    async fn query(
        &self,
        ctx: &QueryContext,
        expr: &str,
        window: &QueryWindow,
    ) -> Result<QueryResult, SourceError> {
        let remaining = ctx.remaining().ok_or(SourceError::DeadlineExceeded)?;

        let (path, params) = match window {
            QueryWindow::Instant => ("api/v1/query", vec![("query", expr.to_string())]),
            QueryWindow::Range {
                start_ms,
                end_ms,
                step,
            } => (
                "api/v1/query_range",
                vec![
                    ("query", expr.to_string()),
                    ("start", millis_to_secs(*start_ms)),
                    ("end", millis_to_secs(*end_ms)),
                    ("step", format!("{}s", step.as_secs().max(1))),
                ],
            ),
        };
        let url = self.base_url.join(path)?;

        debug!(url = %url, timeout_ms = remaining.as_millis() as u64, "Querying Prometheus");

        // The deadline travels to the backend too, so it can stop evaluating
        let response = self
            .client
            .get(url)
            .query(&params)
            .query(&[("timeout", format!("{}ms", remaining.as_millis()))])
            .timeout(remaining)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        let envelope: ApiResponse = serde_json::from_slice(&body).map_err(|e| {
            SourceError::Decode(format!("HTTP {}: {}", status, e))
        })?;

        for warning in &envelope.warnings {
            warn!(warning = %warning, "Prometheus returned a warning");
        }

        if envelope.status != "success" {
            return Err(SourceError::Backend {
                error_type: envelope.error_type.unwrap_or_else(|| status.to_string()),
                error: envelope.error.unwrap_or_default(),
            });
        }

        let data = envelope
            .data
            .ok_or_else(|| SourceError::Decode("response has no data".to_string()))?;

        decode_result(data)
    }
}

fn millis_to_secs(ms: i64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiData {
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorEntry {
    metric: Labels,
    value: (f64, String),
}

#[derive(Debug, Deserialize)]
struct MatrixEntry {
    metric: Labels,
    values: Vec<(f64, String)>,
}

fn decode_result(data: ApiData) -> Result<QueryResult, SourceError> {
    match data.result_type.as_str() {
        "vector" => {
            let entries: Vec<VectorEntry> = serde_json::from_value(data.result)
                .map_err(|e| SourceError::Decode(e.to_string()))?;

            let samples = entries
                .into_iter()
                .map(|entry| {
                    let (ts, raw) = entry.value;
                    Ok(Sample {
                        labels: entry.metric,
                        value: parse_value(&raw)?,
                        timestamp_ms: (ts * 1000.0) as i64,
                    })
                })
                .collect::<Result<Vec<_>, SourceError>>()?;

            Ok(QueryResult::Vector(samples))
        }
        "matrix" => {
            let entries: Vec<MatrixEntry> = serde_json::from_value(data.result)
                .map_err(|e| SourceError::Decode(e.to_string()))?;

            let series = entries
                .into_iter()
                .map(|entry| {
                    let points = entry
                        .values
                        .iter()
                        .map(|(ts, raw)| Ok(((ts * 1000.0) as i64, parse_value(raw)?)))
                        .collect::<Result<Vec<_>, SourceError>>()?;
                    Ok(Series {
                        labels: entry.metric,
                        points,
                    })
                })
                .collect::<Result<Vec<_>, SourceError>>()?;

            Ok(QueryResult::Matrix(series))
        }
        other => Err(SourceError::UnexpectedResultType(other.to_string())),
    }
}

/// Prometheus encodes sample values as strings, including `NaN` and `+Inf`
fn parse_value(raw: &str) -> Result<f64, SourceError> {
    match raw {
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        _ => raw
            .parse()
            .map_err(|_| SourceError::Decode(format!("invalid sample value '{}'", raw))),
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, SourceError> {
    std::fs::read(path).map_err(|source| SourceError::TlsFile {
        path: path.to_path_buf(),
        source,
    })
}
