//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the forwarder.
//! All types derive Serde traits for deserialization from config files.
//! Field names are snake_case; the camelCase spellings used by older
//! `config.json` files are accepted as aliases.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default number of retries when neither the global nor the target retry
/// options say otherwise.
pub const DEFAULT_MAX_RETRIES: i64 = 0;

/// Default backoff slot in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: i64 = 300;

/// Root configuration for the forwarder.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Targets used by every listener unless a listener-specific list is set.
    #[serde(alias = "targetHosts", alias = "targets")]
    pub target_hosts: Vec<TargetSpec>,

    /// Targets for the plain HTTP listener only.
    #[serde(alias = "targetHostsHttp")]
    pub target_hosts_http: Option<Vec<TargetSpec>>,

    /// Targets for the TLS listener only.
    #[serde(alias = "targetHostsHttps")]
    pub target_hosts_https: Option<Vec<TargetSpec>>,

    /// Retry options applied to every target.
    #[serde(alias = "targetRetry")]
    pub target_retry: RetrySpec,

    /// Headers added to every forwarded request.
    #[serde(alias = "targetHeaders")]
    pub target_headers: BTreeMap<String, String>,

    /// Request options applied to every target.
    #[serde(alias = "targetOpts")]
    pub target_opts: TargetOpts,

    /// Per-attempt upstream timeout in milliseconds.
    pub timeout: Option<u64>,

    /// Status code of the locally synthesized response.
    #[serde(alias = "responseStatusCode")]
    pub response_status_code: u16,

    /// Body of the locally synthesized response. When unset a JSON status
    /// payload is produced.
    #[serde(alias = "responseBody")]
    pub response_body: Option<String>,

    /// Headers of the locally synthesized response.
    #[serde(alias = "responseHeaders")]
    pub response_headers: BTreeMap<String, String>,

    /// Request paths that are always answered locally.
    #[serde(alias = "localPaths")]
    pub local_paths: Vec<String>,

    /// Target choice for a retry.
    #[serde(alias = "retryRotation")]
    pub retry_rotation: RetryRotation,

    /// Listener configuration (ports, body limits).
    pub listener: ListenerConfig,

    /// Self-signed credential settings for the TLS listener.
    pub tls: TlsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            target_hosts: Vec::new(),
            target_hosts_http: None,
            target_hosts_https: None,
            target_retry: RetrySpec::default(),
            target_headers: BTreeMap::new(),
            target_opts: TargetOpts::default(),
            timeout: None,
            response_status_code: 200,
            response_body: None,
            response_headers: BTreeMap::new(),
            local_paths: vec!["/health".to_string()],
            retry_rotation: RetryRotation::default(),
            listener: ListenerConfig::default(),
            tls: TlsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Targets served by the given listener.
    pub fn targets_for(&self, kind: ListenerKind) -> &[TargetSpec] {
        let specific = match kind {
            ListenerKind::Http => self.target_hosts_http.as_deref(),
            ListenerKind::Https => self.target_hosts_https.as_deref(),
        };
        specific.unwrap_or(&self.target_hosts)
    }

    /// Global per-attempt timeout. `target_opts.timeout_ms` wins over the
    /// top-level `timeout`.
    pub fn default_timeout_ms(&self) -> Option<u64> {
        self.target_opts.timeout_ms.or(self.timeout)
    }
}

/// The two listeners the forwarder can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Http,
    Https,
}

impl ListenerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerKind::Http => "http",
            ListenerKind::Https => "https",
        }
    }
}

impl std::fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured target: either a bare URL or a structured object.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TargetSpec {
    Url(String),
    Detailed(TargetOptions),
}

impl TargetSpec {
    /// The URL of this target, whichever form it was written in.
    pub fn url(&self) -> &str {
        match self {
            TargetSpec::Url(url) => url,
            TargetSpec::Detailed(opts) => &opts.url,
        }
    }
}

impl From<&str> for TargetSpec {
    fn from(url: &str) -> Self {
        TargetSpec::Url(url.to_string())
    }
}

/// Structured target definition.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct TargetOptions {
    /// Target URL (`http://host:port/base`).
    pub url: String,

    /// Static headers that override inbound headers on collision.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Retry options overriding the global ones field-by-field.
    #[serde(default)]
    pub retry: Option<RetrySpec>,

    /// Request options overriding the global ones.
    #[serde(default)]
    pub opts: Option<TargetOpts>,
}

/// Retry options as written in configuration.
///
/// Counts are signed so that a negative value can be reported as a
/// configuration error instead of a parse error.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct RetrySpec {
    /// Maximum number of retries after the first attempt.
    #[serde(alias = "maxRetries")]
    pub max_retries: Option<i64>,

    /// Backoff slot in milliseconds.
    #[serde(alias = "delay_ms")]
    pub delay: Option<i64>,

    /// Retry when the upstream answers with a 5xx status.
    #[serde(alias = "retryOnInternalError", alias = "retry_on_server_error")]
    pub retry_on_internal_error: Option<bool>,
}

impl RetrySpec {
    /// Fill unset fields of `self` from `base`.
    pub fn or(self, base: &RetrySpec) -> RetrySpec {
        RetrySpec {
            max_retries: self.max_retries.or(base.max_retries),
            delay: self.delay.or(base.delay),
            retry_on_internal_error: self.retry_on_internal_error.or(base.retry_on_internal_error),
        }
    }
}

/// Per-request options for upstream calls.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct TargetOpts {
    /// Timeout of one upstream attempt in milliseconds.
    #[serde(alias = "timeoutMs", alias = "timeout")]
    pub timeout_ms: Option<u64>,
}

/// Whether a retry goes to the next target in rotation or repeats the
/// target that just failed.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryRotation {
    #[default]
    Rotate,
    Same,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface both listeners bind to.
    pub bind_host: String,

    /// Port of the plain HTTP listener.
    pub http_port: u16,

    /// Port of the TLS-terminated listener.
    pub https_port: u16,

    /// Run the TLS listener.
    pub https_enabled: bool,

    /// Largest request or upstream response body that is buffered.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            http_port: 80,
            https_port: 443,
            https_enabled: true,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Self-signed credential settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Directory holding `ssl.cert` and `ssl.key`.
    pub cert_dir: String,

    /// Common name of the generated certificate.
    pub common_name: String,

    /// Validity window of the generated certificate in days.
    pub validity_days: u32,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_dir: "certs".to_string(),
            common_name: "atlasapi.myacurite.com".to_string(),
            validity_days: 9999,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
