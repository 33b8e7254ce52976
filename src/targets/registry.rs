//! Target resolution.
//!
//! # Responsibilities
//! - Turn configured target specs (URL strings or objects) into descriptors
//! - Reject malformed entries before the listeners start
//! - Hold the resolved list and the shared rotation counter

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::config::schema::{
    ProxyConfig, RetrySpec, TargetOpts, TargetSpec, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS,
};
use crate::resilience::RetryPolicy;
use crate::targets::round_robin::RoundRobin;

/// A malformed target definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("target {url:?}: invalid URL: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("target {url:?}: unsupported scheme {scheme:?} (expected http or https)")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("target {url:?}: missing host")]
    MissingHost { url: String },

    #[error("target {url:?}: port out of range")]
    PortOutOfRange { url: String },

    #[error("target {url:?}: retry count must not be negative (got {value})")]
    NegativeRetries { url: String, value: i64 },

    #[error("target {url:?}: retry delay must not be negative (got {value})")]
    NegativeDelay { url: String, value: i64 },

    #[error("target {url:?}: invalid header {name:?}")]
    InvalidHeader { url: String, name: String },
}

/// Upstream scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// Static request changes a target applies to every forwarded request.
#[derive(Debug, Clone, Default)]
pub struct RequestOverrides {
    /// Headers that replace inbound headers of the same name.
    pub headers: HeaderMap,
    /// Deadline of one upstream attempt.
    pub timeout: Option<Duration>,
}

/// A resolved upstream target. Immutable after construction.
#[derive(Debug, Clone)]
pub struct TargetDescriptor {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Path prefix taken from the target URL, without a trailing slash.
    pub base_path: Option<String>,
    /// `user:password` from the URL userinfo.
    pub auth_credential: Option<String>,
    pub request_overrides: RequestOverrides,
    pub retry_policy: Arc<RetryPolicy>,
}

impl TargetDescriptor {
    /// `host` or `host:port` when the port is not the scheme default.
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == self.scheme.default_port() {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

impl std::fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.authority())?;
        if let Some(base) = &self.base_path {
            f.write_str(base)?;
        }
        Ok(())
    }
}

/// Defaults every target inherits.
#[derive(Debug, Clone, Default)]
pub struct TargetDefaults {
    pub retry: RetrySpec,
    pub headers: BTreeMap<String, String>,
    pub opts: TargetOpts,
}

impl TargetDefaults {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            retry: config.target_retry,
            headers: config.target_headers.clone(),
            opts: TargetOpts {
                timeout_ms: config.default_timeout_ms(),
            },
        }
    }
}

/// Resolve every spec, failing on the first malformed one.
pub fn resolve(specs: &[TargetSpec], defaults: &TargetDefaults) -> Result<Vec<TargetDescriptor>, TargetError> {
    let shared_policy = Arc::new(retry_policy("<global>", &defaults.retry)?);
    specs
        .iter()
        .map(|spec| resolve_one(spec, defaults, &shared_policy))
        .collect()
}

fn resolve_one(
    spec: &TargetSpec,
    defaults: &TargetDefaults,
    shared_policy: &Arc<RetryPolicy>,
) -> Result<TargetDescriptor, TargetError> {
    let raw = spec.url();
    let url = Url::parse(raw).map_err(|e| match e {
        url::ParseError::InvalidPort => TargetError::PortOutOfRange { url: raw.to_string() },
        url::ParseError::EmptyHost => TargetError::MissingHost { url: raw.to_string() },
        other => TargetError::InvalidUrl {
            url: raw.to_string(),
            reason: other.to_string(),
        },
    })?;

    let scheme = match url.scheme() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        other => {
            return Err(TargetError::UnsupportedScheme {
                url: raw.to_string(),
                scheme: other.to_string(),
            })
        }
    };

    let host = match url.host() {
        Some(url::Host::Ipv6(addr)) => addr.to_string(),
        Some(host) => host.to_string(),
        None => return Err(TargetError::MissingHost { url: raw.to_string() }),
    };

    let port = url.port().unwrap_or(scheme.default_port());
    if port == 0 {
        return Err(TargetError::PortOutOfRange { url: raw.to_string() });
    }

    let base_path = match url.path().trim_end_matches('/') {
        "" => None,
        path => Some(path.to_string()),
    };

    let auth_credential = match (url.username(), url.password()) {
        ("", None) => None,
        (user, password) => Some(format!("{}:{}", user, password.unwrap_or(""))),
    };

    let mut headers = header_map(raw, &defaults.headers)?;
    let mut timeout_ms = defaults.opts.timeout_ms;
    let mut retry_policy = shared_policy.clone();

    if let TargetSpec::Detailed(opts) = spec {
        for (name, value) in header_map(raw, &opts.headers)? {
            if let Some(name) = name {
                headers.insert(name, value);
            }
        }
        if let Some(target_opts) = &opts.opts {
            timeout_ms = target_opts.timeout_ms.or(timeout_ms);
        }
        if let Some(retry) = &opts.retry {
            retry_policy = Arc::new(self::retry_policy(raw, &retry.or(&defaults.retry))?);
        }
    }

    Ok(TargetDescriptor {
        scheme,
        host,
        port,
        base_path,
        auth_credential,
        request_overrides: RequestOverrides {
            headers,
            timeout: timeout_ms.map(Duration::from_millis),
        },
        retry_policy,
    })
}

fn retry_policy(url: &str, spec: &RetrySpec) -> Result<RetryPolicy, TargetError> {
    let max_retries = spec.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
    if max_retries < 0 {
        return Err(TargetError::NegativeRetries {
            url: url.to_string(),
            value: max_retries,
        });
    }
    let delay = spec.delay.unwrap_or(DEFAULT_RETRY_DELAY_MS);
    if delay < 0 {
        return Err(TargetError::NegativeDelay {
            url: url.to_string(),
            value: delay,
        });
    }
    Ok(RetryPolicy {
        max_retries: u32::try_from(max_retries).unwrap_or(u32::MAX),
        base_delay_millis: delay as u64,
        retry_on_server_error: spec.retry_on_internal_error.unwrap_or(false),
    })
}

fn header_map(url: &str, headers: &BTreeMap<String, String>) -> Result<HeaderMap, TargetError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let invalid = || TargetError::InvalidHeader {
            url: url.to_string(),
            name: name.clone(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Resolved targets of one listener plus the rotation state.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: Vec<Arc<TargetDescriptor>>,
    selector: RoundRobin,
}

impl TargetRegistry {
    pub fn new(targets: Vec<TargetDescriptor>) -> Self {
        Self {
            targets: targets.into_iter().map(Arc::new).collect(),
            selector: RoundRobin::new(),
        }
    }

    /// Resolve `specs` against `defaults` and wrap the result.
    pub fn from_specs(specs: &[TargetSpec], defaults: &TargetDefaults) -> Result<Self, TargetError> {
        Ok(Self::new(resolve(specs, defaults)?))
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Target for a new request.
    pub fn select(&self) -> Option<(usize, Arc<TargetDescriptor>)> {
        let index = self.selector.next_index(self.targets.len())?;
        Some((index, self.targets[index].clone()))
    }

    /// The target after `index` in rotation order.
    pub fn next_after(&self, index: usize) -> Option<(usize, Arc<TargetDescriptor>)> {
        if self.targets.is_empty() {
            return None;
        }
        let next = (index + 1) % self.targets.len();
        Some((next, self.targets[next].clone()))
    }

    /// The target at `index`, if any.
    pub fn get(&self, index: usize) -> Option<(usize, Arc<TargetDescriptor>)> {
        self.targets.get(index).map(|t| (index, t.clone()))
    }
}
