//! Response handling and synthesis.
//!
//! # Responsibilities
//! - Hold a fully read upstream response until it is relayed
//! - Strip hop-by-hop headers before relaying
//! - Build locally synthesized responses (status payload, failures)
//!
//! # Design Decisions
//! - Upstream bodies are buffered so an attempt is classified only once
//!   the whole response has arrived
//! - Exhausted timeouts map to 504, other upstream failures to 502

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Headers that describe one connection and are never forwarded.
pub const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// A complete upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Convert into the response written to the client.
    pub fn into_client_response(self) -> Response<Body> {
        let mut headers = self.headers;
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}

#[derive(Serialize)]
struct StatusPayload {
    status: &'static str,
    time: String,
}

/// Builds the response for requests answered without an upstream.
#[derive(Debug, Clone)]
pub struct LocalResponder {
    status: StatusCode,
    body: Option<String>,
    headers: HeaderMap,
}

impl Default for LocalResponder {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            body: None,
            headers: HeaderMap::new(),
        }
    }
}

impl LocalResponder {
    pub fn new(status: StatusCode, body: Option<String>, headers: HeaderMap) -> Self {
        Self { status, body, headers }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The configured body, or a JSON status/time payload when none is set.
    pub fn respond(&self) -> Response<Body> {
        let mut response = match &self.body {
            Some(body) => Response::new(Body::from(body.clone())),
            None => {
                let payload = StatusPayload {
                    status: "ok",
                    time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                };
                let mut response = Response::new(Body::from(
                    serde_json::to_vec(&payload).unwrap_or_default(),
                ));
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
        };
        *response.status_mut() = self.status;
        for (name, value) in &self.headers {
            response.headers_mut().insert(name.clone(), value.clone());
        }
        response
    }
}

/// A response synthesized because the request could not be relayed.
pub fn failure_response(status: StatusCode, reason: &str) -> Response<Body> {
    (status, format!("{}: {}", status.canonical_reason().unwrap_or("Error"), reason)).into_response()
}
