//! Forwarding engine.
//!
//! Runs one inbound request through translate → dispatch → retry → relay,
//! or answers it locally. Every request ends with exactly one response:
//! relayed, synthesized locally, or synthesized from the terminal error.
//! If the client goes away the handler future is dropped, which drops the
//! in-flight upstream request and its connection with it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, Response, StatusCode};
use http_body_util::LengthLimitError;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::{ConfigError, ListenerKind, ProxyConfig, RetryRotation, ValidationError};
use crate::http::request::{ForwardState, InboundRequestContext};
use crate::http::response::{failure_response, LocalResponder, UpstreamResponse};
use crate::http::translate::{normalize_path, translate, OutboundRequest, TranslationError};
use crate::net::connection::ConnectionTracker;
use crate::observability::{EventSink, ForwardEvent, RequestMeta};
use crate::resilience::timeouts::with_attempt_timeout;
use crate::resilience::{backoff_delay, should_retry, ForwardOutcome, NetworkErrorKind, NetworkFailure};
use crate::targets::{TargetDefaults, TargetDescriptor, TargetRegistry};

/// Client used for upstream requests; speaks plain HTTP and HTTPS.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the shared upstream client.
pub fn upstream_client() -> UpstreamClient {
    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Client::builder(TokioExecutor::new()).build(https)
}

/// Per-listener engine settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub listener: ListenerKind,
    pub local_paths: HashSet<String>,
    pub rotation: RetryRotation,
    pub max_body_bytes: usize,
}

impl EngineSettings {
    pub fn from_config(listener: ListenerKind, config: &ProxyConfig) -> Self {
        Self {
            listener,
            local_paths: config.local_paths.iter().cloned().collect(),
            rotation: config.retry_rotation,
            max_body_bytes: config.listener.max_body_bytes,
        }
    }
}

/// Drives inbound requests to their final outcome.
pub struct ForwardingEngine {
    settings: EngineSettings,
    registry: Arc<TargetRegistry>,
    local: LocalResponder,
    client: UpstreamClient,
    events: EventSink,
    tracker: ConnectionTracker,
}

impl ForwardingEngine {
    pub fn new(
        settings: EngineSettings,
        registry: Arc<TargetRegistry>,
        local: LocalResponder,
        client: UpstreamClient,
        events: EventSink,
        tracker: ConnectionTracker,
    ) -> Self {
        Self {
            settings,
            registry,
            local,
            client,
            events,
            tracker,
        }
    }

    /// Build the engine for one listener from a validated config.
    pub fn from_config(
        listener: ListenerKind,
        config: &ProxyConfig,
        client: UpstreamClient,
        events: EventSink,
        tracker: ConnectionTracker,
    ) -> Result<Self, ConfigError> {
        let defaults = TargetDefaults::from_config(config);
        let registry = TargetRegistry::from_specs(config.targets_for(listener), &defaults)
            .map_err(|error| ConfigError::Validation(vec![ValidationError::Target { listener, error }]))?;

        let status = StatusCode::from_u16(config.response_status_code).map_err(|_| {
            ConfigError::Validation(vec![ValidationError::InvalidStatusCode(config.response_status_code)])
        })?;
        let mut headers = axum::http::HeaderMap::new();
        for (name, value) in &config.response_headers {
            let invalid = || ConfigError::Validation(vec![ValidationError::InvalidResponseHeader(name.clone())]);
            let name = axum::http::HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let value = axum::http::HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(name, value);
        }
        let local = LocalResponder::new(status, config.response_body.clone(), headers);

        Ok(Self::new(
            EngineSettings::from_config(listener, config),
            Arc::new(registry),
            local,
            client,
            events,
            tracker,
        ))
    }

    pub fn listener(&self) -> ListenerKind {
        self.settings.listener
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Tracker counting requests currently in flight.
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Handle one inbound request.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path_and_query().map(|pq| pq.as_str().to_string());
        let guard = self.tracker.track();

        let body = axum::body::to_bytes(body, self.settings.max_body_bytes).await;
        let mut ctx = InboundRequestContext::new(parts.method, path, parts.headers, Bytes::new()).tracked(guard);

        match body {
            Ok(bytes) => ctx.body = bytes,
            Err(e) => {
                ctx.advance(ForwardState::Failed);
                return if exceeds_limit(&e) {
                    self.fail(&ctx, None, StatusCode::PAYLOAD_TOO_LARGE, "EBODYSIZE", &e.to_string())
                } else {
                    self.fail(&ctx, None, StatusCode::BAD_REQUEST, "EBODY", &e.to_string())
                };
            }
        }

        if self.is_local(&ctx) {
            ctx.advance(ForwardState::Done);
            let response = self.local.respond();
            self.events.emit(ForwardEvent::LocalResponse {
                meta: self.meta(&ctx),
                status: response.status().as_u16(),
                elapsed: ctx.elapsed(),
            });
            return response;
        }

        ctx.advance(ForwardState::Translating);
        self.forward(ctx).await
    }

    fn is_local(&self, ctx: &InboundRequestContext) -> bool {
        if self.registry.is_empty() {
            return true;
        }
        let path = normalize_path(ctx.display_path());
        let path = path.split('?').next().unwrap_or(&path);
        self.settings.local_paths.contains(path)
    }

    async fn forward(&self, mut ctx: InboundRequestContext) -> Response<Body> {
        let Some((mut index, mut target)) = self.registry.select() else {
            ctx.advance(ForwardState::Failed);
            return self.fail(&ctx, None, StatusCode::BAD_GATEWAY, "ENOTARGET", "no target available");
        };

        loop {
            ctx.target = Some(index);
            let outbound = match translate(&ctx, &target) {
                Ok(outbound) => outbound,
                Err(e) => return self.translation_failed(&mut ctx, &target, e),
            };

            ctx.advance(ForwardState::Dispatching);
            ctx.attempt += 1;
            self.events.emit(ForwardEvent::RequestForwarded {
                meta: self.meta(&ctx),
                host: outbound.host.clone(),
                attempt: ctx.attempt,
            });

            ctx.advance(ForwardState::AwaitingResponse);
            let result = self.attempt(&outbound, ctx.body.clone(), target.request_overrides.timeout).await;
            let policy = *target.retry_policy;
            let outcome = ForwardOutcome::classify(result, &policy);
            let retry = should_retry(&policy, ctx.attempt, &outcome);

            let (status, code, message) = match outcome {
                ForwardOutcome::Success(response) => {
                    ctx.advance(ForwardState::Relaying);
                    self.events.emit(ForwardEvent::ForwardResponse {
                        meta: self.meta(&ctx),
                        host: outbound.host.clone(),
                        status: response.status.as_u16(),
                        attempt: ctx.attempt,
                        elapsed: ctx.elapsed(),
                    });
                    let response = response.into_client_response();
                    ctx.advance(ForwardState::Done);
                    return response;
                }
                ForwardOutcome::NetworkFailure(f) if f.kind == NetworkErrorKind::Timeout => {
                    (StatusCode::GATEWAY_TIMEOUT, f.kind.as_str(), f.message)
                }
                ForwardOutcome::NetworkFailure(f) => (StatusCode::BAD_GATEWAY, f.kind.as_str(), f.message),
                ForwardOutcome::UpstreamServerError(s) => {
                    (StatusCode::BAD_GATEWAY, "ESERVERERROR", format!("upstream answered {}", s))
                }
            };

            if !retry {
                ctx.advance(ForwardState::Failed);
                return self.fail(&ctx, Some(outbound.host), status, code, &message);
            }
            tracing::debug!(
                context = %ctx.id(),
                request_id = %ctx.request_id,
                attempt = ctx.attempt,
                code,
                %message,
                "Attempt failed"
            );

            ctx.advance(ForwardState::Retrying);
            let delay = backoff_delay(&policy, ctx.attempt);
            tracing::debug!(
                request_id = %ctx.request_id,
                attempt = ctx.attempt,
                delay = ?delay,
                target = %target,
                "Retrying request"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let next = match self.settings.rotation {
                RetryRotation::Rotate => self.registry.next_after(index),
                RetryRotation::Same => self.registry.get(index),
            };
            if let Some((next_index, next_target)) = next {
                index = next_index;
                target = next_target;
            }
        }
    }

    /// One upstream exchange, bounded by `timeout`. The response body is
    /// read completely before the attempt counts as answered.
    async fn attempt(
        &self,
        outbound: &OutboundRequest,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> Result<UpstreamResponse, NetworkFailure> {
        let request = outbound.to_request(body);
        let limit = self.settings.max_body_bytes;

        let exchange = async {
            let response = self.client.request(request).await.map_err(|e| {
                let kind = if e.is_connect() {
                    NetworkErrorKind::Connect
                } else {
                    NetworkErrorKind::Io
                };
                NetworkFailure::new(kind, e.to_string())
            })?;

            let (parts, body) = response.into_parts();
            let declared = parts
                .headers
                .get(axum::http::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<usize>().ok());
            if declared.is_some_and(|len| len > limit) {
                return Err(NetworkFailure::new(
                    NetworkErrorKind::BodyTooLarge,
                    format!("upstream body exceeds {} bytes", limit),
                ));
            }
            let body = axum::body::to_bytes(Body::new(body), limit)
                .await
                .map_err(|e| NetworkFailure::new(NetworkErrorKind::Io, e.to_string()))?;

            Ok(UpstreamResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        };

        match with_attempt_timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(timed_out) => Err(NetworkFailure::new(NetworkErrorKind::Timeout, timed_out.to_string())),
        }
    }

    fn translation_failed(
        &self,
        ctx: &mut InboundRequestContext,
        target: &TargetDescriptor,
        error: TranslationError,
    ) -> Response<Body> {
        ctx.advance(ForwardState::Failed);
        self.fail(
            ctx,
            Some(target.authority()),
            StatusCode::BAD_REQUEST,
            "ETRANSLATE",
            &error.to_string(),
        )
    }

    fn fail(
        &self,
        ctx: &InboundRequestContext,
        host: Option<String>,
        status: StatusCode,
        code: &'static str,
        message: &str,
    ) -> Response<Body> {
        self.events.emit(ForwardEvent::ForwardError {
            meta: self.meta(ctx),
            host,
            code,
            message: message.to_string(),
            status: status.as_u16(),
            attempts: ctx.attempt,
            elapsed: ctx.elapsed(),
        });
        failure_response(status, message)
    }

    fn meta(&self, ctx: &InboundRequestContext) -> RequestMeta {
        RequestMeta {
            request_id: ctx.request_id.clone(),
            listener: self.settings.listener,
            method: ctx.method.to_string(),
            path: ctx.display_path().to_string(),
        }
    }
}

/// Whether buffering failed because the body went over the limit rather
/// than because the client stream broke.
fn exceeds_limit(error: &axum::Error) -> bool {
    std::error::Error::source(error).is_some_and(|source| source.is::<LengthLimitError>())
}
