//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router that hands every request to the engine
//! - Wire up middleware (request ID, tracing)
//!
//! # Design Decisions
//! - A single fallback handler catches every method and path, including
//!   requests whose target has no path
//! - The same router serves the plain and the TLS listener; only the
//!   engine behind it differs

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::http::forwarder::ForwardingEngine;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ForwardingEngine>,
}

/// Build the router for one listener.
pub fn build_router(engine: Arc<ForwardingEngine>) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .with_state(AppState { engine })
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    tracing::debug!(
        listener = %state.engine.listener(),
        method = %request.method(),
        uri = %request.uri(),
        "Forwarding request"
    );
    state.engine.handle(request).await
}
