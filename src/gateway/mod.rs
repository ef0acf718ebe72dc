//! Thin HTTP/SSE façade exposing the dispatcher's MCP verbs, gated behind
//! the `gateway` feature (SPEC_FULL §D: "not a second protocol").

#[cfg(feature = "gateway")]
pub mod routes;

#[cfg(feature = "gateway")]
use std::sync::Arc;

#[cfg(feature = "gateway")]
use axum::{
    Router,
    routing::{get, post},
};

#[cfg(feature = "gateway")]
use crate::dispatcher::Dispatcher;

/// Build the façade's router over a shared [`Dispatcher`].
#[cfg(feature = "gateway")]
pub fn build_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/initialize", post(routes::initialize))
        .route("/tools/list", get(routes::list_tools))
        .route("/tools/call", post(routes::call_tool))
        .route("/prompts/list", get(routes::list_prompts))
        .route("/prompts/get/{name}", post(routes::get_prompt))
        .route("/resources/list", get(routes::list_resources))
        .route("/resources/read", get(routes::read_resource))
        .with_state(dispatcher)
}
