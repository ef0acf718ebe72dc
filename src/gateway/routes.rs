//! Thin HTTP/SSE façade over the [`Dispatcher`]'s MCP verbs (§6, SPEC_FULL §D).
//!
//! Not a second protocol: every handler here is a direct pass-through to the
//! same `Dispatcher` an in-process Agent Loop calls.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::dispatcher::Dispatcher;
use crate::tools::ToolProfile;

pub type GatewayState = Arc<Dispatcher>;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "ape" }))
}

pub async fn initialize(State(dispatcher): State<GatewayState>) -> impl IntoResponse {
    Json(serde_json::to_value(dispatcher.initialize()).unwrap_or(Value::Null))
}

#[derive(Debug, Deserialize)]
pub struct ListToolsQuery {
    /// Optional `ToolProfile` name (`minimal`, `coding`, `messaging`, `full`)
    /// filtering the returned catalog (§B "tool profiles").
    pub profile: Option<String>,
}

pub async fn list_tools(
    State(dispatcher): State<GatewayState>,
    Query(query): Query<ListToolsQuery>,
) -> impl IntoResponse {
    let profile = match query.profile.as_deref().map(str::parse::<ToolProfile>) {
        Some(Ok(profile)) => Some(profile),
        Some(Err(e)) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))).into_response(),
        None => None,
    };
    Json(json!({ "tools": dispatcher.list_tools(profile) })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CallToolRequest {
    pub session_id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub bound_context: HashMap<String, String>,
}

pub async fn call_tool(
    State(dispatcher): State<GatewayState>,
    Json(req): Json<CallToolRequest>,
) -> impl IntoResponse {
    match dispatcher
        .call_tool(&req.session_id, &req.name, req.arguments, &req.bound_context)
        .await
    {
        Ok(envelope) => (StatusCode::OK, Json(serde_json::to_value(envelope).unwrap_or(Value::Null))),
        Err(err) => (StatusCode::BAD_REQUEST, Json(serde_json::to_value(err).unwrap_or(Value::Null))),
    }
}

pub async fn list_prompts(State(dispatcher): State<GatewayState>) -> impl IntoResponse {
    Json(json!({ "prompts": dispatcher.list_prompts().await }))
}

#[derive(Debug, Deserialize)]
pub struct GetPromptRequest {
    #[serde(default)]
    pub arguments: HashMap<String, String>,
}

pub async fn get_prompt(
    State(dispatcher): State<GatewayState>,
    Path(name): Path<String>,
    Json(req): Json<GetPromptRequest>,
) -> impl IntoResponse {
    match dispatcher.get_prompt(&name, req.arguments).await {
        Ok(rendered) => (StatusCode::OK, Json(json!({ "rendered": rendered }))),
        Err(err) => (StatusCode::NOT_FOUND, Json(serde_json::to_value(err).unwrap_or(Value::Null))),
    }
}

pub async fn list_resources(State(dispatcher): State<GatewayState>) -> impl IntoResponse {
    Json(json!({ "resources": dispatcher.list_resources() }))
}

#[derive(Debug, Deserialize)]
pub struct ReadResourceQuery {
    pub uri: String,
}

pub async fn read_resource(
    State(dispatcher): State<GatewayState>,
    Query(q): Query<ReadResourceQuery>,
) -> impl IntoResponse {
    match dispatcher.read_resource(&q.uri).await {
        Ok((mime, content)) => (StatusCode::OK, Json(json!({ "mime": mime, "content": content }))),
        Err(err) => (StatusCode::NOT_FOUND, Json(serde_json::to_value(err).unwrap_or(Value::Null))),
    }
}
