//! The public surface `modelgate-router` calls into: one function per
//! ingress route (SPEC_FULL.md §6), each a thin wrapper around
//! `crate::pipeline` that stamps the `x-gateway-request-id` trace header
//! carried on every response.

use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;
use time::OffsetDateTime;
use uuid::Uuid;

use modelgate_transform::adapters::ClientDialect;

use crate::pipeline;
use crate::response::GatewayResponse;
use crate::state::AppState;

fn with_trace_header(mut response: GatewayResponse) -> GatewayResponse {
    response.headers.push(("x-gateway-request-id".to_string(), Uuid::new_v4().to_string()));
    response
}

pub async fn handle_chat_completions(state: Arc<AppState>, headers: HeaderMap, body: Bytes) -> GatewayResponse {
    with_trace_header(pipeline::handle_chat(state, ClientDialect::OpenAiChat, headers, body).await)
}

pub async fn handle_messages(state: Arc<AppState>, headers: HeaderMap, body: Bytes) -> GatewayResponse {
    with_trace_header(pipeline::handle_chat(state, ClientDialect::Anthropic, headers, body).await)
}

pub async fn handle_responses(state: Arc<AppState>, headers: HeaderMap, body: Bytes) -> GatewayResponse {
    with_trace_header(pipeline::handle_chat(state, ClientDialect::OpenAiResponses, headers, body).await)
}

pub async fn handle_embeddings(state: Arc<AppState>, headers: HeaderMap, body: Bytes) -> GatewayResponse {
    with_trace_header(pipeline::handle_embeddings(state, headers, body).await)
}

pub async fn handle_models(state: Arc<AppState>, headers: HeaderMap) -> GatewayResponse {
    with_trace_header(pipeline::handle_models(state, headers).await)
}

pub async fn handle_usage(state: Arc<AppState>, headers: HeaderMap, from: OffsetDateTime, to: OffsetDateTime) -> GatewayResponse {
    with_trace_header(pipeline::handle_usage(state, headers, from, to).await)
}
