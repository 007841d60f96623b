use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use serde::Deserialize;
use time::OffsetDateTime;
use tokio_stream::wrappers::UnboundedReceiverStream;

use modelgate_core::handler;
use modelgate_core::response::{GatewayResponse, ResponseBody};
use modelgate_core::state::AppState;

pub fn proxy_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/messages", post(messages))
        .route("/v1/responses", post(responses))
        .route("/v1/embeddings", post(embeddings))
        .route("/v1/models", get(models))
        .route("/api/usage", get(usage))
        .with_state(state)
}

async fn chat_completions(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    into_axum_response(handler::handle_chat_completions(state, headers, body).await)
}

async fn messages(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    into_axum_response(handler::handle_messages(state, headers, body).await)
}

async fn responses(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    into_axum_response(handler::handle_responses(state, headers, body).await)
}

async fn embeddings(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    into_axum_response(handler::handle_embeddings(state, headers, body).await)
}

async fn models(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    into_axum_response(handler::handle_models(state, headers).await)
}

#[derive(Debug, Deserialize)]
struct UsageQuery {
    from: Option<String>,
    to: Option<String>,
}

async fn usage(State(state): State<Arc<AppState>>, headers: HeaderMap, Query(query): Query<UsageQuery>) -> Response {
    let from = query
        .from
        .as_deref()
        .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let to = query
        .to
        .as_deref()
        .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);
    into_axum_response(handler::handle_usage(state, headers, from, to).await)
}

/// The only place a `GatewayResponse` becomes a real axum body: unary
/// responses are a single frame, streaming ones wrap the unbounded
/// channel `crate::stream::run_stream` feeds from a detached task (so the
/// upstream drain in that task keeps running even if the body below is
/// dropped on client disconnect, per SPEC_FULL.md §4.8).
fn into_axum_response(response: GatewayResponse) -> Response {
    let GatewayResponse { status, headers, body } = response;
    let mut builder = Response::builder().status(status);
    for (name, value) in &headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let body = match body {
        ResponseBody::Unary(bytes) => Body::from(bytes),
        ResponseBody::Stream(rx) => Body::from_stream(UnboundedReceiverStream::new(rx)),
    };
    match builder.body(body) {
        Ok(resp) => resp,
        Err(err) => {
            tracing::error!(error = %err, "failed to build http response");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
