//! Minimal admin CRUD surface (SPEC_FULL.md §1 Non-goals: "a full admin
//! product is out of scope"; this exists only so providers/models/keys have
//! somewhere to be written from, per `modelgate_core::admin`'s own doc
//! comment). Every mutation goes through `modelgate_core::admin`, which
//! refreshes `AppState::routing` so the next proxied request sees it.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use modelgate_core::auth::authenticate_admin;
use modelgate_core::state::AppState;
use modelgate_storage::{ApiKeyInput, ModelInput, ProviderInput};

#[derive(Clone)]
pub struct AdminState {
    pub app: Arc<AppState>,
}

pub fn router(app: Arc<AppState>) -> Router {
    let state = AdminState { app };

    Router::new()
        .route("/health", get(health))
        .route("/snapshot", get(snapshot))
        .route(
            "/providers/{name}",
            put(upsert_provider).delete(delete_provider),
        )
        .route(
            "/providers/{provider}/models/{system_name}",
            put(upsert_model).delete(delete_model),
        )
        .route("/keys/{key_value}", put(upsert_api_key).delete(revoke_api_key))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth))
        .with_state(state)
}

async fn admin_auth(
    State(state): State<AdminState>,
    headers: HeaderMap,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if !authenticate_admin(&headers, &state.app.global.load().admin_key_hash) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn snapshot(State(state): State<AdminState>) -> Response {
    match modelgate_core::admin::snapshot(&state.app).await {
        Ok(snapshot) => Json(json!({
            "providers": snapshot.providers.iter().map(|p| json!({
                "id": p.id,
                "name": p.name,
                "provider_type": p.provider_type,
                "base_url": p.base_url,
                "api_version": p.api_version,
                "proxy": p.proxy,
            })).collect::<Vec<_>>(),
            "models": snapshot.models.iter().map(|m| json!({
                "id": m.id,
                "provider_id": m.provider_id,
                "system_name": m.system_name,
                "remote_id": m.remote_id,
                "model_type": m.model_type,
                "weight": m.weight,
                "context_length": m.context_length,
            })).collect::<Vec<_>>(),
            "api_keys": snapshot.api_keys.iter().map(|k| json!({
                "id": k.id,
                "external_id": k.external_id,
                "revoked": k.revoked,
                "expires_at": k.expires_at.map(|t| t.unix_timestamp()),
                "rpm_limit": k.rpm_limit,
                "tpm_limit": k.tpm_limit,
                "source": k.source,
                "comment": k.comment,
                "last_seen": k.last_seen.map(|t| t.unix_timestamp()),
            })).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(err) => storage_error(err),
    }
}

#[derive(Debug, Deserialize)]
struct ProviderBody {
    provider_type: String,
    base_url: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    api_version: Option<String>,
    #[serde(default)]
    proxy: Option<String>,
}

async fn upsert_provider(State(state): State<AdminState>, Path(name): Path<String>, Json(body): Json<ProviderBody>) -> Response {
    let input = ProviderInput {
        name,
        provider_type: body.provider_type,
        base_url: body.base_url,
        api_key: body.api_key,
        api_version: body.api_version,
        proxy: body.proxy,
    };
    match modelgate_core::admin::upsert_provider(&state.app, &input).await {
        Ok(id) => Json(json!({ "id": id })).into_response(),
        Err(err) => storage_error(err),
    }
}

async fn delete_provider(State(state): State<AdminState>, Path(name): Path<String>) -> Response {
    match modelgate_core::admin::delete_provider(&state.app, &name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => storage_error(err),
    }
}

#[derive(Debug, Deserialize)]
struct ModelBody {
    #[serde(default)]
    remote_id: Option<String>,
    #[serde(default = "default_model_type")]
    model_type: String,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default)]
    context_length: Option<i64>,
    #[serde(default)]
    prices: Option<JsonValue>,
}

fn default_model_type() -> String {
    "chat".to_string()
}

fn default_weight() -> f64 {
    1.0
}

async fn upsert_model(
    State(state): State<AdminState>,
    Path((provider, system_name)): Path<(String, String)>,
    Json(body): Json<ModelBody>,
) -> Response {
    let input = ModelInput {
        provider_name: provider,
        system_name,
        remote_id: body.remote_id,
        model_type: body.model_type,
        weight: body.weight,
        context_length: body.context_length,
        prices_json: body.prices,
    };
    match modelgate_core::admin::upsert_model(&state.app, &input).await {
        Ok(id) => Json(json!({ "id": id })).into_response(),
        Err(err) => storage_error(err),
    }
}

async fn delete_model(State(state): State<AdminState>, Path((provider, system_name)): Path<(String, String)>) -> Response {
    match modelgate_core::admin::delete_model(&state.app, &provider, &system_name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => storage_error(err),
    }
}

#[derive(Debug, Deserialize)]
struct ApiKeyBody {
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default = "default_rpm_limit")]
    rpm_limit: i32,
    #[serde(default = "default_tpm_limit")]
    tpm_limit: i32,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default)]
    comment: Option<String>,
}

fn default_rpm_limit() -> i32 {
    60
}

fn default_tpm_limit() -> i32 {
    100_000
}

fn default_source() -> String {
    "admin".to_string()
}

async fn upsert_api_key(State(state): State<AdminState>, Path(key_value): Path<String>, Json(body): Json<ApiKeyBody>) -> Response {
    let input = ApiKeyInput {
        external_id: body.external_id,
        rpm_limit: body.rpm_limit,
        tpm_limit: body.tpm_limit,
        source: body.source,
        comment: body.comment,
    };
    match modelgate_core::admin::upsert_api_key(&state.app, &key_value, &input).await {
        Ok(id) => Json(json!({ "id": id })).into_response(),
        Err(err) => storage_error(err),
    }
}

async fn revoke_api_key(State(state): State<AdminState>, Path(key_value): Path<String>) -> Response {
    match modelgate_core::admin::revoke_api_key(&state.app, &key_value).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => storage_error(err),
    }
}

fn storage_error(err: modelgate_storage::StorageError) -> Response {
    tracing::error!(error = %err, "admin storage operation failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": err.to_string() }))).into_response()
}
