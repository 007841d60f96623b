//! Orchestrates one request end to end: auth, rate limiting, format
//! translation, resolution, the dedup gate, the failover executor, and
//! terminal persistence (SPEC_FULL.md §2 "request flow", §4).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde_json::{Value as JsonValue, json};
use time::OffsetDateTime;

use modelgate_protocol::ir::{IrRequest, IrResponse};
use modelgate_protocol::openai::embeddings::{CreateEmbeddingRequestBody, EmbeddingInput};
use modelgate_protocol::openai::models::{ListObjectType, ListModelsResponse, Model, ModelObjectType};
use modelgate_provider_core::errors::ProviderError;
use modelgate_provider_core::failover::{FailoverOutcome, run_with_failover};
use modelgate_provider_core::provider::{EmbeddingsInput, Provider, ProviderOperation};
use modelgate_provider_core::resolver::Candidate;
use modelgate_provider_impl::{UpstreamBody, provider_for, upstream};
use modelgate_storage::{ApiKeyRow, CompletionCreate, CompletionFinalize, CompletionRow, CompletionStatus, DedupOutcome};
use modelgate_transform::adapters::{ClientDialect, DialectAdapter, adapter_for};

use crate::error::{self, dialect_str};
use crate::ratelimit::{self, KeyLimitVerdict};
use crate::response::{GatewayResponse, ResponseBody};
use crate::state::{AppState, RoutingTable};
use crate::{auth, dedup, dialect, resolve, stream, unary};

pub async fn handle_chat(
    state: Arc<AppState>,
    dialect_kind: ClientDialect,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResponse {
    let key = match auth::authenticate(state.storage.as_ref(), &headers).await {
        Ok(Some(key)) => key,
        Ok(None) => return error::invalid_api_key(dialect_kind),
        Err(err) => {
            tracing::error!(error = %err, "api key lookup failed");
            return error::internal_error(dialect_kind, "internal error");
        }
    };

    let key_headers = match ratelimit::check_key_limits(&state, &key) {
        KeyLimitVerdict::Allowed { headers } => headers,
        KeyLimitVerdict::Rejected { kind, headers } => {
            return error::rate_limited(dialect_kind, &format!("{kind} rate limit exceeded"), headers);
        }
    };

    let body_json: JsonValue = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return error::bad_request(dialect_kind, "request body is not valid JSON"),
    };

    let model_hint = body_json.get("model").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let (bucket_model, _) = resolve::parse_model_spec(&model_hint);
    let (bucket_allowed, bucket_headers) = ratelimit::check_model_bucket(&state, bucket_model);
    if !bucket_allowed {
        let mut headers = key_headers;
        headers.extend(bucket_headers);
        return error::rate_limited(dialect_kind, "model rate limit exceeded", headers);
    }

    let adapter = adapter_for(dialect_kind);
    let ir: IrRequest = match adapter.parse_request(&body_json) {
        Ok(ir) => ir,
        Err(err) => return error::bad_request(dialect_kind, &err.to_string()),
    };

    if ir.stream {
        if let Some(n) = body_json.get("n").and_then(|v| v.as_i64()) {
            if n > 1 {
                return error::bad_request(dialect_kind, "stream with n > 1 is not supported");
            }
        }
    }

    let req_id = dialect::extract_req_id(&headers);
    if let Some(id) = &req_id {
        if !dedup::is_valid_req_id(id) {
            return error::bad_request(dialect_kind, "ReqId must match ^[A-Za-z0-9._:-]{1,128}$");
        }
    }

    let header_provider = dialect::extract_target_provider(&headers);
    let routing_table = state.routing.load_full();
    let mut rng = rand::rng();
    let (_, candidates) = match resolve::resolve(
        &routing_table,
        &ir.model,
        header_provider.as_deref(),
        ProviderOperation::Chat,
        state.failover.max_provider_attempts,
        || rand::Rng::random(&mut rng),
    ) {
        Ok(v) => v,
        Err(_) => return error::not_found(dialect_kind, &format!("no provider configured for model {}", ir.model)),
    };

    let mut prompt_json = body_json.clone();
    if let JsonValue::Object(map) = &mut prompt_json {
        let extra_headers: BTreeMap<String, String> = dialect::passthrough_headers(&headers).into_iter().collect();
        map.insert("extraHeaders".to_string(), json!(extra_headers));
    }
    let create = CompletionCreate {
        api_key_id: key.id,
        model_id: candidates.first().map(|c| c.model_id),
        requested_model: ir.model.clone(),
        prompt_json,
        req_id: req_id.clone(),
    };

    let completion_id = if let Some(id) = &req_id {
        match state.storage.claim_req_id(key.id, id, &create).await {
            Ok(DedupOutcome::NewRequest { completion_id }) => completion_id,
            Ok(DedupOutcome::InFlight) => {
                return error::conflict(
                    dialect_kind,
                    "a request with this ReqId is already in flight",
                    dedup::retry_after_ms(),
                    id,
                );
            }
            Ok(DedupOutcome::CacheHit(row)) => {
                let body = replay_cached_response(&row, dialect_kind, adapter.as_ref());
                let mut headers = key_headers;
                headers.extend(bucket_headers);
                return GatewayResponse::json(StatusCode::OK, headers, &body);
            }
            Err(err) => {
                tracing::error!(error = %err, "dedup gate failed");
                return error::internal_error(dialect_kind, "internal error");
            }
        }
    } else {
        match state.storage.create_pending_completion(&create).await {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(error = %err, "failed to create pending completion");
                return error::internal_error(dialect_kind, "internal error");
            }
        }
    };

    let timeout = Duration::from_millis(state.failover.timeout_ms);
    let extra_headers = dialect::passthrough_headers(&headers);
    let started = Instant::now();

    let outcome = run_with_failover(candidates, &state.failover, |candidate| {
        let routing = routing_table.clone();
        let ir = ir.clone();
        let extra_headers = extra_headers.clone();
        async move {
            let result = attempt_chat_candidate(&routing, &candidate, &ir, &extra_headers, timeout).await;
            (candidate, result)
        }
    })
    .await;

    match outcome {
        FailoverOutcome::Success { value: (body, provider), candidate, .. } => {
            if ir.stream {
                let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
                let response_adapter = adapter_for(dialect_kind);
                tokio::spawn(stream::run_stream(
                    state.clone(),
                    provider,
                    body,
                    response_adapter,
                    dialect_kind,
                    ir.model.clone(),
                    completion_id,
                    Some(candidate.model_id),
                    key.id,
                    req_id.clone(),
                    tx,
                ));
                let mut headers = key_headers;
                headers.extend(bucket_headers);
                headers.push(("Content-Type".to_string(), "text/event-stream".to_string()));
                GatewayResponse { status: StatusCode::OK, headers, body: ResponseBody::Stream(rx) }
            } else {
                match finalize_unary(
                    &state,
                    body,
                    &provider,
                    adapter.as_ref(),
                    dialect_kind,
                    completion_id,
                    Some(candidate.model_id),
                    &key,
                    req_id.clone(),
                    started,
                )
                .await
                {
                    Ok(rendered) => {
                        let mut headers = key_headers;
                        headers.extend(bucket_headers);
                        GatewayResponse::json(StatusCode::OK, headers, &rendered)
                    }
                    Err(resp) => resp,
                }
            }
        }
        FailoverOutcome::NonRetriable { error, .. } => {
            finalize_failed(&state, completion_id, &key, req_id.clone(), started).await;
            forward_provider_error(error, dialect_kind)
        }
        FailoverOutcome::Exhausted { .. } => {
            finalize_failed(&state, completion_id, &key, req_id.clone(), started).await;
            error::upstream_exhausted(dialect_kind)
        }
    }
}

async fn attempt_chat_candidate(
    routing: &RoutingTable,
    candidate: &Candidate,
    ir: &IrRequest,
    extra_headers: &[(String, String)],
    timeout: Duration,
) -> Result<(UpstreamBody, Arc<dyn Provider>), ProviderError> {
    let entry = routing
        .providers
        .get(&candidate.provider_id)
        .ok_or_else(|| ProviderError::InvalidConfig("provider missing from routing table".to_string()))?;
    let provider = provider_for(entry.config.clone());
    if !provider.supports(ProviderOperation::Chat) {
        return Err(ProviderError::InvalidConfig("provider does not support chat".to_string()));
    }
    let native = provider.build_request(&candidate.remote_id, ir)?;
    let body = upstream::dispatch(
        entry.config.provider_type,
        &entry.config.base_url,
        entry.config.proxy.as_deref(),
        &native,
        extra_headers,
        timeout,
        ir.stream,
    )
    .await?;
    Ok((body, provider))
}

#[allow(clippy::too_many_arguments)]
async fn finalize_unary(
    state: &AppState,
    body: UpstreamBody,
    provider: &Arc<dyn Provider>,
    adapter: &dyn DialectAdapter,
    dialect_kind: ClientDialect,
    completion_id: i64,
    model_id: Option<i64>,
    key: &ApiKeyRow,
    req_id: Option<String>,
    started: Instant,
) -> Result<JsonValue, GatewayResponse> {
    let bytes = unary::collect_body(body).await.map_err(|err| error::internal_error(dialect_kind, &err.to_string()))?;
    let ir_response =
        unary::parse(provider.as_ref(), &bytes).map_err(|err| error::internal_error(dialect_kind, &err.to_string()))?;
    let rendered = adapter.render_response(&ir_response);
    let prompt_tokens = ir_response.usage.input_tokens;
    let completion_tokens = ir_response.usage.output_tokens;
    let completion_json = serde_json::to_value(&ir_response).ok();

    let finalize = CompletionFinalize {
        status: CompletionStatus::Completed,
        model_id,
        prompt_tokens,
        completion_json,
        completion_tokens,
        ttft_ms: -1,
        duration_ms: started.elapsed().as_millis() as i64,
        cached_response_body: Some(rendered.clone()),
        cached_response_format: Some(dialect_str(dialect_kind).to_string()),
    };
    if let Err(err) = state.storage.finalize_completion(completion_id, &finalize).await {
        tracing::error!(error = %err, completion_id, "failed to finalize completion");
    }
    if let Some(req_id) = &req_id {
        if let Err(err) = state.storage.finalize_req_id(key.id, req_id, completion_id).await {
            tracing::error!(error = %err, "failed to finalize req_id entry");
        }
    }
    ratelimit::consume_tpm(state, key.id, prompt_tokens, completion_tokens);
    Ok(rendered)
}

/// Replays a dedup cache hit (§4.6/§8). Exact-dialect replays return the
/// stored body byte-for-byte; a hit from a different dialect than the one
/// that originally produced it is re-rendered from the canonical IR instead,
/// falling back to the stored body verbatim if that IR is missing or stale.
fn replay_cached_response(row: &CompletionRow, dialect_kind: ClientDialect, adapter: &dyn DialectAdapter) -> JsonValue {
    if row.cached_response_format.as_deref() == Some(dialect_str(dialect_kind)) {
        if let Some(body) = &row.cached_response_body {
            return body.clone();
        }
    }
    if let Some(ir_json) = &row.completion_json {
        if let Ok(ir_response) = serde_json::from_value::<IrResponse>(ir_json.clone()) {
            return adapter.render_response(&ir_response);
        }
    }
    row.cached_response_body.clone().unwrap_or(JsonValue::Null)
}

async fn finalize_failed(state: &AppState, completion_id: i64, key: &ApiKeyRow, req_id: Option<String>, started: Instant) {
    let finalize = CompletionFinalize {
        status: CompletionStatus::Failed,
        model_id: None,
        prompt_tokens: -1,
        completion_json: None,
        completion_tokens: -1,
        ttft_ms: -1,
        duration_ms: started.elapsed().as_millis() as i64,
        cached_response_body: None,
        cached_response_format: None,
    };
    if let Err(err) = state.storage.finalize_completion(completion_id, &finalize).await {
        tracing::error!(error = %err, completion_id, "failed to finalize failed completion");
    }
    if let Some(req_id) = &req_id {
        if let Err(err) = state.storage.finalize_req_id_on_error(key.id, req_id).await {
            tracing::error!(error = %err, "failed to finalize_req_id_on_error");
        }
    }
}

fn forward_provider_error(error: ProviderError, dialect_kind: ClientDialect) -> GatewayResponse {
    match error {
        ProviderError::Status { status, body, .. } => {
            GatewayResponse::raw(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY), Vec::new(), body)
        }
        other => error::internal_error(dialect_kind, &other.to_string()),
    }
}

pub async fn handle_embeddings(state: Arc<AppState>, headers: HeaderMap, body: Bytes) -> GatewayResponse {
    let dialect_kind = ClientDialect::OpenAiChat;

    let key = match auth::authenticate(state.storage.as_ref(), &headers).await {
        Ok(Some(key)) => key,
        Ok(None) => return error::invalid_api_key(dialect_kind),
        Err(err) => {
            tracing::error!(error = %err, "api key lookup failed");
            return error::internal_error(dialect_kind, "internal error");
        }
    };

    let key_headers = match ratelimit::check_key_limits(&state, &key) {
        KeyLimitVerdict::Allowed { headers } => headers,
        KeyLimitVerdict::Rejected { kind, headers } => {
            return error::rate_limited(dialect_kind, &format!("{kind} rate limit exceeded"), headers);
        }
    };

    let request: CreateEmbeddingRequestBody = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return error::bad_request(dialect_kind, "request body is not valid JSON"),
    };

    let (bucket_model, _) = resolve::parse_model_spec(&request.model);
    let (bucket_allowed, bucket_headers) = ratelimit::check_model_bucket(&state, bucket_model);
    if !bucket_allowed {
        let mut headers = key_headers;
        headers.extend(bucket_headers);
        return error::rate_limited(dialect_kind, "model rate limit exceeded", headers);
    }

    let header_provider = dialect::extract_target_provider(&headers);
    let routing_table = state.routing.load_full();
    let mut rng = rand::rng();
    let (_, candidates) = match resolve::resolve(
        &routing_table,
        &request.model,
        header_provider.as_deref(),
        ProviderOperation::Embeddings,
        state.failover.max_provider_attempts,
        || rand::Rng::random(&mut rng),
    ) {
        Ok(v) => v,
        Err(_) => {
            return error::not_found(dialect_kind, &format!("no embeddings provider configured for model {}", request.model));
        }
    };

    let values = match &request.input {
        EmbeddingInput::Text(s) => vec![s.clone()],
        EmbeddingInput::Many(values) => values.clone(),
    };
    let embeddings_input = EmbeddingsInput { values };

    let timeout = Duration::from_millis(state.failover.timeout_ms);
    let extra_headers = dialect::passthrough_headers(&headers);
    let started = Instant::now();

    let outcome = run_with_failover(candidates, &state.failover, |candidate| {
        let routing = routing_table.clone();
        let input = embeddings_input.clone();
        let extra_headers = extra_headers.clone();
        async move {
            let result = attempt_embeddings_candidate(&routing, &candidate, &input, &extra_headers, timeout).await;
            (candidate, result)
        }
    })
    .await;

    match outcome {
        FailoverOutcome::Success { value: (result, model_id), .. } => {
            let data: Vec<JsonValue> = result
                .vectors
                .iter()
                .enumerate()
                .map(|(i, v)| json!({ "object": "embedding", "index": i, "embedding": v }))
                .collect();
            let rendered = json!({
                "object": "list",
                "data": data,
                "model": request.model,
                "usage": { "prompt_tokens": result.input_tokens.max(0), "total_tokens": result.input_tokens.max(0) },
            });
            let embed_create = modelgate_storage::EmbeddingCreate {
                api_key_id: key.id,
                model_id,
                input_json: serde_json::to_value(&request.input).unwrap_or(JsonValue::Null),
                input_tokens: result.input_tokens,
                embedding_json: rendered.clone(),
                dimensions: result.dimensions as i32,
                status: "completed".to_string(),
                duration_ms: started.elapsed().as_millis() as i64,
            };
            if let Err(err) = state.storage.insert_embedding(&embed_create).await {
                tracing::error!(error = %err, "failed to persist embedding");
            }
            ratelimit::consume_tpm(&state, key.id, result.input_tokens, 0);
            let mut headers = key_headers;
            headers.extend(bucket_headers);
            GatewayResponse::json(StatusCode::OK, headers, &rendered)
        }
        FailoverOutcome::NonRetriable { error, .. } => forward_provider_error(error, dialect_kind),
        FailoverOutcome::Exhausted { .. } => error::upstream_exhausted(dialect_kind),
    }
}

async fn attempt_embeddings_candidate(
    routing: &RoutingTable,
    candidate: &Candidate,
    input: &EmbeddingsInput,
    extra_headers: &[(String, String)],
    timeout: Duration,
) -> Result<(modelgate_provider_core::provider::EmbeddingsResult, i64), ProviderError> {
    let entry = routing
        .providers
        .get(&candidate.provider_id)
        .ok_or_else(|| ProviderError::InvalidConfig("provider missing from routing table".to_string()))?;
    let provider = provider_for(entry.config.clone());
    if !provider.supports(ProviderOperation::Embeddings) {
        return Err(ProviderError::InvalidConfig("provider does not support embeddings".to_string()));
    }
    let native = provider.build_embeddings_request(&candidate.remote_id, input)?;
    let body = upstream::dispatch(
        entry.config.provider_type,
        &entry.config.base_url,
        entry.config.proxy.as_deref(),
        &native,
        extra_headers,
        timeout,
        false,
    )
    .await?;
    let bytes = unary::collect_body(body).await?;
    let result = provider.parse_embeddings_response(&bytes)?;
    Ok((result, candidate.model_id))
}

pub async fn handle_models(state: Arc<AppState>, headers: HeaderMap) -> GatewayResponse {
    let dialect_kind = ClientDialect::OpenAiChat;
    match auth::authenticate(state.storage.as_ref(), &headers).await {
        Ok(Some(_)) => {}
        Ok(None) => return error::invalid_api_key(dialect_kind),
        Err(err) => {
            tracing::error!(error = %err, "api key lookup failed");
            return error::internal_error(dialect_kind, "internal error");
        }
    }

    let routing = state.routing.load();
    let created = OffsetDateTime::now_utc().unix_timestamp();
    let data: Vec<Model> = routing
        .system_names
        .iter()
        .map(|name| Model { id: name.clone(), object: ModelObjectType::Model, created, owned_by: "modelgate".to_string() })
        .collect();
    let response = ListModelsResponse { object: ListObjectType::List, data };
    GatewayResponse::json(StatusCode::OK, Vec::new(), &serde_json::to_value(response).unwrap_or(JsonValue::Null))
}

pub async fn handle_usage(
    state: Arc<AppState>,
    headers: HeaderMap,
    from: OffsetDateTime,
    to: OffsetDateTime,
) -> GatewayResponse {
    let dialect_kind = ClientDialect::OpenAiChat;
    let key = match auth::authenticate(state.storage.as_ref(), &headers).await {
        Ok(Some(key)) => key,
        Ok(None) => return error::invalid_api_key(dialect_kind),
        Err(err) => {
            tracing::error!(error = %err, "api key lookup failed");
            return error::internal_error(dialect_kind, "internal error");
        }
    };

    match state.storage.aggregate_usage(key.id, from, to).await {
        Ok(agg) => GatewayResponse::json(
            StatusCode::OK,
            Vec::new(),
            &json!({
                "matched_rows": agg.matched_rows,
                "prompt_tokens": agg.prompt_tokens,
                "completion_tokens": agg.completion_tokens,
                "total_tokens": agg.total_tokens,
            }),
        ),
        Err(err) => {
            tracing::error!(error = %err, "usage aggregation failed");
            error::internal_error(dialect_kind, "internal error")
        }
    }
}
