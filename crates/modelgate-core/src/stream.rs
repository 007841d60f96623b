//! Streaming response processing (SPEC_FULL.md §4.8, §9 "StreamingContext").
//!
//! Runs as a detached task decoupled from the client's body by an unbounded
//! channel: the upstream byte stream is drained to completion regardless of
//! whether the client is still reading, satisfying "continue consuming
//! upstream after client abort" without any axum-specific cancellation
//! plumbing in this crate.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc::UnboundedSender;

use modelgate_protocol::ir::{ContentBlock, ContentBlockStart, ContentDelta, IrResponse, IrStreamEvent, StopReason, Usage};
use modelgate_provider_core::provider::{Provider, StreamDecodeState};
use modelgate_provider_impl::{StreamDecoder, UpstreamBody};
use modelgate_storage::{CompletionFinalize, CompletionStatus};
use modelgate_transform::adapters::{ClientDialect, DialectAdapter};

use crate::error::dialect_str;
use crate::ratelimit::consume_tpm;
use crate::state::AppState;

#[derive(Default)]
struct ToolCallAccum {
    name: String,
    arguments: String,
}

#[derive(Default)]
struct StreamingContext {
    text_parts: Vec<String>,
    thinking_parts: Vec<String>,
    tool_call_order: Vec<String>,
    tool_calls: HashMap<String, ToolCallAccum>,
    index_to_id: HashMap<u32, String>,
    input_tokens: i64,
    output_tokens: i64,
    stop_reason: Option<StopReason>,
    ttft_ms: i64,
}

impl StreamingContext {
    fn apply(&mut self, event: &IrStreamEvent) {
        match event {
            IrStreamEvent::ContentBlockStart { index, block } => {
                if let ContentBlockStart::ToolUse { id, name } = block {
                    if !self.tool_calls.contains_key(id) {
                        self.tool_call_order.push(id.clone());
                        self.tool_calls.insert(id.clone(), ToolCallAccum { name: name.clone(), arguments: String::new() });
                    }
                    self.index_to_id.insert(*index, id.clone());
                }
            }
            IrStreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentDelta::TextDelta { text } => self.text_parts.push(text.clone()),
                ContentDelta::ThinkingDelta { thinking } => self.thinking_parts.push(thinking.clone()),
                ContentDelta::InputJsonDelta { partial_json } => {
                    if let Some(id) = self.index_to_id.get(index) {
                        if let Some(call) = self.tool_calls.get_mut(id) {
                            call.arguments.push_str(partial_json);
                        }
                    } else {
                        tracing::warn!(index, "input_json_delta for an unopened tool-call block, dropping");
                    }
                }
            },
            IrStreamEvent::MessageDelta { stop_reason } => {
                if stop_reason.is_some() {
                    self.stop_reason = *stop_reason;
                }
            }
            IrStreamEvent::Usage { usage } => {
                self.input_tokens = usage.input_tokens;
                self.output_tokens = usage.output_tokens;
            }
            _ => {}
        }
    }

    /// Reassembles the canonical IR response this stream represented:
    /// thinking block (if any), then text block (if any), then tool-use
    /// blocks in the order their blocks were opened. `stop_reason` is the
    /// real value tracked off `MessageDelta` events, not inferred.
    fn into_ir_response(self, model: String) -> IrResponse {
        let mut content = Vec::new();
        let thinking = self.thinking_parts.concat();
        if !thinking.is_empty() {
            content.push(ContentBlock::Thinking { thinking, signature: None });
        }
        let text = self.text_parts.concat();
        if !text.is_empty() {
            content.push(ContentBlock::Text { text });
        }
        for id in &self.tool_call_order {
            if let Some(call) = self.tool_calls.get(id) {
                let input = serde_json::from_str::<JsonValue>(&call.arguments).unwrap_or(JsonValue::Null);
                content.push(ContentBlock::ToolUse { id: id.clone(), name: call.name.clone(), input });
            }
        }
        IrResponse {
            model,
            content,
            stop_reason: self.stop_reason,
            usage: Usage { input_tokens: self.input_tokens, output_tokens: self.output_tokens },
        }
    }
}

/// Drives one streamed upstream reply to completion: decodes provider
/// framing, maps each frame to IR events, renders client-dialect SSE frames
/// onto `tx`, and persists the terminal `Completion` exactly once.
#[allow(clippy::too_many_arguments)]
pub async fn run_stream(
    state: Arc<AppState>,
    provider: Arc<dyn Provider>,
    upstream_body: UpstreamBody,
    response_adapter: Box<dyn DialectAdapter>,
    dialect: ClientDialect,
    model: String,
    completion_id: i64,
    model_id: Option<i64>,
    api_key_id: i64,
    req_id: Option<String>,
    tx: UnboundedSender<Result<Bytes, io::Error>>,
) {
    let started = Instant::now();
    let mut ctx = StreamingContext::default();
    let mut decode_state = StreamDecodeState::default();
    let mut decoder = StreamDecoder::new();
    let mut forwarding_ok = true;
    let mut first_chunk_seen = false;

    let byte_stream = match upstream_body {
        UpstreamBody::Stream(s) => s,
        UpstreamBody::Unary(bytes) => Box::pin(futures_util::stream::once(async move { Ok(bytes) })),
    };
    tokio::pin!(byte_stream);

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(error = %err, "upstream stream read error");
                break;
            }
        };
        if !first_chunk_seen {
            ctx.ttft_ms = started.elapsed().as_millis() as i64;
            first_chunk_seen = true;
        }
        for frame in decoder.push(&chunk) {
            emit_frame(&provider, &frame, &mut decode_state, &mut ctx, &*response_adapter, &tx, &mut forwarding_ok);
        }
    }
    for frame in decoder.finish() {
        emit_frame(&provider, &frame, &mut decode_state, &mut ctx, &*response_adapter, &tx, &mut forwarding_ok);
    }

    if forwarding_ok {
        if let Some(terminator) = response_adapter.stream_terminator() {
            let _ = tx.send(Ok(Bytes::from(format!("data: {terminator}\n\n"))));
        }
    }

    let aborted = !forwarding_ok;
    finalize(
        &state,
        &*response_adapter,
        completion_id,
        model_id,
        api_key_id,
        req_id,
        dialect,
        model,
        ctx,
        started,
        first_chunk_seen,
        aborted,
    )
    .await;
}

#[allow(clippy::too_many_arguments)]
fn emit_frame(
    provider: &Arc<dyn Provider>,
    frame: &str,
    decode_state: &mut StreamDecodeState,
    ctx: &mut StreamingContext,
    response_adapter: &dyn DialectAdapter,
    tx: &UnboundedSender<Result<Bytes, io::Error>>,
    forwarding_ok: &mut bool,
) {
    let events = match provider.parse_stream_frame(frame.as_bytes(), decode_state) {
        Ok(events) => events,
        Err(err) => {
            tracing::warn!(error = %err, "failed to parse upstream stream frame");
            return;
        }
    };
    for event in events {
        ctx.apply(&event);
        if *forwarding_ok {
            for sse in response_adapter.render_stream_event(&event) {
                if tx.send(Ok(Bytes::from(sse.to_wire()))).is_err() {
                    *forwarding_ok = false;
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn finalize(
    state: &AppState,
    response_adapter: &dyn DialectAdapter,
    completion_id: i64,
    model_id: Option<i64>,
    api_key_id: i64,
    req_id: Option<String>,
    dialect: ClientDialect,
    model: String,
    ctx: StreamingContext,
    started: Instant,
    first_chunk_seen: bool,
    aborted: bool,
) {
    let duration_ms = started.elapsed().as_millis() as i64;
    let status = if !first_chunk_seen {
        CompletionStatus::Failed
    } else if aborted {
        CompletionStatus::Aborted
    } else {
        CompletionStatus::Completed
    };
    let prompt_tokens = ctx.input_tokens;
    let completion_tokens = ctx.output_tokens;
    let ttft_ms = if first_chunk_seen { ctx.ttft_ms } else { -1 };
    let ir_response = ctx.into_ir_response(model);
    let rendered = response_adapter.render_response(&ir_response);
    let completion_json = serde_json::to_value(&ir_response).ok();

    let finalize = CompletionFinalize {
        status,
        model_id,
        prompt_tokens,
        completion_json,
        completion_tokens,
        ttft_ms,
        duration_ms,
        cached_response_body: Some(rendered),
        cached_response_format: Some(dialect_str(dialect).to_string()),
    };

    if let Err(err) = state.storage.finalize_completion(completion_id, &finalize).await {
        tracing::error!(error = %err, completion_id, "failed to finalize streaming completion");
    }
    if let Some(req_id) = req_id {
        if let Err(err) = state.storage.finalize_req_id(api_key_id, &req_id, completion_id).await {
            tracing::error!(error = %err, "failed to finalize req_id entry");
        }
    }
    consume_tpm(state, api_key_id, prompt_tokens, completion_tokens);
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_protocol::ir::Usage as IrUsage;

    #[test]
    fn reassembles_tool_calls_keyed_by_id_despite_interleaved_indices() {
        let mut ctx = StreamingContext::default();
        ctx.apply(&IrStreamEvent::ContentBlockStart {
            index: 0,
            block: ContentBlockStart::ToolUse { id: "call_a".to_string(), name: "fn_a".to_string() },
        });
        ctx.apply(&IrStreamEvent::ContentBlockStart {
            index: 1,
            block: ContentBlockStart::ToolUse { id: "call_b".to_string(), name: "fn_b".to_string() },
        });
        // Arguments interleave: b, a, b, a.
        ctx.apply(&IrStreamEvent::ContentBlockDelta { index: 1, delta: ContentDelta::InputJsonDelta { partial_json: "{\"b\":".to_string() } });
        ctx.apply(&IrStreamEvent::ContentBlockDelta { index: 0, delta: ContentDelta::InputJsonDelta { partial_json: "{\"a\":".to_string() } });
        ctx.apply(&IrStreamEvent::ContentBlockDelta { index: 1, delta: ContentDelta::InputJsonDelta { partial_json: "1}".to_string() } });
        ctx.apply(&IrStreamEvent::ContentBlockDelta { index: 0, delta: ContentDelta::InputJsonDelta { partial_json: "1}".to_string() } });

        let response = ctx.into_ir_response("gpt-4".to_string());
        let tool_calls: Vec<_> = response
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, input, .. } => Some((id.clone(), input.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(tool_calls.len(), 2);
        let a = tool_calls.iter().find(|(id, _)| id == "call_a").unwrap();
        let b = tool_calls.iter().find(|(id, _)| id == "call_b").unwrap();
        assert_eq!(a.1["a"], 1);
        assert_eq!(b.1["b"], 1);
    }

    #[test]
    fn input_json_delta_without_a_known_index_does_not_corrupt_any_tool() {
        let mut ctx = StreamingContext::default();
        ctx.apply(&IrStreamEvent::ContentBlockStart {
            index: 0,
            block: ContentBlockStart::ToolUse { id: "call_a".to_string(), name: "fn_a".to_string() },
        });
        ctx.apply(&IrStreamEvent::ContentBlockDelta { index: 0, delta: ContentDelta::InputJsonDelta { partial_json: "{\"a\":1}".to_string() } });
        // A delta for an index that was never opened must be dropped.
        ctx.apply(&IrStreamEvent::ContentBlockDelta { index: 9, delta: ContentDelta::InputJsonDelta { partial_json: "garbage".to_string() } });

        let response = ctx.into_ir_response("gpt-4".to_string());
        let call = response
            .content
            .iter()
            .find_map(|b| match b {
                ContentBlock::ToolUse { id, input, .. } if id == "call_a" => Some(input.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(call["a"], 1);
    }

    #[test]
    fn text_and_thinking_parts_concatenate_in_arrival_order() {
        let mut ctx = StreamingContext::default();
        ctx.apply(&IrStreamEvent::ContentBlockDelta { index: 0, delta: ContentDelta::ThinkingDelta { thinking: "thinking ".to_string() } });
        ctx.apply(&IrStreamEvent::ContentBlockDelta { index: 0, delta: ContentDelta::ThinkingDelta { thinking: "more".to_string() } });
        ctx.apply(&IrStreamEvent::ContentBlockDelta { index: 1, delta: ContentDelta::TextDelta { text: "hello ".to_string() } });
        ctx.apply(&IrStreamEvent::ContentBlockDelta { index: 1, delta: ContentDelta::TextDelta { text: "world".to_string() } });

        let response = ctx.into_ir_response("gpt-4".to_string());
        assert!(matches!(&response.content[0], ContentBlock::Thinking { thinking, .. } if thinking == "thinking more"));
        assert!(matches!(&response.content[1], ContentBlock::Text { text } if text == "hello world"));
    }

    #[test]
    fn message_delta_only_overwrites_stop_reason_when_present() {
        let mut ctx = StreamingContext::default();
        ctx.apply(&IrStreamEvent::MessageDelta { stop_reason: Some(StopReason::ToolUse) });
        ctx.apply(&IrStreamEvent::MessageDelta { stop_reason: None });
        assert_eq!(ctx.stop_reason, Some(StopReason::ToolUse));
    }

    #[test]
    fn usage_event_sets_token_counts() {
        let mut ctx = StreamingContext::default();
        ctx.apply(&IrStreamEvent::Usage { usage: IrUsage { input_tokens: 7, output_tokens: 3 } });
        assert_eq!(ctx.input_tokens, 7);
        assert_eq!(ctx.output_tokens, 3);
    }
}
