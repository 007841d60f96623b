//! The Anthropic Messages wire (SPEC_FULL.md §4.5, §6).

use async_trait::async_trait;
use modelgate_protocol::anthropic::messages::request::{
    ContentBlockParam, CreateMessageRequestBody, ImageSource, ImageSourceType, MessageContent,
    MessageParam, MessageRole, SystemParam, Tool, ToolChoice as AnthropicToolChoice,
    ToolInputSchema, ToolResultContent,
};
use modelgate_protocol::anthropic::messages::response::{CreateMessageResponse, StopReason as AnthropicStopReason};
use modelgate_protocol::anthropic::messages::stream::{BetaStreamEventKnown, StreamContentBlockDelta};
use modelgate_protocol::ir::{
    ContentBlock, ContentBlockStart, ContentDelta, IrRequest, IrResponse, IrStreamEvent, Message,
    Role, StopReason, ToolChoice, ToolSpec, Usage,
};
use modelgate_provider_core::errors::{ProviderError, ProviderResult};
use modelgate_provider_core::provider::{
    EmbeddingsInput, EmbeddingsResult, NativeRequest, Provider, ProviderConfig, ProviderOperation,
    ProviderType, StreamDecodeState,
};

pub struct AnthropicProvider {
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn auth_headers(&self) -> ProviderResult<Vec<(String, String)>> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidConfig("missing api key".to_string()))?;
        let version = self
            .config
            .api_version
            .clone()
            .unwrap_or_else(|| "2023-06-01".to_string());
        Ok(vec![
            ("x-api-key".to_string(), key.to_string()),
            ("anthropic-version".to_string(), version),
        ])
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }

    fn supports(&self, op: ProviderOperation) -> bool {
        matches!(op, ProviderOperation::Chat)
    }

    fn build_request(&self, remote_id: &str, ir: &IrRequest) -> ProviderResult<NativeRequest> {
        let body = ir_to_anthropic_body(remote_id, ir);
        let value = serde_json::to_value(&body)
            .map_err(|err| ProviderError::Other(format!("encode messages request: {err}")))?;
        Ok(NativeRequest {
            method: http::Method::POST,
            path: "/messages".to_string(),
            headers: self.auth_headers()?,
            body: value,
        })
    }

    fn parse_response(&self, body: &[u8]) -> ProviderResult<IrResponse> {
        let response: CreateMessageResponse = serde_json::from_slice(body)
            .map_err(|err| ProviderError::Other(format!("decode messages response: {err}")))?;
        Ok(anthropic_response_to_ir(response))
    }

    fn parse_stream_frame(
        &self,
        frame: &[u8],
        state: &mut StreamDecodeState,
    ) -> ProviderResult<Vec<IrStreamEvent>> {
        parse_anthropic_stream_frame(frame, state)
    }

    fn build_embeddings_request(
        &self,
        _remote_id: &str,
        _input: &EmbeddingsInput,
    ) -> ProviderResult<NativeRequest> {
        Err(ProviderError::InvalidConfig(
            "anthropic does not support embeddings".to_string(),
        ))
    }

    fn parse_embeddings_response(&self, _body: &[u8]) -> ProviderResult<EmbeddingsResult> {
        Err(ProviderError::InvalidConfig(
            "anthropic does not support embeddings".to_string(),
        ))
    }
}

fn ir_to_anthropic_body(remote_id: &str, ir: &IrRequest) -> CreateMessageRequestBody {
    let messages = ir
        .messages
        .iter()
        .filter(|message| message.role != Role::System)
        .map(message_to_anthropic)
        .collect();
    let system = ir.system.clone().map(SystemParam::Text);
    let tools = ir
        .tools
        .as_ref()
        .map(|specs| specs.iter().map(tool_to_anthropic).collect());
    let tool_choice = ir.tool_choice.as_ref().map(tool_choice_to_anthropic);
    let mut extra = serde_json::Map::new();
    for (key, value) in &ir.extra_params {
        extra.insert(key.clone(), value.clone());
    }
    CreateMessageRequestBody {
        max_tokens: ir.max_tokens.unwrap_or(4096),
        messages,
        model: remote_id.to_string(),
        stop_sequences: ir.stop_sequences.clone(),
        stream: Some(ir.stream),
        system,
        temperature: ir.temperature,
        thinking: None,
        tool_choice,
        tools,
        top_k: ir.top_k,
        top_p: ir.top_p,
        extra,
    }
}

fn message_to_anthropic(message: &Message) -> MessageParam {
    let role = match message.role {
        Role::Assistant => MessageRole::Assistant,
        _ => MessageRole::User,
    };
    let blocks: Vec<ContentBlockParam> = message.content.iter().map(block_to_anthropic).collect();
    let content = if blocks.len() == 1 {
        match &blocks[0] {
            ContentBlockParam::Text { text } => MessageContent::Text(text.clone()),
            _ => MessageContent::Blocks(blocks),
        }
    } else {
        MessageContent::Blocks(blocks)
    };
    MessageParam { role, content }
}

fn block_to_anthropic(block: &ContentBlock) -> ContentBlockParam {
    match block {
        ContentBlock::Text { text } => ContentBlockParam::Text { text: text.clone() },
        ContentBlock::Thinking { thinking, signature } => ContentBlockParam::Thinking {
            thinking: thinking.clone(),
            signature: signature.clone(),
        },
        ContentBlock::Image {
            url,
            base64,
            media_type,
        } => {
            let source = if let Some(data) = base64 {
                ImageSource {
                    r#type: ImageSourceType::Base64,
                    media_type: Some(media_type.clone().unwrap_or_else(|| "image/png".to_string())),
                    data: Some(data.clone()),
                    url: None,
                }
            } else {
                ImageSource {
                    r#type: ImageSourceType::Url,
                    media_type: media_type.clone(),
                    data: None,
                    url: url.clone(),
                }
            };
            ContentBlockParam::Image { source }
        }
        ContentBlock::ToolUse { id, name, input } => ContentBlockParam::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => ContentBlockParam::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: Some(ToolResultContent::Text(content.clone())),
            is_error: *is_error,
        },
    }
}

fn tool_to_anthropic(spec: &ToolSpec) -> Tool {
    let object = spec.input_schema.as_object();
    Tool {
        name: spec.name.clone(),
        description: spec.description.clone(),
        input_schema: ToolInputSchema {
            r#type: "object".to_string(),
            properties: object
                .and_then(|o| o.get("properties"))
                .cloned(),
            required: object
                .and_then(|o| o.get("required"))
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                }),
        },
    }
}

fn tool_choice_to_anthropic(choice: &ToolChoice) -> AnthropicToolChoice {
    match choice {
        ToolChoice::Auto => AnthropicToolChoice::Auto,
        ToolChoice::None => AnthropicToolChoice::None,
        ToolChoice::Any => AnthropicToolChoice::Any,
        ToolChoice::Named(name) => AnthropicToolChoice::Tool { name: name.clone() },
    }
}

fn anthropic_response_to_ir(response: CreateMessageResponse) -> IrResponse {
    let content = response.content.into_iter().map(block_from_anthropic).collect();
    let stop_reason = response.stop_reason.map(|reason| match reason {
        AnthropicStopReason::EndTurn => StopReason::EndTurn,
        AnthropicStopReason::MaxTokens => StopReason::MaxTokens,
        AnthropicStopReason::StopSequence => StopReason::StopSequence,
        AnthropicStopReason::ToolUse => StopReason::ToolUse,
    });
    IrResponse {
        model: response.model,
        content,
        stop_reason,
        usage: Usage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        },
    }
}

fn block_from_anthropic(block: ContentBlockParam) -> ContentBlock {
    match block {
        ContentBlockParam::Text { text } => ContentBlock::Text { text },
        ContentBlockParam::Thinking { thinking, signature } => {
            ContentBlock::Thinking { thinking, signature }
        }
        ContentBlockParam::Image { source } => ContentBlock::Image {
            url: source.url,
            base64: source.data,
            media_type: source.media_type,
        },
        ContentBlockParam::ToolUse { id, name, input } => ContentBlock::ToolUse { id, name, input },
        ContentBlockParam::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => ContentBlock::ToolResult {
            tool_use_id,
            content: match content {
                Some(ToolResultContent::Text(text)) => text,
                Some(ToolResultContent::Blocks(blocks)) => blocks
                    .into_iter()
                    .filter_map(|b| match b {
                        ContentBlockParam::Text { text } => Some(text),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
                None => String::new(),
            },
            is_error,
        },
    }
}

fn parse_anthropic_stream_frame(
    frame: &[u8],
    state: &mut StreamDecodeState,
) -> ProviderResult<Vec<IrStreamEvent>> {
    if state.terminated {
        return Ok(Vec::new());
    }
    let text = std::str::from_utf8(frame)
        .map_err(|_| ProviderError::Other("non-utf8 stream frame".to_string()))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let event: BetaStreamEventKnown = serde_json::from_str(trimmed)
        .map_err(|err| ProviderError::Other(format!("bad stream event: {err}")))?;

    let events = match event {
        BetaStreamEventKnown::MessageStart { message } => {
            state.message_started = true;
            vec![IrStreamEvent::MessageStart { model: message.model }]
        }
        BetaStreamEventKnown::ContentBlockStart {
            index,
            content_block,
        } => {
            if let ContentBlockParam::ToolUse { id, .. } = &content_block {
                state.index_to_id.insert(index, id.clone());
            }
            vec![IrStreamEvent::ContentBlockStart {
                index,
                block: content_block_start(&content_block),
            }]
        }
        BetaStreamEventKnown::ContentBlockDelta { index, delta } => {
            vec![IrStreamEvent::ContentBlockDelta {
                index,
                delta: match delta {
                    StreamContentBlockDelta::TextDelta { text } => ContentDelta::TextDelta { text },
                    StreamContentBlockDelta::ThinkingDelta { thinking } => {
                        ContentDelta::ThinkingDelta { thinking }
                    }
                    StreamContentBlockDelta::InputJsonDelta { partial_json } => {
                        ContentDelta::InputJsonDelta { partial_json }
                    }
                },
            }]
        }
        BetaStreamEventKnown::ContentBlockStop { index } => {
            vec![IrStreamEvent::ContentBlockStop { index }]
        }
        BetaStreamEventKnown::MessageDelta { delta, usage } => {
            let stop_reason = delta.stop_reason.map(|reason| match reason {
                AnthropicStopReason::EndTurn => StopReason::EndTurn,
                AnthropicStopReason::MaxTokens => StopReason::MaxTokens,
                AnthropicStopReason::StopSequence => StopReason::StopSequence,
                AnthropicStopReason::ToolUse => StopReason::ToolUse,
            });
            vec![
                IrStreamEvent::MessageDelta { stop_reason },
                IrStreamEvent::Usage {
                    usage: Usage {
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                    },
                },
            ]
        }
        BetaStreamEventKnown::MessageStop => {
            state.terminated = true;
            vec![IrStreamEvent::MessageStop]
        }
        BetaStreamEventKnown::Ping => Vec::new(),
        BetaStreamEventKnown::Error { error } => {
            state.terminated = true;
            vec![
                IrStreamEvent::Unknown(serde_json::json!({ "error": error })),
                IrStreamEvent::MessageStop,
            ]
        }
    };
    Ok(events)
}

fn content_block_start(block: &ContentBlockParam) -> ContentBlockStart {
    match block {
        ContentBlockParam::ToolUse { id, name, .. } => ContentBlockStart::ToolUse {
            id: id.clone(),
            name: name.clone(),
        },
        ContentBlockParam::Thinking { .. } => ContentBlockStart::Thinking,
        _ => ContentBlockStart::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_start_emits_model_and_sets_flag() {
        let mut state = StreamDecodeState::default();
        let events = parse_anthropic_stream_frame(
            br#"{"type":"message_start","message":{"id":"msg_1","content":[],"model":"claude-3","role":"assistant","type":"message","usage":{"input_tokens":1,"output_tokens":0}}}"#,
            &mut state,
        )
        .unwrap();
        assert!(state.message_started);
        assert!(matches!(&events[0], IrStreamEvent::MessageStart { model } if model == "claude-3"));
    }

    #[test]
    fn two_tool_use_blocks_at_distinct_indices_stay_independent() {
        let mut state = StreamDecodeState::default();
        let mut events = Vec::new();
        events.extend(
            parse_anthropic_stream_frame(
                br#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_A","name":"fn_a","input":{}}}"#,
                &mut state,
            )
            .unwrap(),
        );
        events.extend(
            parse_anthropic_stream_frame(
                br#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_B","name":"fn_b","input":{}}}"#,
                &mut state,
            )
            .unwrap(),
        );
        // Deltas arrive interleaved, index 1 before index 0.
        events.extend(
            parse_anthropic_stream_frame(
                br#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"b\":1}"}}"#,
                &mut state,
            )
            .unwrap(),
        );
        events.extend(
            parse_anthropic_stream_frame(
                br#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"a\":1}"}}"#,
                &mut state,
            )
            .unwrap(),
        );

        assert_eq!(state.index_to_id.get(&0).map(String::as_str), Some("toolu_A"));
        assert_eq!(state.index_to_id.get(&1).map(String::as_str), Some("toolu_B"));

        let arg_for = |idx: u32| {
            events
                .iter()
                .find_map(|e| match e {
                    IrStreamEvent::ContentBlockDelta { index, delta: ContentDelta::InputJsonDelta { partial_json } }
                        if *index == idx =>
                    {
                        Some(partial_json.clone())
                    }
                    _ => None,
                })
                .unwrap()
        };
        assert_eq!(arg_for(0), "{\"a\":1}");
        assert_eq!(arg_for(1), "{\"b\":1}");
    }

    #[test]
    fn message_delta_maps_stop_reason_and_carries_usage() {
        let mut state = StreamDecodeState::default();
        let events = parse_anthropic_stream_frame(
            br#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"input_tokens":10,"output_tokens":4}}"#,
            &mut state,
        )
        .unwrap();
        assert!(matches!(&events[0], IrStreamEvent::MessageDelta { stop_reason: Some(StopReason::ToolUse) }));
        assert!(matches!(&events[1], IrStreamEvent::Usage { usage } if usage.input_tokens == 10 && usage.output_tokens == 4));
    }

    #[test]
    fn ping_events_are_dropped() {
        let mut state = StreamDecodeState::default();
        let events = parse_anthropic_stream_frame(br#"{"type":"ping"}"#, &mut state).unwrap();
        assert!(events.is_empty());
        assert!(!state.terminated);
    }

    #[test]
    fn message_stop_terminates_and_later_frames_are_ignored() {
        let mut state = StreamDecodeState::default();
        let events = parse_anthropic_stream_frame(br#"{"type":"message_stop"}"#, &mut state).unwrap();
        assert!(state.terminated);
        assert!(matches!(events.as_slice(), [IrStreamEvent::MessageStop]));
        let more = parse_anthropic_stream_frame(br#"{"type":"ping"}"#, &mut state).unwrap();
        assert!(more.is_empty());
    }

    #[test]
    fn error_event_terminates_stream() {
        let mut state = StreamDecodeState::default();
        let events = parse_anthropic_stream_frame(
            br#"{"type":"error","error":{"type":"overloaded_error","message":"busy"}}"#,
            &mut state,
        )
        .unwrap();
        assert!(state.terminated);
        assert!(matches!(events.last(), Some(IrStreamEvent::MessageStop)));
    }
}
