//! The OpenAI chat-completions wire. Shared verbatim by `azure` and
//! `ollama` provider rows (SPEC_FULL.md §6 "Egress HTTP") — both speak the
//! identical JSON shape, differing only in base URL/auth conventions
//! already captured in `ProviderConfig`.

use async_trait::async_trait;
use modelgate_protocol::ir::{
    ContentBlock, ContentBlockStart, ContentDelta, IrRequest, IrResponse, IrStreamEvent, Message,
    Role, StopReason, ToolChoice, ToolSpec, Usage,
};
use modelgate_protocol::openai::chat::request::{
    ChatCompletionImageUrl, ChatCompletionMessageToolCall, ChatCompletionMessageToolCallFunction,
    ChatCompletionNamedToolChoice, ChatCompletionNamedToolChoiceFunction,
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestToolMessage,
    ChatCompletionRequestUserMessage, ChatCompletionTextContent, ChatCompletionToolChoiceMode,
    ChatCompletionToolChoiceOption, ChatCompletionToolDefinition, ChatCompletionUserContent,
    ChatCompletionUserContentPart, CreateChatCompletionRequestBody, FunctionObject,
    StopConfiguration,
};
use modelgate_protocol::openai::chat::response::{
    ChatCompletionFinishReason, CreateChatCompletionResponse,
};
use modelgate_protocol::openai::chat::stream::CreateChatCompletionStreamResponse;
use modelgate_protocol::openai::embeddings::{
    CreateEmbeddingRequestBody, CreateEmbeddingResponse, Embedding, EmbeddingInput,
    decode_base64_f32,
};
use modelgate_provider_core::errors::{ProviderError, ProviderResult};
use modelgate_provider_core::provider::{
    EmbeddingsInput, EmbeddingsResult, NativeRequest, Provider, ProviderConfig, ProviderOperation,
    ProviderType, StreamDecodeState,
};
use serde_json::Value as JsonValue;

pub struct OpenAiProvider {
    config: ProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn auth_header(&self) -> ProviderResult<(String, String)> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidConfig("missing api key".to_string()))?;
        Ok(("Authorization".to_string(), format!("Bearer {key}")))
    }

    fn path(&self, suffix: &str) -> String {
        match self.config.provider_type {
            ProviderType::Azure => match &self.config.api_version {
                Some(version) => format!("{suffix}?api-version={version}"),
                None => suffix.to_string(),
            },
            _ => suffix.to_string(),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn provider_type(&self) -> ProviderType {
        self.config.provider_type
    }

    fn supports(&self, op: ProviderOperation) -> bool {
        match op {
            ProviderOperation::Chat => true,
            ProviderOperation::Embeddings => true,
        }
    }

    fn build_request(&self, remote_id: &str, ir: &IrRequest) -> ProviderResult<NativeRequest> {
        let body = ir_to_chat_body(remote_id, ir);
        let mut value = serde_json::to_value(&body)
            .map_err(|err| ProviderError::Other(format!("encode chat request: {err}")))?;
        merge_extra_params(&mut value, ir);
        Ok(NativeRequest {
            method: http::Method::POST,
            path: self.path("/chat/completions"),
            headers: vec![self.auth_header()?],
            body: value,
        })
    }

    fn parse_response(&self, body: &[u8]) -> ProviderResult<IrResponse> {
        let response: CreateChatCompletionResponse = serde_json::from_slice(body)
            .map_err(|err| ProviderError::Other(format!("decode chat response: {err}")))?;
        Ok(chat_response_to_ir(response))
    }

    fn parse_stream_frame(
        &self,
        frame: &[u8],
        state: &mut StreamDecodeState,
    ) -> ProviderResult<Vec<IrStreamEvent>> {
        parse_chat_stream_frame(frame, state)
    }

    fn build_embeddings_request(
        &self,
        remote_id: &str,
        input: &EmbeddingsInput,
    ) -> ProviderResult<NativeRequest> {
        let body = CreateEmbeddingRequestBody {
            model: remote_id.to_string(),
            input: if input.values.len() == 1 {
                EmbeddingInput::Text(input.values[0].clone())
            } else {
                EmbeddingInput::Many(input.values.clone())
            },
            dimensions: None,
        };
        let value = serde_json::to_value(&body)
            .map_err(|err| ProviderError::Other(format!("encode embeddings request: {err}")))?;
        Ok(NativeRequest {
            method: http::Method::POST,
            path: self.path("/embeddings"),
            headers: vec![self.auth_header()?],
            body: value,
        })
    }

    fn parse_embeddings_response(&self, body: &[u8]) -> ProviderResult<EmbeddingsResult> {
        let response: CreateEmbeddingResponse = serde_json::from_slice(body)
            .map_err(|err| ProviderError::Other(format!("decode embeddings response: {err}")))?;
        let vectors = response
            .data
            .into_iter()
            .map(embedding_to_vector)
            .collect::<ProviderResult<Vec<_>>>()?;
        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        Ok(EmbeddingsResult {
            vectors,
            dimensions,
            input_tokens: response.usage.prompt_tokens,
        })
    }
}

fn embedding_to_vector(embedding: Embedding) -> ProviderResult<Vec<f32>> {
    Ok(embedding.embedding)
}

/// Some providers return embeddings base64-encoded little-endian float32
/// instead of a JSON array (SPEC_FULL.md §4.5); callers that see a raw
/// string in place of the array should route through this instead of
/// `parse_embeddings_response`.
pub fn normalize_base64_embedding(data: &str) -> ProviderResult<Vec<f32>> {
    decode_base64_f32(data)
        .ok_or_else(|| ProviderError::Other("invalid base64 embedding vector".to_string()))
}

fn merge_extra_params(value: &mut JsonValue, ir: &IrRequest) {
    if ir.extra_params.is_empty() {
        return;
    }
    if let JsonValue::Object(map) = value {
        for (key, val) in &ir.extra_params {
            map.entry(key.clone()).or_insert_with(|| val.clone());
        }
    }
}

fn ir_to_chat_body(remote_id: &str, ir: &IrRequest) -> CreateChatCompletionRequestBody {
    let messages = ir_messages_to_openai(ir.system.as_deref(), &ir.messages);
    let tools = ir
        .tools
        .as_ref()
        .map(|specs| specs.iter().map(tool_to_openai).collect());
    let tool_choice = ir.tool_choice.as_ref().map(tool_choice_to_openai);
    let stop = ir.stop_sequences.clone().and_then(|seqs| {
        if seqs.is_empty() {
            None
        } else if seqs.len() == 1 {
            Some(StopConfiguration::Single(seqs.into_iter().next().unwrap()))
        } else {
            Some(StopConfiguration::Many(seqs))
        }
    });
    CreateChatCompletionRequestBody {
        messages,
        model: remote_id.to_string(),
        max_completion_tokens: ir.max_tokens.map(i64::from),
        max_tokens: None,
        stream: Some(ir.stream),
        stop,
        n: None,
        tools,
        tool_choice,
        parallel_tool_calls: None,
        extra_body: None,
        temperature: ir.temperature,
        top_p: ir.top_p,
        reasoning_effort: None,
    }
}

fn tool_to_openai(spec: &ToolSpec) -> ChatCompletionToolDefinition {
    ChatCompletionToolDefinition::Function {
        function: FunctionObject {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: Some(spec.input_schema.clone()),
        },
    }
}

fn tool_choice_to_openai(choice: &ToolChoice) -> ChatCompletionToolChoiceOption {
    match choice {
        ToolChoice::Auto => ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::Auto),
        ToolChoice::None => ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::None),
        ToolChoice::Any => {
            ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::Required)
        }
        ToolChoice::Named(name) => {
            ChatCompletionToolChoiceOption::Named(ChatCompletionNamedToolChoice::Function {
                function: ChatCompletionNamedToolChoiceFunction { name: name.clone() },
            })
        }
    }
}

fn ir_messages_to_openai(
    system: Option<&str>,
    messages: &[Message],
) -> Vec<ChatCompletionRequestMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(text) = system {
        out.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessage {
                content: ChatCompletionTextContent::Text(text.to_string()),
            },
        ));
    }
    for message in messages {
        match message.role {
            Role::System => {
                let text = concat_text(&message.content);
                out.push(ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage {
                        content: ChatCompletionTextContent::Text(text),
                    },
                ));
            }
            Role::User => {
                let (tool_results, rest) = split_tool_results(&message.content);
                for (tool_use_id, content) in tool_results {
                    out.push(ChatCompletionRequestMessage::Tool(
                        ChatCompletionRequestToolMessage {
                            tool_call_id: tool_use_id,
                            content: ChatCompletionTextContent::Text(content),
                        },
                    ));
                }
                if !rest.is_empty() {
                    out.push(ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessage {
                            content: blocks_to_user_content(&rest),
                            name: None,
                        },
                    ));
                }
            }
            Role::Assistant => {
                let text = concat_text(&message.content);
                let tool_calls = collect_tool_calls(&message.content);
                out.push(ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessage {
                        content: if text.is_empty() {
                            None
                        } else {
                            Some(ChatCompletionTextContent::Text(text))
                        },
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                    },
                ));
            }
            Role::Tool => {
                for block in &message.content {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        out.push(ChatCompletionRequestMessage::Tool(
                            ChatCompletionRequestToolMessage {
                                tool_call_id: tool_use_id.clone(),
                                content: ChatCompletionTextContent::Text(content.clone()),
                            },
                        ));
                    }
                }
            }
        }
    }
    out
}

fn concat_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn split_tool_results(blocks: &[ContentBlock]) -> (Vec<(String, String)>, Vec<ContentBlock>) {
    let mut results = Vec::new();
    let mut rest = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => results.push((tool_use_id.clone(), content.clone())),
            other => rest.push(other.clone()),
        }
    }
    (results, rest)
}

fn collect_tool_calls(blocks: &[ContentBlock]) -> Vec<ChatCompletionMessageToolCall> {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => {
                Some(ChatCompletionMessageToolCall::Function {
                    id: id.clone(),
                    function: ChatCompletionMessageToolCallFunction {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                })
            }
            _ => None,
        })
        .collect()
}

fn blocks_to_user_content(blocks: &[ContentBlock]) -> ChatCompletionUserContent {
    if blocks.len() == 1 {
        if let ContentBlock::Text { text } = &blocks[0] {
            return ChatCompletionUserContent::Text(text.clone());
        }
    }
    let parts = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(ChatCompletionUserContentPart::Text {
                text: text.clone(),
            }),
            ContentBlock::Image {
                url,
                base64,
                media_type,
            } => {
                let resolved = url.clone().or_else(|| {
                    base64.as_ref().map(|data| {
                        let media = media_type.as_deref().unwrap_or("image/png");
                        format!("data:{media};base64,{data}")
                    })
                })?;
                Some(ChatCompletionUserContentPart::ImageUrl {
                    image_url: ChatCompletionImageUrl { url: resolved },
                })
            }
            _ => None,
        })
        .collect();
    ChatCompletionUserContent::Parts(parts)
}

fn chat_response_to_ir(response: CreateChatCompletionResponse) -> IrResponse {
    let Some(choice) = response.choices.into_iter().next() else {
        return IrResponse {
            model: response.model,
            content: Vec::new(),
            stop_reason: None,
            usage: Usage::unknown(),
        };
    };
    let mut content = Vec::new();
    if let Some(text) = choice.message.content {
        if !text.is_empty() {
            content.push(ContentBlock::Text { text });
        }
    }
    if let Some(tool_calls) = choice.message.tool_calls {
        for call in tool_calls {
            let ChatCompletionMessageToolCall::Function { id, function } = call;
            let input = serde_json::from_str(&function.arguments).unwrap_or(JsonValue::Null);
            content.push(ContentBlock::ToolUse {
                id,
                name: function.name,
                input,
            });
        }
    }
    let stop_reason = Some(match choice.finish_reason {
        ChatCompletionFinishReason::Stop => StopReason::EndTurn,
        ChatCompletionFinishReason::Length => StopReason::MaxTokens,
        ChatCompletionFinishReason::ToolCalls => StopReason::ToolUse,
        ChatCompletionFinishReason::ContentFilter => StopReason::EndTurn,
    });
    let usage = response
        .usage
        .map(|usage| Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
        .unwrap_or_else(Usage::unknown);
    IrResponse {
        model: response.model,
        content,
        stop_reason,
        usage,
    }
}

/// Parses one OpenAI chat SSE/NDJSON data payload. Implements the tolerant
/// termination race from SPEC_FULL.md §9 Open Questions: whichever of
/// `finish_reason="stop"`, empty-choices-with-usage, or a bare `[DONE]`
/// arrives first wins; `state.terminated` stops any later frame from
/// re-firing `message_stop`.
pub fn parse_chat_stream_frame(
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
    if trimmed == "[DONE]" {
        state.terminated = true;
        return Ok(vec![IrStreamEvent::MessageStop]);
    }

    let chunk: CreateChatCompletionStreamResponse = serde_json::from_str(trimmed)
        .map_err(|err| ProviderError::Other(format!("bad stream chunk: {err}")))?;

    let mut events = Vec::new();
    if !state.message_started {
        events.push(IrStreamEvent::MessageStart {
            model: chunk.model.clone(),
        });
        state.message_started = true;
    }

    let choice = chunk.choices.first();
    let has_usage = chunk.usage.is_some();

    if let Some(choice) = choice {
        let delta = &choice.delta;

        if let Some(text) = &delta.content {
            if !text.is_empty() {
                open_text_block(state, &mut events);
                events.push(IrStreamEvent::ContentBlockDelta {
                    index: state.text_block_index,
                    delta: ContentDelta::TextDelta { text: text.clone() },
                });
            }
        }

        if let Some(thinking) = &delta.reasoning_content {
            if !thinking.is_empty() {
                open_thinking_block(state, &mut events);
                events.push(IrStreamEvent::ContentBlockDelta {
                    index: state.thinking_block_index,
                    delta: ContentDelta::ThinkingDelta {
                        thinking: thinking.clone(),
                    },
                });
            }
        }

        if let Some(tool_calls) = &delta.tool_calls {
            for call in tool_calls {
                let provider_index = call.index as u32;
                let block_index = if let Some(id) = &call.id {
                    let idx = state.next_block_index;
                    state.next_block_index += 1;
                    events.push(IrStreamEvent::ContentBlockStart {
                        index: idx,
                        block: ContentBlockStart::ToolUse {
                            id: id.clone(),
                            name: call
                                .function
                                .as_ref()
                                .and_then(|f| f.name.clone())
                                .unwrap_or_default(),
                        },
                    });
                    state.index_to_id.insert(provider_index, idx.to_string());
                    idx
                } else if let Some(idx) = state.index_to_id.get(&provider_index) {
                    idx.parse().unwrap_or(provider_index)
                } else {
                    tracing::warn!(index = provider_index, "tool call delta without known id");
                    continue;
                };
                if let Some(function) = &call.function {
                    if let Some(arguments) = &function.arguments {
                        events.push(IrStreamEvent::ContentBlockDelta {
                            index: block_index,
                            delta: ContentDelta::InputJsonDelta {
                                partial_json: arguments.clone(),
                            },
                        });
                    }
                }
            }
        }

        if let Some(reason) = choice.finish_reason {
            let stop_reason = match reason {
                ChatCompletionFinishReason::Stop => StopReason::EndTurn,
                ChatCompletionFinishReason::Length => StopReason::MaxTokens,
                ChatCompletionFinishReason::ToolCalls => StopReason::ToolUse,
                ChatCompletionFinishReason::ContentFilter => StopReason::EndTurn,
            };
            close_open_blocks(state, &mut events);
            events.push(IrStreamEvent::MessageDelta {
                stop_reason: Some(stop_reason),
            });
            if let Some(usage) = &chunk.usage {
                events.push(IrStreamEvent::Usage {
                    usage: Usage {
                        input_tokens: usage.prompt_tokens,
                        output_tokens: usage.completion_tokens,
                    },
                });
            }
            state.terminated = true;
            events.push(IrStreamEvent::MessageStop);
            return Ok(events);
        }
    } else if has_usage {
        close_open_blocks(state, &mut events);
        if let Some(usage) = &chunk.usage {
            events.push(IrStreamEvent::Usage {
                usage: Usage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                },
            });
        }
        state.terminated = true;
        events.push(IrStreamEvent::MessageStop);
        return Ok(events);
    }

    Ok(events)
}

fn open_text_block(state: &mut StreamDecodeState, events: &mut Vec<IrStreamEvent>) {
    if !state.text_block_open {
        state.text_block_index = state.next_block_index;
        state.next_block_index += 1;
        state.text_block_open = true;
        events.push(IrStreamEvent::ContentBlockStart {
            index: state.text_block_index,
            block: ContentBlockStart::Text,
        });
    }
}

fn open_thinking_block(state: &mut StreamDecodeState, events: &mut Vec<IrStreamEvent>) {
    if !state.thinking_block_open {
        state.thinking_block_index = state.next_block_index;
        state.next_block_index += 1;
        state.thinking_block_open = true;
        events.push(IrStreamEvent::ContentBlockStart {
            index: state.thinking_block_index,
            block: ContentBlockStart::Thinking,
        });
    }
}

fn close_open_blocks(state: &mut StreamDecodeState, events: &mut Vec<IrStreamEvent>) {
    if state.thinking_block_open {
        events.push(IrStreamEvent::ContentBlockStop {
            index: state.thinking_block_index,
        });
        state.thinking_block_open = false;
    }
    if state.text_block_open {
        events.push(IrStreamEvent::ContentBlockStop {
            index: state.text_block_index,
        });
        state.text_block_open = false;
    }
    for idx in state.index_to_id.values() {
        if let Ok(idx) = idx.parse::<u32>() {
            events.push(IrStreamEvent::ContentBlockStop { index: idx });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(events: &mut Vec<IrStreamEvent>, state: &mut StreamDecodeState, json: &str) {
        events.extend(parse_chat_stream_frame(json.as_bytes(), state).unwrap());
    }

    #[test]
    fn text_delta_opens_and_emits_one_block() {
        let mut state = StreamDecodeState::default();
        let mut events = Vec::new();
        frame(
            &mut events,
            &mut state,
            r#"{"id":"1","object":"chat.completion.chunk","created":0,"model":"gpt-4","choices":[{"index":0,"delta":{"content":"hi"}}]}"#,
        );
        assert!(matches!(events[0], IrStreamEvent::MessageStart { .. }));
        assert!(matches!(events[1], IrStreamEvent::ContentBlockStart { index: 0, .. }));
        assert!(matches!(&events[2], IrStreamEvent::ContentBlockDelta { index: 0, delta: ContentDelta::TextDelta { text } } if text == "hi"));
    }

    #[test]
    fn interleaved_tool_call_deltas_route_by_index_not_arrival_order() {
        let mut state = StreamDecodeState::default();
        let mut events = Vec::new();
        // Two tool calls open at provider indices 0 and 1, then their
        // argument deltas arrive interleaved (1 before 0).
        frame(
            &mut events,
            &mut state,
            r#"{"id":"1","object":"chat.completion.chunk","created":0,"model":"gpt-4","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"fn_a","arguments":""}}]}}]}"#,
        );
        frame(
            &mut events,
            &mut state,
            r#"{"id":"1","object":"chat.completion.chunk","created":0,"model":"gpt-4","choices":[{"index":0,"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"fn_b","arguments":""}}]}}]}"#,
        );
        frame(
            &mut events,
            &mut state,
            r#"{"id":"1","object":"chat.completion.chunk","created":0,"model":"gpt-4","choices":[{"index":0,"delta":{"tool_calls":[{"index":1,"function":{"arguments":"{\"b\":1}"}}]}}]}"#,
        );
        frame(
            &mut events,
            &mut state,
            r#"{"id":"1","object":"chat.completion.chunk","created":0,"model":"gpt-4","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"a\":1}"}}]}}]}"#,
        );

        let mut args_for_a = String::new();
        let mut args_for_b = String::new();
        let mut ir_index_a = None;
        let mut ir_index_b = None;
        for ev in &events {
            if let IrStreamEvent::ContentBlockStart { index, block: ContentBlockStart::ToolUse { id, .. } } = ev {
                if id == "call_a" {
                    ir_index_a = Some(*index);
                } else if id == "call_b" {
                    ir_index_b = Some(*index);
                }
            }
        }
        for ev in &events {
            if let IrStreamEvent::ContentBlockDelta { index, delta: ContentDelta::InputJsonDelta { partial_json } } = ev {
                if Some(*index) == ir_index_a {
                    args_for_a.push_str(partial_json);
                } else if Some(*index) == ir_index_b {
                    args_for_b.push_str(partial_json);
                }
            }
        }
        assert_eq!(args_for_a, "{\"a\":1}");
        assert_eq!(args_for_b, "{\"b\":1}");
    }

    #[test]
    fn tool_call_delta_without_known_index_is_dropped_not_misrouted() {
        let mut state = StreamDecodeState::default();
        let mut events = Vec::new();
        // Arguments for provider index 5 arrive without ever seeing an
        // opening delta carrying an id for that index.
        frame(
            &mut events,
            &mut state,
            r#"{"id":"1","object":"chat.completion.chunk","created":0,"model":"gpt-4","choices":[{"index":0,"delta":{"tool_calls":[{"index":5,"function":{"arguments":"{\"x\":1}"}}]}}]}"#,
        );
        assert!(events.iter().all(|e| !matches!(e, IrStreamEvent::ContentBlockDelta { .. })));
    }

    #[test]
    fn terminates_on_finish_reason_stop() {
        let mut state = StreamDecodeState::default();
        let mut events = Vec::new();
        frame(
            &mut events,
            &mut state,
            r#"{"id":"1","object":"chat.completion.chunk","created":0,"model":"gpt-4","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        );
        assert!(state.terminated);
        assert!(events.iter().any(|e| matches!(e, IrStreamEvent::MessageStop)));
        // A later frame in the same response must not re-terminate or
        // re-emit.
        let more = parse_chat_stream_frame(
            r#"{"id":"1","object":"chat.completion.chunk","created":0,"model":"gpt-4","choices":[{"index":0,"delta":{"content":"late"}}]}"#
                .as_bytes(),
            &mut state,
        )
        .unwrap();
        assert!(more.is_empty());
    }

    #[test]
    fn terminates_on_empty_choices_with_usage_deepseek_style() {
        let mut state = StreamDecodeState::default();
        let mut events = Vec::new();
        frame(
            &mut events,
            &mut state,
            r#"{"id":"1","object":"chat.completion.chunk","created":0,"model":"gpt-4","choices":[{"index":0,"delta":{"content":"hi"}}]}"#,
        );
        assert!(!state.terminated);
        frame(
            &mut events,
            &mut state,
            r#"{"id":"1","object":"chat.completion.chunk","created":0,"model":"gpt-4","choices":[],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
        );
        assert!(state.terminated);
        assert!(events.iter().any(|e| matches!(e, IrStreamEvent::Usage { usage } if usage.input_tokens == 3)));
    }

    #[test]
    fn bare_done_marker_terminates() {
        let mut state = StreamDecodeState::default();
        let events = parse_chat_stream_frame(b"[DONE]", &mut state).unwrap();
        assert!(state.terminated);
        assert!(matches!(events.as_slice(), [IrStreamEvent::MessageStop]));
    }
}
