use modelgate_protocol::ir::{
    ContentBlock, ContentBlockStart, ContentDelta, IrRequest, IrResponse, IrStreamEvent, Message,
    Role, StopReason, ToolChoice, ToolSpec, Usage,
};
use modelgate_protocol::openai::chat::request::{
    ChatCompletionRequestMessage, ChatCompletionToolChoiceMode, ChatCompletionToolChoiceOption,
    ChatCompletionUserContent, ChatCompletionUserContentPart, CreateChatCompletionRequestBody,
};
use modelgate_protocol::openai::chat::response::{
    ChatCompletionChoice, ChatCompletionFinishReason, ChatCompletionObjectType,
    ChatCompletionResponseMessage, ChatCompletionResponseRole, CreateChatCompletionResponse,
};
use modelgate_protocol::openai::chat::stream::{
    ChatCompletionChunkObjectType, ChatCompletionDeltaToolCall, ChatCompletionDeltaToolCallFunction,
    ChatCompletionStreamChoice, ChatCompletionStreamDelta, CreateChatCompletionStreamResponse,
};
use serde_json::Value as JsonValue;

use super::{RequestAdapter, ResponseAdapter, SseFrame, TranslateError};

pub struct OpenAiChatAdapter;

impl RequestAdapter for OpenAiChatAdapter {
    fn parse_request(&self, body: &JsonValue) -> Result<IrRequest, TranslateError> {
        let body: CreateChatCompletionRequestBody =
            serde_json::from_value(body.clone()).map_err(|e| TranslateError::InvalidBody(e.to_string()))?;

        let mut system = None;
        let mut messages = Vec::new();
        for message in body.messages {
            match message {
                ChatCompletionRequestMessage::System(sys) | ChatCompletionRequestMessage::Developer(sys) => {
                    let text = text_content(&sys.content);
                    system = Some(match system {
                        Some(existing) => format!("{existing}\n{text}"),
                        None => text,
                    });
                }
                ChatCompletionRequestMessage::User(user) => {
                    messages.push(Message {
                        role: Role::User,
                        content: user_content_blocks(&user.content),
                    });
                }
                ChatCompletionRequestMessage::Assistant(assistant) => {
                    let mut content = Vec::new();
                    if let Some(text) = assistant.content.as_ref() {
                        content.push(ContentBlock::Text {
                            text: text_content(text),
                        });
                    }
                    if let Some(tool_calls) = &assistant.tool_calls {
                        for call in tool_calls {
                            let modelgate_protocol::openai::chat::request::ChatCompletionMessageToolCall::Function { id, function } = call;
                            let input = serde_json::from_str(&function.arguments)
                                .unwrap_or(JsonValue::String(function.arguments.clone()));
                            content.push(ContentBlock::ToolUse {
                                id: id.clone(),
                                name: function.name.clone(),
                                input,
                            });
                        }
                    }
                    messages.push(Message {
                        role: Role::Assistant,
                        content,
                    });
                }
                ChatCompletionRequestMessage::Tool(tool) => {
                    messages.push(Message {
                        role: Role::Tool,
                        content: vec![ContentBlock::ToolResult {
                            tool_use_id: tool.tool_call_id,
                            content: text_content(&tool.content),
                            is_error: None,
                        }],
                    });
                }
            }
        }

        let tools = body.tools.map(|tools| {
            tools
                .into_iter()
                .map(|t| {
                    let modelgate_protocol::openai::chat::request::ChatCompletionToolDefinition::Function { function } = t;
                    ToolSpec {
                        name: function.name,
                        description: function.description,
                        input_schema: function.parameters.unwrap_or(JsonValue::Object(Default::default())),
                    }
                })
                .collect()
        });

        let tool_choice = body.tool_choice.map(|choice| match choice {
            ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::None) => ToolChoice::None,
            ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::Auto) => ToolChoice::Auto,
            ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::Required) => ToolChoice::Any,
            ChatCompletionToolChoiceOption::Named(named) => {
                let modelgate_protocol::openai::chat::request::ChatCompletionNamedToolChoice::Function { function } = named;
                ToolChoice::Named(function.name)
            }
        });

        let stop_sequences = body.stop.map(|stop| match stop {
            modelgate_protocol::openai::chat::request::StopConfiguration::Single(s) => vec![s],
            modelgate_protocol::openai::chat::request::StopConfiguration::Many(many) => many,
        });

        Ok(IrRequest {
            model: body.model,
            system,
            messages,
            tools,
            tool_choice,
            max_tokens: body
                .max_completion_tokens
                .or(body.max_tokens)
                .map(|v| v.max(0) as u32),
            temperature: body.temperature,
            top_p: body.top_p,
            top_k: None,
            stream: body.stream.unwrap_or(false),
            stop_sequences,
            ..Default::default()
        })
    }
}

fn text_content(content: &modelgate_protocol::openai::chat::request::ChatCompletionTextContent) -> String {
    use modelgate_protocol::openai::chat::request::ChatCompletionTextContent as T;
    match content {
        T::Text(text) => text.clone(),
        T::Parts(parts) => parts
            .iter()
            .map(|modelgate_protocol::openai::chat::request::ChatCompletionTextContentPart::Text { text }| text.clone())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn user_content_blocks(content: &ChatCompletionUserContent) -> Vec<ContentBlock> {
    match content {
        ChatCompletionUserContent::Text(text) => vec![ContentBlock::Text { text: text.clone() }],
        ChatCompletionUserContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ChatCompletionUserContentPart::Text { text } => ContentBlock::Text { text: text.clone() },
                ChatCompletionUserContentPart::ImageUrl { image_url } => ContentBlock::Image {
                    url: Some(image_url.url.clone()),
                    base64: None,
                    media_type: None,
                },
            })
            .collect(),
    }
}

fn finish_reason(stop: Option<StopReason>) -> ChatCompletionFinishReason {
    match stop {
        Some(StopReason::MaxTokens) => ChatCompletionFinishReason::Length,
        Some(StopReason::ToolUse) => ChatCompletionFinishReason::ToolCalls,
        _ => ChatCompletionFinishReason::Stop,
    }
}

impl ResponseAdapter for OpenAiChatAdapter {
    fn render_response(&self, response: &IrResponse) -> JsonValue {
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in &response.content {
            match block {
                ContentBlock::Text { text: t } => text.push_str(t),
                ContentBlock::Thinking { thinking, .. } => {
                    text = format!("<think>{thinking}</think>{text}");
                }
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(modelgate_protocol::openai::chat::request::ChatCompletionMessageToolCall::Function {
                        id: id.clone(),
                        function: modelgate_protocol::openai::chat::request::ChatCompletionMessageToolCallFunction {
                            name: name.clone(),
                            arguments: input.to_string(),
                        },
                    });
                }
                _ => {}
            }
        }

        let body = CreateChatCompletionResponse {
            id: format!("chatcmpl-{}", uuid_lite()),
            object: ChatCompletionObjectType::ChatCompletion,
            created: 0,
            model: response.model.clone(),
            choices: vec![ChatCompletionChoice {
                index: 0,
                message: ChatCompletionResponseMessage {
                    role: ChatCompletionResponseRole::Assistant,
                    content: if text.is_empty() { None } else { Some(text) },
                    tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                },
                finish_reason: finish_reason(response.stop_reason),
            }],
            usage: Some(modelgate_protocol::openai::types::CompletionUsage::new(
                response.usage.input_tokens.max(0),
                response.usage.output_tokens.max(0),
            )),
        };
        serde_json::to_value(body).unwrap_or(JsonValue::Null)
    }

    fn render_stream_event(&self, event: &IrStreamEvent) -> Vec<SseFrame> {
        let chunk = |delta: ChatCompletionStreamDelta, finish_reason: Option<ChatCompletionFinishReason>, usage: Option<Usage>| {
            let body = CreateChatCompletionStreamResponse {
                id: "chatcmpl-stream".to_string(),
                object: ChatCompletionChunkObjectType::ChatCompletionChunk,
                created: 0,
                model: String::new(),
                choices: vec![ChatCompletionStreamChoice {
                    index: 0,
                    delta,
                    finish_reason,
                }],
                usage: usage.map(|u| {
                    modelgate_protocol::openai::types::CompletionUsage::new(
                        u.input_tokens.max(0),
                        u.output_tokens.max(0),
                    )
                }),
            };
            vec![SseFrame::data_only(
                serde_json::to_string(&body).unwrap_or_default(),
            )]
        };

        match event {
            IrStreamEvent::MessageStart { .. } => vec![],
            IrStreamEvent::ContentBlockStart { index, block } => match block {
                ContentBlockStart::ToolUse { id, name } => chunk(
                    ChatCompletionStreamDelta {
                        tool_calls: Some(vec![ChatCompletionDeltaToolCall {
                            index: *index as i64,
                            id: Some(id.clone()),
                            function: Some(ChatCompletionDeltaToolCallFunction {
                                name: Some(name.clone()),
                                arguments: Some(String::new()),
                            }),
                        }]),
                        ..Default::default()
                    },
                    None,
                    None,
                ),
                _ => vec![],
            },
            IrStreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentDelta::TextDelta { text } => chunk(
                    ChatCompletionStreamDelta {
                        content: Some(text.clone()),
                        ..Default::default()
                    },
                    None,
                    None,
                ),
                ContentDelta::ThinkingDelta { thinking } => chunk(
                    ChatCompletionStreamDelta {
                        reasoning_content: Some(thinking.clone()),
                        ..Default::default()
                    },
                    None,
                    None,
                ),
                ContentDelta::InputJsonDelta { partial_json } => chunk(
                    ChatCompletionStreamDelta {
                        tool_calls: Some(vec![ChatCompletionDeltaToolCall {
                            index: *index as i64,
                            id: None,
                            function: Some(ChatCompletionDeltaToolCallFunction {
                                name: None,
                                arguments: Some(partial_json.clone()),
                            }),
                        }]),
                        ..Default::default()
                    },
                    None,
                    None,
                ),
            },
            IrStreamEvent::ContentBlockStop { .. } => vec![],
            IrStreamEvent::MessageDelta { stop_reason } => {
                chunk(ChatCompletionStreamDelta::default(), Some(finish_reason(*stop_reason)), None)
            }
            IrStreamEvent::Usage { usage } => chunk(ChatCompletionStreamDelta::default(), None, Some(usage.clone())),
            IrStreamEvent::MessageStop => vec![],
            IrStreamEvent::Unknown(_) => vec![],
        }
    }

    fn stream_terminator(&self) -> Option<String> {
        Some("[DONE]".to_string())
    }
}

fn uuid_lite() -> String {
    "0".repeat(8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_system_and_user_messages() {
        let body = json!({
            "model": "gpt-4",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hi"},
            ],
            "stream": true,
        });
        let ir = OpenAiChatAdapter.parse_request(&body).unwrap();
        assert_eq!(ir.model, "gpt-4");
        assert_eq!(ir.system.as_deref(), Some("be terse"));
        assert_eq!(ir.messages.len(), 1);
        assert!(ir.stream);
    }

    #[test]
    fn rejects_stream_with_n_greater_than_one_is_caller_responsibility() {
        // The adapter itself has no opinion on n>1; the pipeline enforces
        // SPEC_FULL.md's `stream && n>1 -> 400` rule before translation.
        let body = json!({"model": "gpt-4", "messages": [], "stream": true, "n": 2});
        assert!(OpenAiChatAdapter.parse_request(&body).is_ok());
    }

    #[test]
    fn assistant_tool_calls_become_tool_use_blocks() {
        let body = json!({
            "model": "gpt-4",
            "messages": [
                {"role": "user", "content": "weather?"},
                {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"nyc\"}"}
                    }]
                },
            ],
        });
        let ir = OpenAiChatAdapter.parse_request(&body).unwrap();
        let assistant = &ir.messages[1];
        match &assistant.content[0] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "call_1");
                assert_eq!(name, "get_weather");
                assert_eq!(input["city"], "nyc");
            }
            other => panic!("expected tool_use block, got {other:?}"),
        }
    }

    #[test]
    fn render_response_flattens_thinking_into_leading_think_tag() {
        let response = IrResponse {
            model: "gpt-4".to_string(),
            content: vec![
                ContentBlock::Thinking { thinking: "pondering".to_string(), signature: None },
                ContentBlock::Text { text: "answer".to_string() },
            ],
            stop_reason: Some(StopReason::EndTurn),
            usage: Usage { input_tokens: 3, output_tokens: 1 },
        };
        let rendered = OpenAiChatAdapter.render_response(&response);
        let content = rendered["choices"][0]["message"]["content"].as_str().unwrap();
        assert_eq!(content, "<think>pondering</think>answer");
        assert_eq!(rendered["choices"][0]["finish_reason"], "stop");
        assert_eq!(rendered["usage"]["prompt_tokens"], 3);
    }

    #[test]
    fn render_response_maps_tool_use_stop_reason_to_tool_calls() {
        let response = IrResponse {
            model: "gpt-4".to_string(),
            content: vec![ContentBlock::ToolUse {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                input: json!({"city": "nyc"}),
            }],
            stop_reason: Some(StopReason::ToolUse),
            usage: Usage { input_tokens: 2, output_tokens: 5 },
        };
        let rendered = OpenAiChatAdapter.render_response(&response);
        assert_eq!(rendered["choices"][0]["finish_reason"], "tool_calls");
        let tool_calls = rendered["choices"][0]["message"]["tool_calls"].as_array().unwrap();
        assert_eq!(tool_calls[0]["id"], "call_1");
        assert_eq!(tool_calls[0]["function"]["arguments"], "{\"city\":\"nyc\"}");
    }

    #[test]
    fn stream_terminator_is_done_marker() {
        assert_eq!(OpenAiChatAdapter.stream_terminator(), Some("[DONE]".to_string()));
    }

    #[test]
    fn tool_use_content_block_start_renders_as_indexed_delta_with_id() {
        let event = IrStreamEvent::ContentBlockStart {
            index: 1,
            block: ContentBlockStart::ToolUse { id: "call_9".to_string(), name: "lookup".to_string() },
        };
        let frames = OpenAiChatAdapter.render_stream_event(&event);
        assert_eq!(frames.len(), 1);
        let parsed: JsonValue = serde_json::from_str(&frames[0].data).unwrap();
        let tool_call = &parsed["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(tool_call["index"], 1);
        assert_eq!(tool_call["id"], "call_9");
    }

    #[test]
    fn input_json_delta_renders_without_id_so_it_only_routes_by_index() {
        let event = IrStreamEvent::ContentBlockDelta {
            index: 1,
            delta: ContentDelta::InputJsonDelta { partial_json: "{\"a\":1}".to_string() },
        };
        let frames = OpenAiChatAdapter.render_stream_event(&event);
        let parsed: JsonValue = serde_json::from_str(&frames[0].data).unwrap();
        let tool_call = &parsed["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(tool_call["index"], 1);
        assert!(tool_call.get("id").is_none());
    }
}
