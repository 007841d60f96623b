use modelgate_protocol::ir::{
    ContentBlock, ContentBlockStart, ContentDelta, IrRequest, IrResponse, IrStreamEvent, Message,
    Role, StopReason, ToolChoice, ToolSpec,
};
use modelgate_protocol::openai::responses::request::{
    FunctionCallItem, InputContentPart, InputItem, InputMessage, InputMessageContent, InputRole,
    ResponseInput, ResponseTool, ResponseToolChoice, ResponseToolChoiceMode,
};
use modelgate_protocol::openai::responses::response::{
    OutputItem, OutputRole, Response, ResponseObjectType, ResponseStatus, ResponseUsage,
};
use modelgate_protocol::openai::responses::stream::ResponseStreamEventKnown;
use modelgate_protocol::openai::types::OpenAiError;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{RequestAdapter, ResponseAdapter, SseFrame, TranslateError};

pub struct OpenAiResponsesAdapter;

impl RequestAdapter for OpenAiResponsesAdapter {
    fn parse_request(&self, body: &JsonValue) -> Result<IrRequest, TranslateError> {
        let body: modelgate_protocol::openai::responses::request::CreateResponseRequestBody =
            serde_json::from_value(body.clone()).map_err(|e| TranslateError::InvalidBody(e.to_string()))?;

        let mut system = body.instructions;
        let mut messages = Vec::new();

        match body.input {
            ResponseInput::Text(text) => {
                messages.push(Message::text(Role::User, text));
            }
            ResponseInput::Items(items) => {
                for item in items {
                    match item {
                        InputItem::Message(InputMessage { role, content }) => {
                            let blocks = input_content_blocks(content);
                            match role {
                                InputRole::System | InputRole::Developer => {
                                    let text = blocks
                                        .iter()
                                        .filter_map(|b| match b {
                                            ContentBlock::Text { text } => Some(text.clone()),
                                            _ => None,
                                        })
                                        .collect::<Vec<_>>()
                                        .join("\n");
                                    system = Some(match system {
                                        Some(existing) => format!("{existing}\n{text}"),
                                        None => text,
                                    });
                                }
                                InputRole::User => messages.push(Message {
                                    role: Role::User,
                                    content: blocks,
                                }),
                                InputRole::Assistant => messages.push(Message {
                                    role: Role::Assistant,
                                    content: blocks,
                                }),
                            }
                        }
                        InputItem::FunctionCall(FunctionCallItem { call_id, name, arguments }) => {
                            let input = serde_json::from_str(&arguments)
                                .unwrap_or(JsonValue::String(arguments));
                            messages.push(Message {
                                role: Role::Assistant,
                                content: vec![ContentBlock::ToolUse {
                                    id: call_id,
                                    name,
                                    input,
                                }],
                            });
                        }
                        InputItem::FunctionCallOutput(out) => {
                            messages.push(Message {
                                role: Role::Tool,
                                content: vec![ContentBlock::ToolResult {
                                    tool_use_id: out.call_id,
                                    content: out.output,
                                    is_error: None,
                                }],
                            });
                        }
                    }
                }
            }
        }

        let tools = body.tools.map(|tools| {
            tools
                .into_iter()
                .map(|ResponseTool::Function(f)| ToolSpec {
                    name: f.name,
                    description: f.description,
                    input_schema: f.parameters.unwrap_or(JsonValue::Object(Default::default())),
                })
                .collect()
        });

        let tool_choice = body.tool_choice.map(|choice| match choice {
            ResponseToolChoice::Mode(ResponseToolChoiceMode::None) => ToolChoice::None,
            ResponseToolChoice::Mode(ResponseToolChoiceMode::Auto) => ToolChoice::Auto,
            ResponseToolChoice::Mode(ResponseToolChoiceMode::Required) => ToolChoice::Any,
            ResponseToolChoice::Named { name, .. } => ToolChoice::Named(name),
        });

        Ok(IrRequest {
            model: body.model,
            system,
            messages,
            tools,
            tool_choice,
            max_tokens: body.max_output_tokens,
            temperature: body.temperature,
            top_p: body.top_p,
            stream: body.stream.unwrap_or(false),
            ..Default::default()
        })
    }
}

fn input_content_blocks(content: InputMessageContent) -> Vec<ContentBlock> {
    match content {
        InputMessageContent::Text(text) => vec![ContentBlock::Text { text }],
        InputMessageContent::Parts(parts) => parts
            .into_iter()
            .map(|part| match part {
                InputContentPart::InputText { text } | InputContentPart::OutputText { text } => {
                    ContentBlock::Text { text }
                }
                InputContentPart::InputImage { image_url } => ContentBlock::Image {
                    url: image_url,
                    base64: None,
                    media_type: None,
                },
            })
            .collect(),
    }
}

fn output_items(content: &[ContentBlock]) -> Vec<OutputItem> {
    let mut items = Vec::new();
    let mut text_parts = Vec::new();
    for block in content {
        match block {
            ContentBlock::Text { text } => text_parts.push(InputContentPart::OutputText { text: text.clone() }),
            ContentBlock::Thinking { thinking, .. } => {
                text_parts.push(InputContentPart::OutputText {
                    text: format!("<think>{thinking}</think>"),
                });
            }
            ContentBlock::ToolUse { id, name, input } => {
                items.push(OutputItem::FunctionCall(FunctionCallItem {
                    call_id: id.clone(),
                    name: name.clone(),
                    arguments: input.to_string(),
                }));
            }
            _ => {}
        }
    }
    if !text_parts.is_empty() {
        items.insert(
            0,
            OutputItem::Message {
                id: format!("msg_{}", short_id()),
                role: OutputRole::Assistant,
                content: text_parts,
            },
        );
    }
    items
}

fn response_status(reason: Option<StopReason>) -> ResponseStatus {
    match reason {
        Some(StopReason::MaxTokens) => ResponseStatus::Incomplete,
        _ => ResponseStatus::Completed,
    }
}

impl ResponseAdapter for OpenAiResponsesAdapter {
    fn render_response(&self, response: &IrResponse) -> JsonValue {
        let body = Response {
            id: format!("resp_{}", short_id()),
            object: ResponseObjectType::Response,
            created_at: 0,
            model: response.model.clone(),
            status: response_status(response.stop_reason),
            output: output_items(&response.content),
            usage: Some(ResponseUsage {
                input_tokens: response.usage.input_tokens.max(0),
                output_tokens: response.usage.output_tokens.max(0),
                total_tokens: response.usage.input_tokens.max(0) + response.usage.output_tokens.max(0),
            }),
        };
        serde_json::to_value(body).unwrap_or(JsonValue::Null)
    }

    fn render_stream_event(&self, event: &IrStreamEvent) -> Vec<SseFrame> {
        let frame = |ev: ResponseStreamEventKnown| vec![SseFrame::data_only(serde_json::to_string(&ev).unwrap_or_default())];

        match event {
            IrStreamEvent::MessageStart { .. } => vec![],
            IrStreamEvent::ContentBlockStart { index, block } => match block {
                ContentBlockStart::ToolUse { id, name } => frame(ResponseStreamEventKnown::OutputItemAdded {
                    output_index: *index,
                    item: OutputItem::FunctionCall(FunctionCallItem {
                        call_id: id.clone(),
                        name: name.clone(),
                        arguments: String::new(),
                    }),
                }),
                _ => vec![],
            },
            IrStreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentDelta::TextDelta { text } => frame(ResponseStreamEventKnown::OutputTextDelta {
                    output_index: *index,
                    item_id: format!("msg_{index}"),
                    delta: text.clone(),
                }),
                ContentDelta::ThinkingDelta { thinking } => frame(ResponseStreamEventKnown::OutputTextDelta {
                    output_index: *index,
                    item_id: format!("msg_{index}"),
                    delta: thinking.clone(),
                }),
                ContentDelta::InputJsonDelta { partial_json } => {
                    frame(ResponseStreamEventKnown::FunctionCallArgumentsDelta {
                        output_index: *index,
                        item_id: format!("fc_{index}"),
                        delta: partial_json.clone(),
                    })
                }
            },
            IrStreamEvent::ContentBlockStop { .. } => vec![],
            IrStreamEvent::MessageDelta { .. } => vec![],
            IrStreamEvent::Usage { .. } => vec![],
            IrStreamEvent::MessageStop => frame(ResponseStreamEventKnown::Completed {
                response: Response {
                    id: format!("resp_{}", short_id()),
                    object: ResponseObjectType::Response,
                    created_at: 0,
                    model: String::new(),
                    status: ResponseStatus::Completed,
                    output: vec![],
                    usage: None,
                },
            }),
            IrStreamEvent::Unknown(_) => vec![],
        }
    }

    fn stream_terminator(&self) -> Option<String> {
        None
    }
}

/// Error SSE frame shape used when a stream fails after first byte
/// (SPEC_FULL.md §4.5/§7: Responses streaming errors use `type: "error"`).
pub fn error_frame(message: impl Into<String>) -> SseFrame {
    let event = ResponseStreamEventKnown::Error {
        error: OpenAiError {
            message: message.into(),
            r#type: "error".to_string(),
            param: None,
            code: None,
        },
    };
    SseFrame::data_only(serde_json::to_string(&event).unwrap_or_default())
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_text_input_becomes_single_user_message() {
        let body = json!({"model": "gpt-4", "input": "hi"});
        let ir = OpenAiResponsesAdapter.parse_request(&body).unwrap();
        assert_eq!(ir.messages.len(), 1);
        assert!(matches!(ir.messages[0].content[0], ContentBlock::Text { .. }));
    }

    #[test]
    fn function_call_and_output_items_round_trip_into_ir() {
        let body = json!({
            "model": "gpt-4",
            "input": [
                {"type": "message", "role": "user", "content": "weather?"},
                {"type": "function_call", "call_id": "c1", "name": "get_weather", "arguments": "{\"city\":\"nyc\"}"},
                {"type": "function_call_output", "call_id": "c1", "output": "sunny"},
            ],
        });
        let ir = OpenAiResponsesAdapter.parse_request(&body).unwrap();
        assert_eq!(ir.messages.len(), 3);
        match &ir.messages[1].content[0] {
            ContentBlock::ToolUse { id, name, .. } => {
                assert_eq!(id, "c1");
                assert_eq!(name, "get_weather");
            }
            other => panic!("expected tool_use, got {other:?}"),
        }
        match &ir.messages[2].content[0] {
            ContentBlock::ToolResult { tool_use_id, content, .. } => {
                assert_eq!(tool_use_id, "c1");
                assert_eq!(content, "sunny");
            }
            other => panic!("expected tool_result, got {other:?}"),
        }
    }

    #[test]
    fn developer_role_lifts_into_system_instructions() {
        let body = json!({
            "model": "gpt-4",
            "instructions": "be terse",
            "input": [{"type": "message", "role": "developer", "content": "also be nice"}],
        });
        let ir = OpenAiResponsesAdapter.parse_request(&body).unwrap();
        assert_eq!(ir.system.as_deref(), Some("be terse\nalso be nice"));
    }

    #[test]
    fn max_tokens_stop_reason_marks_response_incomplete() {
        let response = IrResponse {
            model: "gpt-4".to_string(),
            content: vec![ContentBlock::Text { text: "cut off".to_string() }],
            stop_reason: Some(StopReason::MaxTokens),
            usage: Usage { input_tokens: 1, output_tokens: 1 },
        };
        let rendered = OpenAiResponsesAdapter.render_response(&response);
        assert_eq!(rendered["status"], "incomplete");
    }

    #[test]
    fn tool_use_content_renders_as_function_call_output_item() {
        let response = IrResponse {
            model: "gpt-4".to_string(),
            content: vec![ContentBlock::ToolUse {
                id: "c1".to_string(),
                name: "get_weather".to_string(),
                input: json!({"city": "nyc"}),
            }],
            stop_reason: Some(StopReason::ToolUse),
            usage: Usage { input_tokens: 1, output_tokens: 1 },
        };
        let rendered = OpenAiResponsesAdapter.render_response(&response);
        let output = rendered["output"].as_array().unwrap();
        assert_eq!(output.len(), 1);
        assert_eq!(output[0]["type"], "function_call");
        assert_eq!(output[0]["call_id"], "c1");
    }

    #[test]
    fn stream_has_no_done_terminator() {
        assert_eq!(OpenAiResponsesAdapter.stream_terminator(), None);
    }

    #[test]
    fn error_frame_uses_error_type() {
        let frame = error_frame("boom");
        let parsed: JsonValue = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(parsed["error"]["message"], "boom");
    }
}
