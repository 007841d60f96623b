use modelgate_protocol::anthropic::messages::request::{
    ContentBlockParam, CreateMessageRequestBody, ImageSource, ImageSourceType, MessageContent,
    MessageParam, MessageRole as ReqMessageRole, SystemParam, Tool, ToolChoice as ReqToolChoice,
    ToolResultContent,
};
use modelgate_protocol::anthropic::messages::response::{
    CreateMessageResponse, MessageRole, MessageType, StopReason as AnthropicStopReason, Usage as AnthropicUsage,
};
use modelgate_protocol::anthropic::messages::stream::{
    BetaStreamEventKnown, StreamContentBlockDelta, StreamMessage, StreamMessageDelta,
};
use modelgate_protocol::ir::{
    ContentBlock, ContentBlockStart, ContentDelta, IrRequest, IrResponse, IrStreamEvent, Message,
    Role, StopReason, ToolChoice, ToolSpec, Usage,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{RequestAdapter, ResponseAdapter, SseFrame, TranslateError};

pub struct AnthropicAdapter;

impl RequestAdapter for AnthropicAdapter {
    fn parse_request(&self, body: &JsonValue) -> Result<IrRequest, TranslateError> {
        let body: CreateMessageRequestBody =
            serde_json::from_value(body.clone()).map_err(|e| TranslateError::InvalidBody(e.to_string()))?;

        let system = body.system.map(|system| match system {
            SystemParam::Text(text) => text,
            SystemParam::Blocks(blocks) => blocks
                .into_iter()
                .filter_map(|b| match b {
                    ContentBlockParam::Text { text } => Some(text),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        });

        let messages = body
            .messages
            .into_iter()
            .map(message_to_ir)
            .collect::<Vec<_>>();

        let tools = if body.tools.is_some() {
            Some(
                body.tools
                    .unwrap()
                    .into_iter()
                    .map(tool_to_ir)
                    .collect::<Vec<_>>(),
            )
        } else {
            None
        };

        let tool_choice = body.tool_choice.map(|choice| match choice {
            ReqToolChoice::Auto => ToolChoice::Auto,
            ReqToolChoice::Any => ToolChoice::Any,
            ReqToolChoice::None => ToolChoice::None,
            ReqToolChoice::Tool { name } => ToolChoice::Named(name),
        });

        Ok(IrRequest {
            model: body.model,
            system,
            messages,
            tools,
            tool_choice,
            max_tokens: Some(body.max_tokens),
            temperature: body.temperature,
            top_p: body.top_p,
            top_k: body.top_k,
            stream: body.stream.unwrap_or(false),
            stop_sequences: body.stop_sequences,
            ..Default::default()
        })
    }
}

fn message_to_ir(message: MessageParam) -> Message {
    let role = match message.role {
        ReqMessageRole::User => Role::User,
        ReqMessageRole::Assistant => Role::Assistant,
    };
    let content = match message.content {
        MessageContent::Text(text) => vec![ContentBlock::Text { text }],
        MessageContent::Blocks(blocks) => blocks.into_iter().map(block_to_ir).collect(),
    };
    Message { role, content }
}

fn block_to_ir(block: ContentBlockParam) -> ContentBlock {
    match block {
        ContentBlockParam::Text { text } => ContentBlock::Text { text },
        ContentBlockParam::Thinking { thinking, signature } => {
            ContentBlock::Thinking { thinking, signature }
        }
        ContentBlockParam::Image { source } => match source.r#type {
            ImageSourceType::Base64 => ContentBlock::Image {
                url: None,
                base64: source.data,
                media_type: source.media_type,
            },
            ImageSourceType::Url => ContentBlock::Image {
                url: source.url,
                base64: None,
                media_type: source.media_type,
            },
        },
        ContentBlockParam::ToolUse { id, name, input } => ContentBlock::ToolUse { id, name, input },
        ContentBlockParam::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let text = match content {
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
            };
            ContentBlock::ToolResult {
                tool_use_id,
                content: text,
                is_error,
            }
        }
    }
}

fn tool_to_ir(tool: Tool) -> ToolSpec {
    ToolSpec {
        name: tool.name,
        description: tool.description,
        input_schema: serde_json::to_value(&tool.input_schema).unwrap_or(JsonValue::Null),
    }
}

fn ir_stop_reason(reason: Option<StopReason>) -> Option<AnthropicStopReason> {
    reason.map(|r| match r {
        StopReason::EndTurn => AnthropicStopReason::EndTurn,
        StopReason::MaxTokens => AnthropicStopReason::MaxTokens,
        StopReason::StopSequence => AnthropicStopReason::StopSequence,
        StopReason::ToolUse => AnthropicStopReason::ToolUse,
    })
}

fn block_from_ir(block: &ContentBlock) -> ContentBlockParam {
    match block {
        ContentBlock::Text { text } => ContentBlockParam::Text { text: text.clone() },
        ContentBlock::Thinking { thinking, signature } => ContentBlockParam::Thinking {
            thinking: thinking.clone(),
            signature: signature.clone(),
        },
        ContentBlock::Image { url, base64, media_type } => ContentBlockParam::Image {
            source: if let Some(data) = base64 {
                ImageSource {
                    r#type: ImageSourceType::Base64,
                    media_type: media_type.clone(),
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
            },
        },
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

impl ResponseAdapter for AnthropicAdapter {
    fn render_response(&self, response: &IrResponse) -> JsonValue {
        let body = CreateMessageResponse {
            id: format!("msg_{}", short_id()),
            r#type: MessageType::Message,
            role: MessageRole::Assistant,
            content: response.content.iter().map(block_from_ir).collect(),
            model: response.model.clone(),
            stop_reason: ir_stop_reason(response.stop_reason),
            stop_sequence: None,
            usage: AnthropicUsage {
                input_tokens: response.usage.input_tokens.max(0),
                output_tokens: response.usage.output_tokens.max(0),
            },
        };
        serde_json::to_value(body).unwrap_or(JsonValue::Null)
    }

    fn render_stream_event(&self, event: &IrStreamEvent) -> Vec<SseFrame> {
        let frame = |name: &str, ev: BetaStreamEventKnown| {
            vec![SseFrame::named(
                name.to_string(),
                serde_json::to_string(&ev).unwrap_or_default(),
            )]
        };

        match event {
            IrStreamEvent::MessageStart { model } => frame(
                "message_start",
                BetaStreamEventKnown::MessageStart {
                    message: StreamMessage {
                        id: format!("msg_{}", short_id()),
                        content: vec![],
                        model: model.clone(),
                        role: MessageRole::Assistant,
                        stop_reason: None,
                        r#type: MessageType::Message,
                        usage: AnthropicUsage::default(),
                    },
                },
            ),
            IrStreamEvent::ContentBlockStart { index, block } => {
                let content_block = match block {
                    ContentBlockStart::Text => ContentBlockParam::Text { text: String::new() },
                    ContentBlockStart::Thinking => ContentBlockParam::Thinking {
                        thinking: String::new(),
                        signature: None,
                    },
                    ContentBlockStart::ToolUse { id, name } => ContentBlockParam::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: JsonValue::Object(Default::default()),
                    },
                };
                frame(
                    "content_block_start",
                    BetaStreamEventKnown::ContentBlockStart {
                        index: *index,
                        content_block,
                    },
                )
            }
            IrStreamEvent::ContentBlockDelta { index, delta } => {
                let delta = match delta {
                    ContentDelta::TextDelta { text } => StreamContentBlockDelta::TextDelta { text: text.clone() },
                    ContentDelta::ThinkingDelta { thinking } => {
                        StreamContentBlockDelta::ThinkingDelta { thinking: thinking.clone() }
                    }
                    ContentDelta::InputJsonDelta { partial_json } => {
                        StreamContentBlockDelta::InputJsonDelta { partial_json: partial_json.clone() }
                    }
                };
                frame(
                    "content_block_delta",
                    BetaStreamEventKnown::ContentBlockDelta { index: *index, delta },
                )
            }
            IrStreamEvent::ContentBlockStop { index } => frame(
                "content_block_stop",
                BetaStreamEventKnown::ContentBlockStop { index: *index },
            ),
            IrStreamEvent::MessageDelta { stop_reason } => frame(
                "message_delta",
                BetaStreamEventKnown::MessageDelta {
                    delta: StreamMessageDelta {
                        stop_reason: ir_stop_reason(*stop_reason),
                        stop_sequence: None,
                    },
                    usage: AnthropicUsage::default(),
                },
            ),
            IrStreamEvent::Usage { usage } => frame(
                "message_delta",
                BetaStreamEventKnown::MessageDelta {
                    delta: StreamMessageDelta {
                        stop_reason: None,
                        stop_sequence: None,
                    },
                    usage: AnthropicUsage {
                        input_tokens: usage.input_tokens.max(0),
                        output_tokens: usage.output_tokens.max(0),
                    },
                },
            ),
            IrStreamEvent::MessageStop => frame("message_stop", BetaStreamEventKnown::MessageStop),
            IrStreamEvent::Unknown(_) => vec![],
        }
    }

    fn stream_terminator(&self) -> Option<String> {
        None
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifts_system_param_text_into_ir() {
        let body = json!({
            "model": "claude-3",
            "max_tokens": 100,
            "system": "be terse",
            "messages": [{"role": "user", "content": "hi"}],
        });
        let ir = AnthropicAdapter.parse_request(&body).unwrap();
        assert_eq!(ir.system.as_deref(), Some("be terse"));
        assert_eq!(ir.max_tokens, Some(100));
        assert_eq!(ir.messages.len(), 1);
    }

    #[test]
    fn joins_system_blocks_with_newline() {
        let body = json!({
            "model": "claude-3",
            "max_tokens": 10,
            "system": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}],
            "messages": [],
        });
        let ir = AnthropicAdapter.parse_request(&body).unwrap();
        assert_eq!(ir.system.as_deref(), Some("a\nb"));
    }

    #[test]
    fn tool_use_and_tool_result_blocks_round_trip() {
        let body = json!({
            "model": "claude-3",
            "max_tokens": 10,
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": "weather?"}]},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "t1", "name": "get_weather", "input": {"city": "nyc"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "t1", "content": "sunny"}
                ]},
            ],
        });
        let ir = AnthropicAdapter.parse_request(&body).unwrap();
        match &ir.messages[1].content[0] {
            ContentBlock::ToolUse { id, name, .. } => {
                assert_eq!(id, "t1");
                assert_eq!(name, "get_weather");
            }
            other => panic!("expected tool_use, got {other:?}"),
        }
        match &ir.messages[2].content[0] {
            ContentBlock::ToolResult { tool_use_id, content, .. } => {
                assert_eq!(tool_use_id, "t1");
                assert_eq!(content, "sunny");
            }
            other => panic!("expected tool_result, got {other:?}"),
        }
    }

    #[test]
    fn render_response_carries_stop_reason_and_usage() {
        let response = IrResponse {
            model: "claude-3".to_string(),
            content: vec![ContentBlock::Text { text: "hi there".to_string() }],
            stop_reason: Some(StopReason::EndTurn),
            usage: Usage { input_tokens: 5, output_tokens: 2 },
        };
        let rendered = AnthropicAdapter.render_response(&response);
        assert_eq!(rendered["type"], "message");
        assert_eq!(rendered["stop_reason"], "end_turn");
        assert_eq!(rendered["usage"]["input_tokens"], 5);
        assert_eq!(rendered["content"][0]["text"], "hi there");
    }

    #[test]
    fn stream_has_no_done_terminator() {
        assert_eq!(AnthropicAdapter.stream_terminator(), None);
    }

    #[test]
    fn content_block_start_for_tool_use_names_the_event() {
        let event = IrStreamEvent::ContentBlockStart {
            index: 0,
            block: ContentBlockStart::ToolUse { id: "t1".to_string(), name: "get_weather".to_string() },
        };
        let frames = AnthropicAdapter.render_stream_event(&event);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("content_block_start"));
        let parsed: JsonValue = serde_json::from_str(&frames[0].data).unwrap();
        assert_eq!(parsed["content_block"]["type"], "tool_use");
        assert_eq!(parsed["content_block"]["id"], "t1");
    }

    #[test]
    fn unknown_event_produces_no_frames() {
        let event = IrStreamEvent::Unknown(json!({"type": "ping"}));
        assert!(AnthropicAdapter.render_stream_event(&event).is_empty());
    }
}
