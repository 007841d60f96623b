//! The OpenAI Responses wire (SPEC_FULL.md §4.5, §6). Chat-only: a
//! `ProviderOperation::Embeddings` candidate is filtered out before this
//! type is ever dialed.

use async_trait::async_trait;
use modelgate_protocol::ir::{
    ContentBlock, ContentBlockStart, ContentDelta, IrRequest, IrResponse, IrStreamEvent, Message,
    Role, StopReason, ToolChoice, ToolSpec, Usage,
};
use modelgate_protocol::openai::responses::request::{
    CreateResponseRequestBody, FunctionCallItem, FunctionCallOutput, FunctionToolDefinition,
    InputContentPart, InputItem, InputMessage, InputMessageContent, InputRole, ResponseInput,
    ResponseTool, ResponseToolChoice, ResponseToolChoiceMode,
};
use modelgate_protocol::openai::responses::response::{OutputItem, Response, ResponseStatus};
use modelgate_protocol::openai::responses::stream::ResponseStreamEventKnown;
use modelgate_provider_core::errors::{ProviderError, ProviderResult};
use modelgate_provider_core::provider::{
    EmbeddingsInput, EmbeddingsResult, NativeRequest, Provider, ProviderConfig, ProviderOperation,
    ProviderType, StreamDecodeState,
};
use serde_json::Value as JsonValue;

pub struct OpenAiResponsesProvider {
    config: ProviderConfig,
}

impl OpenAiResponsesProvider {
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
}

#[async_trait]
impl Provider for OpenAiResponsesProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAiResponses
    }

    fn supports(&self, op: ProviderOperation) -> bool {
        matches!(op, ProviderOperation::Chat)
    }

    fn build_request(&self, remote_id: &str, ir: &IrRequest) -> ProviderResult<NativeRequest> {
        let body = ir_to_responses_body(remote_id, ir);
        let mut value = serde_json::to_value(&body)
            .map_err(|err| ProviderError::Other(format!("encode responses request: {err}")))?;
        if let JsonValue::Object(map) = &mut value {
            for (key, val) in &ir.extra_params {
                map.entry(key.clone()).or_insert_with(|| val.clone());
            }
        }
        Ok(NativeRequest {
            method: http::Method::POST,
            path: "/responses".to_string(),
            headers: vec![self.auth_header()?],
            body: value,
        })
    }

    fn parse_response(&self, body: &[u8]) -> ProviderResult<IrResponse> {
        let response: Response = serde_json::from_slice(body)
            .map_err(|err| ProviderError::Other(format!("decode responses body: {err}")))?;
        Ok(responses_body_to_ir(response))
    }

    fn parse_stream_frame(
        &self,
        frame: &[u8],
        state: &mut StreamDecodeState,
    ) -> ProviderResult<Vec<IrStreamEvent>> {
        parse_responses_stream_frame(frame, state)
    }

    fn build_embeddings_request(
        &self,
        _remote_id: &str,
        _input: &EmbeddingsInput,
    ) -> ProviderResult<NativeRequest> {
        Err(ProviderError::InvalidConfig(
            "openai-responses does not support embeddings".to_string(),
        ))
    }

    fn parse_embeddings_response(&self, _body: &[u8]) -> ProviderResult<EmbeddingsResult> {
        Err(ProviderError::InvalidConfig(
            "openai-responses does not support embeddings".to_string(),
        ))
    }
}

fn ir_to_responses_body(remote_id: &str, ir: &IrRequest) -> CreateResponseRequestBody {
    let mut items = Vec::new();
    for message in &ir.messages {
        items.push(message_to_input_item(message));
    }
    let tools = ir
        .tools
        .as_ref()
        .map(|specs| specs.iter().map(tool_to_responses).collect());
    let tool_choice = ir.tool_choice.as_ref().map(tool_choice_to_responses);
    CreateResponseRequestBody {
        model: remote_id.to_string(),
        input: ResponseInput::Items(items),
        instructions: ir.system.clone(),
        stream: Some(ir.stream),
        max_output_tokens: ir.max_tokens,
        temperature: ir.temperature,
        top_p: ir.top_p,
        tools,
        tool_choice,
    }
}

fn message_to_input_item(message: &Message) -> InputItem {
    let role = match message.role {
        Role::System => InputRole::System,
        Role::User => InputRole::User,
        Role::Assistant => InputRole::Assistant,
        Role::Tool => InputRole::User,
    };
    if message.role == Role::Tool {
        if let Some(ContentBlock::ToolResult {
            tool_use_id,
            content,
            ..
        }) = message.content.first()
        {
            return InputItem::FunctionCallOutput(FunctionCallOutput {
                call_id: tool_use_id.clone(),
                output: content.clone(),
            });
        }
    }
    if let Some(ContentBlock::ToolUse { id, name, input }) = message
        .content
        .iter()
        .find(|block| matches!(block, ContentBlock::ToolUse { .. }))
    {
        return InputItem::FunctionCall(FunctionCallItem {
            call_id: id.clone(),
            name: name.clone(),
            arguments: input.to_string(),
        });
    }
    InputItem::Message(InputMessage {
        role,
        content: input_content(&message.content),
    })
}

fn input_content(blocks: &[ContentBlock]) -> InputMessageContent {
    if blocks.len() == 1 {
        if let ContentBlock::Text { text } = &blocks[0] {
            return InputMessageContent::Text(text.clone());
        }
    }
    let parts = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(InputContentPart::InputText { text: text.clone() }),
            ContentBlock::Image { url, base64, .. } => {
                let resolved = url
                    .clone()
                    .or_else(|| base64.clone().map(|data| format!("data:image/png;base64,{data}")));
                resolved.map(|image_url| InputContentPart::InputImage {
                    image_url: Some(image_url),
                })
            }
            _ => None,
        })
        .collect();
    InputMessageContent::Parts(parts)
}

fn tool_to_responses(spec: &ToolSpec) -> ResponseTool {
    ResponseTool::Function(FunctionToolDefinition {
        name: spec.name.clone(),
        description: spec.description.clone(),
        parameters: Some(spec.input_schema.clone()),
    })
}

fn tool_choice_to_responses(choice: &ToolChoice) -> ResponseToolChoice {
    match choice {
        ToolChoice::Auto => ResponseToolChoice::Mode(ResponseToolChoiceMode::Auto),
        ToolChoice::None => ResponseToolChoice::Mode(ResponseToolChoiceMode::None),
        ToolChoice::Any => ResponseToolChoice::Mode(ResponseToolChoiceMode::Required),
        ToolChoice::Named(name) => ResponseToolChoice::Named {
            r#type: "function".to_string(),
            name: name.clone(),
        },
    }
}

fn responses_body_to_ir(response: Response) -> IrResponse {
    let mut content = Vec::new();
    let mut stop_reason = Some(StopReason::EndTurn);
    for item in response.output {
        match item {
            OutputItem::Message { content: parts, .. } => {
                for part in parts {
                    match part {
                        InputContentPart::OutputText { text } | InputContentPart::InputText { text } => {
                            content.push(ContentBlock::Text { text });
                        }
                        InputContentPart::InputImage { .. } => {}
                    }
                }
            }
            OutputItem::FunctionCall(call) => {
                let input = serde_json::from_str(&call.arguments).unwrap_or(JsonValue::Null);
                content.push(ContentBlock::ToolUse {
                    id: call.call_id,
                    name: call.name,
                    input,
                });
                stop_reason = Some(StopReason::ToolUse);
            }
        }
    }
    if matches!(response.status, ResponseStatus::Incomplete) {
        stop_reason = Some(StopReason::MaxTokens);
    }
    let usage = response
        .usage
        .map(|usage| Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        })
        .unwrap_or_else(Usage::unknown);
    IrResponse {
        model: response.model,
        content,
        stop_reason,
        usage,
    }
}

fn parse_responses_stream_frame(
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
    let event: ResponseStreamEventKnown = serde_json::from_str(trimmed)
        .map_err(|err| ProviderError::Other(format!("bad stream event: {err}")))?;

    let mut events = Vec::new();
    if !state.message_started {
        events.push(IrStreamEvent::MessageStart {
            model: String::new(),
        });
        state.message_started = true;
    }

    match event {
        ResponseStreamEventKnown::OutputItemAdded { item, .. } => {
            if let OutputItem::FunctionCall(call) = item {
                let idx = state.next_block_index;
                state.next_block_index += 1;
                state.index_to_id.insert(idx, call.call_id.clone());
                events.push(IrStreamEvent::ContentBlockStart {
                    index: idx,
                    block: ContentBlockStart::ToolUse {
                        id: call.call_id,
                        name: call.name,
                    },
                });
            }
        }
        ResponseStreamEventKnown::OutputTextDelta { delta, .. } => {
            if !state.text_block_open {
                state.text_block_index = state.next_block_index;
                state.next_block_index += 1;
                state.text_block_open = true;
                events.push(IrStreamEvent::ContentBlockStart {
                    index: state.text_block_index,
                    block: ContentBlockStart::Text,
                });
            }
            events.push(IrStreamEvent::ContentBlockDelta {
                index: state.text_block_index,
                delta: ContentDelta::TextDelta { text: delta },
            });
        }
        ResponseStreamEventKnown::FunctionCallArgumentsDelta { item_id, delta, .. } => {
            let index = state
                .index_to_id
                .iter()
                .find(|(_, id)| **id == item_id)
                .map(|(idx, _)| *idx);
            if let Some(index) = index {
                events.push(IrStreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::InputJsonDelta { partial_json: delta },
                });
            } else {
                tracing::warn!(item_id, "function call delta for unknown item");
            }
        }
        ResponseStreamEventKnown::OutputItemDone { .. } => {}
        ResponseStreamEventKnown::Completed { response } => {
            if state.text_block_open {
                events.push(IrStreamEvent::ContentBlockStop {
                    index: state.text_block_index,
                });
                state.text_block_open = false;
            }
            for idx in state.index_to_id.keys().copied() {
                events.push(IrStreamEvent::ContentBlockStop { index: idx });
            }
            let ir = responses_body_to_ir(response);
            events.push(IrStreamEvent::MessageDelta {
                stop_reason: ir.stop_reason,
            });
            events.push(IrStreamEvent::Usage { usage: ir.usage });
            state.terminated = true;
            events.push(IrStreamEvent::MessageStop);
        }
        ResponseStreamEventKnown::Error { error } => {
            state.terminated = true;
            events.push(IrStreamEvent::Unknown(serde_json::json!({
                "error": error,
            })));
            events.push(IrStreamEvent::MessageStop);
        }
    }

    Ok(events)
}
