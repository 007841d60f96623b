mod anthropic;
mod openai_chat;
mod openai_responses;

use modelgate_protocol::ir::{IrRequest, IrResponse, IrStreamEvent};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientDialect {
    OpenAiChat,
    OpenAiResponses,
    Anthropic,
}

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("unsupported combination: {0}")]
    Unsupported(String),
}

/// Parses a client's request body into the IR. Implemented once per
/// client dialect; the dispatch table in `modelgate-provider-impl` picks
/// which impl to call based on the inbound route.
pub trait RequestAdapter {
    fn parse_request(&self, body: &JsonValue) -> Result<IrRequest, TranslateError>;
}

/// Serializes IR back into a client's wire format, unary and streaming.
pub trait ResponseAdapter {
    fn render_response(&self, response: &IrResponse) -> JsonValue;

    /// Render one decoded provider stream event as zero or more SSE frames
    /// (`event:`/`data:` pairs already formatted, sans the trailing blank
    /// line). Most events produce exactly one frame; a few (e.g. a
    /// `ContentBlockStart` for a dialect that doesn't model blocks)
    /// produce none.
    fn render_stream_event(&self, event: &IrStreamEvent) -> Vec<SseFrame>;

    /// The terminator line(s) appended after the last event, if any
    /// (`data: [DONE]` for OpenAI dialects, nothing for Anthropic).
    fn stream_terminator(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    pub fn data_only(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
        }
    }

    /// Render as wire bytes, including the trailing blank line SSE requires
    /// between events.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        out.push_str("data: ");
        out.push_str(&self.data);
        out.push_str("\n\n");
        out
    }
}

pub fn adapter_for(dialect: ClientDialect) -> Box<dyn DialectAdapter> {
    match dialect {
        ClientDialect::OpenAiChat => Box::new(openai_chat::OpenAiChatAdapter),
        ClientDialect::OpenAiResponses => Box::new(openai_responses::OpenAiResponsesAdapter),
        ClientDialect::Anthropic => Box::new(anthropic::AnthropicAdapter),
    }
}

/// Convenience bound implemented by every per-dialect adapter so callers
/// can hold one trait object rather than threading two generic bounds
/// through the dispatch table.
pub trait DialectAdapter: RequestAdapter + ResponseAdapter + Send + Sync {}
impl<T: RequestAdapter + ResponseAdapter + Send + Sync> DialectAdapter for T {}
