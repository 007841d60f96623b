use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::anthropic::error::ErrorDetail;
use crate::anthropic::messages::request::ContentBlockParam;
use crate::anthropic::messages::response::{MessageRole, MessageType, StopReason, Usage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    pub id: String,
    /// Message-start events carry an empty content array; blocks arrive
    /// via subsequent content_block_start/delta events.
    pub content: Vec<ContentBlockParam>,
    pub model: String,
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(rename = "type")]
    pub r#type: MessageType,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessageDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamContentBlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    /// Partial JSON string; accumulate and parse after content_block_stop.
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BetaStreamEventKnown {
    MessageStart {
        message: StreamMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: ContentBlockParam,
    },
    ContentBlockDelta {
        index: u32,
        delta: StreamContentBlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: StreamMessageDelta,
        usage: Usage,
    },
    MessageStop,
    Ping,
    Error {
        error: ErrorDetail,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BetaStreamEvent {
    Known(BetaStreamEventKnown),
    Unknown(JsonValue),
}
