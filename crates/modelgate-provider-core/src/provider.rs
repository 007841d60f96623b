use async_trait::async_trait;
use modelgate_protocol::ir::{IrRequest, IrResponse, IrStreamEvent};
use serde::{Deserialize, Serialize};

use crate::errors::ProviderResult;

/// How the gateway talks to an upstream — one of the five wire dialects
/// named in SPEC_FULL.md §3. Azure and Ollama share the OpenAI wire
/// end-to-end; they exist as distinct values because they carry their own
/// base URL / auth conventions (SPEC_FULL.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    OpenAi,
    OpenAiResponses,
    Anthropic,
    Azure,
    Ollama,
}

impl ProviderType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderType::OpenAi => "openai",
            ProviderType::OpenAiResponses => "openai-responses",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Azure => "azure",
            ProviderType::Ollama => "ollama",
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(ProviderType::OpenAi),
            "openai-responses" => Ok(ProviderType::OpenAiResponses),
            "anthropic" => Ok(ProviderType::Anthropic),
            "azure" => Ok(ProviderType::Azure),
            "ollama" => Ok(ProviderType::Ollama),
            other => Err(format!("unknown provider type: {other}")),
        }
    }
}

/// Admin-managed connection config for one `Provider` row (SPEC_FULL.md
/// §3). Carried as plain data; `modelgate-provider-impl` turns it into a
/// concrete HTTP client per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

/// Which endpoint family a request targets; `Provider::supports` lets a
/// candidate be filtered out before it's ever dialed (e.g. an
/// `openai-responses` provider has no embeddings endpoint).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderOperation {
    Chat,
    Embeddings,
}

/// One decoded chunk of a provider's native stream, still addressed in
/// provider framing — the caller (dispatch/stream decoder) turns these
/// into `IrStreamEvent`s.
pub type RawStreamChunk = bytes::Bytes;

/// Everything a concrete provider integration must supply: build a
/// provider-native HTTP request out of the IR, and parse the provider's
/// native reply (unary or streamed) back into the IR. Transport (actually
/// firing the HTTP call) is not part of this trait — see
/// `modelgate-provider-impl::upstream` — so the trait stays testable
/// without a network.
#[async_trait]
pub trait Provider: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    fn supports(&self, op: ProviderOperation) -> bool;

    /// Builds the provider-native JSON body and path for a chat/messages
    /// call. `remote_id` is the provider-native model id (falls back to
    /// `systemName` per the GLOSSARY when the `Model` row has none set).
    fn build_request(&self, remote_id: &str, ir: &IrRequest) -> ProviderResult<NativeRequest>;

    /// Parses a complete (non-streamed) provider reply into the IR.
    fn parse_response(&self, body: &[u8]) -> ProviderResult<IrResponse>;

    /// Parses one provider-native SSE/JSONL frame into zero or more IR
    /// stream events. `state` carries the `index -> id` tool-call table
    /// for providers (OpenAI-shaped ones) whose wire format only repeats
    /// the id on the first delta of a tool call; Anthropic-shaped
    /// providers pass it through unused. Called once per complete frame a
    /// `StreamDecoder` demuxes off the wire — the decoder owns buffering
    /// across chunk boundaries, this owns per-provider framing semantics.
    fn parse_stream_frame(
        &self,
        frame: &[u8],
        state: &mut StreamDecodeState,
    ) -> ProviderResult<Vec<IrStreamEvent>>;

    /// Builds a provider-native embeddings request body.
    fn build_embeddings_request(
        &self,
        remote_id: &str,
        input: &EmbeddingsInput,
    ) -> ProviderResult<NativeRequest>;

    fn parse_embeddings_response(&self, body: &[u8]) -> ProviderResult<EmbeddingsResult>;
}

#[derive(Debug, Clone)]
pub struct NativeRequest {
    pub method: http::Method,
    /// Path appended to the provider's base URL (e.g. `/chat/completions`).
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct EmbeddingsInput {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddingsResult {
    pub vectors: Vec<Vec<f32>>,
    pub dimensions: usize,
    pub input_tokens: i64,
}

/// Per-request state a `Provider`'s stream decoder carries across frames.
/// Owned by the streaming processor (`modelgate-core`), one instance per
/// in-flight request.
#[derive(Debug, Default)]
pub struct StreamDecodeState {
    /// `index -> id` for tool-use blocks opened this stream (SPEC_FULL.md
    /// §4.5 "Tool-call streaming" / §9 "Tool-call reconstruction"). Used in
    /// both directions: IR-to-client adapters map IR block index to tool id,
    /// OpenAI-native decoders map the wire's own tool_calls[].index the
    /// same way before it ever reaches the IR.
    pub index_to_id: std::collections::HashMap<u32, String>,
    /// Whether `message_start` has already been emitted, so a provider
    /// whose wire repeats role info on every chunk only synthesizes one.
    pub message_started: bool,
    /// OpenAI-chat tolerant-parsing race state: set once any of the three
    /// terminal conditions in SPEC_FULL.md §9 Open Questions has fired, so
    /// a later frame in the same response can't re-terminate.
    pub terminated: bool,
    /// Whether a text content block has been opened at `text_block_index`.
    pub text_block_open: bool,
    pub text_block_index: u32,
    /// Whether a thinking content block has been opened at `thinking_block_index`.
    pub thinking_block_open: bool,
    pub thinking_block_index: u32,
    /// Next free IR content-block index; incremented whenever a new block
    /// (text, thinking, or tool-use) is opened.
    pub next_block_index: u32,
}
