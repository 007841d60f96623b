use async_trait::async_trait;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use modelgate_common::GlobalConfig;

use crate::snapshot::{ApiKeyRow, ModelRow, ProviderRow, SettingsRow, StorageSnapshot};

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("db error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("serde json error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(&'static str),
}

#[derive(Debug, Clone)]
pub struct ProviderInput {
    pub name: String,
    pub provider_type: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub proxy: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelInput {
    pub provider_name: String,
    pub system_name: String,
    pub remote_id: Option<String>,
    pub model_type: String,
    pub weight: f64,
    pub context_length: Option<i64>,
    pub prices_json: Option<JsonValue>,
}

#[derive(Debug, Clone)]
pub struct ApiKeyInput {
    pub external_id: Option<String>,
    pub rpm_limit: i32,
    pub tpm_limit: i32,
    pub source: String,
    pub comment: Option<String>,
}

/// Input for a freshly started Completion (§3, §4.8/§4.9). `prompt_json`
/// carries `{messages, tools, tool_choice, extraParams, extraHeaders}` as
/// the handler received it, before any provider translation.
#[derive(Debug, Clone)]
pub struct CompletionCreate {
    pub api_key_id: i64,
    pub model_id: Option<i64>,
    pub requested_model: String,
    pub prompt_json: JsonValue,
    pub req_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Completed,
    Failed,
    Aborted,
}

impl CompletionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionStatus::Completed => "completed",
            CompletionStatus::Failed => "failed",
            CompletionStatus::Aborted => "aborted",
        }
    }
}

/// Terminal write for a Completion (§4.8/§4.9). `-1` means "unknown" for
/// both token counts and the ttft/duration millisecond fields, per §3's
/// invariants.
#[derive(Debug, Clone)]
pub struct CompletionFinalize {
    pub status: CompletionStatus,
    /// Overwrites the Completion's `model_id` with the candidate that
    /// actually served the request, which may differ from the first
    /// candidate tried at creation time when failover moved to a later
    /// provider (§8 scenario 5). `None` leaves the original value in place
    /// (the failed-attempt finalize path has no winning candidate to report).
    pub model_id: Option<i64>,
    pub prompt_tokens: i64,
    pub completion_json: Option<JsonValue>,
    pub completion_tokens: i64,
    pub ttft_ms: i64,
    pub duration_ms: i64,
    pub cached_response_body: Option<JsonValue>,
    pub cached_response_format: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletionRow {
    pub id: i64,
    pub api_key_id: i64,
    pub status: String,
    /// The canonical IR response (`modelgate_protocol::ir::IrResponse`),
    /// dialect-independent. Used to re-render a cache hit into a dialect
    /// other than the one that originally produced it (§4.6/§8).
    pub completion_json: Option<JsonValue>,
    pub cached_response_body: Option<JsonValue>,
    pub cached_response_format: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingCreate {
    pub api_key_id: i64,
    pub model_id: i64,
    pub input_json: JsonValue,
    pub input_tokens: i64,
    pub embedding_json: JsonValue,
    pub dimensions: i32,
    pub status: String,
    pub duration_ms: i64,
}

/// Result of the dedup gate's atomic claim (§4.6).
#[derive(Debug, Clone)]
pub enum DedupOutcome {
    /// A finalized completion already exists for this `(apiKeyId, reqId)`.
    CacheHit(CompletionRow),
    /// An entry is `in_flight`; the caller should respond 409.
    InFlight,
    /// Freshly claimed: a pending Completion was created and owned by this
    /// entry. The handler must eventually call `finalize_req_id` or
    /// `finalize_req_id_on_error`.
    NewRequest { completion_id: i64 },
}

#[derive(Debug, Clone, Default)]
pub struct UsageAggregate {
    pub matched_rows: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

/// Storage is used for:
/// - bootstrap (`load_snapshot`)
/// - admin mutations (writes only)
/// - the request path's handful of unavoidable DB touches: key lookup
///   (§4.1), the dedup gate (§4.6), and Completion/Embedding persistence
///
/// Everything else the handler needs at request time (provider/model
/// resolution, rate limit config) comes from the in-memory snapshot held by
/// `modelgate-core`'s `ArcSwap`, not from a live query.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Entity-first schema sync (SeaORM 2.0). Enabled by default at bootstrap.
    async fn sync(&self) -> StorageResult<()>;

    async fn load_settings(&self) -> StorageResult<Option<SettingsRow>>;
    async fn upsert_settings(
        &self,
        config: &GlobalConfig,
        init_config_applied: bool,
    ) -> StorageResult<()>;

    async fn load_snapshot(&self) -> StorageResult<StorageSnapshot>;

    // Providers
    async fn upsert_provider(&self, input: &ProviderInput) -> StorageResult<i64>;
    async fn delete_provider(&self, name: &str) -> StorageResult<()>;

    // Models
    async fn upsert_model(&self, input: &ModelInput) -> StorageResult<i64>;
    async fn delete_model(&self, provider_name: &str, system_name: &str) -> StorageResult<()>;

    // API keys
    async fn upsert_api_key(&self, key_value: &str, input: &ApiKeyInput) -> StorageResult<i64>;
    async fn revoke_api_key(&self, key_value: &str) -> StorageResult<()>;
    /// The single upsert-read of §4.1: sets `last_seen=now` and returns the
    /// row, or `None` if the key doesn't exist, is revoked, or has expired.
    async fn touch_api_key(&self, key_value: &str) -> StorageResult<Option<ApiKeyRow>>;

    // Completions
    async fn create_pending_completion(&self, input: &CompletionCreate) -> StorageResult<i64>;
    async fn finalize_completion(
        &self,
        completion_id: i64,
        finalize: &CompletionFinalize,
    ) -> StorageResult<()>;

    // Embeddings
    async fn insert_embedding(&self, input: &EmbeddingCreate) -> StorageResult<i64>;

    // Dedup gate (§4.6)
    async fn claim_req_id(
        &self,
        api_key_id: i64,
        req_id: &str,
        completion: &CompletionCreate,
    ) -> StorageResult<DedupOutcome>;
    async fn finalize_req_id(
        &self,
        api_key_id: i64,
        req_id: &str,
        completion_id: i64,
    ) -> StorageResult<()>;
    async fn finalize_req_id_on_error(&self, api_key_id: i64, req_id: &str) -> StorageResult<()>;

    // Usage (§4.11)
    async fn aggregate_usage(
        &self,
        api_key_id: i64,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> StorageResult<UsageAggregate>;
}
