//! Completion (SPEC_FULL.md §3): one chat/responses request's full
//! lifecycle record. Created `pending` at request start (either directly or
//! pre-created by the dedup gate, §4.6), finalized exactly once at request
//! end. `status` is monotone: `pending -> {completed|failed|aborted}`.
//! `prompt_tokens`/`completion_tokens` use `-1` for "unknown; do not charge"
//! per the invariant in §3; `ttft_ms`/`duration_ms` use `-1` for "never
//! reached" (failure before first byte).

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "completions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub api_key_id: i64,
    pub model_id: Option<i64>,
    pub requested_model: String,
    pub prompt_json: Json,
    pub prompt_tokens: i64,
    pub completion_json: Option<Json>,
    pub completion_tokens: i64,
    pub status: String,
    pub ttft_ms: i64,
    pub duration_ms: i64,
    pub cached_response_body: Option<Json>,
    pub cached_response_format: Option<String>,
    pub req_id: Option<String>,
    pub created_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "api_key_id", to = "id", on_delete = "Cascade")]
    pub api_key: HasOne<super::api_keys::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
