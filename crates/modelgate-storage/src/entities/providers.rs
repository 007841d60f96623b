//! Provider (SPEC_FULL.md §3): an admin-managed upstream connection.
//! `provider_type` mirrors `modelgate_provider_core::ProviderType::as_str()`
//! (openai | openai-responses | anthropic | azure | ollama). Soft-deleted
//! via `deleted_at` so historical `Model`/`Completion` rows keep their FK.

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "providers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "provider_name")]
    pub name: String,
    pub provider_type: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub proxy: Option<String>,
    pub deleted_at: Option<OffsetDateTime>,
    pub updated_at: OffsetDateTime,
    #[sea_orm(has_many)]
    pub models: HasMany<super::models::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
