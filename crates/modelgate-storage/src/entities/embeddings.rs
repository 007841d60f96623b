//! Embedding (SPEC_FULL.md §3): one embeddings request record, created per
//! call (no pending/in-flight phase — embeddings are always unary).

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "embeddings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub api_key_id: i64,
    pub model_id: i64,
    pub input_json: Json,
    pub input_tokens: i64,
    pub embedding_json: Json,
    pub dimensions: i32,
    pub status: String,
    pub duration_ms: i64,
    pub created_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "api_key_id", to = "id", on_delete = "Cascade")]
    pub api_key: HasOne<super::api_keys::Entity>,
    #[sea_orm(belongs_to, from = "model_id", to = "id", on_delete = "Cascade")]
    pub model: HasOne<super::models::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
