//! ApiKey (SPEC_FULL.md §3): the bearer credential accepted at the gateway
//! edge. `last_seen` is upserted on every authenticated lookup (§4.1); a key
//! is rejected once `revoked` or `expires_at < now`, though `last_seen` is
//! still touched for the failed attempt.

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "api_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "api_key_value")]
    pub key_value: String,
    #[sea_orm(unique_key = "api_key_external_id")]
    pub external_id: Option<String>,
    pub revoked: bool,
    pub expires_at: Option<OffsetDateTime>,
    pub rpm_limit: i32,
    pub tpm_limit: i32,
    pub source: String,
    pub comment: Option<String>,
    pub last_seen: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl ActiveModelBehavior for ActiveModel {}
