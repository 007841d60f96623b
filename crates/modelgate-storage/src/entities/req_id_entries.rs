//! ReqIdEntry (SPEC_FULL.md §3 / §4.6): the dedup gate's claim row. Created
//! `in_flight` the first time `(api_key_id, req_id)` is seen, alongside a
//! pre-created `Completion`; resolved to `finalized` when that completion
//! reaches a terminal status. `(api_key_id, req_id)` is unique while the
//! entry is alive — a unique-constraint collision on insert is the signal
//! to fall back to a cache_hit/in_flight read instead.

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "req_id_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "api_key_req_id")]
    pub api_key_id: i64,
    #[sea_orm(unique_key = "api_key_req_id")]
    pub req_id: String,
    pub completion_id: i64,
    pub state: String,
    pub created_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "completion_id", to = "id", on_delete = "Cascade")]
    pub completion: HasOne<super::completions::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
