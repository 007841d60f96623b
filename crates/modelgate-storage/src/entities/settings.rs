//! Settings (SPEC_FULL.md §3): the single ambient process-wide row — same
//! slot the teacher used for `global_config`. Holds the serialized
//! `modelgate_common::GlobalConfig` plus whether the CLI/ENV init-config has
//! already been applied, so a restart doesn't clobber values the admin API
//! has since changed.

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "settings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub config_json: Json,
    pub init_config_applied: bool,
    pub updated_at: OffsetDateTime,
}

impl ActiveModelBehavior for ActiveModel {}
