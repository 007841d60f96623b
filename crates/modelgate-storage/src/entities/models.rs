//! Model (SPEC_FULL.md §3): a logical, client-visible model name bound to
//! one provider. `weight` drives the resolver's weighted-random selection
//! (`modelgate-provider-core::resolver`); `weight == 0` excludes a model from
//! random draws but it may still be picked if it is the only candidate.

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "models")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "provider_system_name")]
    pub provider_id: i64,
    #[sea_orm(unique_key = "provider_system_name")]
    pub system_name: String,
    pub remote_id: Option<String>,
    pub model_type: String,
    pub weight: f64,
    pub context_length: Option<i64>,
    pub prices_json: Option<Json>,
    pub updated_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "provider_id", to = "id", on_delete = "Cascade")]
    pub provider: HasOne<super::providers::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
