//! `SeaOrmStorage`: the concrete `Storage` impl, grounded on the teacher's
//! `seaorm/mod.rs` find-or-update-else-insert idiom and its
//! `Schema::new(..).builder().register(..).sync(..)` entity-first bootstrap.

use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, Database, DatabaseBackend,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Schema, TransactionTrait,
};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use modelgate_common::GlobalConfig;

use crate::entities;
use crate::snapshot::{ApiKeyRow, ModelRow, ProviderRow, SettingsRow, StorageSnapshot};
use crate::storage::{
    ApiKeyInput, CompletionCreate, CompletionFinalize, CompletionRow, DedupOutcome,
    EmbeddingCreate, ModelInput, ProviderInput, Storage, StorageError, StorageResult,
    UsageAggregate,
};

#[derive(Clone)]
pub struct SeaOrmStorage {
    db: DatabaseConnection,
}

impl SeaOrmStorage {
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        let db = Database::connect(dsn).await?;
        if db.get_database_backend() == DatabaseBackend::Sqlite {
            db.execute_unprepared("PRAGMA foreign_keys = ON").await?;
        }
        Ok(Self { db })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn provider_row(m: entities::providers::Model) -> ProviderRow {
    ProviderRow {
        id: m.id,
        name: m.name,
        provider_type: m.provider_type,
        base_url: m.base_url,
        api_key: m.api_key,
        api_version: m.api_version,
        proxy: m.proxy,
        updated_at: m.updated_at,
    }
}

fn model_row(m: entities::models::Model) -> ModelRow {
    ModelRow {
        id: m.id,
        provider_id: m.provider_id,
        system_name: m.system_name,
        remote_id: m.remote_id,
        model_type: m.model_type,
        weight: m.weight,
        context_length: m.context_length,
        prices_json: m.prices_json,
        updated_at: m.updated_at,
    }
}

fn api_key_row(m: entities::api_keys::Model) -> ApiKeyRow {
    ApiKeyRow {
        id: m.id,
        key_value: m.key_value,
        external_id: m.external_id,
        revoked: m.revoked,
        expires_at: m.expires_at,
        rpm_limit: m.rpm_limit,
        tpm_limit: m.tpm_limit,
        source: m.source,
        comment: m.comment,
        last_seen: m.last_seen,
        created_at: m.created_at,
    }
}

fn completion_row(m: entities::completions::Model) -> CompletionRow {
    CompletionRow {
        id: m.id,
        api_key_id: m.api_key_id,
        status: m.status,
        completion_json: m.completion_json,
        cached_response_body: m.cached_response_body,
        cached_response_format: m.cached_response_format,
    }
}

#[async_trait::async_trait]
impl Storage for SeaOrmStorage {
    async fn sync(&self) -> StorageResult<()> {
        Schema::new(self.db.get_database_backend())
            .builder()
            .register(entities::Settings)
            .register(entities::Providers)
            .register(entities::Models)
            .register(entities::ApiKeys)
            .register(entities::Completions)
            .register(entities::Embeddings)
            .register(entities::ReqIdEntries)
            .sync(&self.db)
            .await?;
        Ok(())
    }

    async fn load_settings(&self) -> StorageResult<Option<SettingsRow>> {
        use entities::settings::Column;
        let row = entities::Settings::find()
            .order_by_asc(Column::Id)
            .one(&self.db)
            .await?;
        Ok(row
            .map(|m| -> StorageResult<SettingsRow> {
                let config: GlobalConfig = serde_json::from_value(m.config_json)?;
                Ok(SettingsRow {
                    id: m.id,
                    config,
                    init_config_applied: m.init_config_applied,
                    updated_at: m.updated_at,
                })
            })
            .transpose()?)
    }

    async fn upsert_settings(
        &self,
        config: &GlobalConfig,
        init_config_applied: bool,
    ) -> StorageResult<()> {
        use entities::settings::ActiveModel as SettingsActive;
        let now = OffsetDateTime::now_utc();
        let id = 1_i64;
        let config_json = serde_json::to_value(config)?;

        let existing = entities::Settings::find_by_id(id).one(&self.db).await?;
        match existing {
            Some(model) => {
                let mut active: SettingsActive = model.into();
                active.config_json = ActiveValue::Set(config_json);
                active.init_config_applied = ActiveValue::Set(init_config_applied);
                active.updated_at = ActiveValue::Set(now);
                active.update(&self.db).await?;
            }
            None => {
                let active = SettingsActive {
                    id: ActiveValue::Set(id),
                    config_json: ActiveValue::Set(config_json),
                    init_config_applied: ActiveValue::Set(init_config_applied),
                    updated_at: ActiveValue::Set(now),
                };
                entities::Settings::insert(active).exec(&self.db).await?;
            }
        }
        Ok(())
    }

    async fn load_snapshot(&self) -> StorageResult<StorageSnapshot> {
        let settings = self.load_settings().await?;
        let providers = entities::Providers::find()
            .filter(entities::providers::Column::DeletedAt.is_null())
            .all(&self.db)
            .await?
            .into_iter()
            .map(provider_row)
            .collect();
        let models = entities::Models::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(model_row)
            .collect();
        let api_keys = entities::ApiKeys::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(api_key_row)
            .collect();

        Ok(StorageSnapshot {
            settings,
            providers,
            models,
            api_keys,
        })
    }

    async fn upsert_provider(&self, input: &ProviderInput) -> StorageResult<i64> {
        use entities::providers::{ActiveModel as ProviderActive, Column};
        let now = OffsetDateTime::now_utc();
        let existing = entities::Providers::find()
            .filter(Column::Name.eq(input.name.as_str()))
            .one(&self.db)
            .await?;

        let id = match existing {
            Some(model) => {
                let mut active: ProviderActive = model.into();
                active.provider_type = ActiveValue::Set(input.provider_type.clone());
                active.base_url = ActiveValue::Set(input.base_url.clone());
                active.api_key = ActiveValue::Set(input.api_key.clone());
                active.api_version = ActiveValue::Set(input.api_version.clone());
                active.proxy = ActiveValue::Set(input.proxy.clone());
                active.deleted_at = ActiveValue::Set(None);
                active.updated_at = ActiveValue::Set(now);
                active.update(&self.db).await?.id
            }
            None => {
                let active = ProviderActive {
                    id: ActiveValue::NotSet,
                    name: ActiveValue::Set(input.name.clone()),
                    provider_type: ActiveValue::Set(input.provider_type.clone()),
                    base_url: ActiveValue::Set(input.base_url.clone()),
                    api_key: ActiveValue::Set(input.api_key.clone()),
                    api_version: ActiveValue::Set(input.api_version.clone()),
                    proxy: ActiveValue::Set(input.proxy.clone()),
                    deleted_at: ActiveValue::Set(None),
                    updated_at: ActiveValue::Set(now),
                };
                entities::Providers::insert(active)
                    .exec(&self.db)
                    .await?
                    .last_insert_id
            }
        };
        Ok(id)
    }

    async fn delete_provider(&self, name: &str) -> StorageResult<()> {
        use entities::providers::{ActiveModel as ProviderActive, Column};
        let Some(model) = entities::Providers::find()
            .filter(Column::Name.eq(name))
            .one(&self.db)
            .await?
        else {
            return Ok(());
        };
        let mut active: ProviderActive = model.into();
        active.deleted_at = ActiveValue::Set(Some(OffsetDateTime::now_utc()));
        active.update(&self.db).await?;
        Ok(())
    }

    async fn upsert_model(&self, input: &ModelInput) -> StorageResult<i64> {
        use entities::models::{ActiveModel as ModelActive, Column};
        use entities::providers::Column as ProviderColumn;

        let provider = entities::Providers::find()
            .filter(ProviderColumn::Name.eq(input.provider_name.as_str()))
            .one(&self.db)
            .await?
            .ok_or(StorageError::NotFound("provider"))?;

        let now = OffsetDateTime::now_utc();
        let existing = entities::Models::find()
            .filter(Column::ProviderId.eq(provider.id))
            .filter(Column::SystemName.eq(input.system_name.as_str()))
            .one(&self.db)
            .await?;

        let id = match existing {
            Some(model) => {
                let mut active: ModelActive = model.into();
                active.remote_id = ActiveValue::Set(input.remote_id.clone());
                active.model_type = ActiveValue::Set(input.model_type.clone());
                active.weight = ActiveValue::Set(input.weight);
                active.context_length = ActiveValue::Set(input.context_length);
                active.prices_json = ActiveValue::Set(input.prices_json.clone());
                active.updated_at = ActiveValue::Set(now);
                active.update(&self.db).await?.id
            }
            None => {
                let active = ModelActive {
                    id: ActiveValue::NotSet,
                    provider_id: ActiveValue::Set(provider.id),
                    system_name: ActiveValue::Set(input.system_name.clone()),
                    remote_id: ActiveValue::Set(input.remote_id.clone()),
                    model_type: ActiveValue::Set(input.model_type.clone()),
                    weight: ActiveValue::Set(input.weight),
                    context_length: ActiveValue::Set(input.context_length),
                    prices_json: ActiveValue::Set(input.prices_json.clone()),
                    updated_at: ActiveValue::Set(now),
                };
                entities::Models::insert(active)
                    .exec(&self.db)
                    .await?
                    .last_insert_id
            }
        };
        Ok(id)
    }

    async fn delete_model(&self, provider_name: &str, system_name: &str) -> StorageResult<()> {
        use entities::models::Column;
        use entities::providers::Column as ProviderColumn;
        let Some(provider) = entities::Providers::find()
            .filter(ProviderColumn::Name.eq(provider_name))
            .one(&self.db)
            .await?
        else {
            return Ok(());
        };
        entities::Models::delete_many()
            .filter(Column::ProviderId.eq(provider.id))
            .filter(Column::SystemName.eq(system_name))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn upsert_api_key(&self, key_value: &str, input: &ApiKeyInput) -> StorageResult<i64> {
        use entities::api_keys::{ActiveModel as KeyActive, Column};
        let now = OffsetDateTime::now_utc();

        // The admin "ensured-by-external-id" endpoint (§3) looks the row up
        // by external_id when present, falling back to key_value so the
        // same logical key can be re-issued a new opaque value.
        let existing = match input.external_id.as_deref() {
            Some(external_id) => {
                entities::ApiKeys::find()
                    .filter(Column::ExternalId.eq(external_id))
                    .one(&self.db)
                    .await?
            }
            None => {
                entities::ApiKeys::find()
                    .filter(Column::KeyValue.eq(key_value))
                    .one(&self.db)
                    .await?
            }
        };

        let id = match existing {
            Some(model) => {
                let mut active: KeyActive = model.into();
                active.key_value = ActiveValue::Set(key_value.to_string());
                active.external_id = ActiveValue::Set(input.external_id.clone());
                active.rpm_limit = ActiveValue::Set(input.rpm_limit);
                active.tpm_limit = ActiveValue::Set(input.tpm_limit);
                active.source = ActiveValue::Set(input.source.clone());
                active.comment = ActiveValue::Set(input.comment.clone());
                active.revoked = ActiveValue::Set(false);
                active.update(&self.db).await?.id
            }
            None => {
                let active = KeyActive {
                    id: ActiveValue::NotSet,
                    key_value: ActiveValue::Set(key_value.to_string()),
                    external_id: ActiveValue::Set(input.external_id.clone()),
                    revoked: ActiveValue::Set(false),
                    expires_at: ActiveValue::Set(None),
                    rpm_limit: ActiveValue::Set(input.rpm_limit),
                    tpm_limit: ActiveValue::Set(input.tpm_limit),
                    source: ActiveValue::Set(input.source.clone()),
                    comment: ActiveValue::Set(input.comment.clone()),
                    last_seen: ActiveValue::Set(None),
                    created_at: ActiveValue::Set(now),
                };
                entities::ApiKeys::insert(active)
                    .exec(&self.db)
                    .await?
                    .last_insert_id
            }
        };
        Ok(id)
    }

    async fn revoke_api_key(&self, key_value: &str) -> StorageResult<()> {
        use entities::api_keys::{ActiveModel as KeyActive, Column};
        let Some(model) = entities::ApiKeys::find()
            .filter(Column::KeyValue.eq(key_value))
            .one(&self.db)
            .await?
        else {
            return Ok(());
        };
        let mut active: KeyActive = model.into();
        active.revoked = ActiveValue::Set(true);
        active.update(&self.db).await?;
        Ok(())
    }

    async fn touch_api_key(&self, key_value: &str) -> StorageResult<Option<ApiKeyRow>> {
        use entities::api_keys::{ActiveModel as KeyActive, Column};
        let Some(model) = entities::ApiKeys::find()
            .filter(Column::KeyValue.eq(key_value))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        let now = OffsetDateTime::now_utc();
        let mut active: KeyActive = model.clone().into();
        active.last_seen = ActiveValue::Set(Some(now));
        let updated = active.update(&self.db).await?;
        Ok(Some(api_key_row(updated)))
    }

    async fn create_pending_completion(&self, input: &CompletionCreate) -> StorageResult<i64> {
        use entities::completions::ActiveModel as CompletionActive;
        let active = CompletionActive {
            id: ActiveValue::NotSet,
            api_key_id: ActiveValue::Set(input.api_key_id),
            model_id: ActiveValue::Set(input.model_id),
            requested_model: ActiveValue::Set(input.requested_model.clone()),
            prompt_json: ActiveValue::Set(input.prompt_json.clone()),
            prompt_tokens: ActiveValue::Set(-1),
            completion_json: ActiveValue::Set(None),
            completion_tokens: ActiveValue::Set(-1),
            status: ActiveValue::Set("pending".to_string()),
            ttft_ms: ActiveValue::Set(-1),
            duration_ms: ActiveValue::Set(-1),
            cached_response_body: ActiveValue::Set(None),
            cached_response_format: ActiveValue::Set(None),
            req_id: ActiveValue::Set(input.req_id.clone()),
            created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
        };
        Ok(entities::Completions::insert(active)
            .exec(&self.db)
            .await?
            .last_insert_id)
    }

    async fn finalize_completion(
        &self,
        completion_id: i64,
        finalize: &CompletionFinalize,
    ) -> StorageResult<()> {
        use entities::completions::ActiveModel as CompletionActive;
        let model = entities::Completions::find_by_id(completion_id)
            .one(&self.db)
            .await?
            .ok_or(StorageError::NotFound("completion"))?;
        let mut active: CompletionActive = model.into();
        active.status = ActiveValue::Set(finalize.status.as_str().to_string());
        if let Some(model_id) = finalize.model_id {
            active.model_id = ActiveValue::Set(Some(model_id));
        }
        active.prompt_tokens = ActiveValue::Set(finalize.prompt_tokens);
        active.completion_json = ActiveValue::Set(finalize.completion_json.clone());
        active.completion_tokens = ActiveValue::Set(finalize.completion_tokens);
        active.ttft_ms = ActiveValue::Set(finalize.ttft_ms);
        active.duration_ms = ActiveValue::Set(finalize.duration_ms);
        active.cached_response_body = ActiveValue::Set(finalize.cached_response_body.clone());
        active.cached_response_format = ActiveValue::Set(finalize.cached_response_format.clone());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn insert_embedding(&self, input: &EmbeddingCreate) -> StorageResult<i64> {
        use entities::embeddings::ActiveModel as EmbeddingActive;
        let active = EmbeddingActive {
            id: ActiveValue::NotSet,
            api_key_id: ActiveValue::Set(input.api_key_id),
            model_id: ActiveValue::Set(input.model_id),
            input_json: ActiveValue::Set(input.input_json.clone()),
            input_tokens: ActiveValue::Set(input.input_tokens),
            embedding_json: ActiveValue::Set(input.embedding_json.clone()),
            dimensions: ActiveValue::Set(input.dimensions),
            status: ActiveValue::Set(input.status.clone()),
            duration_ms: ActiveValue::Set(input.duration_ms),
            created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
        };
        Ok(entities::Embeddings::insert(active)
            .exec(&self.db)
            .await?
            .last_insert_id)
    }

    async fn claim_req_id(
        &self,
        api_key_id: i64,
        req_id: &str,
        completion: &CompletionCreate,
    ) -> StorageResult<DedupOutcome> {
        use entities::req_id_entries::Column as ReqIdColumn;

        // Atomic claim: insert the pending completion and the dedup entry in
        // one transaction. A unique-constraint violation on the entry means
        // another request beat us to it — fall through to a plain lookup.
        let txn = self.db.begin().await?;
        let completion_id = match entities::Completions::insert({
            use entities::completions::ActiveModel as CompletionActive;
            CompletionActive {
                id: ActiveValue::NotSet,
                api_key_id: ActiveValue::Set(api_key_id),
                model_id: ActiveValue::Set(completion.model_id),
                requested_model: ActiveValue::Set(completion.requested_model.clone()),
                prompt_json: ActiveValue::Set(completion.prompt_json.clone()),
                prompt_tokens: ActiveValue::Set(-1),
                completion_json: ActiveValue::Set(None),
                completion_tokens: ActiveValue::Set(-1),
                status: ActiveValue::Set("pending".to_string()),
                ttft_ms: ActiveValue::Set(-1),
                duration_ms: ActiveValue::Set(-1),
                cached_response_body: ActiveValue::Set(None),
                cached_response_format: ActiveValue::Set(None),
                req_id: ActiveValue::Set(Some(req_id.to_string())),
                created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
            }
        })
        .exec(&txn)
        .await
        {
            Ok(inserted) => inserted.last_insert_id,
            Err(err) => {
                txn.rollback().await.ok();
                return Err(err.into());
            }
        };

        let entry_result = entities::ReqIdEntries::insert({
            use entities::req_id_entries::ActiveModel as EntryActive;
            EntryActive {
                id: ActiveValue::NotSet,
                api_key_id: ActiveValue::Set(api_key_id),
                req_id: ActiveValue::Set(req_id.to_string()),
                completion_id: ActiveValue::Set(completion_id),
                state: ActiveValue::Set("in_flight".to_string()),
                created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
            }
        })
        .exec(&txn)
        .await;

        match entry_result {
            Ok(_) => {
                txn.commit().await?;
                Ok(DedupOutcome::NewRequest { completion_id })
            }
            Err(_unique_violation) => {
                txn.rollback().await.ok();
                self.lookup_req_id(api_key_id, req_id).await
            }
        }
    }

    async fn finalize_req_id(
        &self,
        api_key_id: i64,
        req_id: &str,
        completion_id: i64,
    ) -> StorageResult<()> {
        use entities::req_id_entries::{ActiveModel as EntryActive, Column};
        let Some(model) = entities::ReqIdEntries::find()
            .filter(Column::ApiKeyId.eq(api_key_id))
            .filter(Column::ReqId.eq(req_id))
            .one(&self.db)
            .await?
        else {
            return Ok(());
        };
        debug_assert_eq!(model.completion_id, completion_id);
        let mut active: EntryActive = model.into();
        active.state = ActiveValue::Set("finalized".to_string());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn finalize_req_id_on_error(&self, api_key_id: i64, req_id: &str) -> StorageResult<()> {
        use entities::req_id_entries::{ActiveModel as EntryActive, Column};
        let Some(model) = entities::ReqIdEntries::find()
            .filter(Column::ApiKeyId.eq(api_key_id))
            .filter(Column::ReqId.eq(req_id))
            .one(&self.db)
            .await?
        else {
            return Ok(());
        };
        let mut active: EntryActive = model.into();
        active.state = ActiveValue::Set("finalized".to_string());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn aggregate_usage(
        &self,
        api_key_id: i64,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> StorageResult<UsageAggregate> {
        use entities::completions::Column;
        let rows = entities::Completions::find()
            .filter(Column::ApiKeyId.eq(api_key_id))
            .filter(Column::CreatedAt.gte(from))
            .filter(Column::CreatedAt.lte(to))
            .filter(Column::Status.eq("completed"))
            .all(&self.db)
            .await?;

        let mut out = UsageAggregate::default();
        for row in &rows {
            out.matched_rows += 1;
            if row.prompt_tokens > 0 {
                out.prompt_tokens += row.prompt_tokens;
            }
            if row.completion_tokens > 0 {
                out.completion_tokens += row.completion_tokens;
            }
        }
        out.total_tokens = out.prompt_tokens + out.completion_tokens;
        Ok(out)
    }
}

impl SeaOrmStorage {
    async fn lookup_req_id(&self, api_key_id: i64, req_id: &str) -> StorageResult<DedupOutcome> {
        use entities::req_id_entries::Column;
        let Some(entry) = entities::ReqIdEntries::find()
            .filter(Column::ApiKeyId.eq(api_key_id))
            .filter(Column::ReqId.eq(req_id))
            .one(&self.db)
            .await?
        else {
            return Err(StorageError::NotFound("req_id_entry"));
        };
        if entry.state == "in_flight" {
            return Ok(DedupOutcome::InFlight);
        }
        let completion = entities::Completions::find_by_id(entry.completion_id)
            .one(&self.db)
            .await?
            .ok_or(StorageError::NotFound("completion"))?;
        Ok(DedupOutcome::CacheHit(completion_row(completion)))
    }
}
