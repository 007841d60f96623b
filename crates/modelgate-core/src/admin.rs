//! Minimal in-process admin surface (SPEC_FULL.md §1: "implemented only to
//! the extent the core needs somewhere to read its routing table from; it
//! is not a feature-complete admin product"). Every mutation refreshes
//! `AppState::routing` so the next request sees it immediately.

use modelgate_storage::{
    ApiKeyInput, ModelInput, ProviderInput, StorageResult, StorageSnapshot,
};

use crate::state::AppState;

pub async fn upsert_provider(state: &AppState, input: &ProviderInput) -> StorageResult<i64> {
    let id = state.storage.upsert_provider(input).await?;
    state.refresh_routing().await?;
    Ok(id)
}

pub async fn delete_provider(state: &AppState, name: &str) -> StorageResult<()> {
    state.storage.delete_provider(name).await?;
    state.refresh_routing().await?;
    Ok(())
}

pub async fn upsert_model(state: &AppState, input: &ModelInput) -> StorageResult<i64> {
    let id = state.storage.upsert_model(input).await?;
    state.refresh_routing().await?;
    Ok(id)
}

pub async fn delete_model(state: &AppState, provider_name: &str, system_name: &str) -> StorageResult<()> {
    state.storage.delete_model(provider_name, system_name).await?;
    state.refresh_routing().await?;
    Ok(())
}

pub async fn upsert_api_key(state: &AppState, key_value: &str, input: &ApiKeyInput) -> StorageResult<i64> {
    state.storage.upsert_api_key(key_value, input).await
}

pub async fn revoke_api_key(state: &AppState, key_value: &str) -> StorageResult<()> {
    state.storage.revoke_api_key(key_value).await
}

/// Settings snapshot endpoint: the current providers/models/keys/settings,
/// for an admin UI (out of scope here) to render.
pub async fn snapshot(state: &AppState) -> StorageResult<StorageSnapshot> {
    state.storage.load_snapshot().await
}
