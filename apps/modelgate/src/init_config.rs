//! One-shot provider/model/key seeding from `INIT_CONFIG_PATH` or
//! `INIT_CONFIG_JSON`, gated by `ENABLE_INIT_CONFIG` and the persisted
//! `init_config_applied` flag (SPEC_FULL.md §6) so a restart doesn't
//! re-clobber values the admin API has since changed. `FORCILY_ADD_API_KEYS`
//! is a separate, always-on escape hatch for ops to pin a known key on
//! every boot regardless of whether init-config already ran once.

use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use modelgate_core::admin;
use modelgate_core::state::AppState;
use modelgate_storage::{ApiKeyInput, ModelInput, ProviderInput, SeaOrmStorage, Storage};

#[derive(Debug, Default, Deserialize)]
struct InitConfig {
    #[serde(default)]
    providers: Vec<InitProvider>,
    #[serde(default)]
    models: Vec<InitModel>,
    #[serde(default)]
    api_keys: Vec<InitApiKey>,
}

#[derive(Debug, Deserialize)]
struct InitProvider {
    name: String,
    provider_type: String,
    base_url: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    api_version: Option<String>,
    #[serde(default)]
    proxy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InitModel {
    provider: String,
    system_name: String,
    #[serde(default)]
    remote_id: Option<String>,
    #[serde(default = "default_model_type")]
    model_type: String,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default)]
    context_length: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct InitApiKey {
    key: String,
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default = "default_rpm_limit")]
    rpm_limit: i32,
    #[serde(default = "default_tpm_limit")]
    tpm_limit: i32,
    #[serde(default)]
    comment: Option<String>,
}

fn default_model_type() -> String {
    "chat".to_string()
}

fn default_weight() -> f64 {
    1.0
}

fn default_rpm_limit() -> i32 {
    60
}

fn default_tpm_limit() -> i32 {
    100_000
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn env_nonempty(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/// Runs once at startup, after `AppState` is built. No-op unless
/// `ENABLE_INIT_CONFIG` is truthy and the DB hasn't already applied one.
pub async fn apply(state: &Arc<AppState>, storage: &Arc<SeaOrmStorage>) -> anyhow::Result<()> {
    if env_flag("ENABLE_INIT_CONFIG") {
        let already_applied = storage.load_settings().await?.map(|row| row.init_config_applied).unwrap_or(false);
        if already_applied {
            tracing::info!("init config already applied, skipping");
        } else if let Some(config) = load_init_config()? {
            apply_config(state, &config).await?;
            let global = state.global.load().as_ref().clone();
            storage.upsert_settings(&global, true).await.context("mark init config applied")?;
            tracing::info!(
                providers = config.providers.len(),
                models = config.models.len(),
                api_keys = config.api_keys.len(),
                "applied init config"
            );
        } else {
            tracing::warn!("ENABLE_INIT_CONFIG is set but neither INIT_CONFIG_PATH nor INIT_CONFIG_JSON is readable");
        }
    }

    force_add_api_keys(state).await
}

fn load_init_config() -> anyhow::Result<Option<InitConfig>> {
    if let Some(path) = env_nonempty("INIT_CONFIG_PATH") {
        let body = std::fs::read_to_string(&path).with_context(|| format!("read INIT_CONFIG_PATH {path}"))?;
        return Ok(Some(serde_json::from_str(&body).with_context(|| format!("parse INIT_CONFIG_PATH {path}"))?));
    }
    if let Some(json) = env_nonempty("INIT_CONFIG_JSON") {
        return Ok(Some(serde_json::from_str(&json).context("parse INIT_CONFIG_JSON")?));
    }
    Ok(None)
}

async fn apply_config(state: &Arc<AppState>, config: &InitConfig) -> anyhow::Result<()> {
    for provider in &config.providers {
        let input = ProviderInput {
            name: provider.name.clone(),
            provider_type: provider.provider_type.clone(),
            base_url: provider.base_url.clone(),
            api_key: provider.api_key.clone(),
            api_version: provider.api_version.clone(),
            proxy: provider.proxy.clone(),
        };
        admin::upsert_provider(state, &input).await.with_context(|| format!("seed provider {}", provider.name))?;
    }
    for model in &config.models {
        let input = ModelInput {
            provider_name: model.provider.clone(),
            system_name: model.system_name.clone(),
            remote_id: model.remote_id.clone(),
            model_type: model.model_type.clone(),
            weight: model.weight,
            context_length: model.context_length,
            prices_json: None,
        };
        admin::upsert_model(state, &input)
            .await
            .with_context(|| format!("seed model {}@{}", model.system_name, model.provider))?;
    }
    for key in &config.api_keys {
        let input = ApiKeyInput {
            external_id: key.external_id.clone(),
            rpm_limit: key.rpm_limit,
            tpm_limit: key.tpm_limit,
            source: "init_config".to_string(),
            comment: key.comment.clone(),
        };
        admin::upsert_api_key(state, &key.key, &input).await.with_context(|| "seed api key".to_string())?;
    }
    Ok(())
}

/// `FORCILY_ADD_API_KEYS=sk-a,sk-b` ensures those keys exist (generous
/// default limits) on every boot, independent of `init_config_applied` —
/// meant for an operator's always-present break-glass key, not bulk seeding.
async fn force_add_api_keys(state: &Arc<AppState>) -> anyhow::Result<()> {
    let Some(raw) = env_nonempty("FORCILY_ADD_API_KEYS") else {
        return Ok(());
    };
    for key_value in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let input = ApiKeyInput {
            external_id: None,
            rpm_limit: default_rpm_limit(),
            tpm_limit: default_tpm_limit(),
            source: "forcily_add".to_string(),
            comment: Some("FORCILY_ADD_API_KEYS".to_string()),
        };
        admin::upsert_api_key(state, key_value, &input).await.context("force-add api key")?;
    }
    Ok(())
}
