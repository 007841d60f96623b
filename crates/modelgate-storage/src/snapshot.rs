//! Row types read out of the database at bootstrap (and on admin mutation)
//! into the in-memory snapshot `modelgate-core` swaps into its `ArcSwap` —
//! the runtime request path never queries these tables directly.

use modelgate_common::GlobalConfig;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

#[derive(Debug, Clone)]
pub struct SettingsRow {
    pub id: i64,
    pub config: GlobalConfig,
    pub init_config_applied: bool,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct ProviderRow {
    pub id: i64,
    pub name: String,
    pub provider_type: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub proxy: Option<String>,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct ModelRow {
    pub id: i64,
    pub provider_id: i64,
    pub system_name: String,
    pub remote_id: Option<String>,
    pub model_type: String,
    pub weight: f64,
    pub context_length: Option<i64>,
    pub prices_json: Option<JsonValue>,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct ApiKeyRow {
    pub id: i64,
    pub key_value: String,
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

impl ApiKeyRow {
    pub fn is_usable(&self, now: OffsetDateTime) -> bool {
        !self.revoked && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

#[derive(Debug, Clone)]
pub struct StorageSnapshot {
    pub settings: Option<SettingsRow>,
    pub providers: Vec<ProviderRow>,
    pub models: Vec<ModelRow>,
    pub api_keys: Vec<ApiKeyRow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn row(revoked: bool, expires_at: Option<OffsetDateTime>) -> ApiKeyRow {
        ApiKeyRow {
            id: 1,
            key_value: "sk-test".to_string(),
            external_id: None,
            revoked,
            expires_at,
            rpm_limit: 60,
            tpm_limit: 100_000,
            source: "admin".to_string(),
            comment: None,
            last_seen: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn revoked_key_is_unusable() {
        assert!(!row(true, None).is_usable(OffsetDateTime::now_utc()));
    }

    #[test]
    fn expired_key_is_unusable() {
        let now = OffsetDateTime::now_utc();
        assert!(!row(false, Some(now - Duration::seconds(1))).is_usable(now));
    }

    #[test]
    fn active_key_with_no_expiry_is_usable() {
        assert!(row(false, None).is_usable(OffsetDateTime::now_utc()));
    }

    #[test]
    fn active_key_with_future_expiry_is_usable() {
        let now = OffsetDateTime::now_utc();
        assert!(row(false, Some(now + Duration::seconds(60))).is_usable(now));
    }
}
