//! Process bootstrap (SPEC_FULL.md §1.1, §6): `clap`-derived CLI args with
//! `env = "..."` fallbacks, sqlite-by-default DSN with parent-directory
//! creation, a merged global config (CLI > ENV > DB, the same precedence as
//! `GlobalConfigPatch::overlay`), and the initial `AppState` snapshot.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use modelgate_common::{GlobalConfig, GlobalConfigPatch};
use modelgate_storage::{SeaOrmStorage, Storage};

use crate::state::AppState;

#[derive(Debug, Clone, Parser)]
#[command(name = "modelgate", version, about = "LLM API gateway")]
pub struct CliArgs {
    /// Database DSN (sqlite by default).
    #[arg(long, env = "DATABASE_URL")]
    pub dsn: Option<String>,

    /// Bind host.
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port.
    #[arg(long, env = "PORT")]
    pub port: Option<String>,

    /// Admin secret (plaintext); stored and compared as a blake3 hash.
    #[arg(long, env = "ADMIN_SUPER_SECRET")]
    pub admin_key: Option<String>,

    /// Optional outbound proxy for upstream requests.
    #[arg(long)]
    pub proxy: Option<String>,

    /// Redact sensitive headers/body fields in structured logs.
    #[arg(long, env = "EVENT_REDACT_SENSITIVE")]
    pub event_redact_sensitive: Option<String>,

    /// Default per-model token-bucket capacity (§4.3); per-model overrides
    /// are set later via the admin surface.
    #[arg(long, env = "DEFAULT_RATE_LIMIT", default_value_t = 60.0)]
    pub default_rate_limit: f64,

    /// Default per-model token-bucket refill rate, tokens/sec (§4.3).
    #[arg(long, env = "DEFAULT_REFILL_RATE", default_value_t = 1.0)]
    pub default_refill_rate: f64,
}

pub struct Bootstrap {
    pub storage: Arc<SeaOrmStorage>,
    pub state: Arc<AppState>,
}

pub async fn bootstrap_from_env() -> anyhow::Result<Bootstrap> {
    let args = CliArgs::parse();
    bootstrap(args).await
}

pub async fn bootstrap(args: CliArgs) -> anyhow::Result<Bootstrap> {
    let dsn = sanitize_dsn_value(args.dsn.clone());
    let host = sanitize_optional_env_value(args.host.clone());
    let port = parse_u16_env_value(args.port.clone(), "PORT")?;
    let admin_key = sanitize_optional_env_value(args.admin_key.clone());
    let proxy = sanitize_optional_env_value(args.proxy.clone());
    let event_redact_sensitive = parse_bool_env_value(args.event_redact_sensitive.clone(), "EVENT_REDACT_SENSITIVE")?;

    ensure_sqlite_parent_dir(&dsn)?;

    // 1) connect DB from CLI/ENV DSN (required).
    let storage = Arc::new(SeaOrmStorage::connect(&dsn).await.context("connect storage")?);
    storage.sync().await.context("schema sync")?;

    // 2) load the persisted settings row (if any), then merge once: CLI > ENV > DB.
    // clap already applies CLI > ENV precedence per field; we then overlay on DB.
    let settings_row = storage.load_settings().await.context("load settings")?;
    let mut merged = settings_row
        .as_ref()
        .map(|row| GlobalConfigPatch::from(row.config.clone()))
        .unwrap_or_default();
    let init_config_applied = settings_row.map(|row| row.init_config_applied).unwrap_or(false);

    // Select admin key source:
    // - CLI/ENV provided key wins and overwrites DB (hash stored)
    // - else, if DB missing admin_key_hash, generate one and persist (print plaintext once)
    let mut admin_key_hash_override: Option<String> = None;
    if let Some(key_plain) = admin_key.as_deref() {
        admin_key_hash_override = Some(hash_admin_key(key_plain));
    } else if merged.admin_key_hash.is_none() {
        let key_plain = generate_admin_key();
        eprintln!("generated admin key: {key_plain}");
        admin_key_hash_override = Some(hash_admin_key(&key_plain));
    }

    let cli_patch = GlobalConfigPatch {
        host,
        port,
        admin_key_hash: admin_key_hash_override,
        proxy,
        dsn: Some(dsn),
        event_redact_sensitive,
    };
    merged.overlay(cli_patch);

    let global: GlobalConfig = merged.into_config().context("finalize merged global config")?;

    // 3) persist merged global config back to DB.
    storage.upsert_settings(&global, init_config_applied).await.context("upsert settings")?;

    // 4) load the routing data once (providers/models/api keys).
    let snapshot = storage.load_snapshot().await.context("load snapshot")?;

    // 5) build in-memory state (all runtime reads come from here).
    let state = Arc::new(AppState::new(storage.clone(), global, snapshot, args.default_rate_limit, args.default_refill_rate));

    Ok(Bootstrap { storage, state })
}

fn sanitize_optional_env_value(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        return None;
    }
    // Some PaaS systems may inject unresolved placeholders like `${VAR}`.
    // Treat them as "not set" so startup doesn't fail on URL parsing.
    if trimmed.starts_with("${") && trimmed.ends_with('}') {
        return None;
    }
    Some(trimmed)
}

fn sanitize_dsn_value(value: Option<String>) -> String {
    sanitize_optional_env_value(value).unwrap_or_else(default_dsn)
}

fn default_dsn() -> String {
    if let Some(data_dir) = sanitize_optional_env_value(std::env::var("MODELGATE_DATA_DIR").ok()) {
        let dir = data_dir.trim_end_matches('/');
        return format!("sqlite://{dir}/modelgate.db?mode=rwc");
    }
    "sqlite://modelgate.db?mode=rwc".to_string()
}

fn ensure_sqlite_parent_dir(dsn: &str) -> anyhow::Result<()> {
    let Some(db_path) = sqlite_file_path_from_dsn(dsn) else {
        return Ok(());
    };
    let Some(parent) = db_path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    std::fs::create_dir_all(parent).with_context(|| format!("create sqlite parent dir {}", parent.display()))?;
    Ok(())
}

fn sqlite_file_path_from_dsn(dsn: &str) -> Option<PathBuf> {
    let rest = dsn.strip_prefix("sqlite:")?;
    let path_part = rest.split(['?', '#']).next()?.trim();
    if path_part.is_empty() {
        return None;
    }

    let mut normalized = path_part;
    if let Some(stripped) = normalized.strip_prefix("//") {
        normalized = stripped;
    }

    let memory = normalized.to_ascii_lowercase();
    if memory == ":memory:" {
        return None;
    }

    Some(PathBuf::from(normalized))
}

fn parse_u16_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<u16>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = raw.parse::<u16>().with_context(|| format!("invalid {env_name} value: {raw}"))?;
    Ok(Some(parsed))
}

fn parse_bool_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<bool>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => return Err(anyhow::anyhow!("invalid {env_name} value: {raw}")),
    };
    Ok(Some(parsed))
}

fn hash_admin_key(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

fn generate_admin_key() -> String {
    // Random enough for a bootstrap key; stored only in memory/printed once.
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::sqlite_file_path_from_dsn;

    #[test]
    fn sqlite_dsn_resolves_relative_path() {
        let path = sqlite_file_path_from_dsn("sqlite://modelgate.db?mode=rwc").unwrap();
        assert_eq!(path.to_string_lossy(), "modelgate.db");
    }

    #[test]
    fn sqlite_dsn_resolves_absolute_path() {
        let path = sqlite_file_path_from_dsn("sqlite://app/data/modelgate.db?mode=rwc").unwrap();
        assert_eq!(path.to_string_lossy(), "/app/data/modelgate.db");
    }

    #[test]
    fn sqlite_memory_dsn_is_ignored() {
        assert!(sqlite_file_path_from_dsn("sqlite::memory:").is_none());
        assert!(sqlite_file_path_from_dsn("sqlite://:memory:").is_none());
    }
}
