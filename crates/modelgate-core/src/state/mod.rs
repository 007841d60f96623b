//! Process-wide runtime state (SPEC_FULL.md §5 "Global mutable config" /
//! §9 "read-mostly config with copy-on-write"). `AppState` is built once at
//! bootstrap and handed to every request as an `Arc`; the only mutation
//! during normal operation is an `ArcSwap::store` after an admin write.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;

use modelgate_common::GlobalConfig;
use modelgate_provider_core::failover::FailoverConfig;
use modelgate_provider_core::provider::{ProviderConfig, ProviderType};
use modelgate_provider_core::ratelimit::{RateLimitRejectionMetrics, RpmLimiter, TokenBucketLimiter, TpmLimiter};
use modelgate_provider_core::resolver::Candidate;
use modelgate_storage::{Storage, StorageResult, StorageSnapshot};

/// One admin-configured `Provider` row, resolved to the config shape
/// `modelgate-provider-impl::provider_for` expects.
#[derive(Debug, Clone)]
pub struct ProviderEntry {
    pub id: i64,
    pub name: String,
    pub config: ProviderConfig,
}

/// Candidate pools for every `systemName` the routing table has seen,
/// rebuilt wholesale from a `StorageSnapshot` on every admin mutation
/// (SPEC_FULL.md §4.4). The request path never queries the DB for this.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    pub providers: HashMap<i64, ProviderEntry>,
    pub chat_candidates: HashMap<String, Vec<Candidate>>,
    pub embedding_candidates: HashMap<String, Vec<Candidate>>,
    pub system_names: Vec<String>,
}

pub fn build_routing_table(snapshot: &StorageSnapshot) -> RoutingTable {
    let mut providers = HashMap::new();
    for provider in &snapshot.providers {
        let provider_type = provider.provider_type.parse::<ProviderType>().unwrap_or(ProviderType::OpenAi);
        providers.insert(
            provider.id,
            ProviderEntry {
                id: provider.id,
                name: provider.name.clone(),
                config: ProviderConfig {
                    provider_type,
                    base_url: provider.base_url.clone(),
                    api_key: provider.api_key.clone(),
                    api_version: provider.api_version.clone(),
                    proxy: provider.proxy.clone(),
                },
            },
        );
    }

    let mut chat_candidates: HashMap<String, Vec<Candidate>> = HashMap::new();
    let mut embedding_candidates: HashMap<String, Vec<Candidate>> = HashMap::new();
    let mut names = BTreeSet::new();

    for model in &snapshot.models {
        let Some(provider) = providers.get(&model.provider_id) else {
            continue;
        };
        names.insert(model.system_name.clone());
        let candidate = Candidate {
            model_id: model.id,
            provider_id: model.provider_id,
            provider_name: provider.name.clone(),
            provider_type: provider.config.provider_type,
            remote_id: model.remote_id.clone().unwrap_or_else(|| model.system_name.clone()),
            weight: model.weight.max(0.0) as u32,
        };
        let bucket = match model.model_type.as_str() {
            "embedding" => &mut embedding_candidates,
            _ => &mut chat_candidates,
        };
        bucket.entry(model.system_name.clone()).or_default().push(candidate);
    }

    RoutingTable {
        providers,
        chat_candidates,
        embedding_candidates,
        system_names: names.into_iter().collect(),
    }
}

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub global: ArcSwap<GlobalConfig>,
    pub routing: ArcSwap<RoutingTable>,
    pub rpm: RpmLimiter,
    pub tpm: TpmLimiter,
    pub bucket: TokenBucketLimiter,
    pub rate_limit_rejections: RateLimitRejectionMetrics,
    pub failover: FailoverConfig,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        global: GlobalConfig,
        snapshot: StorageSnapshot,
        default_bucket_capacity: f64,
        default_bucket_refill_per_sec: f64,
    ) -> Self {
        Self {
            storage,
            global: ArcSwap::from_pointee(global),
            routing: ArcSwap::from_pointee(build_routing_table(&snapshot)),
            rpm: RpmLimiter::new(),
            tpm: TpmLimiter::new(),
            bucket: TokenBucketLimiter::new(default_bucket_capacity, default_bucket_refill_per_sec),
            rate_limit_rejections: RateLimitRejectionMetrics::new(),
            failover: FailoverConfig::default(),
        }
    }

    /// Reloads the routing table after an admin mutation. In-flight
    /// requests reading the old `Arc<RoutingTable>` finish against it
    /// unaffected; new requests see the new one the instant this returns.
    pub async fn refresh_routing(&self) -> StorageResult<()> {
        let snapshot = self.storage.load_snapshot().await?;
        self.routing.store(Arc::new(build_routing_table(&snapshot)));
        Ok(())
    }
}
