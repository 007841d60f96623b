//! Model resolution: `model@provider` parsing, candidate-pool lookup, and
//! weighted-random ordering (SPEC_FULL.md §4.4).

use modelgate_provider_core::provider::ProviderOperation;
use modelgate_provider_core::resolver::{Candidate, order_candidates};

use crate::state::RoutingTable;

pub enum ResolveError {
    NotFound,
}

/// Splits `"gpt-4@openai-prod"` into `("gpt-4", Some("openai-prod"))`; a
/// model name with no `@` (or an empty suffix) resolves with no pin.
pub fn parse_model_spec(model: &str) -> (&str, Option<&str>) {
    match model.rsplit_once('@') {
        Some((name, provider)) if !provider.is_empty() && !name.is_empty() => (name, Some(provider)),
        _ => (model, None),
    }
}

/// Resolves `model` against the routing table, pinning to `header_provider`
/// (from `X-Provider`) or the `@provider` suffix when present, and returns
/// the failover-ordered candidate list. Falls back to the full pool with a
/// warning if the pin names a provider with no candidates for this model,
/// per §4.4 "a header/suffix naming an unknown provider is not fatal".
pub fn resolve(
    table: &RoutingTable,
    model: &str,
    header_provider: Option<&str>,
    op: ProviderOperation,
    max_attempts: usize,
    next_rand: impl FnMut() -> f64,
) -> Result<(String, Vec<Candidate>), ResolveError> {
    let (system_name, suffix_provider) = parse_model_spec(model);
    let pool = match op {
        ProviderOperation::Chat => table.chat_candidates.get(system_name),
        ProviderOperation::Embeddings => table.embedding_candidates.get(system_name),
    };
    let Some(pool) = pool else {
        return Err(ResolveError::NotFound);
    };
    if pool.is_empty() {
        return Err(ResolveError::NotFound);
    }

    let target_provider = header_provider.or(suffix_provider);
    let candidates: Vec<Candidate> = if let Some(provider_name) = target_provider {
        let filtered: Vec<Candidate> = pool.iter().filter(|c| c.provider_name == provider_name).cloned().collect();
        if filtered.is_empty() {
            tracing::warn!(model = system_name, provider = provider_name, "pinned provider has no candidates for this model, falling back to the full pool");
            pool.clone()
        } else {
            filtered
        }
    } else {
        pool.clone()
    };

    if candidates.is_empty() {
        return Err(ResolveError::NotFound);
    }

    let ordered = order_candidates(candidates, max_attempts, next_rand);
    Ok((system_name.to_string(), ordered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_provider_core::provider::ProviderType;
    use std::collections::HashMap;

    #[test]
    fn parses_model_at_provider_suffix() {
        assert_eq!(parse_model_spec("gpt-4@openai-prod"), ("gpt-4", Some("openai-prod")));
    }

    #[test]
    fn plain_model_name_has_no_provider_pin() {
        assert_eq!(parse_model_spec("gpt-4"), ("gpt-4", None));
    }

    #[test]
    fn trailing_bare_at_sign_is_not_a_pin() {
        assert_eq!(parse_model_spec("gpt-4@"), ("gpt-4@", None));
    }

    fn candidate(provider_id: i64, provider_name: &str) -> Candidate {
        Candidate {
            model_id: provider_id,
            provider_id,
            provider_name: provider_name.to_string(),
            provider_type: ProviderType::OpenAi,
            remote_id: "gpt-4".to_string(),
            weight: 1,
        }
    }

    fn table_with(pool: Vec<Candidate>) -> RoutingTable {
        let mut chat_candidates = HashMap::new();
        chat_candidates.insert("gpt-4".to_string(), pool);
        RoutingTable { chat_candidates, ..Default::default() }
    }

    #[test]
    fn unknown_model_is_not_found() {
        let table = RoutingTable::default();
        let err = resolve(&table, "gpt-4", None, ProviderOperation::Chat, 3, || 0.0);
        assert!(matches!(err, Err(ResolveError::NotFound)));
    }

    #[test]
    fn pin_naming_unknown_provider_falls_back_to_full_pool() {
        let table = table_with(vec![candidate(1, "vendorY")]);
        let (name, candidates) = resolve(&table, "gpt-4@vendorX", None, ProviderOperation::Chat, 3, || 0.0).unwrap();
        assert_eq!(name, "gpt-4");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provider_name, "vendorY");
    }

    #[test]
    fn header_provider_pin_wins_over_model_suffix_pin() {
        let table = table_with(vec![candidate(1, "vendorA"), candidate(2, "vendorB")]);
        let (_, candidates) = resolve(&table, "gpt-4@vendorA", Some("vendorB"), ProviderOperation::Chat, 3, || 0.0).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provider_name, "vendorB");
    }
}
