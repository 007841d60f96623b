use crate::provider::ProviderType;

/// One `(Model, Provider)` pair eligible to serve a logical model, per
/// SPEC_FULL.md §4.4. Produced by `modelgate-storage` from the snapshot;
/// the selection algorithm here is pure so it can be property-tested
/// without a database.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub model_id: i64,
    pub provider_id: i64,
    pub provider_name: String,
    pub provider_type: ProviderType,
    /// Provider-native model id; falls back to `system_name` if unset.
    pub remote_id: String,
    pub weight: u32,
}

/// Draws one candidate from `pool` weighted by `weight`, excluding
/// `weight == 0` entries from the random draw (they can still be returned
/// if they are the only candidates left, per §4.4 step 5). Removes the
/// chosen candidate from `pool` and returns it.
fn draw_weighted(pool: &mut Vec<Candidate>, rand_unit: f64) -> Option<Candidate> {
    if pool.is_empty() {
        return None;
    }
    let total_weight: u64 = pool.iter().map(|c| c.weight as u64).sum();
    if total_weight == 0 {
        // All zero-weight: return the first so the only-candidates-left
        // escape hatch in §4.4 step 5 still yields a result.
        return Some(pool.remove(0));
    }
    let r = (rand_unit * total_weight as f64) as u64;
    let mut cumulative: u64 = 0;
    for i in 0..pool.len() {
        if pool[i].weight == 0 {
            continue;
        }
        cumulative += pool[i].weight as u64;
        if cumulative > r {
            return Some(pool.remove(i));
        }
    }
    // Floating point edge case: draw landed exactly on the total. Fall
    // back to the last non-zero-weight candidate.
    let idx = pool.iter().rposition(|c| c.weight > 0)?;
    Some(pool.remove(idx))
}

/// Precomputes the full failover order via repeated weighted sampling
/// without replacement, capped at `max_attempts`. Called once per request,
/// before any attempt — failover never re-rolls mid-flight (§4.4, §4.7,
/// §9 "Weighted random + failover order").
pub fn order_candidates(
    mut candidates: Vec<Candidate>,
    max_attempts: usize,
    mut next_rand: impl FnMut() -> f64,
) -> Vec<Candidate> {
    let mut ordered = Vec::with_capacity(candidates.len().min(max_attempts));
    while !candidates.is_empty() && ordered.len() < max_attempts {
        let Some(chosen) = draw_weighted(&mut candidates, next_rand()) else {
            break;
        };
        ordered.push(chosen);
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: i64, weight: u32) -> Candidate {
        Candidate {
            model_id: id,
            provider_id: id,
            provider_name: format!("p{id}"),
            provider_type: ProviderType::OpenAi,
            remote_id: "gpt-4".to_string(),
            weight,
        }
    }

    #[test]
    fn zero_weight_excluded_unless_only_option() {
        let candidates = vec![candidate(1, 0)];
        let ordered = order_candidates(candidates, 3, || 0.0);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].model_id, 1);
    }

    #[test]
    fn order_respects_max_attempts() {
        let candidates = vec![candidate(1, 1), candidate(2, 1), candidate(3, 1)];
        let ordered = order_candidates(candidates, 2, || 0.5);
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn weighted_draw_is_deterministic_for_fixed_rand() {
        let candidates = vec![candidate(1, 1), candidate(2, 9)];
        // r = 0.99 * 10 = 9 -> cumulative after candidate 1 (w=1) is 1, not > 9;
        // after candidate 2 cumulative is 10 > 9 -> picks candidate 2 first.
        let ordered = order_candidates(candidates, 2, || 0.99);
        assert_eq!(ordered[0].model_id, 2);
    }
}
