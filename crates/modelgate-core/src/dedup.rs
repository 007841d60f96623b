//! Request-ID dedup gate (SPEC_FULL.md §4.6). Goes straight to
//! `modelgate_storage::storage::DedupOutcome` — the row-shaped outcome the
//! claim actually needs — rather than bridging through
//! `modelgate_provider_core::dedup`'s speculative swap-in-a-Redis-later
//! types, which nothing in this gateway constructs.

use rand::Rng;

pub use modelgate_provider_core::dedup::is_valid_req_id;

/// A small jittered 409 hint, per §4.6 "respond 409 with `Retry-After` (a
/// small jittered value)" — avoids every retrying client waking up on the
/// same tick.
pub fn retry_after_ms() -> u64 {
    let mut rng = rand::rng();
    rng.random_range(200..=800)
}
