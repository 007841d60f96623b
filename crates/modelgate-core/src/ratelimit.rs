//! Request-time wiring around `modelgate_provider_core::ratelimit`'s
//! limiters: turns a limiter outcome into the `X-RateLimit-*` headers
//! SPEC_FULL.md §6 lists, and decides whether to reject (§4.2, §4.3).

use modelgate_storage::ApiKeyRow;

use crate::state::AppState;

pub enum KeyLimitVerdict {
    Allowed { headers: Vec<(String, String)> },
    Rejected { kind: &'static str, headers: Vec<(String, String)> },
}

/// Per-key RPM then TPM check (§4.2). RPM is checked (and consumed) first;
/// TPM is a pre-flight check only here, consumed post-flight once token
/// counts are known.
pub fn check_key_limits(state: &AppState, key: &ApiKeyRow) -> KeyLimitVerdict {
    let rpm = state.rpm.check_and_increment(key.id, key.rpm_limit.max(0) as u32);
    let tpm = state.tpm.check(key.id, key.tpm_limit.max(0) as u32);

    let mut headers = vec![
        ("X-RateLimit-Limit-RPM".to_string(), rpm.limit.to_string()),
        ("X-RateLimit-Remaining-RPM".to_string(), rpm.remaining.to_string()),
        ("X-RateLimit-Limit-TPM".to_string(), tpm.limit.to_string()),
        ("X-RateLimit-Remaining-TPM".to_string(), tpm.remaining.to_string()),
    ];

    if !rpm.allowed {
        state.rate_limit_rejections.record(key.comment.as_deref().unwrap_or(""), "rpm");
        headers.push(("Retry-After".to_string(), "60".to_string()));
        return KeyLimitVerdict::Rejected { kind: "rpm", headers };
    }
    if !tpm.allowed {
        state.rate_limit_rejections.record(key.comment.as_deref().unwrap_or(""), "tpm");
        headers.push(("Retry-After".to_string(), "60".to_string()));
        return KeyLimitVerdict::Rejected { kind: "tpm", headers };
    }
    KeyLimitVerdict::Allowed { headers }
}

/// Per-model token-bucket check (§4.3). `identifier` is the resolved
/// `systemName`.
pub fn check_model_bucket(state: &AppState, identifier: &str) -> (bool, Vec<(String, String)>) {
    let outcome = state.bucket.consume(identifier, 1.0);
    let headers = vec![
        ("X-RateLimit-Limit".to_string(), outcome.limit.to_string()),
        ("X-RateLimit-Remaining".to_string(), outcome.remaining.to_string()),
    ];
    (outcome.allowed, headers)
}

/// Post-flight TPM charge (§4.2, §4.8/§4.9): unknown (`-1`) or partial
/// counts degrade to a zero charge rather than corrupting the window.
pub fn consume_tpm(state: &AppState, key_id: i64, prompt_tokens: i64, completion_tokens: i64) {
    let total = if prompt_tokens > 0 && completion_tokens > 0 { prompt_tokens + completion_tokens } else { 0 };
    state.tpm.consume(key_id, total);
}
