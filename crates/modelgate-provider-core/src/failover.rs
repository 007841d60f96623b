//! The failover executor (SPEC_FULL.md §4.7). Generic over whatever an
//! "attempt" returns so it has no transport dependency — the concrete HTTP
//! call lives in `modelgate-provider-impl::upstream`.

use crate::errors::ProviderError;
use crate::resolver::Candidate;

#[derive(Debug, Clone)]
pub struct FailoverConfig {
    pub max_provider_attempts: usize,
    pub same_provider_retries: usize,
    pub timeout_ms: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            max_provider_attempts: 3,
            same_provider_retries: 1,
            timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttemptError {
    pub candidate_provider_id: i64,
    pub error: ProviderError,
}

pub enum FailoverOutcome<T> {
    Success {
        value: T,
        candidate: Candidate,
        attempt_errors: Vec<AttemptError>,
    },
    /// A non-retriable HTTP status was returned; per §4.7.1.d this is
    /// authoritative and must be forwarded to the client verbatim rather
    /// than triggering another attempt.
    NonRetriable {
        candidate: Candidate,
        error: ProviderError,
    },
    /// Every candidate was exhausted without a successful or
    /// non-retriable response.
    Exhausted { errors: Vec<AttemptError> },
}

/// Runs `attempt` against each pre-ordered candidate (never reordered
/// mid-flight), retrying same-provider transient failures up to
/// `same_provider_retries` times before moving to the next candidate, and
/// stopping at `max_provider_attempts` distinct providers.
pub async fn run_with_failover<T, F, Fut>(
    candidates: Vec<Candidate>,
    config: &FailoverConfig,
    mut attempt: F,
) -> FailoverOutcome<T>
where
    F: FnMut(Candidate) -> Fut,
    Fut: std::future::Future<Output = (Candidate, Result<T, ProviderError>)>,
{
    let mut errors = Vec::new();
    for candidate in candidates.into_iter().take(config.max_provider_attempts) {
        let provider_id = candidate.provider_id;
        let mut remaining_same_provider_retries = config.same_provider_retries;
        let mut current = candidate;
        loop {
            let (returned_candidate, result) = attempt(current.clone()).await;
            match result {
                Ok(value) => {
                    return FailoverOutcome::Success {
                        value,
                        candidate: returned_candidate,
                        attempt_errors: errors,
                    };
                }
                Err(err) => {
                    if !err.is_retriable() {
                        return FailoverOutcome::NonRetriable {
                            candidate: returned_candidate,
                            error: err,
                        };
                    }
                    errors.push(AttemptError {
                        candidate_provider_id: provider_id,
                        error: err,
                    });
                    if remaining_same_provider_retries > 0 {
                        remaining_same_provider_retries -= 1;
                        current = returned_candidate;
                        continue;
                    }
                    break;
                }
            }
        }
    }
    FailoverOutcome::Exhausted { errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderType;

    fn candidate(id: i64) -> Candidate {
        Candidate {
            model_id: id,
            provider_id: id,
            provider_name: format!("p{id}"),
            provider_type: ProviderType::OpenAi,
            remote_id: "gpt-4".to_string(),
            weight: 1,
        }
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let candidates = vec![candidate(1), candidate(2)];
        let config = FailoverConfig::default();
        let mut calls = 0;
        let outcome = run_with_failover(candidates, &config, |c| {
            calls += 1;
            async move { (c, Ok::<_, ProviderError>(42)) }
        })
        .await;
        assert_eq!(calls, 1);
        matches!(outcome, FailoverOutcome::Success { value: 42, .. });
    }

    #[tokio::test]
    async fn non_retriable_short_circuits() {
        let candidates = vec![candidate(1), candidate(2)];
        let config = FailoverConfig::default();
        let mut calls = 0;
        let outcome = run_with_failover(candidates, &config, |c| {
            calls += 1;
            async move {
                (
                    c,
                    Err::<i32, _>(ProviderError::Status {
                        status: 401,
                        body: bytes::Bytes::new(),
                        retriable: false,
                    }),
                )
            }
        })
        .await;
        assert_eq!(calls, 1);
        assert!(matches!(outcome, FailoverOutcome::NonRetriable { .. }));
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let candidates = vec![candidate(1), candidate(2), candidate(3)];
        let config = FailoverConfig {
            max_provider_attempts: 2,
            same_provider_retries: 0,
            timeout_ms: 1000,
        };
        let mut calls = 0;
        let outcome = run_with_failover(candidates, &config, |c| {
            calls += 1;
            async move { (c, Err::<i32, _>(ProviderError::Network("boom".into()))) }
        })
        .await;
        assert_eq!(calls, 2);
        assert!(matches!(outcome, FailoverOutcome::Exhausted { .. }));
    }
}
