//! Provider abstractions, the resolver/load balancer, the failover
//! executor, rate limiting, and dedup types for the request pipeline.
//!
//! This crate intentionally does not depend on axum, a concrete HTTP
//! client, or sea-orm: provider implementations build `NativeRequest`
//! values, a higher layer performs IO, and storage owns persistence.

pub mod dedup;
pub mod errors;
pub mod failover;
pub mod headers;
pub mod provider;
pub mod ratelimit;
pub mod resolver;

pub use dedup::is_valid_req_id;
pub use errors::{ProviderError, ProviderResult};
pub use failover::{AttemptError, FailoverConfig, FailoverOutcome, run_with_failover};
pub use headers::{Headers, header_get, header_remove, header_set};
pub use provider::{
    EmbeddingsInput, EmbeddingsResult, NativeRequest, Provider, ProviderConfig, ProviderOperation,
    ProviderType, RawStreamChunk, StreamDecodeState,
};
pub use ratelimit::{
    RateLimitRejectionMetrics, RpmLimiter, RpmOutcome, TokenBucketLimiter, TokenBucketOutcome,
    TpmLimiter, TpmOutcome,
};
pub use resolver::{Candidate, order_candidates};
