//! The only crate in the workspace that knows about axum. Turns
//! `modelgate-core`'s transport-agnostic `GatewayResponse` into a real
//! HTTP response and mounts the six ingress routes of SPEC_FULL.md §6.

mod proxy;

pub use proxy::proxy_router;
