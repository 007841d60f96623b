//! Concrete upstream provider wire formats.
//!
//! This crate turns `modelgate_provider_core::Provider` into real
//! implementations (openai, openai-responses, anthropic — azure and ollama
//! reuse the openai one), a dialect-agnostic stream framing decoder, an
//! http client cache, and the transport that actually dials out.

mod client;
pub mod providers;
mod stream;
pub mod upstream;

pub use client::client_for_proxy;
pub use providers::provider_for;
pub use stream::StreamDecoder;
pub use upstream::{ByteStream, UpstreamBody};
