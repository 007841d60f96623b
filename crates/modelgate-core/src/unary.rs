//! Unary (non-streaming) response processing (SPEC_FULL.md §4.9).

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

use modelgate_provider_core::errors::{ProviderError, ProviderResult};
use modelgate_protocol::ir::IrResponse;
use modelgate_provider_impl::UpstreamBody;

/// Buffers `body` fully (draining a streamed reply if the provider ignored
/// `stream: false`) and parses it via `provider.parse_response`.
pub async fn collect_body(body: UpstreamBody) -> ProviderResult<Bytes> {
    match body {
        UpstreamBody::Unary(bytes) => Ok(bytes),
        UpstreamBody::Stream(mut stream) => {
            let mut buf = BytesMut::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| ProviderError::Network(e.to_string()))?;
                buf.extend_from_slice(&chunk);
            }
            Ok(buf.freeze())
        }
    }
}

pub fn parse(provider: &dyn modelgate_provider_core::provider::Provider, bytes: &Bytes) -> ProviderResult<IrResponse> {
    provider.parse_response(bytes)
}
