//! Transport: dials a `NativeRequest` over HTTP. Provider impls build the
//! request, this module is the only place that actually touches the
//! network, and `modelgate-provider-core::failover` decides whether a
//! `ProviderError` here is worth retrying.

use std::io;
use std::pin::Pin;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{info, warn};

use modelgate_provider_core::errors::{ProviderError, ProviderResult};
use modelgate_provider_core::provider::{NativeRequest, ProviderType};

use crate::client::client_for_proxy;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>;

pub enum UpstreamBody {
    Unary(Bytes),
    Stream(ByteStream),
}

/// Fires one HTTP attempt. `extra_headers` are the inbound request's
/// pass-through headers (SPEC_FULL.md §6); provider-specific auth headers
/// are already part of `request.headers`.
pub async fn dispatch(
    provider_type: ProviderType,
    base_url: &str,
    proxy: Option<&str>,
    request: &NativeRequest,
    extra_headers: &[(String, String)],
    timeout: Duration,
    is_stream: bool,
) -> ProviderResult<UpstreamBody> {
    let client = client_for_proxy(proxy)?;
    let url = format!("{}{}", base_url.trim_end_matches('/'), request.path);

    let mut builder = client
        .request(request.method.clone(), url.as_str())
        .timeout(timeout)
        .json(&request.body);
    for (name, value) in request.headers.iter().chain(extra_headers.iter()) {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let started_at = Instant::now();
    let response = builder.send().await.map_err(|err| {
        warn!(
            provider = provider_type.as_str(),
            error = %err,
            "upstream request failed"
        );
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network(err.to_string())
        }
    })?;

    let status = response.status();
    info!(
        provider = provider_type.as_str(),
        status = status.as_u16(),
        elapsed_ms = started_at.elapsed().as_millis(),
        is_stream,
        "upstream response"
    );

    if !status.is_success() {
        let body = response
            .bytes()
            .await
            .map_err(|err| ProviderError::Network(err.to_string()))?;
        return Err(ProviderError::retriable_status(status.as_u16(), body));
    }

    if is_stream {
        let stream = response
            .bytes_stream()
            .map(|item| item.map_err(|err| io::Error::other(err.to_string())));
        Ok(UpstreamBody::Stream(Box::pin(stream)))
    } else {
        let body = response
            .bytes()
            .await
            .map_err(|err| ProviderError::Network(err.to_string()))?;
        Ok(UpstreamBody::Unary(body))
    }
}
