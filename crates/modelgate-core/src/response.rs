//! The transport-agnostic response shape every code path in this crate
//! produces. `modelgate-router` is the only place that turns this into an
//! axum `Response` — this crate has no axum dependency.

use bytes::Bytes;
use http::StatusCode;
use std::io;
use tokio::sync::mpsc::UnboundedReceiver;

pub enum ResponseBody {
    Unary(Bytes),
    /// Fed by a detached task that keeps draining the upstream byte stream
    /// even after the receiving end is dropped (client abort); see
    /// `crate::stream::run_stream`.
    Stream(UnboundedReceiver<Result<Bytes, io::Error>>),
}

pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl GatewayResponse {
    pub fn json(status: StatusCode, headers: Vec<(String, String)>, body: &serde_json::Value) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Unary(Bytes::from(serde_json::to_vec(body).unwrap_or_default())),
        }
    }

    pub fn raw(status: StatusCode, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self { status, headers, body: ResponseBody::Unary(body) }
    }
}
