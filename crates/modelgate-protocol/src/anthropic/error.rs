use serde::{Deserialize, Serialize};

use crate::anthropic::types::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorResponseTypeKnown {
    #[serde(rename = "error")]
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorResponseType {
    Known(ErrorResponseTypeKnown),
    Custom(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorTypeKnown {
    /// 400
    #[serde(rename = "invalid_request_error")]
    InvalidRequestError,
    /// 401
    #[serde(rename = "authentication_error")]
    AuthenticationError,
    /// 404
    #[serde(rename = "not_found_error")]
    NotFoundError,
    /// 409
    #[serde(rename = "conflict_error")]
    ConflictError,
    /// 429
    #[serde(rename = "rate_limit_error")]
    RateLimitError,
    /// 500
    #[serde(rename = "api_error")]
    ApiError,
    /// 502
    #[serde(rename = "upstream_error")]
    UpstreamError,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorType {
    Known(ErrorTypeKnown),
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub r#type: ErrorType,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub r#type: ErrorResponseType,
    pub error: ErrorDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

impl ErrorResponse {
    pub fn new(kind: ErrorTypeKnown, message: impl Into<String>) -> Self {
        Self {
            r#type: ErrorResponseType::Known(ErrorResponseTypeKnown::Error),
            error: ErrorDetail {
                r#type: ErrorType::Known(kind),
                message: message.into(),
            },
            request_id: None,
        }
    }
}
