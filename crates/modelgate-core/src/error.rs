//! Dialect-aware error responses (SPEC_FULL.md §7). Every fallible path in
//! the pipeline produces a `GatewayResponse` rather than unwinding past the
//! handler, so the client always gets a well-formed body in its own dialect.

use http::StatusCode;
use modelgate_transform::adapters::ClientDialect;
use serde_json::json;

use crate::response::GatewayResponse;

fn error_json(dialect: ClientDialect, error_type: &str, message: &str) -> serde_json::Value {
    error_json_with_req_id(dialect, error_type, message, None)
}

fn error_json_with_req_id(
    dialect: ClientDialect,
    error_type: &str,
    message: &str,
    req_id: Option<&str>,
) -> serde_json::Value {
    let mut value = match dialect {
        ClientDialect::Anthropic => json!({
            "type": "error",
            "error": { "type": error_type, "message": message },
        }),
        ClientDialect::OpenAiChat | ClientDialect::OpenAiResponses => json!({
            "error": { "type": error_type, "message": message },
        }),
    };
    if let Some(req_id) = req_id {
        value["error"]["req_id"] = json!(req_id);
    }
    value
}

pub fn error_response(
    status: StatusCode,
    dialect: ClientDialect,
    error_type: &str,
    message: &str,
) -> GatewayResponse {
    error_response_with_headers(status, dialect, error_type, message, Vec::new())
}

pub fn error_response_with_headers(
    status: StatusCode,
    dialect: ClientDialect,
    error_type: &str,
    message: &str,
    headers: Vec<(String, String)>,
) -> GatewayResponse {
    GatewayResponse::json(status, headers, &error_json(dialect, error_type, message))
}

pub fn invalid_api_key(dialect: ClientDialect) -> GatewayResponse {
    error_response(StatusCode::UNAUTHORIZED, dialect, "authentication_error", "invalid API key")
}

pub fn bad_request(dialect: ClientDialect, message: &str) -> GatewayResponse {
    error_response(StatusCode::BAD_REQUEST, dialect, "invalid_request_error", message)
}

pub fn not_found(dialect: ClientDialect, message: &str) -> GatewayResponse {
    error_response(StatusCode::NOT_FOUND, dialect, "invalid_request_error", message)
}

/// A request with this `ReqId` is already in flight (SPEC_FULL.md §7: "409
/// carries `Retry-After` plus the conflicting request-id").
pub fn conflict(dialect: ClientDialect, message: &str, retry_after_ms: u64, req_id: &str) -> GatewayResponse {
    GatewayResponse::json(
        StatusCode::CONFLICT,
        vec![("Retry-After".to_string(), retry_after_ms.to_string())],
        &error_json_with_req_id(dialect, "conflict_error", message, Some(req_id)),
    )
}

pub fn rate_limited(dialect: ClientDialect, message: &str, headers: Vec<(String, String)>) -> GatewayResponse {
    error_response_with_headers(StatusCode::TOO_MANY_REQUESTS, dialect, "rate_limit_error", message, headers)
}

pub fn upstream_exhausted(dialect: ClientDialect) -> GatewayResponse {
    error_response(StatusCode::BAD_GATEWAY, dialect, "api_error", "all upstream providers failed")
}

pub fn internal_error(dialect: ClientDialect, message: &str) -> GatewayResponse {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, dialect, "api_error", message)
}

pub fn dialect_str(dialect: ClientDialect) -> &'static str {
    match dialect {
        ClientDialect::OpenAiChat => "openai-chat",
        ClientDialect::OpenAiResponses => "openai-responses",
        ClientDialect::Anthropic => "anthropic",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseBody;

    fn body_json(response: &GatewayResponse) -> serde_json::Value {
        match &response.body {
            ResponseBody::Unary(bytes) => serde_json::from_slice(bytes).unwrap(),
            ResponseBody::Stream(_) => panic!("expected a unary body"),
        }
    }

    #[test]
    fn anthropic_errors_wrap_in_outer_error_envelope() {
        let response = invalid_api_key(ClientDialect::Anthropic);
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        let body = body_json(&response);
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "authentication_error");
    }

    #[test]
    fn openai_errors_have_no_outer_type_field() {
        let response = bad_request(ClientDialect::OpenAiChat, "bad body");
        let body = body_json(&response);
        assert!(body.get("type").is_none());
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["message"], "bad body");
    }

    #[test]
    fn conflict_carries_retry_after_header_and_req_id() {
        let response = conflict(ClientDialect::OpenAiChat, "in flight", 500, "req-abc");
        assert_eq!(response.status, StatusCode::CONFLICT);
        assert!(response.headers.iter().any(|(k, v)| k == "Retry-After" && v == "500"));
        let body = body_json(&response);
        assert_eq!(body["error"]["req_id"], "req-abc");
    }

    #[test]
    fn upstream_exhausted_is_bad_gateway() {
        let response = upstream_exhausted(ClientDialect::Anthropic);
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    }
}
