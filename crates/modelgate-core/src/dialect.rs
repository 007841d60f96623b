//! Inbound header handling shared by all four ingress routes (SPEC_FULL.md
//! §6): which headers are forwarded upstream verbatim, and the two gateway-
//! specific headers (`ReqId`, `X-Provider`).

use http::HeaderMap;

pub use modelgate_transform::adapters::ClientDialect;

const EXCLUDED_EXACT: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "content-type",
    "authorization",
    "x-api-key",
    "anthropic-version",
    "user-agent",
    "origin",
    "referer",
    "cookie",
];

fn is_excluded(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    EXCLUDED_EXACT.contains(&lower.as_str())
        || lower.starts_with("accept")
        || lower.starts_with("sec-")
        || lower.starts_with("x-modelgate-")
}

/// Headers forwarded verbatim to the upstream provider on top of whatever
/// the provider adapter itself sets (SPEC_FULL.md §6 "Egress headers").
pub fn passthrough_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.as_str();
            if is_excluded(name) {
                return None;
            }
            value.to_str().ok().map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

/// `X-Provider: <name>` pins the request to one admin-configured provider
/// by name instead of letting the resolver pick (SPEC_FULL.md §4.4).
pub fn extract_target_provider(headers: &HeaderMap) -> Option<String> {
    headers.get("x-provider").and_then(|v| v.to_str().ok()).map(percent_decode)
}

/// `ReqId: <value>` opts the request into the dedup gate (SPEC_FULL.md §4.6).
pub fn extract_req_id(headers: &HeaderMap) -> Option<String> {
    headers.get("reqid").and_then(|v| v.to_str().ok()).map(|s| s.to_string())
}

fn percent_decode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                out.push(byte as char);
                continue;
            }
            out.push(c);
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(http::HeaderName::from_bytes(k.as_bytes()).unwrap(), v.parse().unwrap());
        }
        map
    }

    #[test]
    fn excludes_auth_and_framing_headers() {
        let map = headers(&[
            ("authorization", "Bearer x"),
            ("x-api-key", "k"),
            ("content-type", "application/json"),
            ("content-length", "10"),
            ("host", "example.com"),
            ("x-custom", "keep-me"),
        ]);
        let forwarded = passthrough_headers(&map);
        assert_eq!(forwarded, vec![("x-custom".to_string(), "keep-me".to_string())]);
    }

    #[test]
    fn excludes_accept_sec_and_gateway_prefixed_headers() {
        let map = headers(&[
            ("accept", "*/*"),
            ("accept-encoding", "gzip"),
            ("sec-fetch-mode", "cors"),
            ("x-modelgate-internal", "1"),
            ("x-trace-id", "abc"),
        ]);
        let forwarded = passthrough_headers(&map);
        assert_eq!(forwarded, vec![("x-trace-id".to_string(), "abc".to_string())]);
    }

    #[test]
    fn extracts_and_percent_decodes_target_provider() {
        let map = headers(&[("x-provider", "my%20provider")]);
        assert_eq!(extract_target_provider(&map), Some("my provider".to_string()));
    }

    #[test]
    fn missing_x_provider_header_returns_none() {
        let map = HeaderMap::new();
        assert_eq!(extract_target_provider(&map), None);
    }

    #[test]
    fn extracts_req_id_case_insensitively() {
        let map = headers(&[("ReqId", "abc-123")]);
        assert_eq!(extract_req_id(&map), Some("abc-123".to_string()));
    }
}
