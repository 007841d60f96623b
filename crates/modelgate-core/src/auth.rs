//! Credential extraction and key validation (SPEC_FULL.md §4.1).

use http::HeaderMap;

use modelgate_storage::{ApiKeyRow, Storage, StorageResult};

/// Bearer token, or `X-Api-Key`, whichever is present (OpenAI clients send
/// the former, Anthropic clients the latter).
pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        let trimmed = value.trim();
        if let Some(token) = trimmed.strip_prefix("Bearer ").or_else(|| trimmed.strip_prefix("bearer ")) {
            return Some(token.trim().to_string());
        }
    }
    headers.get("x-api-key").and_then(|v| v.to_str().ok()).map(|v| v.trim().to_string())
}

/// The single upsert-read of §4.1: looks the key up, bumps `last_seen`, and
/// returns `None` if it's missing, revoked, or expired.
pub async fn authenticate(storage: &dyn Storage, headers: &HeaderMap) -> StorageResult<Option<ApiKeyRow>> {
    let Some(key_value) = extract_bearer(headers) else {
        return Ok(None);
    };
    if key_value.is_empty() {
        return Ok(None);
    }
    storage.touch_api_key(&key_value).await
}

/// Admin endpoints authenticate against the process-wide admin secret
/// rather than a per-tenant `ApiKey` row.
pub fn authenticate_admin(headers: &HeaderMap, admin_key_hash: &str) -> bool {
    let Some(key_value) = extract_bearer(headers) else {
        return false;
    };
    blake3::hash(key_value.as_bytes()).to_hex().to_string() == admin_key_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(name: &str, value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(http::HeaderName::from_bytes(name.as_bytes()).unwrap(), value.parse().unwrap());
        map
    }

    #[test]
    fn extracts_bearer_from_authorization_header() {
        let map = headers_with("authorization", "Bearer sk-abc123");
        assert_eq!(extract_bearer(&map), Some("sk-abc123".to_string()));
    }

    #[test]
    fn extracts_key_from_x_api_key_header() {
        let map = headers_with("x-api-key", "sk-anthropic-style");
        assert_eq!(extract_bearer(&map), Some("sk-anthropic-style".to_string()));
    }

    #[test]
    fn authorization_header_takes_precedence_over_x_api_key() {
        let mut map = headers_with("authorization", "Bearer from-auth");
        map.insert("x-api-key", "from-x-api-key".parse().unwrap());
        assert_eq!(extract_bearer(&map), Some("from-auth".to_string()));
    }

    #[test]
    fn missing_credentials_yields_none() {
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }

    #[test]
    fn admin_auth_matches_blake3_hash_of_bearer() {
        let hash = blake3::hash(b"super-secret").to_hex().to_string();
        let map = headers_with("authorization", "Bearer super-secret");
        assert!(authenticate_admin(&map, &hash));
        assert!(!authenticate_admin(&map, "not-the-hash"));
    }

    #[test]
    fn admin_auth_fails_without_credentials() {
        let hash = blake3::hash(b"super-secret").to_hex().to_string();
        assert!(!authenticate_admin(&HeaderMap::new(), &hash));
    }
}
