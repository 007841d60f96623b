//! `ReqId` validation shared by the dedup gate (in `modelgate-core`) and its
//! storage backing (`modelgate-storage`). SPEC_FULL.md §4.6.

/// `^[A-Za-z0-9._:-]{1,128}$` per §4.6. A request whose `ReqId` header
/// fails this check is rejected with 400 before the gate is ever consulted.
pub fn is_valid_req_id(value: &str) -> bool {
    if value.is_empty() || value.len() > 128 {
        return false;
    }
    value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_req_id_charset() {
        assert!(is_valid_req_id("abc-123_ABC.def:1"));
        assert!(!is_valid_req_id(""));
        assert!(!is_valid_req_id("has space"));
        assert!(!is_valid_req_id(&"a".repeat(129)));
    }
}
