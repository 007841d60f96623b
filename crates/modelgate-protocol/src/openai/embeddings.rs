use serde::{Deserialize, Serialize};

use crate::openai::types::CompletionUsage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Text(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEmbeddingRequestBody {
    pub model: String,
    pub input: EmbeddingInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct CreateEmbeddingRequest {
    pub body: CreateEmbeddingRequestBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddingObjectType {
    #[serde(rename = "embedding")]
    Embedding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub object: EmbeddingObjectType,
    pub index: i64,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddingListObjectType {
    #[serde(rename = "list")]
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEmbeddingResponse {
    pub object: EmbeddingListObjectType,
    pub data: Vec<Embedding>,
    pub model: String,
    pub usage: CompletionUsage,
}

/// A raw embedding vector as it may arrive base64-encoded little-endian
/// float32 from a provider; adapters normalize this before persistence.
pub fn decode_base64_f32(data: &str) -> Option<Vec<f32>> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .ok()?;
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian_f32_vector() {
        let values: [f32; 3] = [1.0, -2.5, 0.0];
        let mut bytes = Vec::new();
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let decoded = decode_base64_f32(&encoded).expect("valid vector");
        assert_eq!(decoded, values);
    }

    #[test]
    fn rejects_length_not_multiple_of_four() {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"abc");
        assert!(decode_base64_f32(&encoded).is_none());
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(decode_base64_f32("not base64!!").is_none());
    }

    #[test]
    fn input_is_untagged_text_or_many() {
        let single: EmbeddingInput = serde_json::from_str("\"hi\"").unwrap();
        assert_eq!(single, EmbeddingInput::Text("hi".to_string()));
        let many: EmbeddingInput = serde_json::from_str("[\"a\",\"b\"]").unwrap();
        assert_eq!(many, EmbeddingInput::Many(vec!["a".to_string(), "b".to_string()]));
    }
}
