pub mod anthropic;
pub mod openai;
pub mod openai_responses;

use std::sync::Arc;

use modelgate_provider_core::provider::{Provider, ProviderConfig, ProviderType};

/// Builds the concrete `Provider` for one admin-managed `Provider` row.
/// `azure` and `ollama` reuse `OpenAiProvider` — they differ only in the
/// connection details already carried on `ProviderConfig`.
pub fn provider_for(config: ProviderConfig) -> Arc<dyn Provider> {
    match config.provider_type {
        ProviderType::OpenAi | ProviderType::Azure | ProviderType::Ollama => {
            Arc::new(openai::OpenAiProvider::new(config))
        }
        ProviderType::OpenAiResponses => Arc::new(openai_responses::OpenAiResponsesProvider::new(config)),
        ProviderType::Anthropic => Arc::new(anthropic::AnthropicProvider::new(config)),
    }
}
