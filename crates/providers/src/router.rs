//! Provider selection: builds the configured transport.

use std::sync::Arc;

use halu_config::AppConfig;
use halu_core::error::ProviderError;
use halu_core::provider::Provider;
use tracing::debug;

use crate::anthropic::{self, AnthropicProvider};
use crate::openai_compat::OpenAiCompatProvider;

/// Build the provider named by `config.provider`.
///
/// "anthropic" uses the native Messages API; every other name is treated
/// as an OpenAI-compatible endpoint. Hosted endpoints require an API key,
/// local ones (vLLM, Ollama, llama.cpp) do not.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.provider.as_str();
    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(name));
    let api_key = config.api_key.clone().unwrap_or_default();

    if api_key.is_empty() && requires_api_key(name) {
        return Err(ProviderError::NotConfigured(format!(
            "No API key for provider '{name}'. Set HALU_API_KEY or api_key in config.toml"
        )));
    }

    debug!(provider = name, base_url = %base_url, model = %config.model, "Building provider");

    let provider: Arc<dyn Provider> = if name == "anthropic" {
        Arc::new(AnthropicProvider::new(api_key)?.with_base_url(base_url))
    } else {
        Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)?)
    };

    Ok(provider)
}

fn requires_api_key(provider_name: &str) -> bool {
    !matches!(provider_name, "vllm" | "ollama" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "anthropic" => anthropic::DEFAULT_BASE_URL.into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "http://localhost:8000/v1".into(),
    }
}
