use std::sync::Arc;

use omnigate_provider_core::{ProviderRegistry, UpstreamProvider};

use crate::providers::{
    AnthropicProvider, ClaudeProvider, CodexProvider, GeminiCliProvider, GeminiProvider,
    GithubProvider, IflowProvider, OllamaProvider, OpenAICompatibleProvider, OpenAIProvider,
    QwenProvider,
};

pub fn builtin_providers() -> Vec<Arc<dyn UpstreamProvider>> {
    vec![
        Arc::new(OpenAIProvider),
        Arc::new(AnthropicProvider),
        Arc::new(ClaudeProvider),
        Arc::new(GeminiProvider),
        Arc::new(GeminiCliProvider),
        Arc::new(CodexProvider),
        Arc::new(GithubProvider),
        Arc::new(QwenProvider),
        Arc::new(IflowProvider),
        Arc::new(OllamaProvider),
        Arc::new(OpenAICompatibleProvider),
    ]
}

pub fn builtin_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for provider in builtin_providers() {
        registry.register(provider);
    }
    registry
}
