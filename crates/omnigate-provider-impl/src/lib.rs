//! Built-in upstream providers.
//!
//! Providers build upstream calls and run credential refresh through the
//! `UpstreamClient` they are handed; they hold no connections of their own.

mod providers;
mod registry;

pub use providers::{
    AnthropicProvider, ClaudeProvider, CodexProvider, GeminiCliProvider, GeminiProvider,
    GithubProvider, IflowProvider, OllamaProvider, OpenAICompatibleProvider, OpenAIProvider,
    QwenProvider,
};
pub use registry::{builtin_providers, builtin_registry};
