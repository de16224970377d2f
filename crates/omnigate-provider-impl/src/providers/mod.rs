mod anthropic;
mod claude;
mod codex;
mod gemini;
mod gemini_cli;
mod github;
mod iflow;
mod oauth_common;
mod ollama;
mod openai;
mod qwen;

pub use anthropic::AnthropicProvider;
pub use claude::ClaudeProvider;
pub use codex::CodexProvider;
pub use gemini::GeminiProvider;
pub use gemini_cli::GeminiCliProvider;
pub use github::GithubProvider;
pub use iflow::IflowProvider;
pub use ollama::OllamaProvider;
pub use openai::{OpenAICompatibleProvider, OpenAIProvider};
pub use qwen::QwenProvider;
