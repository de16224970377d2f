//! Model listings and the token estimate endpoint bodies.

use serde_json::{Value, json};

use omnigate_common::GatewayConfig;
use omnigate_provider_core::ProviderRegistry;

use crate::resolve::resolve_model;
use crate::store::CredentialStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedModel {
    /// The string a client sends back to select this model.
    pub id: String,
    pub owned_by: &'static str,
}

/// Every configured provider's model table, prefixed with the provider's
/// alias (or id), followed by the configured model aliases.
pub fn listed_models(
    config: &GatewayConfig,
    providers: &ProviderRegistry,
    store: &CredentialStore,
) -> Vec<ListedModel> {
    let mut out = Vec::new();
    for name in store.providers() {
        let Some(provider) = providers.get(name) else {
            continue;
        };
        let prefix = provider.alias().unwrap_or(name);
        out.extend(provider.models().iter().map(|model| ListedModel {
            id: format!("{prefix}/{model}"),
            owned_by: name,
        }));
    }
    for alias in config.model_aliases.keys() {
        if let Ok(resolved) = resolve_model(config, providers, alias)
            && store.slot(resolved.provider).is_some()
        {
            out.push(ListedModel {
                id: alias.clone(),
                owned_by: resolved.provider,
            });
        }
    }
    out
}

pub fn openai_model_list(models: &[ListedModel]) -> Value {
    let data: Vec<Value> = models
        .iter()
        .map(|model| {
            json!({
                "id": model.id,
                "object": "model",
                "created": 0,
                "owned_by": model.owned_by,
            })
        })
        .collect();
    json!({ "object": "list", "data": data })
}

pub fn gemini_model_list(models: &[ListedModel]) -> Value {
    let models: Vec<Value> = models
        .iter()
        .map(|model| {
            json!({
                "name": format!("models/{}", model.id),
                "displayName": model.id,
                "supportedGenerationMethods": ["generateContent", "streamGenerateContent", "countTokens"],
            })
        })
        .collect();
    json!({ "models": models })
}

pub fn ollama_tags(models: &[ListedModel]) -> Value {
    let models: Vec<Value> = models
        .iter()
        .map(|model| {
            json!({
                "name": model.id,
                "model": model.id,
                "size": 0,
                "digest": "",
                "details": { "family": model.owned_by },
            })
        })
        .collect();
    json!({ "models": models })
}

/// `ceil(chars / 4)` over every piece of text in the request.
pub fn estimate_tokens(body: &Value) -> u64 {
    let mut chars = 0usize;
    count_text(body, &mut chars);
    chars.div_ceil(4) as u64
}

fn count_text(value: &Value, chars: &mut usize) {
    match value {
        Value::Array(items) => {
            for item in items {
                count_text(item, chars);
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                match (key.as_str(), value) {
                    ("text" | "content" | "system" | "input", Value::String(text)) => {
                        *chars += text.chars().count();
                    }
                    (_, Value::Array(_) | Value::Object(_)) => count_text(value, chars),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_counts_text_only() {
        let body = json!({
            "model": "claude-sonnet-4-5-20250929",
            "system": "abcd",
            "messages": [
                {"role": "user", "content": "hello"},
                {"role": "assistant", "content": [{"type": "text", "text": "hé"}]},
                {"role": "user", "content": [{"type": "tool_result", "tool_use_id": "t1", "content": "x"}]},
            ],
        });
        // 4 + 5 + 2 + 1 = 12 chars
        assert_eq!(estimate_tokens(&body), 3);
        assert_eq!(estimate_tokens(&json!({"messages": [{"role": "user", "content": "a"}]})), 1);
        assert_eq!(estimate_tokens(&json!({})), 0);
    }

    #[test]
    fn gemini_contents_are_counted() {
        let body = json!({
            "systemInstruction": {"parts": [{"text": "sys"}]},
            "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
        });
        assert_eq!(estimate_tokens(&body), 2);
    }

    #[test]
    fn listing_shapes() {
        let models = vec![ListedModel {
            id: "cc/claude-opus-4-1-20250805".into(),
            owned_by: "claude",
        }];
        assert_eq!(openai_model_list(&models)["data"][0]["id"], "cc/claude-opus-4-1-20250805");
        assert_eq!(
            gemini_model_list(&models)["models"][0]["name"],
            "models/cc/claude-opus-4-1-20250805"
        );
        assert_eq!(ollama_tags(&models)["models"][0]["model"], "cc/claude-opus-4-1-20250805");
    }
}
