use omnigate_common::GatewayConfig;
use omnigate_provider_core::ProviderRegistry;

/// A client model string resolved to a provider id and the model that
/// provider knows it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub provider: &'static str,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    MissingModel,
    NoProvider(String),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::MissingModel => write!(f, "missing model"),
            ResolveError::NoProvider(model) => write!(
                f,
                "no provider for model {model}: use provider/model or set default_provider"
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

/// `model_aliases` first, then `provider/model` or `alias/model`, then a bare
/// model on `default_provider`.
///
/// A prefix that names no provider is part of the model id, so ids such as
/// `meta/llama-3` pass through to the default provider intact.
pub fn resolve_model(
    config: &GatewayConfig,
    providers: &ProviderRegistry,
    requested: &str,
) -> Result<ResolvedModel, ResolveError> {
    let requested = requested.trim().trim_start_matches('/');
    let requested = requested.strip_prefix("models/").unwrap_or(requested);
    if requested.is_empty() {
        return Err(ResolveError::MissingModel);
    }

    let target = config
        .model_aliases
        .get(requested)
        .map(String::as_str)
        .unwrap_or(requested);

    if let Some((prefix, model)) = target.split_once('/')
        && !model.is_empty()
        && let Some(provider) = providers.canonical_name(prefix)
    {
        return Ok(ResolvedModel {
            provider,
            model: model.to_string(),
        });
    }

    config
        .default_provider
        .as_deref()
        .and_then(|name| providers.canonical_name(name))
        .map(|provider| ResolvedModel {
            provider,
            model: target.to_string(),
        })
        .ok_or_else(|| ResolveError::NoProvider(target.to_string()))
}
