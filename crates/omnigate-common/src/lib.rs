use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use omnigate_provider_core::{Credentials, RefreshPolicy};
use omnigate_transform::PartPolicy;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 20128;
pub const DEFAULT_CONFIG_PATH: &str = "omnigate.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("default_provider `{0}` is not configured")]
    UnknownDefaultProvider(String),
    #[error("model alias `{alias}` must look like `provider/model`, got `{target}`")]
    InvalidAlias { alias: String, target: String },
}

/// Final configuration used by the running process.
///
/// Merge order: CLI > config file > defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Optional outbound proxy for upstream egress.
    pub proxy: Option<String>,
    /// Enables the request-log sidecar when set.
    pub log_dir: Option<PathBuf>,
    pub default_provider: Option<String>,
    pub providers: BTreeMap<String, ProviderEntry>,
    /// `alias -> provider/model`.
    pub model_aliases: BTreeMap<String, String>,
    pub bypass: BypassRules,
    pub unsupported_parts: PartPolicy,
    pub refresh: RefreshConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            proxy: None,
            log_dir: None,
            default_provider: None,
            providers: BTreeMap::new(),
            model_aliases: BTreeMap::new(),
            bypass: BypassRules::default(),
            unsupported_parts: PartPolicy::Drop,
            refresh: RefreshConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEntry {
    pub credentials: Credentials,
    pub base_url: Option<String>,
    pub enabled: bool,
}

impl Default for ProviderEntry {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            base_url: None,
            enabled: true,
        }
    }
}

/// Requests answered locally without contacting any upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BypassRules {
    pub models: Vec<String>,
    pub probe_texts: Vec<String>,
    pub reply_text: String,
}

impl Default for BypassRules {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            probe_texts: vec!["Warmup".to_string()],
            reply_text: "OK".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        let policy = RefreshPolicy::default();
        Self {
            attempts: policy.attempts,
            backoff_ms: policy.backoff.as_millis() as u64,
        }
    }
}

impl RefreshConfig {
    pub fn policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            attempts: self.attempts.max(1),
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

/// Values supplied on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub proxy: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn from_json(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_json(&raw, path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn overlay(&mut self, overrides: ConfigOverrides) {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if overrides.proxy.is_some() {
            self.proxy = overrides.proxy;
        }
        if overrides.log_dir.is_some() {
            self.log_dir = overrides.log_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.default_provider
            && !self.providers.contains_key(name)
        {
            return Err(ConfigError::UnknownDefaultProvider(name.clone()));
        }
        for (alias, target) in &self.model_aliases {
            let valid = target
                .split_once('/')
                .is_some_and(|(provider, model)| !provider.is_empty() && !model.is_empty());
            if !valid {
                return Err(ConfigError::InvalidAlias {
                    alias: alias.clone(),
                    target: target.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn enabled_providers(&self) -> impl Iterator<Item = (&str, &ProviderEntry)> {
        self.providers
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(name, entry)| (name.as_str(), entry))
    }
}
