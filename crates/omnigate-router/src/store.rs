//! In-memory credential state, one slot per configured provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use omnigate_common::GatewayConfig;
use omnigate_core::ChatHooks;
use omnigate_provider_core::{CredentialUpdate, Credentials, ProviderRegistry};

#[derive(Debug)]
pub struct ProviderSlot {
    credentials: RwLock<Credentials>,
    base_url: Option<String>,
    last_error: RwLock<Option<String>>,
    disconnects: AtomicU64,
}

impl ProviderSlot {
    fn new(credentials: Credentials, base_url: Option<String>) -> Self {
        Self {
            credentials: RwLock::new(credentials),
            base_url,
            last_error: RwLock::new(None),
            disconnects: AtomicU64::new(0),
        }
    }

    pub async fn credentials(&self) -> Credentials {
        self.credentials.read().await.clone()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }
}

/// Enabled providers from the config, keyed by canonical provider id.
#[derive(Debug, Default)]
pub struct CredentialStore {
    slots: HashMap<&'static str, Arc<ProviderSlot>>,
}

impl CredentialStore {
    pub fn from_config(config: &GatewayConfig, providers: &ProviderRegistry) -> Self {
        let mut slots = HashMap::new();
        for (name, entry) in config.enabled_providers() {
            let Some(canonical) = providers.canonical_name(name) else {
                warn!(event = "provider_unknown", provider = %name);
                continue;
            };
            let slot = ProviderSlot::new(entry.credentials.clone(), entry.base_url.clone());
            slots.insert(canonical, Arc::new(slot));
        }
        Self { slots }
    }

    pub fn slot(&self, provider: &str) -> Option<Arc<ProviderSlot>> {
        self.slots.get(provider).cloned()
    }

    /// Canonical ids of the configured providers, sorted.
    pub fn providers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.slots.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub async fn record_error(&self, provider: &str, error: impl Into<String>) {
        if let Some(slot) = self.slots.get(provider) {
            *slot.last_error.write().await = Some(error.into());
        }
    }

    /// Hooks bound to one provider's slot.
    pub fn hooks(&self, provider: &str) -> Option<Arc<dyn ChatHooks>> {
        let slot = self.slot(provider)?;
        Some(Arc::new(SlotHooks {
            provider: provider.to_string(),
            slot,
        }))
    }
}

struct SlotHooks {
    provider: String,
    slot: Arc<ProviderSlot>,
}

#[async_trait]
impl ChatHooks for SlotHooks {
    async fn on_credentials_refreshed(&self, update: &CredentialUpdate) {
        self.slot.credentials.write().await.apply(update);
        info!(event = "credentials_stored", provider = %self.provider);
    }

    async fn on_request_success(&self) {
        let mut last_error = self.slot.last_error.write().await;
        if last_error.take().is_some() {
            info!(event = "provider_recovered", provider = %self.provider);
        }
    }

    fn on_disconnect(&self) {
        let total = self.slot.disconnects.fetch_add(1, Ordering::Relaxed) + 1;
        info!(event = "client_disconnect_counted", provider = %self.provider, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnigate_common::ProviderEntry;
    use omnigate_provider_impl::builtin_registry;

    fn store() -> CredentialStore {
        let mut config = GatewayConfig::default();
        config.providers.insert(
            "cc".into(),
            ProviderEntry {
                credentials: Credentials {
                    access_token: Some("old".into()),
                    refresh_token: Some("r1".into()),
                    ..Credentials::default()
                },
                base_url: None,
                enabled: true,
            },
        );
        config.providers.insert(
            "openai".into(),
            ProviderEntry {
                credentials: Credentials::api_key("sk-test"),
                base_url: None,
                enabled: false,
            },
        );
        CredentialStore::from_config(&config, &builtin_registry())
    }

    #[test]
    fn only_enabled_providers_get_slots() {
        let store = store();
        assert_eq!(store.providers(), vec!["claude"]);
        assert!(store.slot("openai").is_none());
        assert!(store.hooks("openai").is_none());
    }

    #[tokio::test]
    async fn refresh_is_merged_and_success_clears_error() {
        let store = store();
        let hooks = store.hooks("claude").unwrap();
        store.record_error("claude", "[401]: expired").await;

        hooks
            .on_credentials_refreshed(&CredentialUpdate {
                access_token: Some("new".into()),
                ..CredentialUpdate::default()
            })
            .await;
        let slot = store.slot("claude").unwrap();
        let creds = slot.credentials().await;
        assert_eq!(creds.access_token.as_deref(), Some("new"));
        assert_eq!(creds.refresh_token.as_deref(), Some("r1"));
        assert_eq!(slot.last_error().await.as_deref(), Some("[401]: expired"));

        hooks.on_request_success().await;
        assert_eq!(slot.last_error().await, None);
    }

    #[test]
    fn disconnects_are_counted() {
        let store = store();
        let hooks = store.hooks("claude").unwrap();
        hooks.on_disconnect();
        hooks.on_disconnect();
        assert_eq!(store.slot("claude").unwrap().disconnects(), 2);
    }
}
