use std::collections::HashMap;
use std::sync::Arc;

use crate::UpstreamProvider;

/// Providers by id, plus their short aliases.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn UpstreamProvider>>,
    aliases: HashMap<&'static str, &'static str>,
    order: Vec<&'static str>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn UpstreamProvider>) {
        let name = provider.name();
        if let Some(alias) = provider.alias() {
            self.aliases.insert(alias, name);
        }
        if self.providers.insert(name, provider).is_none() {
            self.order.push(name);
        }
    }

    /// Look up by id or alias.
    pub fn get(&self, name_or_alias: &str) -> Option<Arc<dyn UpstreamProvider>> {
        let name = self.canonical_name(name_or_alias)?;
        self.providers.get(name).cloned()
    }

    pub fn canonical_name(&self, name_or_alias: &str) -> Option<&'static str> {
        if let Some((name, _)) = self.providers.get_key_value(name_or_alias) {
            return Some(name);
        }
        self.aliases.get(name_or_alias).copied()
    }

    /// Registered providers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn UpstreamProvider>> + '_ {
        self.order.iter().filter_map(|name| self.providers.get(name))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
