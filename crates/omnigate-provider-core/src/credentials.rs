//! Provider credentials and the partial updates a refresh produces.
//!
//! Credentials are owned by the caller. Providers only read them; a refresh
//! returns a [`CredentialUpdate`] holding exactly the fields it obtained, which
//! the caller merges with [`Credentials::apply`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::errors::{ProviderError, ProviderResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_specific_data: Map<String, Value>,
}

impl Credentials {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Access token if present, else the API key.
    pub fn bearer_token(&self) -> Option<&str> {
        self.access_token.as_deref().or(self.api_key.as_deref())
    }

    pub fn require_api_key(&self) -> ProviderResult<&str> {
        self.api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredentialField("apiKey"))
    }

    pub fn require_access_token(&self) -> ProviderResult<&str> {
        self.access_token
            .as_deref()
            .ok_or(ProviderError::MissingCredentialField("accessToken"))
    }

    pub fn require_refresh_token(&self) -> ProviderResult<&str> {
        self.refresh_token
            .as_deref()
            .ok_or(ProviderError::MissingCredentialField("refreshToken"))
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.provider_specific_data.get(key).and_then(Value::as_str)
    }

    /// Merge a refresh result. Fields the update does not carry are left as
    /// they are, and `providerSpecificData` is merged key by key.
    pub fn apply(&mut self, update: &CredentialUpdate) {
        if let Some(value) = &update.api_key {
            self.api_key = Some(value.clone());
        }
        if let Some(value) = &update.access_token {
            self.access_token = Some(value.clone());
        }
        if let Some(value) = &update.refresh_token {
            self.refresh_token = Some(value.clone());
        }
        if let Some(value) = &update.id_token {
            self.id_token = Some(value.clone());
        }
        if let Some(value) = update.expires_at {
            self.expires_at = Some(value);
        }
        for (key, value) in &update.provider_specific_data {
            self.provider_specific_data.insert(key.clone(), value.clone());
        }
    }

    pub fn with_update(&self, update: &CredentialUpdate) -> Self {
        let mut next = self.clone();
        next.apply(update);
        next
    }
}

/// The fields a refresh obtained. Absent fields mean "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_specific_data: Map<String, Value>,
}

impl CredentialUpdate {
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none()
            && self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.id_token.is_none()
            && self.expires_at.is_none()
            && self.provider_specific_data.is_empty()
    }

    /// Later fields win; `providerSpecificData` keys are unioned.
    pub fn merge(&mut self, other: CredentialUpdate) {
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.access_token.is_some() {
            self.access_token = other.access_token;
        }
        if other.refresh_token.is_some() {
            self.refresh_token = other.refresh_token;
        }
        if other.id_token.is_some() {
            self.id_token = other.id_token;
        }
        if other.expires_at.is_some() {
            self.expires_at = other.expires_at;
        }
        self.provider_specific_data
            .extend(other.provider_specific_data);
    }
}
