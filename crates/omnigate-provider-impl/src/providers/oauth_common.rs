use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;

use omnigate_provider_core::{
    CredentialUpdate, Headers, ProviderError, ProviderResult, UpstreamClient, UpstreamFailure,
    UpstreamHttpRequest, header_set,
};

/// The common subset of OAuth token endpoint responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl TokenResponse {
    pub fn into_update(self) -> CredentialUpdate {
        CredentialUpdate {
            access_token: Some(self.access_token),
            refresh_token: self.refresh_token,
            id_token: self.id_token,
            expires_at: self.expires_in.map(expires_at_from_now),
            ..CredentialUpdate::default()
        }
    }
}

pub(crate) fn expires_at_from_now(expires_in: i64) -> OffsetDateTime {
    OffsetDateTime::now_utc() + time::Duration::seconds(expires_in)
}

pub(crate) fn form_body(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

pub(crate) fn form_headers() -> Headers {
    let mut headers = Headers::new();
    header_set(&mut headers, "Content-Type", "application/x-www-form-urlencoded");
    header_set(&mut headers, "Accept", "application/json");
    headers
}

pub(crate) fn json_headers() -> Headers {
    let mut headers = Headers::new();
    header_set(&mut headers, "Content-Type", "application/json");
    header_set(&mut headers, "Accept", "application/json");
    headers
}

/// Send a token request and decode a 2xx JSON body.
pub(crate) async fn fetch_json<T>(client: &dyn UpstreamClient, req: UpstreamHttpRequest) -> ProviderResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let resp = client.send(req).await.map_err(|err| match err {
        UpstreamFailure::Transport { message, .. } => ProviderError::Other(message),
        other => ProviderError::other(other),
    })?;
    let status = resp.status;
    let bytes = resp.body.collect().await;
    if !(200..300).contains(&status) {
        let text = String::from_utf8_lossy(&bytes);
        return Err(ProviderError::Other(format!(
            "refresh_token_failed: {status} {text}"
        )));
    }
    serde_json::from_slice::<T>(&bytes).map_err(ProviderError::other)
}

/// The standard `grant_type=refresh_token` form exchange.
pub(crate) async fn refresh_form(
    client: &dyn UpstreamClient,
    url: &str,
    headers: Headers,
    pairs: &[(&str, &str)],
) -> ProviderResult<TokenResponse> {
    let req = UpstreamHttpRequest::post(url, headers, form_body(pairs));
    fetch_json(client, req).await
}

/// Client secret from the credentials, else from the environment.
pub(crate) fn client_secret(data_value: Option<&str>, env_key: &str) -> Option<String> {
    data_value
        .map(str::to_string)
        .or_else(|| std::env::var(env_key).ok())
        .filter(|value| !value.trim().is_empty())
}
