use base64::Engine;
use serde_json::{Map, Value};

use omnigate_protocol::WireFormat;
use omnigate_provider_core::{
    CredentialUpdate, Credentials, Headers, ProviderResult, RefreshCtx, RouteCtx, UpstreamProvider,
    bearer, header_set, with_retry,
};

use super::oauth_common::{form_headers, refresh_form};

const PROVIDER_NAME: &str = "codex";
const DEFAULT_BASE_URL: &str = "https://chatgpt.com/backend-api/codex";
const TOKEN_URL: &str = "https://auth.openai.com/oauth/token";
const CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";
const AUTH_CLAIM: &str = "https://api.openai.com/auth";

const MODELS: &[&str] = &["gpt-5", "gpt-5-codex", "gpt-5-codex-mini", "codex-mini-latest"];

/// ChatGPT subscription access to the Codex Responses endpoint.
#[derive(Debug, Default)]
pub struct CodexProvider;

#[async_trait::async_trait]
impl UpstreamProvider for CodexProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn alias(&self) -> Option<&'static str> {
        Some("cx")
    }

    fn default_format(&self) -> WireFormat {
        WireFormat::OpenAIResponses
    }

    fn build_url(&self, ctx: &RouteCtx<'_>) -> ProviderResult<String> {
        let base = ctx.base_url.unwrap_or(DEFAULT_BASE_URL);
        Ok(format!("{}/responses", base.trim_end_matches('/')))
    }

    fn build_headers(&self, ctx: &RouteCtx<'_>, _body: &Value) -> ProviderResult<Headers> {
        let mut headers = Headers::new();
        bearer(&mut headers, ctx.credentials.require_access_token()?);
        if let Some(account_id) = account_id(ctx.credentials) {
            header_set(&mut headers, "chatgpt-account-id", account_id);
        }
        header_set(&mut headers, "OpenAI-Beta", "responses=experimental");
        header_set(&mut headers, "originator", "codex_cli_rs");
        Ok(headers)
    }

    /// The endpoint rejects requests without `instructions` or with storage on.
    fn finalize_body(&self, _ctx: &RouteCtx<'_>, mut body: Value) -> ProviderResult<Value> {
        if let Some(map) = body.as_object_mut() {
            map.entry("instructions")
                .or_insert_with(|| Value::String(String::new()));
            map.insert("store".to_string(), Value::Bool(false));
        }
        Ok(body)
    }

    async fn refresh(
        &self,
        ctx: &RefreshCtx<'_>,
        credentials: &Credentials,
    ) -> ProviderResult<Option<CredentialUpdate>> {
        let refresh_token = credentials.require_refresh_token()?;
        let pairs = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", CLIENT_ID),
            ("scope", "openid profile email"),
        ];
        let tokens = with_retry(ctx.policy, PROVIDER_NAME, || {
            refresh_form(ctx.client, TOKEN_URL, form_headers(), &pairs)
        })
        .await?;
        let account = tokens.id_token.as_deref().and_then(account_id_from_id_token);
        let mut update = tokens.into_update();
        if let Some(account) = account {
            let mut data = Map::new();
            data.insert("accountId".to_string(), Value::String(account));
            update.provider_specific_data = data;
        }
        Ok(Some(update))
    }

    fn models(&self) -> &'static [&'static str] {
        MODELS
    }
}

fn account_id(credentials: &Credentials) -> Option<String> {
    credentials
        .data_str("accountId")
        .map(str::to_string)
        .or_else(|| credentials.id_token.as_deref().and_then(account_id_from_id_token))
}

/// `chatgpt_account_id` from the unverified JWT payload.
fn account_id_from_id_token(id_token: &str) -> Option<String> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims
        .get(AUTH_CLAIM)?
        .get("chatgpt_account_id")?
        .as_str()
        .map(str::to_string)
}
