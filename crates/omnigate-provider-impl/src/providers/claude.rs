use serde_json::{Value, json};

use omnigate_protocol::WireFormat;
use omnigate_provider_core::{
    CredentialUpdate, Credentials, Headers, ProviderResult, RefreshCtx, RouteCtx,
    UpstreamHttpRequest, UpstreamProvider, bearer, header_set, with_retry,
};

use super::anthropic::{ANTHROPIC_VERSION, CLAUDE_MODELS};
use super::oauth_common::{TokenResponse, fetch_json, json_headers};

const PROVIDER_NAME: &str = "claude";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";
const CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";
const OAUTH_BETA: &str = "oauth-2025-04-20";

/// Claude subscription access through OAuth tokens.
#[derive(Debug, Default)]
pub struct ClaudeProvider;

#[async_trait::async_trait]
impl UpstreamProvider for ClaudeProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn alias(&self) -> Option<&'static str> {
        Some("cc")
    }

    fn default_format(&self) -> WireFormat {
        WireFormat::Claude
    }

    fn build_url(&self, ctx: &RouteCtx<'_>) -> ProviderResult<String> {
        let base = ctx.base_url.unwrap_or(DEFAULT_BASE_URL);
        Ok(format!("{}/v1/messages?beta=true", base.trim_end_matches('/')))
    }

    fn build_headers(&self, ctx: &RouteCtx<'_>, _body: &Value) -> ProviderResult<Headers> {
        let mut headers = Headers::new();
        bearer(&mut headers, ctx.credentials.require_access_token()?);
        header_set(&mut headers, "anthropic-version", ANTHROPIC_VERSION);
        header_set(&mut headers, "anthropic-beta", OAUTH_BETA);
        Ok(headers)
    }

    async fn refresh(
        &self,
        ctx: &RefreshCtx<'_>,
        credentials: &Credentials,
    ) -> ProviderResult<Option<CredentialUpdate>> {
        let refresh_token = credentials.require_refresh_token()?;
        let body = json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
            "client_id": CLIENT_ID,
        });
        let tokens: TokenResponse = with_retry(ctx.policy, PROVIDER_NAME, || {
            let req = UpstreamHttpRequest::post(TOKEN_URL, json_headers(), body.to_string());
            fetch_json(ctx.client, req)
        })
        .await?;
        Ok(Some(tokens.into_update()))
    }

    fn models(&self) -> &'static [&'static str] {
        CLAUDE_MODELS
    }
}
