//! GitHub Copilot.
//!
//! Chat calls authenticate with a short-lived Copilot token derived from the
//! long-lived GitHub OAuth token. Refresh first re-derives the Copilot token;
//! only when that fails is the GitHub token itself refreshed, after which the
//! derivation is attempted once more with the new token.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use omnigate_protocol::WireFormat;
use omnigate_provider_core::{
    CredentialUpdate, Credentials, Headers, ModelFormatRule, ProviderError, ProviderResult,
    RefreshCtx, RouteCtx, UpstreamClient, UpstreamHttpRequest, UpstreamProvider, bearer,
    header_set,
};

use super::oauth_common::{TokenResponse, fetch_json, form_headers, refresh_form};

const PROVIDER_NAME: &str = "github";
const DEFAULT_BASE_URL: &str = "https://api.githubcopilot.com";
const COPILOT_TOKEN_URL: &str = "https://api.github.com/copilot_internal/v2/token";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";
const USER_AGENT: &str = "GitHubCopilotChat/0.26.7";
const EDITOR_VERSION: &str = "vscode/1.85.0";
const EDITOR_PLUGIN_VERSION: &str = "copilot-chat/0.26.7";
const API_VERSION: &str = "2022-11-28";

pub(crate) const COPILOT_TOKEN_KEY: &str = "copilotToken";
pub(crate) const COPILOT_EXPIRES_KEY: &str = "copilotTokenExpiresAt";

const MODEL_FORMATS: &[ModelFormatRule] = &[
    ModelFormatRule::new("gpt-5-codex*", WireFormat::OpenAIResponses),
    ModelFormatRule::new("gpt-5.1-codex*", WireFormat::OpenAIResponses),
];

const MODELS: &[&str] = &[
    "gpt-4.1",
    "gpt-4o",
    "gpt-5",
    "gpt-5-mini",
    "gpt-5-codex",
    "claude-sonnet-4",
    "gemini-2.5-pro",
];

#[derive(Debug, Deserialize)]
struct CopilotToken {
    token: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Debug, Default)]
pub struct GithubProvider;

#[async_trait::async_trait]
impl UpstreamProvider for GithubProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn alias(&self) -> Option<&'static str> {
        Some("gh")
    }

    fn default_format(&self) -> WireFormat {
        WireFormat::OpenAIChat
    }

    fn model_formats(&self) -> &'static [ModelFormatRule] {
        MODEL_FORMATS
    }

    fn build_url(&self, ctx: &RouteCtx<'_>) -> ProviderResult<String> {
        let base = ctx.base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        let path = match self.target_format(ctx.model) {
            WireFormat::OpenAIResponses => "responses",
            _ => "chat/completions",
        };
        Ok(format!("{base}/{path}"))
    }

    fn build_headers(&self, ctx: &RouteCtx<'_>, _body: &Value) -> ProviderResult<Headers> {
        let token = ctx
            .credentials
            .data_str(COPILOT_TOKEN_KEY)
            .or(ctx.credentials.access_token.as_deref())
            .ok_or(ProviderError::MissingCredentialField("accessToken"))?;
        let mut headers = editor_headers();
        bearer(&mut headers, token);
        header_set(&mut headers, "Copilot-Integration-Id", "vscode-chat");
        header_set(&mut headers, "Openai-Intent", "conversation-panel");
        Ok(headers)
    }

    async fn refresh(
        &self,
        ctx: &RefreshCtx<'_>,
        credentials: &Credentials,
    ) -> ProviderResult<Option<CredentialUpdate>> {
        let first = match credentials.access_token.as_deref() {
            Some(access_token) => copilot_token(ctx.client, access_token).await,
            None => Err(ProviderError::MissingCredentialField("accessToken")),
        };
        let first_err = match first {
            Ok(copilot) => {
                info!(event = "credential_refresh", provider = PROVIDER_NAME, step = "copilot_token");
                return Ok(Some(copilot_update(copilot)));
            }
            Err(err) => err,
        };
        let Some(refresh_token) = credentials.refresh_token.as_deref() else {
            return Err(first_err);
        };
        warn!(
            event = "credential_refresh",
            provider = PROVIDER_NAME,
            step = "github_token",
            error = %first_err,
            "copilot token refresh failed; refreshing github token"
        );
        let tokens = refresh_github_token(ctx.client, refresh_token).await?;
        let copilot = copilot_token(ctx.client, &tokens.access_token).await?;
        let mut update = tokens.into_update();
        update.merge(copilot_update(copilot));
        Ok(Some(update))
    }

    fn models(&self) -> &'static [&'static str] {
        MODELS
    }
}

fn editor_headers() -> Headers {
    let mut headers = Headers::new();
    header_set(&mut headers, "User-Agent", USER_AGENT);
    header_set(&mut headers, "Editor-Version", EDITOR_VERSION);
    header_set(&mut headers, "Editor-Plugin-Version", EDITOR_PLUGIN_VERSION);
    header_set(&mut headers, "X-GitHub-Api-Version", API_VERSION);
    headers
}

async fn copilot_token(client: &dyn UpstreamClient, access_token: &str) -> ProviderResult<CopilotToken> {
    let mut headers = editor_headers();
    header_set(&mut headers, "Authorization", format!("token {access_token}"));
    header_set(&mut headers, "Accept", "application/json");
    fetch_json(client, UpstreamHttpRequest::get(COPILOT_TOKEN_URL, headers)).await
}

async fn refresh_github_token(client: &dyn UpstreamClient, refresh_token: &str) -> ProviderResult<TokenResponse> {
    let pairs = [
        ("client_id", CLIENT_ID),
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
    ];
    refresh_form(client, GITHUB_TOKEN_URL, form_headers(), &pairs).await
}

fn copilot_update(copilot: CopilotToken) -> CredentialUpdate {
    let mut data = Map::new();
    data.insert(COPILOT_TOKEN_KEY.to_string(), Value::String(copilot.token));
    if let Some(expires_at) = copilot.expires_at {
        data.insert(COPILOT_EXPIRES_KEY.to_string(), Value::from(expires_at));
    }
    CredentialUpdate {
        provider_specific_data: data,
        ..CredentialUpdate::default()
    }
}
