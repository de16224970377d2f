use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use omnigate_protocol::WireFormat;
use omnigate_provider_core::{
    CredentialUpdate, Credentials, Headers, ProviderError, ProviderResult, RefreshCtx, RouteCtx,
    UpstreamClient, UpstreamHttpRequest, UpstreamProvider, bearer, header_set, with_retry,
};

use super::oauth_common::{client_secret, fetch_json, form_headers, refresh_form};

const PROVIDER_NAME: &str = "iflow";
const DEFAULT_BASE_URL: &str = "https://apis.iflow.cn/v1";
const TOKEN_URL: &str = "https://iflow.cn/oauth/token";
const USER_INFO_URL: &str = "https://iflow.cn/api/oauth/getUserInfo";
const CLIENT_ID: &str = "10009311001";
const CLIENT_SECRET_ENV: &str = "IFLOW_CLIENT_SECRET";

const MODELS: &[&str] = &["qwen3-coder-plus", "kimi-k2", "deepseek-v3.1", "glm-4.6"];

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<UserInfoData>,
}

#[derive(Debug, Deserialize)]
struct UserInfoData {
    #[serde(default, rename = "apiKey")]
    api_key: Option<String>,
}

#[derive(Debug, Default)]
pub struct IflowProvider;

#[async_trait::async_trait]
impl UpstreamProvider for IflowProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn alias(&self) -> Option<&'static str> {
        Some("if")
    }

    fn default_format(&self) -> WireFormat {
        WireFormat::OpenAIChat
    }

    fn build_url(&self, ctx: &RouteCtx<'_>) -> ProviderResult<String> {
        let base = ctx.base_url.unwrap_or(DEFAULT_BASE_URL);
        Ok(format!("{}/chat/completions", base.trim_end_matches('/')))
    }

    /// The API key minted for the account wins over the OAuth access token.
    fn build_headers(&self, ctx: &RouteCtx<'_>, _body: &Value) -> ProviderResult<Headers> {
        let token = ctx
            .credentials
            .api_key
            .as_deref()
            .or(ctx.credentials.access_token.as_deref())
            .ok_or(ProviderError::MissingCredentialField("apiKey"))?;
        let mut headers = Headers::new();
        bearer(&mut headers, token);
        Ok(headers)
    }

    async fn refresh(
        &self,
        ctx: &RefreshCtx<'_>,
        credentials: &Credentials,
    ) -> ProviderResult<Option<CredentialUpdate>> {
        let refresh_token = credentials.require_refresh_token()?;
        let secret = client_secret(credentials.data_str("clientSecret"), CLIENT_SECRET_ENV)
            .ok_or_else(|| ProviderError::InvalidConfig(format!("{CLIENT_SECRET_ENV} is not set")))?;
        let basic = base64::engine::general_purpose::STANDARD.encode(format!("{CLIENT_ID}:{secret}"));
        let mut headers = form_headers();
        header_set(&mut headers, "Authorization", format!("Basic {basic}"));
        let pairs = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", CLIENT_ID),
            ("client_secret", secret.as_str()),
        ];
        let tokens = with_retry(ctx.policy, PROVIDER_NAME, || {
            refresh_form(ctx.client, TOKEN_URL, headers.clone(), &pairs)
        })
        .await?;
        let mut update = tokens.into_update();
        if let Some(access_token) = update.access_token.as_deref() {
            match fetch_api_key(ctx.client, access_token).await {
                Ok(Some(api_key)) => update.api_key = Some(api_key),
                Ok(None) => {}
                Err(err) => warn!(
                    event = "credential_refresh",
                    provider = PROVIDER_NAME,
                    step = "user_info",
                    error = %err,
                    "api key lookup failed; keeping access token only"
                ),
            }
        }
        Ok(Some(update))
    }

    fn models(&self) -> &'static [&'static str] {
        MODELS
    }
}

async fn fetch_api_key(client: &dyn UpstreamClient, access_token: &str) -> ProviderResult<Option<String>> {
    let url = format!("{USER_INFO_URL}?accessToken={}", urlencoding::encode(access_token));
    let mut headers = Headers::new();
    header_set(&mut headers, "Accept", "application/json");
    let info: UserInfo = fetch_json(client, UpstreamHttpRequest::get(url, headers)).await?;
    if !info.success {
        return Ok(None);
    }
    Ok(info.data.and_then(|data| data.api_key).filter(|key| !key.is_empty()))
}
