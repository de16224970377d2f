use serde_json::Value;

use omnigate_protocol::WireFormat;
use omnigate_provider_core::{
    CredentialUpdate, Credentials, Headers, ProviderError, ProviderResult, RefreshCtx, RouteCtx,
    UpstreamProvider, bearer, with_retry,
};

use super::gemini::{GEMINI_MODELS, generate_verb};
use super::oauth_common::{client_secret, form_headers, refresh_form};

const PROVIDER_NAME: &str = "gemini-cli";
const DEFAULT_BASE_URL: &str = "https://cloudcode-pa.googleapis.com/v1internal";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const CLIENT_ID: &str = "681255809395-oo8ft2oprdrnp9e3aqf6av3hmdib135j.apps.googleusercontent.com";
const CLIENT_SECRET_ENV: &str = "GEMINI_CLIENT_SECRET";

/// Gemini through the Cloud Code assist endpoint, with Google OAuth tokens.
#[derive(Debug, Default)]
pub struct GeminiCliProvider;

#[async_trait::async_trait]
impl UpstreamProvider for GeminiCliProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn alias(&self) -> Option<&'static str> {
        Some("gc")
    }

    fn default_format(&self) -> WireFormat {
        WireFormat::GeminiCli
    }

    fn build_url(&self, ctx: &RouteCtx<'_>) -> ProviderResult<String> {
        let base = ctx.base_url.unwrap_or(DEFAULT_BASE_URL);
        Ok(format!("{}:{}", base.trim_end_matches('/'), generate_verb(ctx.stream)))
    }

    fn build_headers(&self, ctx: &RouteCtx<'_>, _body: &Value) -> ProviderResult<Headers> {
        let mut headers = Headers::new();
        bearer(&mut headers, ctx.credentials.require_access_token()?);
        Ok(headers)
    }

    /// The envelope needs a project; requests translated from another format
    /// already carry it, native ones may not.
    fn finalize_body(&self, ctx: &RouteCtx<'_>, mut body: Value) -> ProviderResult<Value> {
        let Some(envelope) = body.as_object_mut() else {
            return Ok(body);
        };
        let missing_project = envelope
            .get("project")
            .and_then(Value::as_str)
            .is_none_or(str::is_empty);
        if missing_project && let Some(project) = ctx.credentials.data_str("projectId") {
            envelope.insert("project".to_string(), Value::String(project.to_string()));
        }
        envelope
            .entry("user_prompt_id")
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().simple().to_string()));
        Ok(body)
    }

    async fn refresh(
        &self,
        ctx: &RefreshCtx<'_>,
        credentials: &Credentials,
    ) -> ProviderResult<Option<CredentialUpdate>> {
        let refresh_token = credentials.require_refresh_token()?;
        let client_id = credentials.data_str("clientId").unwrap_or(CLIENT_ID);
        let secret = client_secret(credentials.data_str("clientSecret"), CLIENT_SECRET_ENV)
            .ok_or_else(|| ProviderError::InvalidConfig(format!("{CLIENT_SECRET_ENV} is not set")))?;
        let pairs = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", secret.as_str()),
        ];
        let tokens = with_retry(ctx.policy, PROVIDER_NAME, || {
            refresh_form(ctx.client, TOKEN_URL, form_headers(), &pairs)
        })
        .await?;
        Ok(Some(tokens.into_update()))
    }

    fn models(&self) -> &'static [&'static str] {
        GEMINI_MODELS
    }
}
