use serde_json::{Map, Value};

use omnigate_protocol::WireFormat;
use omnigate_provider_core::{
    CredentialUpdate, Credentials, Headers, ProviderResult, RefreshCtx, RouteCtx, UpstreamProvider,
    bearer, with_retry,
};

use super::oauth_common::{form_headers, refresh_form};

const PROVIDER_NAME: &str = "qwen";
const DEFAULT_RESOURCE: &str = "portal.qwen.ai";
const TOKEN_URL: &str = "https://chat.qwen.ai/api/v1/oauth2/token";
const CLIENT_ID: &str = "f0304373b74a44d2b584a3fb70ca9e56";
const RESOURCE_KEY: &str = "resourceUrl";

const MODELS: &[&str] = &["qwen3-coder-plus", "qwen3-coder-flash"];

#[derive(Debug, Default)]
pub struct QwenProvider;

#[async_trait::async_trait]
impl UpstreamProvider for QwenProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn alias(&self) -> Option<&'static str> {
        Some("qw")
    }

    fn default_format(&self) -> WireFormat {
        WireFormat::OpenAIChat
    }

    /// The token response names the regional host to call.
    fn build_url(&self, ctx: &RouteCtx<'_>) -> ProviderResult<String> {
        let host = ctx
            .base_url
            .or_else(|| ctx.credentials.data_str(RESOURCE_KEY))
            .unwrap_or(DEFAULT_RESOURCE)
            .trim_end_matches('/');
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        let base = base.strip_suffix("/v1").unwrap_or(&base);
        Ok(format!("{base}/v1/chat/completions"))
    }

    fn build_headers(&self, ctx: &RouteCtx<'_>, _body: &Value) -> ProviderResult<Headers> {
        let mut headers = Headers::new();
        bearer(&mut headers, ctx.credentials.require_access_token()?);
        Ok(headers)
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
        ];
        let mut tokens = with_retry(ctx.policy, PROVIDER_NAME, || {
            refresh_form(ctx.client, TOKEN_URL, form_headers(), &pairs)
        })
        .await?;
        let resource = tokens.extra.remove("resource_url");
        let mut update = tokens.into_update();
        if let Some(resource @ Value::String(_)) = resource {
            let mut data = Map::new();
            data.insert(RESOURCE_KEY.to_string(), resource);
            update.provider_specific_data = data;
        }
        Ok(Some(update))
    }

    fn models(&self) -> &'static [&'static str] {
        MODELS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_for(data: Value) -> String {
        let creds: Credentials =
            serde_json::from_value(serde_json::json!({"providerSpecificData": data})).unwrap();
        let ctx = RouteCtx {
            model: "qwen3-coder-plus",
            stream: false,
            credentials: &creds,
            base_url: None,
        };
        QwenProvider.build_url(&ctx).unwrap()
    }

    #[test]
    fn resource_url_selects_host() {
        assert_eq!(url_for(serde_json::json!({})), "https://portal.qwen.ai/v1/chat/completions");
        assert_eq!(
            url_for(serde_json::json!({"resourceUrl": "dashscope.aliyuncs.com/compatible-mode"})),
            "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
        );
        assert_eq!(
            url_for(serde_json::json!({"resourceUrl": "https://example.test/v1"})),
            "https://example.test/v1/chat/completions"
        );
    }
}
