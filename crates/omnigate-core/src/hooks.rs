use async_trait::async_trait;

use omnigate_provider_core::CredentialUpdate;

/// Notifications the orchestrator sends back to whoever owns the credentials.
///
/// Each hook fires at most once per chat call.
#[async_trait]
pub trait ChatHooks: Send + Sync {
    /// A refresh succeeded. `update` holds only the fields that changed.
    async fn on_credentials_refreshed(&self, _update: &CredentialUpdate) {}

    /// The upstream accepted the call (streaming or not).
    async fn on_request_success(&self) {}

    /// The client went away before the response finished.
    fn on_disconnect(&self) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl ChatHooks for NoopHooks {}
