use std::future::Future;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::warn;

use crate::errors::ProviderResult;

/// Default lead time before expiry at which a token counts as stale.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Bounded retry for refresh calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub attempts: u32,
    /// Delay before attempt `n` (1-based, after the first) is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Whether `expires_at` falls within `buffer` of now. Unknown expiry is not stale.
pub fn is_token_expiring_soon(expires_at: Option<OffsetDateTime>, buffer: Duration) -> bool {
    let Some(expires_at) = expires_at else {
        return false;
    };
    let buffer = time::Duration::try_from(buffer).unwrap_or(time::Duration::ZERO);
    expires_at - buffer <= OffsetDateTime::now_utc()
}

/// Run `op` until it succeeds or `policy.attempts` is exhausted; the last
/// error is returned.
pub async fn with_retry<T, F, Fut>(policy: RefreshPolicy, label: &str, mut op: F) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => return Err(err),
            Err(err) => {
                warn!(
                    event = "credential_refresh_retry",
                    provider = %label,
                    attempt,
                    error = %err,
                    "refresh attempt failed"
                );
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
        }
    }
}
