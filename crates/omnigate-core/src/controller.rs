//! Per-request cancellation, bound to client disconnects.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::hooks::ChatHooks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Idle = 0,
    InFlight = 1,
    Completed = 2,
    Aborted = 3,
    Errored = 4,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StreamState::Idle,
            1 => StreamState::InFlight,
            2 => StreamState::Completed,
            3 => StreamState::Aborted,
            _ => StreamState::Errored,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Aborted | StreamState::Errored
        )
    }
}

/// `Idle -> InFlight -> {Completed | Aborted | Errored}`.
///
/// The token is cancelled on abort; everything upstream of the client
/// (the HTTP call, refresh calls, the relay task) selects on it.
pub struct StreamController {
    state: AtomicU8,
    token: CancellationToken,
    hooks: Arc<dyn ChatHooks>,
    provider: String,
    model: String,
}

impl StreamController {
    pub fn new(
        parent: &CancellationToken,
        hooks: Arc<dyn ChatHooks>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(StreamState::Idle as u8),
            token: parent.child_token(),
            hooks,
            provider: provider.into(),
            model: model.into(),
        })
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_aborted(&self) -> bool {
        self.state() == StreamState::Aborted
    }

    pub fn begin(&self) -> bool {
        self.transition(StreamState::Idle, StreamState::InFlight)
    }

    pub fn complete(&self) -> bool {
        self.transition(StreamState::InFlight, StreamState::Completed)
    }

    pub fn fail(&self) -> bool {
        self.transition(StreamState::InFlight, StreamState::Errored)
            || self.transition(StreamState::Idle, StreamState::Errored)
    }

    /// Move to `Aborted`, cancel the token and notify the hooks.
    ///
    /// Returns `false` if the request had already finished; the callback
    /// fires only on the winning transition.
    pub fn abort(&self) -> bool {
        let won = self.transition(StreamState::InFlight, StreamState::Aborted)
            || self.transition(StreamState::Idle, StreamState::Aborted);
        if !won {
            return false;
        }
        self.token.cancel();
        info!(
            event = "client_disconnected",
            provider = %self.provider,
            model = %self.model,
        );
        self.hooks.on_disconnect();
        true
    }

    fn transition(&self, from: StreamState, to: StreamState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Aborts the controller if dropped before [`AbortGuard::disarm`].
///
/// Held across the upstream call so that dropping the handler future
/// (the client hung up before headers were sent) still cancels the call and
/// reports the disconnect.
pub struct AbortGuard {
    controller: Option<Arc<StreamController>>,
}

impl AbortGuard {
    pub fn new(controller: Arc<StreamController>) -> Self {
        Self {
            controller: Some(controller),
        }
    }

    pub fn disarm(mut self) {
        self.controller = None;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if let Some(controller) = self.controller.take()
            && !controller.state().is_terminal()
        {
            controller.abort();
        }
    }
}
