//! HTTP surface of the gateway: client-facing endpoints for every supported
//! wire format, model listings and the in-memory credential store.

pub mod models;
pub mod proxy;
pub mod resolve;
pub mod store;

pub use proxy::{ProxyState, proxy_router};
pub use resolve::{ResolveError, ResolvedModel, resolve_model};
pub use store::{CredentialStore, ProviderSlot};
