//! Provider abstractions for omnigate.
//!
//! This crate does not depend on any concrete HTTP client. Providers describe
//! the upstream call (url, headers, body) and an [`UpstreamClient`] supplied by
//! a higher layer performs the IO, including credential refresh calls.

pub mod credentials;
pub mod errors;
pub mod headers;
pub mod provider;
pub mod refresh;
pub mod registry;
pub mod upstream;

pub use credentials::{CredentialUpdate, Credentials};
pub use errors::{ProviderError, ProviderResult};
pub use headers::{Headers, bearer, header_get, header_remove, header_set};
pub use provider::{ModelFormatRule, RefreshCtx, RouteCtx, UpstreamProvider};
pub use refresh::{DEFAULT_EXPIRY_BUFFER, RefreshPolicy, is_token_expiring_soon, with_retry};
pub use registry::ProviderRegistry;
pub use upstream::{
    ByteStream, HttpMethod, UpstreamBody, UpstreamChunk, UpstreamClient, UpstreamFailure,
    UpstreamFuture, UpstreamHttpRequest, UpstreamHttpResponse, UpstreamStream,
    UpstreamTransportErrorKind,
};
