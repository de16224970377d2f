use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Why a provider could not build, sign or refresh an upstream call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// Credentials lack a field the provider signs with (`accessToken`, `apiKey`, ...).
    #[error("missing credential field: {0}")]
    MissingCredentialField(&'static str),
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn other(err: impl std::fmt::Display) -> Self {
        ProviderError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        assert_eq!(
            ProviderError::MissingCredentialField("apiKey").to_string(),
            "missing credential field: apiKey"
        );
        assert_eq!(ProviderError::Unsupported("refresh").to_string(), "unsupported: refresh");
        assert_eq!(
            ProviderError::InvalidConfig("bad base url".into()).to_string(),
            "invalid config: bad base url"
        );
        assert_eq!(ProviderError::other("refresh_token_failed: 400").to_string(), "refresh_token_failed: 400");

        let boxed: Box<dyn std::error::Error> = Box::new(ProviderError::Other("x".into()));
        assert_eq!(boxed.to_string(), "x");
    }
}
