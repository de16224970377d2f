use omnigate_protocol::WireFormat;
use thiserror::Error;

pub type TransformResult<T> = Result<T, TransformError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("invalid {format} body: {message}")]
    InvalidBody { format: WireFormat, message: String },
    #[error("content part `{part}` is not supported by {target}")]
    UnsupportedContentPart { target: WireFormat, part: String },
    #[error("no translator registered for {from} -> {to}")]
    TranslatorMissing { from: WireFormat, to: WireFormat },
    #[error("stream event does not belong to {expected}")]
    StreamMismatch { expected: WireFormat },
    #[error("upstream stream error: {0}")]
    UpstreamStream(String),
}

impl TransformError {
    pub fn invalid(format: WireFormat, err: impl std::fmt::Display) -> Self {
        TransformError::InvalidBody {
            format,
            message: err.to_string(),
        }
    }
}
