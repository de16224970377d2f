use serde::{Deserialize, Serialize};

/// OpenAI-compatible error envelope returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub code: String,
}

/// `(type, code, default message)` for a status.
pub fn error_kind_for_status(status: u16) -> (&'static str, &'static str, &'static str) {
    match status {
        400 => ("invalid_request_error", "bad_request", "Bad request"),
        401 => (
            "authentication_error",
            "invalid_api_key",
            "Invalid API key provided",
        ),
        403 => (
            "permission_error",
            "insufficient_quota",
            "You exceeded your current quota",
        ),
        404 => ("invalid_request_error", "model_not_found", "Model not found"),
        429 => (
            "rate_limit_error",
            "rate_limit_exceeded",
            "Rate limit exceeded",
        ),
        500 => (
            "server_error",
            "internal_server_error",
            "Internal server error",
        ),
        502 => (
            "server_error",
            "bad_gateway",
            "Bad gateway - upstream provider error",
        ),
        503 => (
            "server_error",
            "service_unavailable",
            "Service temporarily unavailable",
        ),
        504 => ("server_error", "gateway_timeout", "Gateway timeout"),
        s if s >= 500 => ("server_error", "internal_server_error", "An error occurred"),
        _ => ("invalid_request_error", "", "An error occurred"),
    }
}

impl ErrorBody {
    /// Build the envelope; an empty message falls back to the status default.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        let (kind, code, default_message) = error_kind_for_status(status);
        let message = message.into();
        let message = if message.is_empty() {
            default_message.to_string()
        } else {
            message
        };
        Self {
            error: ErrorDetail {
                message,
                kind: kind.to_string(),
                code: code.to_string(),
            },
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_statuses() {
        assert_eq!(error_kind_for_status(401).1, "invalid_api_key");
        assert_eq!(error_kind_for_status(504).1, "gateway_timeout");
        assert_eq!(error_kind_for_status(599).0, "server_error");
        assert_eq!(error_kind_for_status(418), ("invalid_request_error", "", "An error occurred"));
    }

    #[test]
    fn empty_message_uses_default() {
        let body = ErrorBody::new(429, "");
        assert_eq!(body.error.message, "Rate limit exceeded");
        let json: serde_json::Value = serde_json::from_str(&body.to_json()).unwrap();
        assert_eq!(json["error"]["type"], "rate_limit_error");
        assert_eq!(json["error"]["code"], "rate_limit_exceeded");
    }
}
