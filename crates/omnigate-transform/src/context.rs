use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use omnigate_protocol::WireFormat;

use crate::error::{TransformError, TransformResult};

/// What to do with a content part the target format cannot carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartPolicy {
    /// Drop the part and log a warning.
    #[default]
    Drop,
    /// Fail the translation.
    Reject,
}

/// Everything a request translator may consult besides the body itself.
#[derive(Debug, Clone, Copy)]
pub struct TranslateCtx<'a> {
    pub source: WireFormat,
    pub target: WireFormat,
    pub model: &'a str,
    pub stream: bool,
    pub provider: &'a str,
    /// `providerSpecificData` of the credentials the request will use.
    pub provider_data: &'a Map<String, Value>,
    pub part_policy: PartPolicy,
}

impl<'a> TranslateCtx<'a> {
    pub fn new(source: WireFormat, target: WireFormat, model: &'a str, stream: bool) -> Self {
        static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
        Self {
            source,
            target,
            model,
            stream,
            provider: "",
            provider_data: EMPTY.get_or_init(Map::new),
            part_policy: PartPolicy::Drop,
        }
    }

    pub fn with_provider(mut self, provider: &'a str, provider_data: &'a Map<String, Value>) -> Self {
        self.provider = provider;
        self.provider_data = provider_data;
        self
    }

    pub fn with_part_policy(mut self, part_policy: PartPolicy) -> Self {
        self.part_policy = part_policy;
        self
    }

    /// Apply the part policy to a part that `format` cannot represent.
    pub fn unsupported_part(&self, format: WireFormat, part: &str) -> TransformResult<()> {
        match self.part_policy {
            PartPolicy::Drop => {
                warn!(
                    event = "unsupported_part_dropped",
                    source = %self.source,
                    target = %format,
                    provider = %self.provider,
                    part = %part,
                    "content part dropped during translation"
                );
                Ok(())
            }
            PartPolicy::Reject => Err(TransformError::UnsupportedContentPart {
                target: format,
                part: part.to_string(),
            }),
        }
    }

    pub fn provider_str(&self, key: &str) -> Option<&'a str> {
        self.provider_data.get(key).and_then(Value::as_str)
    }
}
