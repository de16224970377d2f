use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::info;

use omnigate_protocol::WireFormat;

use crate::context::TranslateCtx;
use crate::error::{TransformError, TransformResult};
use crate::generate_content::{FormatCodec, builtin_codecs, gemini_cli};

static REGISTRY: OnceCell<TranslatorRegistry> = OnceCell::const_new();

/// Process-wide registry, built and validated on the first call.
///
/// Concurrent first callers wait on the same initialisation; a validation
/// failure is returned to every caller and retried on the next call.
pub async fn ensure_initialized() -> TransformResult<&'static TranslatorRegistry> {
    REGISTRY
        .get_or_try_init(|| async {
            let registry = TranslatorRegistry::builtin()?;
            info!(
                event = "translator_registry_initialized",
                formats = registry.codecs.len(),
            );
            Ok(registry)
        })
        .await
}

/// `false` only for identical formats; those are relayed without re-encoding.
pub fn needs_translation(target: WireFormat, source: WireFormat) -> bool {
    target != source
}

/// Composes `source -> hub -> target` from per-format codecs.
#[derive(Debug)]
pub struct TranslatorRegistry {
    codecs: HashMap<WireFormat, FormatCodec>,
}

impl TranslatorRegistry {
    pub fn builtin() -> TransformResult<Self> {
        Self::with_codecs(builtin_codecs())
    }

    /// Build a registry and check that every ordered format pair resolves.
    pub fn with_codecs(codecs: Vec<FormatCodec>) -> TransformResult<Self> {
        let registry = Self {
            codecs: codecs.into_iter().map(|c| (c.format, c)).collect(),
        };
        registry.validate()?;
        Ok(registry)
    }

    pub fn validate(&self) -> TransformResult<()> {
        for source in WireFormat::ALL {
            for target in WireFormat::ALL {
                if needs_translation(target, source) && !is_envelope_pair(source, target) {
                    self.codec(source, source, target)?;
                    self.codec(target, source, target)?;
                }
            }
        }
        Ok(())
    }

    pub fn translate_request(&self, ctx: &TranslateCtx<'_>, body: Value) -> TransformResult<Value> {
        let (source, target) = (ctx.source, ctx.target);
        if !needs_translation(target, source) {
            return Ok(body);
        }
        match (source, target) {
            (WireFormat::Gemini, WireFormat::GeminiCli) => gemini_cli::wrap_request(body, ctx),
            (WireFormat::GeminiCli, WireFormat::Gemini) => gemini_cli::unwrap_request(body),
            _ => {
                let hub = (self.codec(source, source, target)?.request_to_hub)(body, ctx)?;
                (self.codec(target, source, target)?.request_from_hub)(hub, ctx)
            }
        }
    }

    /// Convert a non-stream `upstream` body into the `client` format.
    pub fn translate_response(
        &self,
        upstream: WireFormat,
        client: WireFormat,
        body: Value,
    ) -> TransformResult<Value> {
        if !needs_translation(client, upstream) {
            return Ok(body);
        }
        match (upstream, client) {
            (WireFormat::GeminiCli, WireFormat::Gemini) => Ok(gemini_cli::unwrap_response(body)),
            (WireFormat::Gemini, WireFormat::GeminiCli) => Ok(gemini_cli::wrap_response(body)),
            _ => {
                let hub = (self.codec(upstream, upstream, client)?.response_to_hub)(body)?;
                (self.codec(client, upstream, client)?.response_from_hub)(hub)
            }
        }
    }

    pub fn formats(&self) -> impl Iterator<Item = WireFormat> + '_ {
        self.codecs.keys().copied()
    }

    fn codec(&self, format: WireFormat, from: WireFormat, to: WireFormat) -> TransformResult<&FormatCodec> {
        self.codecs
            .get(&format)
            .ok_or(TransformError::TranslatorMissing { from, to })
    }
}

/// Gemini and its Cloud Code envelope convert by wrapping, without the hub.
fn is_envelope_pair(a: WireFormat, b: WireFormat) -> bool {
    matches!(
        (a, b),
        (WireFormat::Gemini, WireFormat::GeminiCli) | (WireFormat::GeminiCli, WireFormat::Gemini)
    )
}
