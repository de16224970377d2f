//! Format detection and translation between chat wire formats.
//!
//! OpenAI chat completions is the hub: every other format registers a codec
//! to and from the hub, and the registry composes `source -> hub -> target`
//! for any ordered pair.

pub mod context;
pub mod detect;
pub mod error;
pub mod generate_content;
pub mod registry;
pub mod stream;

pub use context::{PartPolicy, TranslateCtx};
pub use detect::{DETECTION_TABLE, DEFAULT_FORMAT, detect_format};
pub use error::{TransformError, TransformResult};
pub use registry::{TranslatorRegistry, ensure_initialized, needs_translation};
pub use stream::{StreamEvent, StreamTransformer, decode_stream_event};

pub use omnigate_protocol::WireFormat;
