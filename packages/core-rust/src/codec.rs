//! Media-type codecs: parse and render JSON-like payloads.
//!
//! A [`Codec`] is constructed for one `(media type, strictness)` pair. The
//! dispatch layer memoizes constructed codecs per media-type token; this
//! module only knows how to build and drive them.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Canonical JSON media type, also the negotiation fallback.
pub const MEDIA_TYPE_JSON: &str = "application/json";
/// Canonical YAML media type.
pub const MEDIA_TYPE_YAML: &str = "application/x-yaml";

/// Parse-mode toggle carried by every codec.
///
/// Strict parsing requires the payload to be exactly one document with no
/// trailing content; lenient parsing reads the first document and ignores
/// whatever follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    Strict,
    Lenient,
}

/// Errors produced while constructing or driving a codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unsupported media type ({0})")]
    UnsupportedMediaType(String),
    #[error("malformed payload: {0}")]
    Parse(String),
    #[error("render failed: {0}")]
    Render(String),
}

/// Parser/serializer pair for one media type and strictness mode.
pub trait Codec: Send + Sync + std::fmt::Debug {
    /// Media type this codec was constructed for.
    fn media_type(&self) -> &str;

    /// Parse mode this codec was constructed with.
    fn strictness(&self) -> Strictness;

    /// Parses a payload into a JSON-like value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Parse`] when the payload is malformed.
    fn parse(&self, bytes: &[u8]) -> Result<Value, CodecError>;

    /// Renders a JSON-like value into the output buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Render`] when the value cannot be serialized.
    fn render(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError>;
}

/// Constructs the codec for a media-type token.
///
/// Token matching is case-insensitive and ignores parameters
/// (`application/json; charset=utf-8` resolves the JSON codec).
///
/// # Errors
///
/// Returns [`CodecError::UnsupportedMediaType`] for tokens that name
/// neither a JSON nor a YAML flavor. The caller decides whether a
/// fallback applies; this function never guesses.
pub fn codec_for(token: &str, strictness: Strictness) -> Result<Arc<dyn Codec>, CodecError> {
    let base = token
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if base.contains("json") {
        return Ok(Arc::new(JsonCodec { strictness }));
    }
    if base.contains("yaml") {
        return Ok(Arc::new(YamlCodec { strictness }));
    }
    debug!("no codec for media type ({token})");
    Err(CodecError::UnsupportedMediaType(token.to_string()))
}

/// Picks the response media type from an `Accept` header value.
///
/// Mirrors request-side matching but never fails: anything that is not a
/// recognized YAML flavor renders as JSON.
#[must_use]
pub fn response_media_type(accept: &str) -> &'static str {
    let lower = accept.to_ascii_lowercase();
    if lower.contains("yaml") {
        MEDIA_TYPE_YAML
    } else {
        MEDIA_TYPE_JSON
    }
}

// ---------------------------------------------------------------------------
// JSON codec
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct JsonCodec {
    strictness: Strictness,
}

impl Codec for JsonCodec {
    fn media_type(&self) -> &str {
        MEDIA_TYPE_JSON
    }

    fn strictness(&self) -> Strictness {
        self.strictness
    }

    fn parse(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let mut de = serde_json::Deserializer::from_slice(bytes);
        let value = Value::deserialize(&mut de).map_err(|e| CodecError::Parse(e.to_string()))?;
        if self.strictness == Strictness::Strict {
            // Exactly one document: trailing non-whitespace is an error.
            de.end().map_err(|e| CodecError::Parse(e.to_string()))?;
        }
        Ok(value)
    }

    fn render(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
        serde_json::to_writer(out, value).map_err(|e| CodecError::Render(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// YAML codec
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct YamlCodec {
    strictness: Strictness,
}

impl Codec for YamlCodec {
    fn media_type(&self) -> &str {
        MEDIA_TYPE_YAML
    }

    fn strictness(&self) -> Strictness {
        self.strictness
    }

    fn parse(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        // YAML has no trailing-content distinction here: serde_yaml already
        // rejects multi-document streams in single-value mode.
        serde_yaml::from_slice(bytes).map_err(|e| CodecError::Parse(e.to_string()))
    }

    fn render(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let text = serde_yaml::to_string(value).map_err(|e| CodecError::Render(e.to_string()))?;
        out.extend_from_slice(text.as_bytes());
        Ok(())
    }
}
