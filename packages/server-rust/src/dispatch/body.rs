//! Bounded request-body acquisition.
//!
//! The body is read as a stream so an oversized payload is rejected as
//! soon as the cap is crossed, without buffering the rest.

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

/// Failures while acquiring the request body.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    /// Declared or streamed size crossed the effective limit.
    #[error("body exceeds limit of ({limit}) bytes")]
    TooLarge { limit: u64 },
    /// Transport-level read failure.
    #[error("body read failed: {0}")]
    Read(String),
}

/// Effective body cap from the service and dispatcher limits.
///
/// 0 means "not configured" on either side; when both are configured the
/// smaller wins; when neither is, the body is unbounded.
#[must_use]
pub fn effective_limit(service_limit: u64, default_limit: u64) -> Option<u64> {
    match (service_limit, default_limit) {
        (0, 0) => None,
        (0, configured) | (configured, 0) => Some(configured),
        (service, default) => Some(service.min(default)),
    }
}

/// Reads the whole body, enforcing the cap.
///
/// A declared `Content-Length` over the limit fails before any byte is
/// read; otherwise the stream is abandoned the moment accumulated bytes
/// cross the limit.
///
/// # Errors
///
/// [`BodyError::TooLarge`] on a crossed limit, [`BodyError::Read`] on a
/// transport failure.
pub async fn read_bounded(
    body: Body,
    declared_length: Option<u64>,
    limit: Option<u64>,
) -> Result<Bytes, BodyError> {
    if let (Some(declared), Some(limit)) = (declared_length, limit) {
        if declared > limit {
            return Err(BodyError::TooLarge { limit });
        }
    }

    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BodyError::Read(e.to_string()))?;
        if let Some(limit) = limit {
            if buf.len() as u64 + chunk.len() as u64 > limit {
                return Err(BodyError::TooLarge { limit });
            }
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}
