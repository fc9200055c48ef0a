//! Dispatch failure taxonomy: every pipeline short-circuit mapped to a status.

use http::StatusCode;

/// Terminal failures produced by the dispatch pipeline.
///
/// Each variant carries enough context for the server-side log line; the
/// caller-visible reason is deliberately narrower (see [`Self::reason`]),
/// so internal detail never leaks into the response envelope.
#[derive(Debug, thiserror::Error)]
pub enum DispatchFailure {
    /// Raw request path was blank after trimming.
    #[error("empty service path found")]
    EmptyPath,
    /// No service registered under the binding, for any method.
    #[error("service or binding not found ({binding})")]
    UnknownBinding { binding: String },
    /// Binding exists, but not for the inbound method.
    #[error("service ({binding}) not type ({method})")]
    MethodMismatch { binding: String, method: String },
    /// Service exists but advertises none of the dispatcher's required tags.
    #[error("service ({binding}) for tags not found")]
    HiddenByTags { binding: String },
    /// Authorization decision was negative.
    #[error("service authorization failed for ({binding}) reason ({reason})")]
    Unauthorized { binding: String, reason: String },
    /// Declared or streamed body size exceeded the effective limit.
    #[error("request body exceeds limit of ({limit}) bytes")]
    BodyTooLarge { limit: u64 },
    /// Body bytes could not be parsed by the negotiated codec.
    ///
    /// Classified as an internal error (500), not a client error (400).
    /// Callers depend on the current mapping; changing it means changing
    /// `status()` and the tests that pin it.
    #[error("malformed request body: {detail}")]
    MalformedBody { detail: String },
    /// Declared validator rejected the parsed payload.
    #[error("request validation failed: {detail}")]
    Invalid { detail: String },
    /// Anything unclassified; the caller only ever sees the correlation id.
    #[error("internal error ({correlation_id})")]
    Internal { correlation_id: String },
}

impl DispatchFailure {
    /// HTTP status this failure terminates the request with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownBinding { .. } | Self::HiddenByTags { .. } => StatusCode::NOT_FOUND,
            Self::MethodMismatch { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unauthorized { .. } => StatusCode::FORBIDDEN,
            Self::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Invalid { .. } => StatusCode::BAD_REQUEST,
            Self::EmptyPath | Self::MalformedBody { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Opaque reason string surfaced to the caller in the failure envelope.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::EmptyPath => "empty service path".to_string(),
            Self::UnknownBinding { .. } | Self::HiddenByTags { .. } => "not found".to_string(),
            Self::MethodMismatch { method, .. } => format!("method not allowed ({method})"),
            Self::Unauthorized { reason, .. } => reason.clone(),
            Self::BodyTooLarge { limit } => format!("body exceeds limit of {limit} bytes"),
            Self::MalformedBody { .. } => "malformed body".to_string(),
            Self::Invalid { detail } => detail.clone(),
            Self::Internal { correlation_id } => correlation_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_failures_map_to_404_and_405() {
        let unknown = DispatchFailure::UnknownBinding {
            binding: "/nope".to_string(),
        };
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let hidden = DispatchFailure::HiddenByTags {
            binding: "/hidden".to_string(),
        };
        assert_eq!(hidden.status(), StatusCode::NOT_FOUND);

        let mismatch = DispatchFailure::MethodMismatch {
            binding: "/users".to_string(),
            method: "POST".to_string(),
        };
        assert_eq!(mismatch.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn payload_failures_map_to_413_400_500() {
        assert_eq!(
            DispatchFailure::BodyTooLarge { limit: 1024 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            DispatchFailure::Invalid {
                detail: "missing field".to_string()
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        // Parse failures map to 500, not 400.
        assert_eq!(
            DispatchFailure::MalformedBody {
                detail: "eof".to_string()
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_reason_is_only_the_correlation_id() {
        let failure = DispatchFailure::Internal {
            correlation_id: "3f2a".to_string(),
        };
        assert_eq!(failure.reason(), "3f2a");
    }

    #[test]
    fn malformed_body_reason_hides_parser_detail() {
        let failure = DispatchFailure::MalformedBody {
            detail: "expected ident at line 1 column 2".to_string(),
        };
        assert_eq!(failure.reason(), "malformed body");
    }
}
