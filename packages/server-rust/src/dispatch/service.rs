//! Service descriptor contract: the operations the registry binds and the
//! pipeline invokes.

use async_trait::async_trait;
use restgate_core::{Method, Validator};
use serde_json::{Map, Value};

use super::context::RequestContext;

/// Failure of the per-service rate-limit gate.
///
/// The gate's semantics (windowing, backoff, token buckets) live entirely
/// inside the service; the pipeline only sees admit or reject.
#[derive(Debug, thiserror::Error)]
#[error("rate limit gate rejected the call: {0}")]
pub struct GateError(pub String);

/// Errors a service invocation can produce.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A declared business error. Code and reason are chosen by the service
    /// and surfaced verbatim to the caller in the failure envelope.
    #[error("{reason}")]
    Declared { code: u16, reason: String },
    /// Anything else. Logged with a correlation id server-side; the caller
    /// only ever sees the id.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Builds a declared business error.
    pub fn declared(code: u16, reason: impl Into<String>) -> Self {
        Self::Declared {
            code,
            reason: reason.into(),
        }
    }
}

/// Tagged result of a successful invocation.
///
/// Replaces result-type sniffing with an explicit variant: either the
/// pipeline renders a JSON-like value through the negotiated codec, or the
/// service hands back a fully formed transport response.
pub enum ServiceReply {
    /// Render this value through the negotiated codec.
    Json(Value),
    /// No content; the pipeline answers 204.
    Empty,
    /// The service rendered the response itself; deliver it untouched.
    Raw(axum::response::Response),
}

/// One registered operation: binding metadata plus the callable.
///
/// Descriptors are immutable after registration and shared across all
/// in-flight dispatches, so every method takes `&self`.
#[async_trait]
pub trait RestService: Send + Sync {
    /// Unique human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Binding path the service registers under (normalized at registration).
    fn binding(&self) -> &str;

    /// The single HTTP method this service answers.
    fn method(&self) -> Method;

    /// Visibility tags. A dispatcher configured with required tags hides
    /// services that advertise none of them.
    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Maximum accepted request body in bytes; 0 inherits the dispatcher
    /// default.
    fn max_body_size(&self) -> u64 {
        0
    }

    /// Optional payload validator, run between parsing and invocation.
    fn validator(&self) -> Option<&dyn Validator> {
        None
    }

    /// Rate-limit gate, called once immediately before invocation.
    ///
    /// # Errors
    ///
    /// Returns [`GateError`] to deny this single request. The default
    /// implementation always admits.
    async fn acquire(&self) -> Result<(), GateError> {
        Ok(())
    }

    /// Invokes the operation with the request context and parsed body.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Declared`] renders at the declared status;
    /// anything else takes the correlation-id path.
    async fn call(
        &self,
        ctx: &mut RequestContext,
        body: Map<String, Value>,
    ) -> Result<ServiceReply, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Minimal;

    #[async_trait]
    impl RestService for Minimal {
        fn name(&self) -> &str {
            "minimal"
        }
        fn binding(&self) -> &str {
            "/minimal"
        }
        fn method(&self) -> Method {
            Method::Get
        }
        async fn call(
            &self,
            _ctx: &mut RequestContext,
            _body: Map<String, Value>,
        ) -> Result<ServiceReply, ServiceError> {
            Ok(ServiceReply::Empty)
        }
    }

    #[test]
    fn descriptor_defaults() {
        let svc = Minimal;
        assert!(svc.tags().is_empty());
        assert_eq!(svc.max_body_size(), 0);
        assert!(svc.validator().is_none());
    }

    #[tokio::test]
    async fn gate_admits_by_default() {
        assert!(Minimal.acquire().await.is_ok());
    }

    #[test]
    fn declared_error_carries_code_and_reason() {
        let err = ServiceError::declared(422, "bad state");
        match err {
            ServiceError::Declared { code, reason } => {
                assert_eq!(code, 422);
                assert_eq!(reason, "bad state");
            }
            ServiceError::Internal(_) => panic!("expected declared error"),
        }
    }
}
