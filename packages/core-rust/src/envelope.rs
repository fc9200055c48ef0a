//! Wire-level response envelopes.
//!
//! Failure bodies always have the shape `{"error":{"code":<int>,"reason":<string>}}`.
//! Successful results render directly, except under the RPC calling convention
//! where they are wrapped as `{"result":<value>}`.

use serde_json::{json, Value};

/// Builds the failure envelope for a status code and opaque reason string.
#[must_use]
pub fn error_envelope(code: u16, reason: &str) -> Value {
    json!({ "error": { "code": code, "reason": reason } })
}

/// Wraps a successful result under the RPC calling convention.
#[must_use]
pub fn rpc_envelope(result: Value) -> Value {
    json!({ "result": result })
}
