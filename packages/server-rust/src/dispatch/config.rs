//! Dispatcher configuration.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Request header that selects strict rendering for the response body.
pub const STRICT_RENDER_HEADER: &str = "x-strict-json-format";

/// How the dispatcher identifies the operation a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressingMode {
    /// Operation resolved from the request path (the default).
    #[default]
    Path,
    /// RPC calling convention: the operation name comes from the body's
    /// `command` field and the payload from its `request` sub-object.
    /// Requests without a body (GET) still resolve by path.
    CommandBody,
}

/// Payload cleaning hook, applied to the inbound body after parsing and to
/// outbound results before rendering. The flag is `true` on the outbound
/// pass.
pub type CleanHook = Arc<dyn Fn(Value, bool) -> Value + Send + Sync>;

/// Per-dispatcher configuration, fixed at construction.
#[derive(Clone, Default)]
pub struct DispatcherConfig {
    /// Default maximum request body in bytes; 0 = unbounded. A service's
    /// own limit caps this further (the smaller configured value wins).
    pub max_body_size: u64,
    /// When non-empty, only services advertising at least one of these
    /// tags are visible through this dispatcher; others answer 404.
    pub required_tags: Vec<String>,
    /// Roles assumed when the session has none (or there is no session).
    pub default_roles: Vec<String>,
    /// Operation addressing strategy, resolved once per dispatcher.
    pub addressing: AddressingMode,
    /// Optional inbound/outbound payload cleaning hook.
    pub clean: Option<CleanHook>,
}

impl fmt::Debug for DispatcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherConfig")
            .field("max_body_size", &self.max_body_size)
            .field("required_tags", &self.required_tags)
            .field("default_roles", &self.default_roles)
            .field("addressing", &self.addressing)
            .field("clean", &self.clean.as_ref().map(|_| "<hook>"))
            .finish()
    }
}
