//! Session and authorization collaborator contracts.
//!
//! The pipeline treats identity as three pluggable seams: a strategy that
//! extracts a session token from the request, a store that resolves tokens
//! to sessions, and an authorization decision provider. In-memory and
//! permissive defaults are supplied for wiring and tests; production hosts
//! bring their own implementations.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use http::request::Parts;
use parking_lot::RwLock;

use super::service::RestService;

/// Default header the built-in strategy reads session tokens from.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// A resolved server session.
///
/// The role list is live: mutations through [`Self::set_roles`] are visible
/// to every context already holding this session.
pub struct Session {
    id: String,
    user_id: String,
    roles: RwLock<Vec<String>>,
    expires_at: Option<Instant>,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            roles: RwLock::new(roles),
            expires_at: None,
        }
    }

    /// Session expiring at the given instant.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: Instant) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Snapshot of the live role list.
    #[must_use]
    pub fn roles(&self) -> Vec<String> {
        self.roles.read().clone()
    }

    /// Replaces the live role list.
    pub fn set_roles(&self, roles: Vec<String>) {
        *self.roles.write() = roles;
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Extracts a session token from the transport request head.
pub trait SessionIdStrategy: Send + Sync {
    fn extract(&self, head: &Parts) -> Option<String>;
}

/// Reads the session token from a configurable request header.
pub struct HeaderSessionId {
    header: String,
}

impl HeaderSessionId {
    #[must_use]
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl Default for HeaderSessionId {
    fn default() -> Self {
        Self::new(SESSION_ID_HEADER)
    }
}

impl SessionIdStrategy for HeaderSessionId {
    fn extract(&self, head: &Parts) -> Option<String> {
        let value = head.headers.get(&self.header)?.to_str().ok()?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}

/// Resolves session tokens to sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Looks up an existing session.
    async fn lookup(&self, token: &str) -> Option<Arc<Session>>;

    /// Creates a session for a token the store has not seen, when the
    /// store supports implicit creation. Stores that only resolve
    /// externally minted sessions return `None`.
    async fn create(&self, token: &str) -> Option<Arc<Session>>;
}

/// In-memory session store over a concurrent map.
///
/// Expired sessions are dropped on lookup rather than swept in the
/// background.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Arc<Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a session under its own id.
    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.insert(session.id().to_string(), session);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn lookup(&self, token: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(token).map(|e| Arc::clone(e.value()))?;
        if session.is_expired() {
            self.sessions.remove(token);
            return None;
        }
        Some(session)
    }

    async fn create(&self, _token: &str) -> Option<Arc<Session>> {
        None
    }
}

/// Outcome of an authorization decision.
///
/// The reason is an opaque string: it is logged and echoed in the
/// `WWW-Authenticate` header, so it must not carry internal detail.
#[derive(Debug, Clone)]
pub struct AuthDecision {
    pub authorized: bool,
    pub admin: bool,
    pub reason: String,
}

impl AuthDecision {
    #[must_use]
    pub fn allow(admin: bool) -> Self {
        Self {
            authorized: true,
            admin,
            reason: String::new(),
        }
    }

    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            authorized: false,
            admin: false,
            reason: reason.into(),
        }
    }
}

/// External authorization decision provider.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn decide(
        &self,
        head: &Parts,
        session: Option<&Session>,
        service: &dyn RestService,
        roles: &[String],
    ) -> AuthDecision;
}

/// Permissive authorizer: every request is admitted, nobody is admin.
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn decide(
        &self,
        _head: &Parts,
        _session: Option<&Session>,
        _service: &dyn RestService,
        _roles: &[String],
    ) -> AuthDecision {
        AuthDecision::allow(false)
    }
}
