//! Per-request context handed to the invoked service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::request::Parts;
use restgate_core::Method;
use serde_json::{Map, Value};

use super::session::Session;

/// Per-call state bag: resolved session, effective roles, method, and the
/// transport request head.
///
/// Owned by exactly one dispatch call; never shared across requests.
/// Identity accessors are late-binding: they query the live [`Session`]
/// on every read and only fall back to the values captured at
/// construction, so role or user mutations made after the context was
/// built are visible to later reads.
pub struct RequestContext {
    method: Method,
    session: Option<Arc<Session>>,
    token: Option<String>,
    fallback_roles: Vec<String>,
    admin: bool,
    head: Parts,
    params: Map<String, Value>,
    closed: AtomicBool,
}

impl RequestContext {
    #[must_use]
    pub fn new(
        method: Method,
        session: Option<Arc<Session>>,
        token: Option<String>,
        fallback_roles: Vec<String>,
        admin: bool,
        head: Parts,
        params: Map<String, Value>,
    ) -> Self {
        Self {
            method,
            session,
            token,
            fallback_roles,
            admin,
            head,
            params,
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    /// Transport request head (URI, headers, extensions).
    #[must_use]
    pub fn head(&self) -> &Parts {
        &self.head
    }

    /// Query parameters as a JSON object.
    #[must_use]
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Session id from the live session, else the token extracted from the
    /// request, else `None`.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session
            .as_ref()
            .map(|s| s.id().to_string())
            .or_else(|| self.token.clone())
    }

    /// User id from the live session, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.user_id().to_string())
    }

    /// Effective roles: the live session's role list when non-empty,
    /// otherwise the fallback list supplied at construction.
    #[must_use]
    pub fn roles(&self) -> Vec<String> {
        if let Some(session) = &self.session {
            let roles = session.roles();
            if !roles.is_empty() {
                return roles;
            }
        }
        self.fallback_roles.clone()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    #[must_use]
    pub fn is_get(&self) -> bool {
        self.method == Method::Get
    }

    #[must_use]
    pub fn is_put(&self) -> bool {
        self.method == Method::Put
    }

    #[must_use]
    pub fn is_post(&self) -> bool {
        self.method == Method::Post
    }

    #[must_use]
    pub fn is_patch(&self) -> bool {
        self.method == Method::Patch
    }

    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.method == Method::Delete
    }

    #[must_use]
    pub fn is_head(&self) -> bool {
        self.method == Method::Head
    }

    /// Marks the context closed: the service takes responsibility for the
    /// response and the pipeline writes nothing further. Idempotent.
    ///
    /// With this transport a service that wants to self-render should
    /// return `ServiceReply::Raw`; closing suppresses the pipeline's
    /// envelope for both results and declared errors.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head() -> Parts {
        let (parts, ()) = http::Request::builder()
            .uri("/test?x=1")
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    fn context(session: Option<Arc<Session>>, fallback: Vec<String>) -> RequestContext {
        RequestContext::new(
            Method::Post,
            session,
            Some("tok-9".to_string()),
            fallback,
            false,
            head(),
            Map::new(),
        )
    }

    #[test]
    fn close_is_idempotent() {
        let ctx = context(None, vec![]);
        assert!(ctx.is_open());
        assert!(!ctx.is_closed());

        ctx.close();
        assert!(!ctx.is_open());

        // Second close does not panic and the state stays closed.
        ctx.close();
        assert!(!ctx.is_open());
        assert!(ctx.is_closed());
    }

    #[test]
    fn session_roles_win_when_non_empty() {
        let session = Arc::new(Session::new("s1", "u1", vec!["admin".to_string()]));
        let ctx = context(Some(session), vec!["guest".to_string()]);
        assert_eq!(ctx.roles(), vec!["admin".to_string()]);
    }

    #[test]
    fn fallback_roles_used_when_session_roles_empty() {
        let session = Arc::new(Session::new("s1", "u1", vec![]));
        let ctx = context(Some(session), vec!["guest".to_string()]);
        assert_eq!(ctx.roles(), vec!["guest".to_string()]);
    }

    #[test]
    fn role_reads_see_later_session_mutations() {
        let session = Arc::new(Session::new("s1", "u1", vec![]));
        let ctx = context(Some(Arc::clone(&session)), vec!["guest".to_string()]);
        assert_eq!(ctx.roles(), vec!["guest".to_string()]);

        session.set_roles(vec!["writer".to_string()]);
        assert_eq!(ctx.roles(), vec!["writer".to_string()]);
    }

    #[test]
    fn session_id_falls_back_to_extracted_token() {
        let without_session = context(None, vec![]);
        assert_eq!(without_session.session_id(), Some("tok-9".to_string()));
        assert_eq!(without_session.user_id(), None);

        let session = Arc::new(Session::new("s1", "u1", vec![]));
        let with_session = context(Some(session), vec![]);
        assert_eq!(with_session.session_id(), Some("s1".to_string()));
        assert_eq!(with_session.user_id(), Some("u1".to_string()));
    }

    #[test]
    fn method_predicates() {
        let ctx = context(None, vec![]);
        assert!(ctx.is_post());
        assert!(!ctx.is_get());
        assert!(!ctx.is_head());
        assert_eq!(ctx.method(), Method::Post);
    }
}
