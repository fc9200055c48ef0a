//! The dispatch pipeline: resolve, authenticate, parse, validate, invoke,
//! render.
//!
//! A [`Dispatcher`] is built once at startup and shared by every in-flight
//! request; each call to [`Dispatcher::dispatch`] runs the full stage
//! sequence and always produces a terminal response. Nothing escapes the
//! dispatch boundary except through logging.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::header::{
    ACCEPT, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, EXPIRES, PRAGMA, WWW_AUTHENTICATE,
};
use http::request::Parts;
use http::{HeaderMap, HeaderValue, Request, StatusCode};
use restgate_core::codec::{response_media_type, Strictness, MEDIA_TYPE_JSON};
use restgate_core::envelope::{error_envelope, rpc_envelope};
use restgate_core::{normalize, DispatchFailure, Method};
use serde_json::{Map, Value};
use tracing::{error, info};
use url::form_urlencoded;
use uuid::Uuid;

use super::body::{effective_limit, read_bounded, BodyError};
use super::cache::CodecCache;
use super::config::{AddressingMode, DispatcherConfig, STRICT_RENDER_HEADER};
use super::context::RequestContext;
use super::registry::BindingRegistry;
use super::service::{RestService, ServiceError, ServiceReply};
use super::session::{Authorizer, Session, SessionIdStrategy, SessionStore};

/// Orchestrates one request through the full dispatch sequence.
///
/// Holds direct references to everything it needs: the frozen registry,
/// the strict and lenient codec caches, the session strategy and store,
/// the authorization provider, and its configuration. No global lookups.
pub struct Dispatcher {
    registry: Arc<BindingRegistry>,
    strict_codecs: CodecCache,
    lenient_codecs: CodecCache,
    session_ids: Arc<dyn SessionIdStrategy>,
    sessions: Arc<dyn SessionStore>,
    authorizer: Arc<dyn Authorizer>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Builds a dispatcher over a frozen registry.
    ///
    /// Both codec caches are created here, empty; codecs are constructed
    /// lazily as media types are first seen.
    #[must_use]
    pub fn new(
        registry: Arc<BindingRegistry>,
        session_ids: Arc<dyn SessionIdStrategy>,
        sessions: Arc<dyn SessionStore>,
        authorizer: Arc<dyn Authorizer>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry,
            strict_codecs: CodecCache::with_default_codecs("strict", Strictness::Strict),
            lenient_codecs: CodecCache::with_default_codecs("lenient", Strictness::Lenient),
            session_ids,
            sessions,
            authorizer,
            config,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &BindingRegistry {
        &self.registry
    }

    /// Runs one request through the pipeline. Never fails: every error is
    /// resolved to a terminal response here.
    ///
    /// HEAD requests are answered directly with an empty 200, without
    /// resolving a service.
    pub async fn dispatch(&self, req: Request<Body>) -> Response {
        let (parts, body) = req.into_parts();

        let Some(method) = Method::from_http(&parts.method) else {
            return empty_response(StatusCode::METHOD_NOT_ALLOWED);
        };
        if method == Method::Head {
            return head_response();
        }

        let result = match self.config.addressing {
            AddressingMode::CommandBody if method != Method::Get => {
                self.run_command(&parts, body, method).await
            }
            _ => self.run_path(&parts, body, method).await,
        };

        match result {
            Ok(response) => response,
            Err(failure) => self.fail(&parts, &failure),
        }
    }

    // -----------------------------------------------------------------
    // Path-addressed dispatch
    // -----------------------------------------------------------------

    async fn run_path(
        &self,
        parts: &Parts,
        body: Body,
        method: Method,
    ) -> Result<Response, DispatchFailure> {
        let bind = resolve_binding(parts.uri.path())?;
        let service = self.resolve_service(&bind, method)?;

        let (session, token, roles) = self.resolve_identity(parts).await;
        let decision = self
            .authorizer
            .decide(parts, session.as_deref(), service.as_ref(), &roles)
            .await;
        if !decision.authorized {
            return Err(DispatchFailure::Unauthorized {
                binding: bind,
                reason: decision.reason,
            });
        }

        let params = query_params(parts);
        let payload = if method == Method::Get {
            params.clone()
        } else {
            let bytes = self.read_body(parts, body, service.max_body_size()).await?;
            self.parse_body(parts, &bytes)?
        };
        let payload = self.clean_object(payload, false);

        self.check_payload(service.as_ref(), &payload)?;
        self.acquire_gate(service.as_ref(), &bind).await?;

        let mut ctx = RequestContext::new(
            method,
            session,
            token,
            roles,
            decision.admin,
            parts.clone(),
            params,
        );
        let outcome = self.invoke(service.as_ref(), &bind, &mut ctx, payload).await;
        self.finish(parts, &bind, &ctx, outcome, false)
    }

    // -----------------------------------------------------------------
    // Command-addressed dispatch (RPC calling convention)
    // -----------------------------------------------------------------

    /// Dispatches by the body-declared command name instead of the path.
    ///
    /// The body is read before resolution because the operation name lives
    /// inside it; only the dispatcher default limit can apply at that
    /// point, so the service's own limit is re-checked after resolution.
    async fn run_command(
        &self,
        parts: &Parts,
        body: Body,
        method: Method,
    ) -> Result<Response, DispatchFailure> {
        let limit = effective_limit(0, self.config.max_body_size);
        let bytes = read_bounded(body, declared_length(parts), limit)
            .await
            .map_err(map_body_error)?;
        let command_envelope = self.parse_body(parts, &bytes)?;

        let Some(command) = command_envelope.get("command").and_then(Value::as_str) else {
            return Err(DispatchFailure::MalformedBody {
                detail: "missing command field".to_string(),
            });
        };
        let bind = normalize(command).ok_or(DispatchFailure::EmptyPath)?;
        let service = self.resolve_service(&bind, method)?;

        if let Some(limit) = effective_limit(service.max_body_size(), self.config.max_body_size) {
            if bytes.len() as u64 > limit {
                return Err(DispatchFailure::BodyTooLarge { limit });
            }
        }

        let (session, token, roles) = self.resolve_identity(parts).await;
        let decision = self
            .authorizer
            .decide(parts, session.as_deref(), service.as_ref(), &roles)
            .await;
        if !decision.authorized {
            return Err(DispatchFailure::Unauthorized {
                binding: bind,
                reason: decision.reason,
            });
        }

        // The RPC convention requires the payload in a `request`
        // sub-object; its absence is a hard 500, not a 400.
        let Some(request) = command_envelope.get("request").and_then(Value::as_object) else {
            return Err(DispatchFailure::MalformedBody {
                detail: format!("missing request object for command ({command})"),
            });
        };
        let payload = self.clean_object(request.clone(), false);

        self.check_payload(service.as_ref(), &payload)?;
        self.acquire_gate(service.as_ref(), &bind).await?;

        let mut ctx = RequestContext::new(
            method,
            session,
            token,
            roles,
            decision.admin,
            parts.clone(),
            query_params(parts),
        );
        let outcome = self.invoke(service.as_ref(), &bind, &mut ctx, payload).await;
        self.finish(parts, &bind, &ctx, outcome, true)
    }

    // -----------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------

    fn resolve_service(
        &self,
        bind: &str,
        method: Method,
    ) -> Result<Arc<dyn RestService>, DispatchFailure> {
        let Some(service) = self.registry.resolve(bind, method) else {
            if self.registry.is_registered(bind) {
                return Err(DispatchFailure::MethodMismatch {
                    binding: bind.to_string(),
                    method: method.to_string(),
                });
            }
            return Err(DispatchFailure::UnknownBinding {
                binding: bind.to_string(),
            });
        };

        if !self.config.required_tags.is_empty() {
            let tags = service.tags();
            let visible = tags.iter().any(|t| self.config.required_tags.contains(t));
            if !visible {
                return Err(DispatchFailure::HiddenByTags {
                    binding: bind.to_string(),
                });
            }
        }

        // Defensive re-check: the descriptor's own declared method must
        // match, independent of the table the lookup went through.
        if service.method() != method {
            return Err(DispatchFailure::MethodMismatch {
                binding: bind.to_string(),
                method: method.to_string(),
            });
        }
        Ok(service)
    }

    async fn resolve_identity(
        &self,
        parts: &Parts,
    ) -> (Option<Arc<Session>>, Option<String>, Vec<String>) {
        let token = self.session_ids.extract(parts);
        let mut session = None;
        if let Some(tok) = &token {
            session = self.sessions.lookup(tok).await;
            if session.is_none() {
                session = self.sessions.create(tok).await;
            }
        }
        let roles = match &session {
            Some(s) => {
                let roles = s.roles();
                if roles.is_empty() {
                    self.config.default_roles.clone()
                } else {
                    roles
                }
            }
            None => self.config.default_roles.clone(),
        };
        (session, token, roles)
    }

    async fn read_body(
        &self,
        parts: &Parts,
        body: Body,
        service_limit: u64,
    ) -> Result<Bytes, DispatchFailure> {
        let limit = effective_limit(service_limit, self.config.max_body_size);
        read_bounded(body, declared_length(parts), limit)
            .await
            .map_err(map_body_error)
    }

    /// Parses body bytes through the lenient cache, keyed by the request
    /// content type. Zero-length bodies become an empty object, never an
    /// error; a non-object document is malformed.
    fn parse_body(&self, parts: &Parts, bytes: &[u8]) -> Result<Map<String, Value>, DispatchFailure> {
        if bytes.is_empty() {
            return Ok(Map::new());
        }
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(MEDIA_TYPE_JSON);
        let codec = self
            .lenient_codecs
            .get(content_type)
            .map_err(|e| DispatchFailure::MalformedBody {
                detail: e.to_string(),
            })?;
        let value = codec
            .parse(bytes)
            .map_err(|e| DispatchFailure::MalformedBody {
                detail: e.to_string(),
            })?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(DispatchFailure::MalformedBody {
                detail: format!("expected object body, found {}", json_kind(&other)),
            }),
        }
    }

    fn check_payload(
        &self,
        service: &dyn RestService,
        payload: &Map<String, Value>,
    ) -> Result<(), DispatchFailure> {
        if let Some(validator) = service.validator() {
            let outcome = validator.validate(&Value::Object(payload.clone()));
            if !outcome.is_valid() {
                return Err(DispatchFailure::Invalid {
                    detail: outcome.error_text(),
                });
            }
        }
        Ok(())
    }

    async fn acquire_gate(
        &self,
        service: &dyn RestService,
        bind: &str,
    ) -> Result<(), DispatchFailure> {
        if let Err(gate) = service.acquire().await {
            let correlation_id = Uuid::new_v4().to_string();
            error!("error calling ({bind}) uuid ({correlation_id}): {gate}");
            return Err(DispatchFailure::Internal { correlation_id });
        }
        Ok(())
    }

    async fn invoke(
        &self,
        service: &dyn RestService,
        bind: &str,
        ctx: &mut RequestContext,
        payload: Map<String, Value>,
    ) -> Result<ServiceReply, ServiceError> {
        let started = Instant::now();
        let outcome = service.call(ctx, payload).await;
        let elapsed = started.elapsed();
        if elapsed.as_millis() < 1 {
            info!("calling service ({bind}) took ({}) nanos.", elapsed.as_nanos());
        } else {
            info!("calling service ({bind}) took ({}) mills.", elapsed.as_millis());
        }
        outcome
    }

    fn finish(
        &self,
        parts: &Parts,
        bind: &str,
        ctx: &RequestContext,
        outcome: Result<ServiceReply, ServiceError>,
        wrap_rpc: bool,
    ) -> Result<Response, DispatchFailure> {
        match outcome {
            Ok(ServiceReply::Raw(response)) => Ok(response),
            Ok(ServiceReply::Empty) => {
                if ctx.is_closed() {
                    Ok(empty_response(StatusCode::OK))
                } else {
                    Ok(self.render_empty(parts))
                }
            }
            Ok(ServiceReply::Json(value)) => {
                if ctx.is_closed() {
                    return Ok(empty_response(StatusCode::OK));
                }
                let value = self.clean_value(value, true);
                let value = if wrap_rpc { rpc_envelope(value) } else { value };
                self.render(parts, StatusCode::OK, &value)
            }
            Err(ServiceError::Declared { code, reason }) => {
                if ctx.is_closed() {
                    return Ok(empty_response(StatusCode::OK));
                }
                let status =
                    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                self.render(parts, status, &error_envelope(status.as_u16(), &reason))
            }
            Err(ServiceError::Internal(e)) => {
                let correlation_id = Uuid::new_v4().to_string();
                error!("error calling ({bind}) uuid ({correlation_id}): {e:#}");
                if ctx.is_closed() {
                    // The service already answered; never write a second
                    // response over it.
                    Ok(empty_response(StatusCode::OK))
                } else {
                    Err(DispatchFailure::Internal { correlation_id })
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------

    fn clean_value(&self, value: Value, outbound: bool) -> Value {
        match &self.config.clean {
            Some(hook) => hook(value, outbound),
            None => value,
        }
    }

    /// Inbound cleaning pass; the hook must hand back an object, anything
    /// else collapses to an empty one.
    fn clean_object(&self, payload: Map<String, Value>, outbound: bool) -> Map<String, Value> {
        if self.config.clean.is_none() {
            return payload;
        }
        match self.clean_value(Value::Object(payload), outbound) {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn strict_render(&self, parts: &Parts) -> bool {
        parts
            .headers
            .get(STRICT_RENDER_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    fn render(
        &self,
        parts: &Parts,
        status: StatusCode,
        value: &Value,
    ) -> Result<Response, DispatchFailure> {
        let accept = parts
            .headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let media = response_media_type(accept);
        let cache = if self.strict_render(parts) {
            &self.strict_codecs
        } else {
            &self.lenient_codecs
        };

        let rendered = cache
            .get(media)
            .and_then(|codec| {
                let mut buf = Vec::new();
                codec.render(value, &mut buf).map(|()| buf)
            })
            .map_err(|e| {
                let correlation_id = Uuid::new_v4().to_string();
                error!("render failed uuid ({correlation_id}): {e}");
                DispatchFailure::Internal { correlation_id }
            })?;

        let mut response = Response::new(Body::from(rendered));
        *response.status_mut() = status;
        never_cache(response.headers_mut());
        if let Ok(content_type) = HeaderValue::from_str(media) {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        Ok(response)
    }

    /// 204 No Content with the negotiated content type and cache headers.
    fn render_empty(&self, parts: &Parts) -> Response {
        let accept = parts
            .headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let mut response = empty_response(StatusCode::NO_CONTENT);
        never_cache(response.headers_mut());
        if let Ok(content_type) = HeaderValue::from_str(response_media_type(accept)) {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        response
    }

    /// Resolves a failure to its terminal response. The detailed variant
    /// is logged; the caller sees only the status and the opaque reason.
    fn fail(&self, parts: &Parts, failure: &DispatchFailure) -> Response {
        error!("{failure}");
        let status = failure.status();
        let envelope = error_envelope(status.as_u16(), &failure.reason());
        let mut response = match self.render(parts, status, &envelope) {
            Ok(response) => response,
            Err(_) => empty_response(status),
        };
        if let DispatchFailure::Unauthorized { reason, .. } = failure {
            let value = HeaderValue::from_str(reason)
                .unwrap_or_else(|_| HeaderValue::from_static("unauthorized"));
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        response
    }
}

// ---------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------

fn resolve_binding(raw: &str) -> Result<String, DispatchFailure> {
    if raw.trim().is_empty() {
        return Err(DispatchFailure::EmptyPath);
    }
    normalize(raw).ok_or(DispatchFailure::EmptyPath)
}

fn map_body_error(err: BodyError) -> DispatchFailure {
    match err {
        BodyError::TooLarge { limit } => DispatchFailure::BodyTooLarge { limit },
        BodyError::Read(detail) => DispatchFailure::MalformedBody { detail },
    }
}

fn declared_length(parts: &Parts) -> Option<u64> {
    parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Query string as a JSON object: single values become strings, repeated
/// keys become string arrays.
fn query_params(parts: &Parts) -> Map<String, Value> {
    let mut map = Map::new();
    let Some(query) = parts.uri.query() else {
        return map;
    };
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            None => {
                map.insert(key.into_owned(), value);
            }
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    map
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn never_cache(headers: &mut HeaderMap) {
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
}

fn empty_response(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

fn head_response() -> Response {
    let mut response = empty_response(StatusCode::OK);
    never_cache(response.headers_mut());
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}
