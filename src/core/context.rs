//! The request-scoped context every handler programs against.
//!
//! # Responsibilities
//! - Capture the request body once and make it replayable
//! - Hold per-request state: trace, logger, payloads, session, abort error,
//!   alias, metrics flag and response decorations
//! - Derive the downstream [`StdContext`]
//!
//! # Design Decisions
//! - State is a typed struct, not a key/value bag
//! - One exhaustive [`Context::reset`] clears every field before reuse
//! - The abort error wins over any payload when the response is built

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri, Version};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::core::binding::FormBody;
use crate::core::error::{BusinessError, CoreError};
use crate::core::std_context::StdContext;
use crate::core::trace::Trace;

/// Position of a context in its per-request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    Initialized,
    Active,
    Finalized,
    Released,
}

/// Identity of the logged-in user, populated by authentication middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUserInfo {
    pub user_id: i64,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub status: StatusCode,
    pub location: String,
}

/// A page to render with the configured template renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlPayload {
    pub template: String,
    pub data: Value,
}

/// Per-request state plus the facade over the captured request.
#[derive(Debug)]
pub struct Context {
    stage: Stage,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    path_params: Vec<(String, String)>,
    body: Bytes,
    form: FormBody,
    trace: Option<Trace>,
    logger: Option<Span>,
    payload: Option<Value>,
    graph_payload: Option<Value>,
    session_user: Option<SessionUserInfo>,
    abort_error: Option<BusinessError>,
    alias: Option<String>,
    record_metrics: bool,
    response_headers: HeaderMap,
    redirect: Option<Redirect>,
    html: Option<HtmlPayload>,
    cancel: CancellationToken,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub(crate) fn new() -> Self {
        Self {
            stage: Stage::Created,
            method: Method::GET,
            uri: Uri::default(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            path_params: Vec::new(),
            body: Bytes::new(),
            form: FormBody::Absent,
            trace: None,
            logger: None,
            payload: None,
            graph_payload: None,
            session_user: None,
            abort_error: None,
            alias: None,
            record_metrics: false,
            response_headers: HeaderMap::new(),
            redirect: None,
            html: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Capture the request. The body is read in full exactly once; every
    /// later accessor and binder works on the memoized copy.
    pub async fn init(
        &mut self,
        request: Request<Body>,
        path_params: Vec<(String, String)>,
        body_limit: usize,
    ) -> Result<(), CoreError> {
        if self.stage != Stage::Created {
            return Err(CoreError::Stage {
                expected: Stage::Created,
                actual: self.stage,
            });
        }

        let (parts, body) = request.into_parts();
        self.body = axum::body::to_bytes(body, body_limit)
            .await
            .map_err(CoreError::BodyRead)?;
        self.method = parts.method;
        self.uri = parts.uri;
        self.version = parts.version;
        self.headers = parts.headers;
        self.path_params = path_params;
        self.form = FormBody::parse(&self.headers, &self.body).await;

        self.transition(Stage::Initialized)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub(crate) fn transition(&mut self, next: Stage) -> Result<(), CoreError> {
        let allowed = matches!(
            (self.stage, next),
            (Stage::Created, Stage::Initialized)
                | (Stage::Initialized, Stage::Active)
                | (Stage::Active, Stage::Active)
                | (Stage::Active, Stage::Finalized)
                | (Stage::Finalized, Stage::Released)
                | (Stage::Released, Stage::Created)
        );
        if !allowed {
            return Err(CoreError::Stage {
                expected: next,
                actual: self.stage,
            });
        }
        self.stage = next;
        Ok(())
    }

    /// Clear every field. Destructuring keeps this exhaustive: a new field
    /// does not compile until it is reset here.
    pub(crate) fn reset(&mut self) {
        let Context {
            stage,
            method,
            uri,
            version,
            headers,
            path_params,
            body,
            form,
            trace,
            logger,
            payload,
            graph_payload,
            session_user,
            abort_error,
            alias,
            record_metrics,
            response_headers,
            redirect,
            html,
            cancel,
        } = self;

        *stage = Stage::Released;
        *method = Method::GET;
        *uri = Uri::default();
        *version = Version::HTTP_11;
        headers.clear();
        path_params.clear();
        *body = Bytes::new();
        *form = FormBody::Absent;
        *trace = None;
        *logger = None;
        *payload = None;
        *graph_payload = None;
        *session_user = None;
        *abort_error = None;
        *alias = None;
        *record_metrics = false;
        response_headers.clear();
        *redirect = None;
        *html = None;
        *cancel = CancellationToken::new();
    }

    // --- Request accessors ---

    /// A fresh request rebuilt from the captured data, body included.
    pub fn request(&self) -> Request<Body> {
        let mut request = Request::new(Body::from(self.body.clone()));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();
        request
    }

    pub fn raw_data(&self) -> &Bytes {
        &self.body
    }

    pub(crate) fn form_body(&self) -> &FormBody {
        &self.form
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn host(&self) -> &str {
        self.headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
            .unwrap_or_default()
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Unescaped request URI including the query string. Empty when the
    /// URI contains a malformed escape.
    pub fn uri(&self) -> String {
        let raw = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        query_unescape(raw).unwrap_or_default()
    }

    pub(crate) fn raw_uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path_params(&self) -> &[(String, String)] {
        &self.path_params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// A copy of the request headers. Mutating it never touches the request.
    pub fn header(&self) -> HeaderMap {
        self.headers.clone()
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Set a response header.
    pub fn set_header(&mut self, key: &str, value: &str) -> Result<(), CoreError> {
        let invalid = || CoreError::Header {
            name: key.to_string(),
        };
        let name = HeaderName::try_from(key).map_err(|_| invalid())?;
        let value = HeaderValue::try_from(value).map_err(|_| invalid())?;
        self.response_headers.insert(name, value);
        Ok(())
    }

    pub(crate) fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    // --- Trace and logger ---

    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    pub(crate) fn set_trace(&mut self, trace: Trace) {
        self.trace = Some(trace);
    }

    /// Stop propagating the trace, e.g. for noisy probe routes.
    pub fn disable_trace(&mut self) {
        self.trace = None;
    }

    pub fn logger(&self) -> Option<&Span> {
        self.logger.as_ref()
    }

    pub(crate) fn set_logger(&mut self, logger: Span) {
        self.logger = Some(logger);
    }

    // --- Response state ---

    /// Set the success body. Last write wins.
    pub fn payload<T: Serialize + ?Sized>(&mut self, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.payload = Some(value),
            Err(e) => self.abort_with_error(
                BusinessError::internal("failed to encode response payload").with_source(e),
            ),
        }
    }

    pub(crate) fn get_payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Set the GraphQL-shaped success body. Independent of [`Context::payload`].
    pub fn graph_payload<T: Serialize + ?Sized>(&mut self, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.graph_payload = Some(value),
            Err(e) => self.abort_with_error(
                BusinessError::internal("failed to encode graph payload").with_source(e),
            ),
        }
    }

    pub(crate) fn get_graph_payload(&self) -> Option<&Value> {
        self.graph_payload.as_ref()
    }

    pub fn redirect(&mut self, status: StatusCode, location: impl Into<String>) {
        self.redirect = Some(Redirect {
            status,
            location: location.into(),
        });
    }

    pub(crate) fn get_redirect(&self) -> Option<&Redirect> {
        self.redirect.as_ref()
    }

    /// Render `<name>.html` with `data`.
    pub fn html<T: Serialize + ?Sized>(&mut self, name: &str, data: &T) {
        match serde_json::to_value(data) {
            Ok(data) => {
                self.html = Some(HtmlPayload {
                    template: format!("{name}.html"),
                    data,
                })
            }
            Err(e) => self.abort_with_error(
                BusinessError::internal("failed to encode template data").with_source(e),
            ),
        }
    }

    pub(crate) fn get_html(&self) -> Option<&HtmlPayload> {
        self.html.as_ref()
    }

    /// Record a business error and stop the handler chain. `None` is a no-op.
    pub fn abort_with_error(&mut self, err: impl Into<Option<BusinessError>>) {
        if let Some(err) = err.into() {
            self.abort_error = Some(err);
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_error.is_some()
    }

    pub fn abort_error(&self) -> Option<&BusinessError> {
        self.abort_error.as_ref()
    }

    // --- Session ---

    /// The session user, or the empty user when none was set.
    pub fn session_user_info(&self) -> SessionUserInfo {
        self.session_user.clone().unwrap_or_default()
    }

    pub fn set_session_user_info(&mut self, info: SessionUserInfo) {
        self.session_user = Some(info);
    }

    // --- Metrics ---

    /// Logical route name for metrics grouping.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Set the alias. Blank values are ignored.
    pub fn set_alias(&mut self, path: &str) {
        let path = path.trim();
        if !path.is_empty() {
            self.alias = Some(path.to_string());
        }
    }

    pub fn enable_record_metrics(&mut self) {
        self.record_metrics = true;
    }

    pub fn disable_record_metrics(&mut self) {
        self.record_metrics = false;
    }

    pub fn is_record_metrics(&self) -> bool {
        self.record_metrics
    }

    // --- Downstream ---

    pub(crate) fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    /// Context for downstream calls. Cancelled when the client disconnects
    /// or the request completes, whichever comes first.
    pub fn request_context(&self) -> StdContext {
        StdContext::new(
            self.cancel.child_token(),
            self.trace.clone(),
            self.logger.clone(),
        )
    }
}

/// Decode `%XX` escapes and `+` as a space.
fn query_unescape(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes.get(i + 1..i + 3)?;
                if !hex.iter().all(u8::is_ascii_hexdigit) {
                    return None;
                }
                let hex = std::str::from_utf8(hex).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Some(String::from_utf8_lossy(&out).into_owned())
}
