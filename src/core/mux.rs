//! Handler chains on top of axum.
//!
//! # Data Flow
//! ```text
//! axum request
//!     → pool.acquire()            Created
//!     → ctx.init() (body capture) Initialized
//!     → handler chain             Active (stops once aborted)
//!     → finalize()                Finalized: abort error > redirect > html
//!                                 > graph payload > payload
//!     → metrics sample            keyed by alias or route pattern
//!     → guard drop                Released, context reset
//! ```
//!
//! # Design Decisions
//! - Handlers borrow the context mutably; nothing else can touch it
//! - The per-request cancellation token is cancelled by a drop guard, so it
//!   fires on completion, timeout and client disconnect alike

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::RawPathParams;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{on, MethodFilter};
use axum::{Json, Router};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, Span};

use crate::core::context::{Context, HtmlPayload, Stage};
use crate::core::error::BoxError;
use crate::core::pool::ContextPool;
use crate::core::trace::Trace;
use crate::observability::metrics;

pub const X_REQUEST_ID: &str = "x-request-id";

/// A step in a handler chain.
pub type HandlerFunc = Arc<dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync>;

/// Wrap a function or closure as a [`HandlerFunc`].
///
/// ```ignore
/// fn ping(c: &mut Context) -> BoxFuture<'_, ()> {
///     async move { c.payload("pong") }.boxed()
/// }
/// group.get("/ping", [handler(ping)]);
/// ```
pub fn handler<F>(f: F) -> HandlerFunc
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Group the route's metrics under `path` instead of its pattern.
pub fn alias_for_record_metrics(path: &str) -> HandlerFunc {
    let path = path.to_string();
    handler(move |c| {
        c.set_alias(&path);
        std::future::ready(()).boxed()
    })
}

/// Keep the route out of the access log and downstream traces.
pub fn disable_trace_log() -> HandlerFunc {
    handler(|c| {
        c.disable_trace();
        std::future::ready(()).boxed()
    })
}

pub fn disable_record_metrics() -> HandlerFunc {
    handler(|c| {
        c.disable_record_metrics();
        std::future::ready(()).boxed()
    })
}

/// Renders pages requested through [`Context::html`].
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, data: &Value) -> Result<String, BoxError>;
}

/// Knobs for the request pipeline.
#[derive(Debug, Clone)]
pub struct MuxOptions {
    /// Largest request body captured at init, in bytes.
    pub body_limit: usize,
    /// Total time allowed for one request.
    pub request_timeout: Duration,
    /// Released contexts kept for reuse.
    pub pool_max_idle: usize,
    /// Whether requests record metrics unless a handler opts out.
    pub record_metrics: bool,
}

impl Default for MuxOptions {
    fn default() -> Self {
        Self {
            body_limit: 2 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            pool_max_idle: 1024,
            record_metrics: true,
        }
    }
}

struct Route {
    method: MethodFilter,
    path: String,
    chain: Vec<HandlerFunc>,
}

struct Shared {
    pool: Arc<ContextPool>,
    body_limit: usize,
    record_metrics: bool,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    parent: Option<Span>,
}

/// Route table whose handlers run against pooled [`Context`]s.
pub struct Mux {
    options: MuxOptions,
    pool: Arc<ContextPool>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    parent: Option<Span>,
    routes: Vec<Route>,
}

impl Mux {
    pub fn new(options: MuxOptions) -> Self {
        let pool = ContextPool::new(options.pool_max_idle);
        Self {
            options,
            pool,
            renderer: None,
            parent: None,
            routes: Vec::new(),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Parent every request span under `span`, e.g. one carrying the
    /// service environment.
    pub fn with_parent_span(mut self, span: Span) -> Self {
        self.parent = Some(span);
        self
    }

    pub fn pool(&self) -> &Arc<ContextPool> {
        &self.pool
    }

    /// Start a route group. `middlewares` run before every route handler.
    pub fn group<I>(&mut self, prefix: &str, middlewares: I) -> RouterGroup<'_>
    where
        I: IntoIterator<Item = HandlerFunc>,
    {
        RouterGroup {
            prefix: join_paths("/", prefix),
            middlewares: middlewares.into_iter().collect(),
            mux: self,
        }
    }

    /// Build the axum router with request-id, timeout and trace layers.
    #[allow(deprecated)]
    pub fn into_router(self) -> Router {
        let shared = Arc::new(Shared {
            pool: self.pool,
            body_limit: self.options.body_limit,
            record_metrics: self.options.record_metrics,
            renderer: self.renderer,
            parent: self.parent,
        });

        let mut router = Router::new();
        for route in self.routes {
            let chain: Arc<[HandlerFunc]> = route.chain.into();
            let pattern: Arc<str> = route.path.as_str().into();
            let shared = Arc::clone(&shared);
            let endpoint = move |params: Result<RawPathParams, RawPathParamsRejection>,
                                 request: Request<Body>| {
                let shared = Arc::clone(&shared);
                let chain = Arc::clone(&chain);
                let pattern = Arc::clone(&pattern);
                async move { dispatch(shared, chain, pattern, params, request).await }
            };
            router = router.route(&route.path, on(route.method, endpoint));
        }

        router
            .layer(TimeoutLayer::new(self.options.request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }
}

/// Routes sharing a prefix and a middleware chain.
pub struct RouterGroup<'m> {
    mux: &'m mut Mux,
    prefix: String,
    middlewares: Vec<HandlerFunc>,
}

impl RouterGroup<'_> {
    /// Nested group inheriting this group's prefix and middlewares.
    pub fn group<I>(&mut self, prefix: &str, middlewares: I) -> RouterGroup<'_>
    where
        I: IntoIterator<Item = HandlerFunc>,
    {
        let mut chain = self.middlewares.clone();
        chain.extend(middlewares);
        RouterGroup {
            prefix: join_paths(&self.prefix, prefix),
            middlewares: chain,
            mux: &mut *self.mux,
        }
    }

    pub fn handle<I>(&mut self, method: MethodFilter, path: &str, handlers: I) -> &mut Self
    where
        I: IntoIterator<Item = HandlerFunc>,
    {
        let mut chain = self.middlewares.clone();
        chain.extend(handlers);
        self.mux.routes.push(Route {
            method,
            path: join_paths(&self.prefix, path),
            chain,
        });
        self
    }

    pub fn get<I: IntoIterator<Item = HandlerFunc>>(&mut self, path: &str, handlers: I) -> &mut Self {
        self.handle(MethodFilter::GET, path, handlers)
    }

    pub fn post<I: IntoIterator<Item = HandlerFunc>>(&mut self, path: &str, handlers: I) -> &mut Self {
        self.handle(MethodFilter::POST, path, handlers)
    }

    pub fn put<I: IntoIterator<Item = HandlerFunc>>(&mut self, path: &str, handlers: I) -> &mut Self {
        self.handle(MethodFilter::PUT, path, handlers)
    }

    pub fn patch<I: IntoIterator<Item = HandlerFunc>>(&mut self, path: &str, handlers: I) -> &mut Self {
        self.handle(MethodFilter::PATCH, path, handlers)
    }

    pub fn delete<I: IntoIterator<Item = HandlerFunc>>(&mut self, path: &str, handlers: I) -> &mut Self {
        self.handle(MethodFilter::DELETE, path, handlers)
    }
}

fn join_paths(prefix: &str, path: &str) -> String {
    let mut joined = String::from("/");
    for segment in [prefix, path] {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        if !joined.ends_with('/') {
            joined.push('/');
        }
        joined.push_str(segment);
    }
    joined
}

async fn dispatch(
    shared: Arc<Shared>,
    chain: Arc<[HandlerFunc]>,
    pattern: Arc<str>,
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request<Body>,
) -> Response {
    let started = Instant::now();
    let params = match params {
        Ok(params) => params
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
        Err(_) => Vec::new(),
    };

    let mut ctx = shared.pool.acquire();

    // Fires when this future completes or is dropped by the server.
    let token = CancellationToken::new();
    let _cancel_on_exit = token.clone().drop_guard();
    ctx.set_cancellation(token);

    if let Err(e) = ctx.init(request, params, shared.body_limit).await {
        tracing::warn!(route = %pattern, error = %e, "Failed to capture request");
        return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
    }

    let trace = ctx
        .get_header(X_REQUEST_ID)
        .filter(|id| !id.is_empty())
        .map(Trace::new)
        .unwrap_or_else(Trace::generate);
    let span = request_span(shared.parent.as_ref(), &trace, &ctx);
    ctx.set_trace(trace);
    ctx.set_logger(span.clone());
    if shared.record_metrics {
        ctx.enable_record_metrics();
    }

    handle(&mut ctx, &chain, &shared, &pattern, started)
        .instrument(span)
        .await
}

fn request_span(parent: Option<&Span>, trace: &Trace, ctx: &Context) -> Span {
    match parent {
        Some(parent) => tracing::info_span!(
            parent: parent,
            "request",
            trace_id = %trace.id(),
            method = %ctx.method(),
            path = %ctx.path(),
        ),
        None => tracing::info_span!(
            "request",
            trace_id = %trace.id(),
            method = %ctx.method(),
            path = %ctx.path(),
        ),
    }
}

async fn handle(
    ctx: &mut Context,
    chain: &[HandlerFunc],
    shared: &Shared,
    pattern: &str,
    started: Instant,
) -> Response {
    if let Err(e) = ctx.transition(Stage::Active) {
        tracing::error!(error = %e, "Context lifecycle violated");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    for step in chain {
        step(ctx).await;
        if ctx.is_aborted() {
            break;
        }
    }
    if let Err(e) = ctx.transition(Stage::Finalized) {
        tracing::error!(error = %e, "Context lifecycle violated");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let response = finalize(ctx, shared.renderer.as_deref());
    let status = response.status();
    let label = ctx.alias().unwrap_or(pattern);

    if ctx.is_record_metrics() {
        metrics::record_request(ctx.method().as_str(), label, status.as_u16(), started);
    }
    if ctx.trace().is_some() {
        tracing::info!(
            status = status.as_u16(),
            route = %label,
            elapsed_ms = elapsed_ms(started.elapsed()),
            "Request completed"
        );
    }
    response
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: i32,
    message: &'a str,
}

/// Turn the terminal state of a context into exactly one response.
fn finalize(ctx: &Context, renderer: Option<&dyn TemplateRenderer>) -> Response {
    let mut response = if let Some(err) = ctx.abort_error() {
        let status = err.http_status();
        tracing::warn!(
            code = err.code(),
            status = status.as_u16(),
            error = %err,
            cause = ?std::error::Error::source(err).map(ToString::to_string),
            "Request aborted"
        );
        let body = ErrorBody {
            code: err.code(),
            message: err.message(),
        };
        (status, Json(body)).into_response()
    } else if let Some(redirect) = ctx.get_redirect() {
        match HeaderValue::try_from(redirect.location.as_str()) {
            Ok(location) => (redirect.status, [(header::LOCATION, location)]).into_response(),
            Err(_) => {
                tracing::error!(location = %redirect.location, "Invalid redirect location");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    } else if let Some(page) = ctx.get_html() {
        render_html(page, renderer)
    } else if let Some(graph) = ctx.get_graph_payload() {
        Json(graph).into_response()
    } else if let Some(payload) = ctx.get_payload() {
        Json(payload).into_response()
    } else {
        StatusCode::OK.into_response()
    };

    for (name, value) in ctx.response_headers() {
        response.headers_mut().insert(name.clone(), value.clone());
    }
    response
}

fn render_html(page: &HtmlPayload, renderer: Option<&dyn TemplateRenderer>) -> Response {
    let Some(renderer) = renderer else {
        tracing::error!(template = %page.template, "No template renderer configured");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    match renderer.render(&page.template, &page.data) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(template = %page.template, error = %e, "Template rendering failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::BusinessError;
    use crate::core::std_context::StdContext;
    use serde::Deserialize;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[test]
    fn test_elapsed_ms_saturates() {
        assert_eq!(elapsed_ms(Duration::from_micros(1_500_900)), 1500);
        assert_eq!(elapsed_ms(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("/", ""), "/");
        assert_eq!(join_paths("/api/", "/tasks"), "/api/tasks");
        assert_eq!(join_paths("api", "tasks/{id}"), "/api/tasks/{id}");
        assert_eq!(join_paths("/api", "/"), "/api");
    }

    #[tokio::test]
    async fn test_abort_wins_over_later_payload() {
        let mut mux = Mux::new(MuxOptions::default());
        mux.group("/api", []).get(
            "/jobs",
            [handler(|c| {
                async move {
                    c.abort_with_error(
                        BusinessError::new(30001, "job locked").with_status(StatusCode::CONFLICT),
                    );
                    c.payload(&serde_json::json!({"ok": true}));
                }
                .boxed()
            })],
        );

        let (status, _, body) = send(mux.into_router(), get("/api/jobs")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json(&body), serde_json::json!({"code": 30001, "message": "job locked"}));
    }

    #[tokio::test]
    async fn test_abort_stops_chain_and_falls_back_to_500() {
        let deny = handler(|c| {
            async move { c.abort_with_error(BusinessError::new(10002, "denied")) }.boxed()
        });
        let never = handler(|c| {
            async move {
                c.set_header("x-reached", "yes").unwrap();
            }
            .boxed()
        });

        let mut mux = Mux::new(MuxOptions::default());
        mux.group("/", [deny]).get("/secret", [never]);

        let (status, headers, _) = send(mux.into_router(), get("/secret")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(headers.get("x-reached").is_none());
    }

    #[tokio::test]
    async fn test_middlewares_run_in_order_and_headers_apply() {
        let first = handler(|c| {
            async move {
                c.set_header("x-step", "1").unwrap();
            }
            .boxed()
        });
        let mut mux = Mux::new(MuxOptions::default());
        {
            let mut api = mux.group("/api", [first]);
            let mut v1 = api.group("/v1", [alias_for_record_metrics("  ")]);
            v1.get(
                "/ping",
                [handler(|c| {
                    async move {
                        let step = c.get_header("x-never").unwrap_or("none").to_string();
                        c.set_header("x-step", "2").unwrap();
                        c.payload(&serde_json::json!({"step": step, "alias": c.alias()}));
                    }
                    .boxed()
                })],
            );
        }

        let (status, headers, body) = send(mux.into_router(), get("/api/v1/ping")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get("x-step").unwrap(), "2");
        assert_eq!(json(&body), serde_json::json!({"step": "none", "alias": null}));
    }

    #[tokio::test]
    async fn test_trace_follows_request_id_header() {
        let mut mux = Mux::new(MuxOptions::default());
        mux.group("/", []).get(
            "/trace",
            [handler(|c| {
                async move {
                    let id = c.request_context().trace().map(|t| t.id().to_string());
                    c.payload(&id);
                }
                .boxed()
            })],
        );

        let request = Request::builder()
            .uri("/trace")
            .header(X_REQUEST_ID, "req-123")
            .body(Body::empty())
            .unwrap();
        let (_, headers, body) = send(mux.into_router(), request).await;
        assert_eq!(json(&body), serde_json::json!("req-123"));
        assert_eq!(headers.get(X_REQUEST_ID).unwrap(), "req-123");
    }

    #[tokio::test]
    async fn test_disabled_trace_is_not_propagated() {
        let mut mux = Mux::new(MuxOptions::default());
        mux.group("/", [disable_trace_log(), disable_record_metrics()]).get(
            "/health",
            [handler(|c| {
                async move {
                    let traced = c.request_context().trace().is_some();
                    let metrics = c.is_record_metrics();
                    c.payload(&serde_json::json!([traced, metrics]));
                }
                .boxed()
            })],
        );

        let (_, _, body) = send(mux.into_router(), get("/health")).await;
        assert_eq!(json(&body), serde_json::json!([false, false]));
    }

    #[derive(Debug, Deserialize, Serialize)]
    struct Filter {
        a: u32,
    }

    #[tokio::test]
    async fn test_form_precedence_end_to_end() {
        let mut mux = Mux::new(MuxOptions::default());
        mux.group("/", []).post(
            "/filter",
            [handler(|c| {
                async move {
                    match c.bind_form::<Filter>() {
                        Ok(filter) => c.payload(&filter),
                        Err(e) => c.abort_with_error(
                            BusinessError::new(10003, e.to_string()).with_status(StatusCode::BAD_REQUEST),
                        ),
                    }
                }
                .boxed()
            })],
        );

        let request = Request::builder()
            .method("POST")
            .uri("/filter?a=1")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("a=2"))
            .unwrap();
        let (status, _, body) = send(mux.into_router(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body), serde_json::json!({"a": 2}));
    }

    #[tokio::test]
    async fn test_uri_binding_from_route_pattern() {
        #[derive(Deserialize)]
        struct Host {
            name: String,
            port: u16,
        }

        let mut mux = Mux::new(MuxOptions::default());
        mux.group("/hosts", []).get(
            "/{name}/{port}",
            [handler(|c| {
                async move {
                    if let Ok(host) = c.bind_uri::<Host>() {
                        c.payload(&format!("{}:{}", host.name, host.port));
                    }
                }
                .boxed()
            })],
        );

        let (_, _, body) = send(mux.into_router(), get("/hosts/backup-01/8443")).await;
        assert_eq!(json(&body), serde_json::json!("backup-01:8443"));
    }

    #[tokio::test]
    async fn test_contexts_are_recycled_between_requests() {
        let mut mux = Mux::new(MuxOptions::default());
        mux.group("/", []).get(
            "/alias",
            [handler(|c| {
                async move {
                    let previous = c.alias().map(str::to_string);
                    c.set_alias("sticky");
                    c.payload(&previous);
                }
                .boxed()
            })],
        );
        let pool = Arc::clone(mux.pool());
        let router = mux.into_router();

        for _ in 0..3 {
            let (_, _, body) = send(router.clone(), get("/alias")).await;
            assert_eq!(json(&body), Value::Null);
        }
        assert_eq!(pool.allocated(), 1);
        assert_eq!(pool.reused(), 2);
    }

    #[tokio::test]
    async fn test_redirect_and_empty_response() {
        let mut mux = Mux::new(MuxOptions::default());
        mux.group("/", [])
            .get(
                "/old",
                [handler(|c| {
                    async move { c.redirect(StatusCode::MOVED_PERMANENTLY, "/new") }.boxed()
                })],
            )
            .get("/empty", [handler(|_| std::future::ready(()).boxed())]);
        let router = mux.into_router();

        let (status, headers, _) = send(router.clone(), get("/old")).await;
        assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(headers.get(header::LOCATION).unwrap(), "/new");

        let (status, _, body) = send(router, get("/empty")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    struct EchoRenderer;

    impl TemplateRenderer for EchoRenderer {
        fn render(&self, template: &str, data: &Value) -> Result<String, BoxError> {
            Ok(format!("<p>{template}:{data}</p>"))
        }
    }

    #[tokio::test]
    async fn test_html_requires_renderer() {
        let page = handler(|c| async move { c.html("index", &1) }.boxed());

        let mut mux = Mux::new(MuxOptions::default());
        mux.group("/", []).get("/", [Arc::clone(&page)]);
        let (status, _, _) = send(mux.into_router(), get("/")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let mut mux = Mux::new(MuxOptions::default()).with_renderer(Arc::new(EchoRenderer));
        mux.group("/", []).get("/", [page]);
        let (status, _, body) = send(mux.into_router(), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<p>index.html:1</p>");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mut mux = Mux::new(MuxOptions {
            body_limit: 8,
            ..MuxOptions::default()
        });
        mux.group("/", []).post("/upload", [handler(|_| std::future::ready(()).boxed())]);
        let pool = Arc::clone(mux.pool());

        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        let (status, _, _) = send(mux.into_router(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn test_client_disconnect_cancels_derived_context() {
        let (tx, mut rx) = mpsc::unbounded_channel::<StdContext>();
        let mut mux = Mux::new(MuxOptions::default());
        mux.group("/", []).get(
            "/slow",
            [handler(move |c| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(c.request_context());
                    std::future::pending::<()>().await;
                }
                .boxed()
            })],
        );
        let router = mux.into_router();

        let in_flight = tokio::spawn(router.oneshot(get("/slow")));
        let downstream = rx.recv().await.unwrap();
        assert!(!downstream.is_cancelled());

        // Dropping the request future is what hyper does on disconnect.
        in_flight.abort();
        tokio::time::timeout(Duration::from_secs(5), downstream.cancelled())
            .await
            .expect("derived context was not cancelled");
        assert!(downstream.is_cancelled());
    }
}
