//! HTTP server for the dashboard backend.
//!
//! # Responsibilities
//! - Register route groups on the [`Mux`]
//! - Serve the resulting router until shutdown
//!
//! # Routes
//! - `GET /system/health`: dependency probes, untraced and unmetered
//! - `GET /system/info`: build and runtime facts, metered as `system_info`

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use futures_util::FutureExt;
use tokio::net::TcpListener;
use tracing::Span;

use crate::config::{Environment, Settings};
use crate::core::mux::{alias_for_record_metrics, disable_record_metrics, disable_trace_log};
use crate::core::{handler, Mux};
use crate::depends::Dependency;
use crate::lifecycle::Shutdown;

pub mod handlers;

use handlers::SystemState;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The dashboard's HTTP surface.
pub struct BackendServer {
    router: Router,
    depend: Dependency,
}

impl BackendServer {
    /// Build every route. `parent` becomes the parent of request spans.
    pub fn new(settings: Arc<Settings>, env: Environment, depend: Dependency, parent: Option<Span>) -> Self {
        let mut mux = Mux::new(settings.http.mux_options());
        if let Some(span) = parent {
            mux = mux.with_parent_span(span);
        }

        let state = Arc::new(SystemState {
            settings,
            env,
            depend: depend.clone(),
            pool: Arc::clone(mux.pool()),
            started: Instant::now(),
        });

        {
            let mut system = mux.group("/system", []);

            let health_state = Arc::clone(&state);
            system.get(
                "/health",
                [
                    disable_trace_log(),
                    disable_record_metrics(),
                    handler(move |c| {
                        let state = Arc::clone(&health_state);
                        async move { handlers::health(c, &state).await }.boxed()
                    }),
                ],
            );

            let info_state = Arc::clone(&state);
            system.get(
                "/info",
                [
                    alias_for_record_metrics("system_info"),
                    handler(move |c| {
                        let state = Arc::clone(&info_state);
                        async move { handlers::info(c, &state).await }.boxed()
                    }),
                ],
            );
        }

        Self {
            router: mux.into_router(),
            depend,
        }
    }

    /// The fully layered router, for serving or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight
    /// requests and close dependencies.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        if let Err(e) = self.depend.close().await {
            tracing::warn!(error = %e, "Failed to close dependencies");
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
