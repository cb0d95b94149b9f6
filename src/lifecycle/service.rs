//! Foreground service runner.
//!
//! `start` binds and spawns the server, `stop` triggers a graceful
//! shutdown, `run` does both around OS signals.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::Span;

use crate::config::{Environment, Settings};
use crate::depends::Dependency;
use crate::lifecycle::signals::spawn_signal_listener;
use crate::lifecycle::Shutdown;
use crate::server::{BackendServer, ServerError};

pub struct DashboardService {
    settings: Arc<Settings>,
    env: Environment,
    depend: Dependency,
    parent: Option<Span>,
    shutdown: Shutdown,
    server: Option<JoinHandle<Result<(), ServerError>>>,
}

impl DashboardService {
    pub fn new(settings: Arc<Settings>, env: Environment, depend: Dependency) -> Self {
        Self {
            settings,
            env,
            depend,
            parent: None,
            shutdown: Shutdown::new(),
            server: None,
        }
    }

    /// Parent span for request logging, usually the env-tagged root.
    pub fn with_parent_span(mut self, span: Span) -> Self {
        self.parent = Some(span);
        self
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Bind the configured address and serve in the background. Returns the
    /// bound address.
    pub async fn start(&mut self) -> Result<std::net::SocketAddr, ServerError> {
        let listener = TcpListener::bind(self.settings.basic.bind_address()).await?;
        self.start_on(listener)
    }

    /// Serve on an already bound listener.
    pub fn start_on(&mut self, listener: TcpListener) -> Result<std::net::SocketAddr, ServerError> {
        let addr = listener.local_addr()?;
        let server = BackendServer::new(
            Arc::clone(&self.settings),
            self.env,
            self.depend.clone(),
            self.parent.clone(),
        );
        let shutdown = self.shutdown.clone();
        self.server = Some(tokio::spawn(server.run(listener, shutdown)));
        tracing::info!(address = %addr, env = %self.env, "Dashboard service started");
        Ok(addr)
    }

    /// Trigger shutdown and wait for in-flight requests to drain.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        let Some(server) = self.server.take() else {
            return Ok(());
        };
        let result = server.await.map_err(ServerError::from).and_then(|result| result);
        match &result {
            Ok(()) => tracing::info!("Dashboard service stopped"),
            Err(e) => tracing::error!(error = %e, "Dashboard service stopped with error"),
        }
        result
    }

    /// Serve until SIGINT/SIGTERM.
    pub async fn run(mut self) -> Result<(), ServerError> {
        self.start().await?;
        let signals = spawn_signal_listener(self.shutdown.clone());
        self.shutdown.wait().await;
        signals.abort();
        self.stop().await
    }
}
