//! System endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use serde::Serialize;

use crate::config::{Environment, Settings};
use crate::core::{BusinessError, Context, ContextPool};
use crate::depends::{Dependency, Probe};

/// Business code answered when a dependency fails its probe.
pub const DEPENDENCY_UNAVAILABLE_CODE: i32 = 10102;

/// Shared by the system handlers.
pub struct SystemState {
    pub settings: Arc<Settings>,
    pub env: Environment,
    pub depend: Dependency,
    pub pool: Arc<ContextPool>,
    pub started: Instant,
}

#[derive(Serialize)]
struct Health<'a> {
    status: &'static str,
    dependencies: &'a [Probe],
}

/// Probe every dependency; 503 when any of them fails.
pub async fn health(c: &mut Context, state: &SystemState) {
    let ctx = c.request_context();
    let probes = state.depend.probe(&ctx).await;

    let failed: Vec<&str> = probes
        .iter()
        .filter(|probe| !probe.healthy)
        .map(|probe| probe.name)
        .collect();
    if failed.is_empty() {
        c.payload(&Health {
            status: "ok",
            dependencies: &probes,
        });
    } else {
        tracing::warn!(failed = ?failed, "Health check failed");
        c.abort_with_error(
            BusinessError::new(
                DEPENDENCY_UNAVAILABLE_CODE,
                format!("dependency unavailable: {}", failed.join(", ")),
            )
            .with_status(StatusCode::SERVICE_UNAVAILABLE),
        );
    }
}

#[derive(Serialize)]
struct PoolStats {
    allocated: usize,
    reused: usize,
    idle: usize,
}

#[derive(Serialize)]
struct Info<'a> {
    name: &'a str,
    display_name: &'a str,
    description: &'a str,
    version: &'a str,
    env: Environment,
    startup_mode: &'a str,
    uptime_secs: u64,
    contexts: PoolStats,
}

pub async fn info(c: &mut Context, state: &SystemState) {
    let basic = &state.settings.basic;
    c.payload(&Info {
        name: &basic.name,
        display_name: &basic.display_name,
        description: &basic.description,
        version: &basic.version,
        env: state.env,
        startup_mode: &basic.startup_mode,
        uptime_secs: state.started.elapsed().as_secs(),
        contexts: PoolStats {
            allocated: state.pool.allocated(),
            reused: state.pool.reused(),
            idle: state.pool.idle(),
        },
    });
}
