//! Backend for the aio_dashboard backup and recovery dashboard.
//!
//! Requests run against pooled, request-scoped contexts (see [`core`]);
//! the rest of the crate wires configuration, logging, dependencies and
//! the service lifecycle around them.

// Request pipeline
pub mod core;
pub mod server;

// Configuration and dependencies
pub mod config;
pub mod depends;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{Environment, Settings};
pub use crate::core::{Context, Mux};
pub use lifecycle::{DashboardService, Shutdown};
pub use server::BackendServer;
