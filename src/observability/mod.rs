//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request pipeline and background jobs produce:
//!     → logging.rs (access and cron sinks, env-tagged spans)
//!     → metrics.rs (request counters and latency histograms)
//!
//! Consumers:
//!     → Log files under basic.global_log_path
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Trace ids flow through request spans and derived contexts
//! - Metrics are cheap (atomic increments) and optional per route

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogGuards, LoggingError, CRON_TARGET};
