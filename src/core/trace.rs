//! Request correlation identity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Correlation handle for one request.
///
/// Cheap to clone; every clone refers to the same identity so downstream
/// calls can be stitched back to the request that caused them.
#[derive(Debug, Clone)]
pub struct Trace {
    inner: Arc<TraceInner>,
}

#[derive(Debug)]
struct TraceInner {
    id: String,
    started: Instant,
}

impl Trace {
    /// Adopt an upstream identifier (usually `x-request-id`).
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TraceInner {
                id: id.into(),
                started: Instant::now(),
            }),
        }
    }

    /// Start a trace with a fresh UUID v4 identifier.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Time elapsed since the trace started.
    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }
}
