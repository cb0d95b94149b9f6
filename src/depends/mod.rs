//! External dependencies consumed by handlers.
//!
//! # Responsibilities
//! - Define the cache and database seams handlers talk to
//! - Bundle them into one [`Dependency`] shared by the server
//!
//! # Design Decisions
//! - Every call takes the request's [`StdContext`] so it stops with the request
//! - Handles are opaque trait objects; the server never sees a driver type

use std::sync::Arc;

use crate::core::{Cancelled, StdContext};

pub mod postgresql;
pub mod redis;

pub use postgresql::{Database, Role};
pub use redis::{CacheRepo, MemoryCache};

#[derive(Debug, thiserror::Error)]
pub enum DependError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("value at {0} is not an integer")]
    NotInteger(String),

    #[error("{0} connection is closed")]
    Closed(&'static str),

    #[error("{backend} unavailable: {message}")]
    Unavailable {
        backend: &'static str,
        message: String,
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Result of pinging one dependency.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Probe {
    pub name: &'static str,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Probe {
    fn from_result(name: &'static str, result: Result<(), DependError>) -> Self {
        match result {
            Ok(()) => Self {
                name,
                healthy: true,
                error: None,
            },
            Err(e) => Self {
                name,
                healthy: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Handles shared by every request.
#[derive(Clone)]
pub struct Dependency {
    pub db: Option<Arc<dyn Database>>,
    pub cache: Arc<dyn CacheRepo>,
}

impl Dependency {
    pub fn new(db: Option<Arc<dyn Database>>, cache: Arc<dyn CacheRepo>) -> Self {
        Self { db, cache }
    }

    /// In-process cache and no database.
    pub fn in_memory() -> Self {
        Self::new(None, Arc::new(MemoryCache::new()))
    }

    /// Ping the cache and, if configured, both database roles.
    pub async fn probe(&self, ctx: &StdContext) -> Vec<Probe> {
        let mut probes = vec![Probe::from_result("redis", self.cache.ping(ctx).await)];
        if let Some(db) = &self.db {
            probes.push(Probe::from_result("postgresql.read", db.ping(ctx, Role::Read).await));
            probes.push(Probe::from_result("postgresql.write", db.ping(ctx, Role::Write).await));
        }
        probes
    }

    /// Close every handle, reporting the first failure.
    pub async fn close(&self) -> Result<(), DependError> {
        let cache = self.cache.close().await;
        if let Some(db) = &self.db {
            db.close(Role::Read).await?;
            db.close(Role::Write).await?;
        }
        cache
    }
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("db", &self.db.is_some())
            .field("cache", &self.cache.version())
            .finish()
    }
}
