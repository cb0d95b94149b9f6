//! PostgreSQL handle.
//!
//! Read and write traffic may go to different servers, so every call names
//! the [`Role`] it targets.

use async_trait::async_trait;

use crate::core::StdContext;
use crate::depends::DependError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Read,
    Write,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Read => "read",
            Role::Write => "write",
        }
    }
}

#[async_trait]
pub trait Database: Send + Sync {
    /// Round-trip to the server behind `role`.
    async fn ping(&self, ctx: &StdContext, role: Role) -> Result<(), DependError>;

    async fn close(&self, role: Role) -> Result<(), DependError>;
}
