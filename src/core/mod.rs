//! Request-scoped context layer.
//!
//! Every HTTP request runs against one pooled [`Context`]: handlers read the
//! captured request from it, record their response into it, and hand a
//! [`StdContext`] to anything downstream that should stop when the request
//! goes away.
//!
//! # Module Layout
//! - `context`: the per-request state bag and its lifecycle stages
//! - `binding`: query, form, JSON and path binders
//! - `pool`: recycling of released contexts
//! - `std_context`: cancellation, trace and logger for downstream calls
//! - `mux`: route groups, handler chains and response finalization

pub mod binding;
pub mod context;
pub mod error;
mod form_decode;
pub mod mux;
pub mod pool;
pub mod std_context;
pub mod trace;

pub use binding::{BindError, BindMode, Params};
pub use context::{Context, SessionUserInfo, Stage};
pub use error::{BusinessError, CoreError};
pub use mux::{handler, HandlerFunc, Mux, MuxOptions, RouterGroup, TemplateRenderer};
pub use pool::{ContextPool, PooledContext};
pub use std_context::{Cancelled, StdContext};
pub use trace::Trace;
