//! Context pool.
//!
//! # Responsibilities
//! - Hand out a [`Context`] per request, recycling released ones
//! - Reset every context before it re-enters the free list
//!
//! # Design Decisions
//! - The free list is the only state shared between requests; a mutex
//!   around a `Vec` is enough since the critical sections are a push or pop
//! - Contexts are returned through an RAII guard, so an early return or a
//!   dropped request future still releases them
//! - The free list is capped; extra contexts are freed on release

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::context::{Context, Stage};

/// Free list of reusable request contexts.
#[derive(Debug)]
pub struct ContextPool {
    free: Mutex<Vec<Box<Context>>>,
    max_idle: usize,
    allocated: AtomicUsize,
    reused: AtomicUsize,
}

impl ContextPool {
    /// Create a pool keeping at most `max_idle` released contexts.
    pub fn new(max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::with_capacity(max_idle.min(1024))),
            max_idle,
            allocated: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
        })
    }

    /// Take a context in the `Created` stage. Never blocks on I/O.
    pub fn acquire(self: &Arc<Self>) -> PooledContext {
        // Contexts are reset before they are pushed, so a poisoned lock
        // still guards a consistent list.
        let recycled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let ctx = match recycled {
            Some(mut ctx) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                ctx.stage_created();
                ctx
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Box::new(Context::new())
            }
        };

        PooledContext {
            ctx: Some(ctx),
            pool: Arc::clone(self),
        }
    }

    fn release(&self, mut ctx: Box<Context>) {
        ctx.reset();
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_idle {
            free.push(ctx);
        }
    }

    /// Number of contexts currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Total contexts allocated since the pool was created.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Total acquisitions served from the free list.
    pub fn reused(&self) -> usize {
        self.reused.load(Ordering::Relaxed)
    }
}

impl Context {
    fn stage_created(&mut self) {
        if self.stage() == Stage::Released {
            // Released -> Created is always a legal transition.
            let _ = self.transition(Stage::Created);
        }
    }
}

/// A context on loan from the pool. Dropping it releases the context.
#[derive(Debug)]
pub struct PooledContext {
    ctx: Option<Box<Context>>,
    pool: Arc<ContextPool>,
}

impl Deref for PooledContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        // Only `Drop` takes the context out.
        match &self.ctx {
            Some(ctx) => ctx,
            None => unreachable!("pooled context used after release"),
        }
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut Context {
        match &mut self.ctx {
            Some(ctx) => ctx,
            None => unreachable!("pooled context used after release"),
        }
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.release(ctx);
        }
    }
}
