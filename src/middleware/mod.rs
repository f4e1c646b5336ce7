//! Middleware layer.
//!
//! A middleware is an async unit shaped as `(context, next) -> result`. It may
//! run code before calling [`Next::run`], after it returns, or both; one that
//! never calls `next` halts the pipeline and its own return value becomes the
//! final result. This is onion composition:
//!
//! ```text
//! compose([a, b, c]).run(ctx, endpoint)
//!
//!   a ──▶ b ──▶ c ──▶ endpoint
//!   a ◀── b ◀── c ◀──┘
//! ```
//!
//! Contexts are never mutated in place. `next` takes a *patch*; the patch is
//! applied to a fresh copy of the context and only the inner layers see it.
//! Each layer owns its own context value: copy-on-write per layer.
//!
//! Two primitives build pipelines:
//!
//! - [`compose`] threads a list of middleware sequentially.
//! - [`concurrent`] runs a group of independent middleware in parallel on the
//!   same context, merges their patches in listed order, and continues once.
//!
//! Both are generic over any [`Context`]. framekit's own request context is
//! [`FrameContext`](crate::FrameContext); `serde_json::Map` also implements
//! [`Context`] for loosely typed pipelines.

mod button;
mod message;

pub use button::ButtonParser;
pub use message::MessageParser;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Error;

// ── Core traits ───────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Combines two patches. Keys present in `later` win.
pub trait Merge {
    fn merge(&mut self, later: Self);
}

/// A value threaded through a pipeline and extended by patches.
pub trait Context: Clone + Send + 'static {
    type Patch: Default + Merge + Send + 'static;

    /// Returns a new context with `patch` applied on top of `self`.
    fn apply(self, patch: Self::Patch) -> Self;
}

/// One unit of a pipeline.
///
/// Implement this on your own types, or wrap an async closure with
/// [`from_fn`].
pub trait Middleware<C: Context, R>: Send + Sync + 'static {
    fn call(&self, ctx: C, next: Next<C, R>) -> BoxFuture<'static, R>;
}

/// A shared, type-erased middleware.
pub type BoxedMiddleware<C, R> = Arc<dyn Middleware<C, R>>;

/// The terminal step of a pipeline: receives the fully patched context.
pub type Endpoint<C, R> = Arc<dyn Fn(C) -> BoxFuture<'static, R> + Send + Sync>;

// ── Next ──────────────────────────────────────────────────────────────────────

/// The continuation handed to a middleware.
///
/// Consumed by value: a middleware can advance the pipeline at most once.
pub struct Next<C: Context, R> {
    cont: Box<dyn FnOnce(C::Patch) -> BoxFuture<'static, R> + Send>,
}

impl<C: Context, R: 'static> Next<C, R> {
    pub(crate) fn new<F>(cont: F) -> Self
    where
        F: FnOnce(C::Patch) -> BoxFuture<'static, R> + Send + 'static,
    {
        Self { cont: Box::new(cont) }
    }

    /// Advances to the next unit with `patch` applied to the context.
    pub fn run(self, patch: C::Patch) -> BoxFuture<'static, R> {
        (self.cont)(patch)
    }

    /// Advances without changing the context.
    pub fn proceed(self) -> BoxFuture<'static, R> {
        self.run(C::Patch::default())
    }
}

// ── from_fn ───────────────────────────────────────────────────────────────────

/// Wraps an async closure as a middleware.
///
/// ```rust
/// use framekit::middleware::{self, Next};
/// use serde_json::{Map, Value, json};
///
/// let stamp = middleware::from_fn(|_ctx: Map<String, Value>, next: Next<Map<String, Value>, Map<String, Value>>| async move {
///     let mut patch = Map::new();
///     patch.insert("stamped".into(), json!(true));
///     next.run(patch).await
/// });
/// # let _ = stamp;
/// ```
pub fn from_fn<C, R, F, Fut>(f: F) -> BoxedMiddleware<C, R>
where
    C: Context,
    R: Send + 'static,
    F: Fn(C, Next<C, R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    Arc::new(FromFn(f))
}

struct FromFn<F>(F);

impl<C, R, F, Fut> Middleware<C, R> for FromFn<F>
where
    C: Context,
    R: Send + 'static,
    F: Fn(C, Next<C, R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    fn call(&self, ctx: C, next: Next<C, R>) -> BoxFuture<'static, R> {
        Box::pin((self.0)(ctx, next))
    }
}

// ── compose ───────────────────────────────────────────────────────────────────

/// A sequential chain of middleware built by [`compose`]. Never empty.
pub struct Pipeline<C: Context, R> {
    chain: Arc<[BoxedMiddleware<C, R>]>,
}

impl<C: Context, R> Clone for Pipeline<C, R> {
    fn clone(&self) -> Self {
        Self { chain: Arc::clone(&self.chain) }
    }
}

/// Composes `middlewares` into one pipeline, in listed order.
///
/// Fails with [`Error::EmptyPipeline`] before anything runs when the list is
/// empty.
pub fn compose<C, R>(middlewares: Vec<BoxedMiddleware<C, R>>) -> Result<Pipeline<C, R>, Error>
where
    C: Context,
    R: Send + 'static,
{
    if middlewares.is_empty() {
        return Err(Error::EmptyPipeline);
    }
    Ok(Pipeline { chain: middlewares.into() })
}

impl<C, R> Pipeline<C, R>
where
    C: Context,
    R: Send + 'static,
{
    /// Runs the pipeline on `ctx`, ending in `endpoint`.
    pub fn run<E, Fut>(&self, ctx: C, endpoint: E) -> BoxFuture<'static, R>
    where
        E: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let endpoint: Endpoint<C, R> =
            Arc::new(move |ctx| -> BoxFuture<'static, R> { Box::pin(endpoint(ctx)) });
        step(Arc::clone(&self.chain), 0, ctx, endpoint)
    }
}

fn step<C, R>(
    chain: Arc<[BoxedMiddleware<C, R>]>,
    index: usize,
    ctx: C,
    endpoint: Endpoint<C, R>,
) -> BoxFuture<'static, R>
where
    C: Context,
    R: Send + 'static,
{
    let Some(middleware) = chain.get(index).cloned() else {
        return endpoint(ctx);
    };

    // The continuation owns its own copy; patches never reach this layer.
    let captured = ctx.clone();
    let next = Next::new(move |patch| step(chain, index + 1, captured.apply(patch), endpoint));
    middleware.call(ctx, next)
}

// ── concurrent ────────────────────────────────────────────────────────────────

/// Runs independent middleware in parallel and continues once with the merge
/// of their patches.
///
/// - one middleware: returned unchanged;
/// - zero: [`Error::EmptyGroup`].
///
/// Every member receives the same starting context. Their `next` only records
/// the patch; when all members have reported, patches merge in listed order
/// (a later member wins on conflicting keys) and the outer `next` runs exactly
/// once. A member that returns without calling `next` short-circuits the whole
/// group with its own value. Code a member places after `next` does not run:
/// the group is dropped as soon as every patch is in.
pub fn concurrent<C, R>(
    mut middlewares: Vec<BoxedMiddleware<C, R>>,
) -> Result<BoxedMiddleware<C, R>, Error>
where
    C: Context,
    R: Send + 'static,
{
    if middlewares.len() == 1 {
        if let Some(only) = middlewares.pop() {
            return Ok(only);
        }
    }
    if middlewares.is_empty() {
        return Err(Error::EmptyGroup);
    }
    Ok(Arc::new(Concurrent { group: middlewares.into() }))
}

struct Concurrent<C: Context, R> {
    group: Arc<[BoxedMiddleware<C, R>]>,
}

impl<C, R> Middleware<C, R> for Concurrent<C, R>
where
    C: Context,
    R: Send + 'static,
{
    fn call(&self, ctx: C, next: Next<C, R>) -> BoxFuture<'static, R> {
        let group = Arc::clone(&self.group);

        Box::pin(async move {
            let (tx, mut rx) = mpsc::unbounded_channel::<(usize, C::Patch)>();

            let mut running: FuturesUnordered<BoxFuture<'static, R>> = group
                .iter()
                .enumerate()
                .map(|(slot, member)| {
                    let tx = tx.clone();
                    let recorder = Next::new(move |patch| -> BoxFuture<'static, R> {
                        // A failed send only happens after the group already finished.
                        let _ = tx.send((slot, patch));
                        Box::pin(std::future::pending())
                    });
                    member.call(ctx.clone(), recorder)
                })
                .collect();
            drop(tx);

            let mut patches: Vec<Option<C::Patch>> = group.iter().map(|_| None).collect();
            let mut outstanding = patches.len();

            while outstanding > 0 {
                tokio::select! {
                    Some((slot, patch)) = rx.recv() => {
                        if let Some(entry) = patches.get_mut(slot) {
                            if entry.replace(patch).is_none() {
                                outstanding -= 1;
                            }
                        }
                    }
                    Some(halted) = running.next() => {
                        debug!(outstanding, "grouped middleware returned without calling next");
                        return halted;
                    }
                    else => break,
                }
            }
            drop(running);

            let merged = patches
                .into_iter()
                .flatten()
                .fold(C::Patch::default(), |mut acc, patch| {
                    acc.merge(patch);
                    acc
                });
            next.run(merged).await
        })
    }
}

// ── Loosely typed context ─────────────────────────────────────────────────────

impl Merge for Map<String, Value> {
    fn merge(&mut self, later: Self) {
        self.extend(later);
    }
}

impl Context for Map<String, Value> {
    type Patch = Map<String, Value>;

    fn apply(mut self, patch: Self::Patch) -> Self {
        self.merge(patch);
        self
    }
}
