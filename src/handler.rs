//! Frame handler trait and type erasure.
//!
//! The router holds handlers of different types in one table, so each is
//! erased into the pipeline's [`Endpoint`] when registered:
//!
//! ```text
//! async fn counter(ctx: FrameContext) -> FrameDefinition { … }   ← user code
//!        ↓ router.frame("/", counter)
//! counter.into_endpoint()                                        ← blanket impl
//!        ↓ Arc<dyn Fn(FrameContext) -> BoxFuture<FrameOutcome>>
//! pipeline.run(ctx, endpoint)                                    ← per request
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::context::FrameContext;
use crate::error::Error;
use crate::frame::{FrameDefinition, FrameResponse};
use crate::middleware::{BoxFuture, BoxedMiddleware, Endpoint};

/// What a pipeline resolves to.
pub type FrameOutcome = Result<FrameResponse, Error>;

/// A middleware over frame requests.
pub type FrameMiddleware = BoxedMiddleware<FrameContext, FrameOutcome>;

/// Return types a frame handler may use.
pub trait IntoFrameOutcome: Send + 'static {
    fn into_outcome(self) -> FrameOutcome;
}

impl IntoFrameOutcome for FrameResponse {
    fn into_outcome(self) -> FrameOutcome { Ok(self) }
}

impl IntoFrameOutcome for FrameDefinition {
    fn into_outcome(self) -> FrameOutcome { Ok(FrameResponse::Frame(self)) }
}

impl<T> IntoFrameOutcome for Result<T, Error>
where
    T: Into<FrameResponse> + Send + 'static,
{
    fn into_outcome(self) -> FrameOutcome { self.map(Into::into) }
}

/// Implemented for every valid frame handler.
///
/// Satisfied automatically by any `async fn` shaped as
///
/// ```text
/// async fn name(ctx: FrameContext) -> impl IntoFrameOutcome
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait FrameHandler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_endpoint(self) -> Endpoint<FrameContext, FrameOutcome>;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, O> private::Sealed for F
where
    F: Fn(FrameContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
    O: IntoFrameOutcome,
{
}

impl<F, Fut, O> FrameHandler for F
where
    F: Fn(FrameContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
    O: IntoFrameOutcome,
{
    fn into_endpoint(self) -> Endpoint<FrameContext, FrameOutcome> {
        Arc::new(move |ctx| -> BoxFuture<'static, FrameOutcome> {
            let fut = self(ctx);
            Box::pin(async move { fut.await.into_outcome() })
        })
    }
}
