use tracing::debug;

use crate::button;
use crate::context::{ContextPatch, FrameContext};
use crate::middleware::{BoxFuture, Middleware, Next};

/// Decodes the clicked button from the request URL on POST.
///
/// GETs and URLs without a well-formed `__bi` pass through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct ButtonParser;

impl<R: Send + 'static> Middleware<FrameContext, R> for ButtonParser {
    fn call(&self, ctx: FrameContext, next: Next<FrameContext, R>) -> BoxFuture<'static, R> {
        if ctx.request().method() != http::Method::POST {
            return next.proceed();
        }
        match button::decode(ctx.url()) {
            Some(clicked) => {
                debug!(index = clicked.index.get(), action = clicked.action.as_str(), "button clicked");
                next.run(ContextPatch::new().clicked_button(clicked))
            }
            None => next.proceed(),
        }
    }
}
