use std::sync::Arc;

use crate::context::{ContextPatch, FrameContext};
use crate::handler::FrameOutcome;
use crate::message::hub::Hub;
use crate::message::{self, VerifyOptions};
use crate::middleware::{BoxFuture, Middleware, Next};

/// Parses and validates the signed frame action carried by a POST body.
///
/// The decoded message lands in the context, and the state it echoes back
/// replaces the initial state. Envelope and hub failures halt the pipeline
/// with the error.
#[derive(Clone)]
pub struct MessageParser {
    hub: Option<Arc<dyn Hub>>,
    options: VerifyOptions,
}

impl MessageParser {
    pub fn new(hub: Option<Arc<dyn Hub>>, options: VerifyOptions) -> Self {
        Self { hub, options }
    }
}

impl Middleware<FrameContext, FrameOutcome> for MessageParser {
    fn call(
        &self,
        ctx: FrameContext,
        next: Next<FrameContext, FrameOutcome>,
    ) -> BoxFuture<'static, FrameOutcome> {
        let hub = self.hub.clone();
        let options = self.options.clone();

        Box::pin(async move {
            let parsed =
                message::parse_frame_message(ctx.request(), ctx.url(), hub.as_deref(), &options)
                    .await?;
            match parsed {
                Some(message) => {
                    let mut patch = ContextPatch::new();
                    if let Some(state) = &message.state {
                        patch = patch.state(state.clone());
                    }
                    next.run(patch.message(message)).await
                }
                None => next.proceed().await,
            }
        })
    }
}
