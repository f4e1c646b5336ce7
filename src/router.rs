//! Frame router.
//!
//! Register frames under the configured base path, then [`build`](Router::build)
//! an [`App`]: a radix tree of routes, each carrying its fully composed
//! middleware pipeline. Host frameworks call [`App::handle`]; standalone
//! deployments hand the router to [`Server::serve`](crate::Server::serve).

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::button::join_path;
use crate::config::FrameConfig;
use crate::context::FrameContext;
use crate::dispatch::{Dispatcher, FrameRoute};
use crate::error::Error;
use crate::frame::image::{self, ImageRenderer};
use crate::handler::{FrameHandler, FrameMiddleware, FrameOutcome};
use crate::message::VerifyOptions;
use crate::message::hub::{Hub, HttpHub};
use crate::middleware::{self, ButtonParser, Endpoint, MessageParser};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Builder for a frame [`App`].
///
/// ```rust,no_run
/// use framekit::{FrameConfig, FrameContext, FrameDefinition, Router};
///
/// async fn home(_ctx: FrameContext) -> FrameDefinition {
///     FrameDefinition::new("https://example.com/home.png")
/// }
///
/// # fn main() -> Result<(), framekit::Error> {
/// let app = Router::new(FrameConfig::default())
///     .frame("/", home)
///     .build()?;
/// # let _ = app;
/// # Ok(())
/// # }
/// ```
pub struct Router {
    config: FrameConfig,
    hub: Option<Arc<dyn Hub>>,
    renderer: Option<Arc<dyn ImageRenderer>>,
    middleware: Vec<FrameMiddleware>,
    frames: Vec<PendingFrame>,
}

struct PendingFrame {
    path: String,
    middleware: Vec<FrameMiddleware>,
    handler: Endpoint<FrameContext, FrameOutcome>,
}

impl Router {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            hub: None,
            renderer: None,
            middleware: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Validates actions against `hub` instead of the configured HTTP hub.
    pub fn hub(mut self, hub: impl Hub) -> Self {
        self.hub = Some(Arc::new(hub));
        self
    }

    /// Mounts an `/image` route next to every frame, rendering image trees.
    pub fn renderer(mut self, renderer: impl ImageRenderer) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    /// Middleware that runs for every frame, after the built-in parsers.
    pub fn middleware(mut self, middleware: FrameMiddleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Registers a frame at `path`, relative to the base path. `{name}`
    /// segments are captured as [`Request::param`]s.
    pub fn frame(self, path: &str, handler: impl FrameHandler) -> Self {
        self.frame_with(path, Vec::new(), handler)
    }

    /// Like [`frame`](Self::frame), with middleware that runs for this frame
    /// only, after the global middleware.
    pub fn frame_with(
        mut self,
        path: &str,
        middleware: Vec<FrameMiddleware>,
        handler: impl FrameHandler,
    ) -> Self {
        self.frames.push(PendingFrame {
            path: join_path(&self.config.base_path, path),
            middleware,
            handler: handler.into_endpoint(),
        });
        self
    }

    /// Composes every pipeline and builds the route table.
    pub fn build(self) -> Result<App, Error> {
        let dispatcher = Dispatcher::new(self.config)?;
        let config = dispatcher.config();

        let hub = match (self.hub, &config.hub) {
            (Some(hub), _) => Some(hub),
            (None, Some(hub_config)) => Some(Arc::new(HttpHub::new(hub_config)?) as Arc<dyn Hub>),
            (None, None) => None,
        };
        let options = VerifyOptions {
            verify_frame_url: config.verify_frame_url,
            base_path: config.base_path.clone(),
        };
        let parsers = middleware::concurrent(vec![
            Arc::new(ButtonParser) as FrameMiddleware,
            Arc::new(MessageParser::new(hub, options)) as FrameMiddleware,
        ])?;

        let mut routes = MatchitRouter::new();
        for frame in self.frames {
            let image_route = self.renderer.as_ref().map(|renderer| {
                (join_path(&frame.path, "image"), Arc::clone(renderer))
            });

            let mut chain = vec![Arc::clone(&parsers)];
            chain.extend(self.middleware.iter().cloned());
            chain.extend(frame.middleware);

            let route = FrameRoute {
                pipeline: middleware::compose(chain)?,
                handler: frame.handler,
                image_route: image_route.as_ref().map(|(path, _)| path.clone()),
            };
            insert(&mut routes, &frame.path, Route::Frame(Arc::new(route)))?;
            if let Some((path, renderer)) = image_route {
                insert(&mut routes, &path, Route::Image(renderer))?;
            }
        }

        Ok(App { routes, dispatcher })
    }
}

fn insert(routes: &mut MatchitRouter<Route>, path: &str, route: Route) -> Result<(), Error> {
    routes.insert(path, route).map_err(|e| Error::Route {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

const FRAME_METHODS: &[Method] = &[Method::GET, Method::POST];
const IMAGE_METHODS: &[Method] = &[Method::GET];

#[derive(Clone)]
enum Route {
    Frame(Arc<FrameRoute>),
    Image(Arc<dyn ImageRenderer>),
}

/// A built frame application.
pub struct App {
    routes: MatchitRouter<Route>,
    dispatcher: Dispatcher,
}

impl App {
    /// Answers one HTTP request.
    ///
    /// Unknown paths get `404`, methods other than GET/POST (GET only on
    /// image routes) `405`, and an unreadable body `400`. Everything else
    /// goes through the frame's pipeline.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: hyper::body::Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();

        let (route, params) = match self.routes.at(parts.uri.path()) {
            Ok(matched) => {
                let params: HashMap<String, String> = matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                (matched.value.clone(), params)
            }
            Err(_) => return StatusCode::NOT_FOUND.into_response().into_inner(),
        };

        let allowed = match route {
            Route::Frame(_) => FRAME_METHODS,
            Route::Image(_) => IMAGE_METHODS,
        };
        if !allowed.contains(&parts.method) {
            return method_not_allowed(allowed).into_inner();
        }

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                debug!(error = %e, "failed to read request body");
                return StatusCode::BAD_REQUEST.into_response().into_inner();
            }
        };
        let request = Request::new(parts, body, params);

        let response = match route {
            Route::Frame(frame) => self.dispatcher.dispatch(&frame, request).await,
            Route::Image(renderer) => {
                image::serve(renderer.as_ref(), &request, &self.dispatcher.config().image).await
            }
        };
        response.into_inner()
    }
}

fn method_not_allowed(allowed: &[Method]) -> Response {
    let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header("allow", &allow)
        .no_body()
}
