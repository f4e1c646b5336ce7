//! Request dispatch: one frame request in, one HTTP response out.
//!
//! ```text
//! GET  ─▶ initial render ──────────────────────────┐
//! POST ─▶ [ButtonParser ∥ MessageParser] ──────────┤
//!                                                  ▼
//!               global middleware ─▶ route middleware ─▶ handler
//!                                                  │
//!            Redirect ─▶ 302 Location              │
//!            Frame    ─▶ resolve ─▶ negotiate ◀────┘
//! ```
//!
//! Every `Err` on the way becomes `500 Internal Server Error`, logged with
//! the request URL.

use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, error, warn};
use url::Url;

use crate::button::ButtonAction;
use crate::config::FrameConfig;
use crate::context::FrameContext;
use crate::error::Error;
use crate::frame::meta;
use crate::frame::resolve::{self, ResolveEnv};
use crate::frame::FrameResponse;
use crate::handler::FrameOutcome;
use crate::middleware::{BoxFuture, Endpoint, Pipeline};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A registered frame: its full middleware chain and its handler.
pub(crate) struct FrameRoute {
    pub(crate) pipeline: Pipeline<FrameContext, FrameOutcome>,
    pub(crate) handler: Endpoint<FrameContext, FrameOutcome>,
    /// Path of this frame's image route, when a renderer is mounted.
    pub(crate) image_route: Option<String>,
}

/// State shared by every frame route.
pub(crate) struct Dispatcher {
    config: FrameConfig,
    origin: Option<Url>,
}

impl Dispatcher {
    pub(crate) fn new(config: FrameConfig) -> Result<Self, Error> {
        config.validate()?;
        let origin = config.origin_url()?;
        Ok(Self { config, origin })
    }

    pub(crate) fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub(crate) async fn dispatch(&self, route: &FrameRoute, request: Request) -> Response {
        let url = match self.request_url(&request) {
            Ok(url) => url,
            Err(e) => {
                debug!(error = %e, uri = %request.uri(), "cannot reconstruct request url");
                return StatusCode::BAD_REQUEST.into_response();
            }
        };
        let accept = request.header("accept").map(str::to_owned);

        let ctx = FrameContext::new(Arc::new(request), url.clone(), self.config.initial_state.clone());
        let outcome = route.pipeline.run(ctx, endpoint(Arc::clone(&route.handler))).await;

        match outcome.and_then(|response| self.respond(response, route, &url, accept.as_deref())) {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, url = %url, "frame request failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    fn respond(
        &self,
        response: FrameResponse,
        route: &FrameRoute,
        url: &Url,
        accept: Option<&str>,
    ) -> Result<Response, Error> {
        match response {
            FrameResponse::Redirect(location) => {
                let location = url.join(&location)?;
                Ok(Response::redirect(location.as_str()))
            }
            FrameResponse::Frame(definition) => {
                let env = ResolveEnv {
                    url,
                    base_path: &self.config.base_path,
                    image_route: route.image_route.as_deref(),
                    title: &self.config.title,
                    image: &self.config.image,
                };
                let resolved = resolve::resolve(definition, &env)?;
                meta::negotiate(&resolved, accept)
            }
        }
    }

    /// Absolute URL of `request`: the configured origin, or the `Host` and
    /// `X-Forwarded-Proto` headers, joined with the path and query. Only
    /// `http` and `https` are accepted from the request.
    fn request_url(&self, request: &Request) -> Result<Url, Error> {
        let path = request.uri().path_and_query().map_or("/", |pq| pq.as_str());
        let base = match &self.origin {
            Some(origin) => origin.clone(),
            None => {
                let host = request
                    .header("host")
                    .or_else(|| request.uri().authority().map(|a| a.as_str()))
                    .unwrap_or("localhost");
                let scheme = request
                    .header("x-forwarded-proto")
                    .and_then(|proto| proto.split(',').next())
                    .map(str::trim)
                    .or_else(|| request.uri().scheme_str())
                    .unwrap_or("http")
                    .to_ascii_lowercase();
                if scheme != "http" && scheme != "https" {
                    return Err(Error::UnsupportedScheme(scheme));
                }
                Url::parse(&format!("{scheme}://{host}"))?
            }
        };
        Ok(base.join(path)?)
    }
}

/// Wraps the handler so a `post_redirect` click answered with a frame is
/// flagged.
fn endpoint(
    handler: Endpoint<FrameContext, FrameOutcome>,
) -> impl Fn(FrameContext) -> BoxFuture<'static, FrameOutcome> + Send + Sync + 'static {
    move |ctx: FrameContext| -> BoxFuture<'static, FrameOutcome> {
        let expects_redirect = ctx
            .clicked_button()
            .is_some_and(|button| button.action == ButtonAction::PostRedirect);
        let fut = handler(ctx);
        Box::pin(async move {
            let outcome = fut.await;
            if expects_redirect && matches!(outcome, Ok(FrameResponse::Frame(_))) {
                warn!("post_redirect button answered with a frame instead of a redirect");
            }
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;

    use super::*;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::get(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        Request::new(parts, Bytes::new(), HashMap::new())
    }

    #[test]
    fn url_from_forwarded_headers() {
        let dispatcher = Dispatcher::new(FrameConfig::default()).unwrap();
        let url = dispatcher
            .request_url(&request(
                "/api?__bi=1%3Ap",
                &[("host", "frames.test"), ("x-forwarded-proto", "https, http")],
            ))
            .unwrap();
        assert_eq!(url.as_str(), "https://frames.test/api?__bi=1%3Ap");
    }

    #[test]
    fn configured_origin_wins() {
        let config = FrameConfig { origin: Some("https://public.test".into()), ..FrameConfig::default() };
        let dispatcher = Dispatcher::new(config).unwrap();
        let url = dispatcher.request_url(&request("/api", &[("host", "internal:8080")])).unwrap();
        assert_eq!(url.as_str(), "https://public.test/api");
    }

    #[test]
    fn forwarded_proto_must_be_http_or_https() {
        let dispatcher = Dispatcher::new(FrameConfig::default()).unwrap();
        for proto in ["javascript", "file", "data"] {
            let result = dispatcher
                .request_url(&request("/api", &[("host", "frames.test"), ("x-forwarded-proto", proto)]));
            assert!(matches!(result, Err(Error::UnsupportedScheme(_))), "{proto}");
        }

        let url = dispatcher
            .request_url(&request("/api", &[("host", "frames.test"), ("x-forwarded-proto", "HTTPS")]))
            .unwrap();
        assert_eq!(url.as_str(), "https://frames.test/api");
    }

    #[test]
    fn defaults_to_plain_http_localhost() {
        let dispatcher = Dispatcher::new(FrameConfig::default()).unwrap();
        let url = dispatcher.request_url(&request("/", &[])).unwrap();
        assert_eq!(url.as_str(), "http://localhost/");
    }
}
