//! # framekit
//!
//! The request lifecycle of a frames server: stateless interactive cards
//! rendered as HTML meta tags (or JSON) that a client re-posts on every
//! button click.
//!
//! One request flows through:
//!
//! - **Button codec**: which button was clicked, and its state, ride in the
//!   post URL's `__bi` / `__bs` query parameters ([`button`]).
//! - **Message parser**: the signed action in the POST body is decoded and
//!   checked against a hub ([`message`]).
//! - **Middleware**: onion composition with copy-on-write context patches and
//!   a concurrent group combinator ([`middleware`]).
//! - **Resolver and negotiator**: the handler's [`FrameDefinition`] is
//!   validated and rendered as meta tags or `application/frame+json`
//!   ([`frame`]).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use framekit::{Button, FrameConfig, FrameContext, FrameDefinition, Router, Server};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), framekit::Error> {
//!     let router = Router::new(FrameConfig::default()).frame("/", counter);
//!     Server::bind("0.0.0.0:3000")?.serve(router).await
//! }
//!
//! async fn counter(ctx: FrameContext) -> Result<FrameDefinition, framekit::Error> {
//!     let count = ctx.state()["count"].as_i64().unwrap_or(0)
//!         + if ctx.button_index().is_some() { 1 } else { 0 };
//!     FrameDefinition::new("https://example.com/counter.png")
//!         .button(Button::post("+1"))
//!         .state(&json!({ "count": count }))
//! }
//! ```
//!
//! Host frameworks skip [`Server`] and call [`App::handle`] with any
//! `http::Request`.

mod context;
mod dispatch;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod button;
pub mod config;
pub mod frame;
pub mod message;
pub mod middleware;

pub use button::{ButtonAction, ButtonIndex, ButtonInformation};
pub use config::{FrameConfig, HubConfig, ImageConfig};
pub use context::{ContextPatch, FrameContext};
pub use error::Error;
pub use frame::{
    AspectRatio, Button, ButtonKind, Element, FrameDefinition, FrameResponse, Image, ImageOptions,
    ImageRenderer, Node, RenderedImage,
};
pub use handler::{FrameHandler, FrameMiddleware, FrameOutcome, IntoFrameOutcome};
pub use message::hub::{Hub, HubValidation, HttpHub};
pub use message::{FrameMessage, VerifyOptions, parse_frame_message};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response};
pub use router::{App, Router};
pub use server::Server;
