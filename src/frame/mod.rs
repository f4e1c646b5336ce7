//! Frame definitions: what a handler returns.
//!
//! ```rust
//! use framekit::{Button, FrameDefinition, FrameResponse};
//! use serde_json::json;
//!
//! # fn build() -> Result<FrameResponse, framekit::Error> {
//! let frame = FrameDefinition::new("https://example.com/count.png")
//!     .button(Button::post("+1").state(json!({ "delta": 1 })))
//!     .button(Button::post_redirect("Docs").target("/docs"))
//!     .button(Button::link("Source", "https://github.com/example"))
//!     .text_input("Say something")
//!     .state(&json!({ "count": 3 }))?;
//! Ok(frame.into())
//! # }
//! ```
//!
//! Nothing here is validated until the frame is resolved (see [`resolve`]).

pub mod image;
pub mod meta;
pub mod resolve;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

pub use image::{Element, ImageRenderer, Node, RenderedImage};

// ── Image ─────────────────────────────────────────────────────────────────────

/// The frame image: a literal URL, or a tree a renderer turns into pixels.
#[derive(Clone, Debug, PartialEq)]
pub enum Image {
    Url(String),
    Tree(Node),
}

impl From<&str> for Image {
    fn from(url: &str) -> Self { Self::Url(url.to_owned()) }
}

impl From<String> for Image {
    fn from(url: String) -> Self { Self::Url(url) }
}

impl From<Node> for Image {
    fn from(tree: Node) -> Self { Self::Tree(tree) }
}

impl From<Element> for Image {
    fn from(element: Element) -> Self { Self::Tree(Node::Element(element)) }
}

/// Aspect ratios a frame image can declare.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1.91:1")]
    Landscape,
    #[serde(rename = "1:1")]
    Square,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "1.91:1",
            Self::Square    => "1:1",
        }
    }
}

/// Pixel size requested from the renderer for image trees.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ImageOptions {
    pub width: u32,
    pub height: u32,
}

// ── Button ────────────────────────────────────────────────────────────────────

/// What a button does when clicked.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ButtonKind {
    Post,
    PostRedirect,
    Link,
    Mint,
    Tx,
}

impl ButtonKind {
    /// Wire name used in `fc:frame:button:N:action`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post         => "post",
            Self::PostRedirect => "post_redirect",
            Self::Link         => "link",
            Self::Mint         => "mint",
            Self::Tx           => "tx",
        }
    }
}

/// One frame button.
#[derive(Clone, Debug, PartialEq)]
pub struct Button {
    pub(crate) label: String,
    pub(crate) kind: ButtonKind,
    pub(crate) target: Option<String>,
    pub(crate) state: Option<Value>,
    pub(crate) post_url: Option<String>,
}

impl Button {
    fn new(kind: ButtonKind, label: impl Into<String>, target: Option<String>) -> Self {
        Self { label: label.into(), kind, target, state: None, post_url: None }
    }

    /// Posts back to this frame (or to [`target`](Self::target)).
    pub fn post(label: impl Into<String>) -> Self {
        Self::new(ButtonKind::Post, label, None)
    }

    /// Posts back and expects the handler to answer with a redirect.
    pub fn post_redirect(label: impl Into<String>) -> Self {
        Self::new(ButtonKind::PostRedirect, label, None)
    }

    /// Opens `href`, an absolute http(s) URL.
    pub fn link(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self::new(ButtonKind::Link, label, Some(href.into()))
    }

    /// Mints the token identified by a CAIP-10 address, e.g.
    /// `eip155:7777777:0x060f3edd18c47f59bd23d063bbeb9aa4a8fec6df`.
    pub fn mint(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self::new(ButtonKind::Mint, label, Some(token.into()))
    }

    /// Fetches transaction data from `path`, resolved like a post target.
    pub fn tx(label: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(ButtonKind::Tx, label, Some(path.into()))
    }

    /// Target for post / post_redirect buttons, relative to the base path.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// State scoped to this click, carried in the target URL.
    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Where the client posts after a tx button completes.
    pub fn post_url(mut self, path: impl Into<String>) -> Self {
        self.post_url = Some(path.into());
        self
    }

    pub fn kind(&self) -> ButtonKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

// ── FrameDefinition ───────────────────────────────────────────────────────────

/// A handler's description of the next frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameDefinition {
    pub(crate) image: Image,
    pub(crate) aspect_ratio: Option<AspectRatio>,
    pub(crate) image_options: Option<ImageOptions>,
    pub(crate) buttons: Vec<Button>,
    pub(crate) text_input: Option<String>,
    pub(crate) state: Option<Value>,
    pub(crate) action: Option<String>,
    pub(crate) title: Option<String>,
    pub(crate) headers: Vec<(String, String)>,
}

impl FrameDefinition {
    pub fn new(image: impl Into<Image>) -> Self {
        Self {
            image: image.into(),
            aspect_ratio: None,
            image_options: None,
            buttons: Vec::new(),
            text_input: None,
            state: None,
            action: None,
            title: None,
            headers: Vec::new(),
        }
    }

    /// Appends a button. Buttons are numbered 1.. in insertion order; more
    /// than four fail at resolution.
    pub fn button(mut self, button: Button) -> Self {
        self.buttons.push(button);
        self
    }

    /// Sets the single text input's placeholder.
    pub fn text_input(mut self, placeholder: impl Into<String>) -> Self {
        self.text_input = Some(placeholder.into());
        self
    }

    /// State the client echoes back on the next click.
    pub fn state<T: Serialize>(mut self, state: &T) -> Result<Self, Error> {
        self.state = Some(serde_json::to_value(state)?);
        Ok(self)
    }

    /// Path the frame's own `post_url` points at.
    pub fn action(mut self, path: impl Into<String>) -> Self {
        self.action = Some(path.into());
        self
    }

    pub fn aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    pub fn image_options(mut self, options: ImageOptions) -> Self {
        self.image_options = Some(options);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Extra response header, e.g. `cache-control`.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }
}

// ── FrameResponse ─────────────────────────────────────────────────────────────

/// What a handler (or a short-circuiting middleware) produced.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameResponse {
    /// Render a frame.
    Frame(FrameDefinition),
    /// Answer with `302 Found` and this `Location`.
    Redirect(String),
}

impl FrameResponse {
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect(location.into())
    }
}

impl From<FrameDefinition> for FrameResponse {
    fn from(frame: FrameDefinition) -> Self {
        Self::Frame(frame)
    }
}
