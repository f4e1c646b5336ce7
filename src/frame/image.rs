//! Renderable image trees.
//!
//! A handler may describe its image as a tree instead of a URL. The tree is
//! serialized into the image URL's `image` query parameter; the image route
//! deserializes it and hands it to the configured [`ImageRenderer`]. The
//! compact wire form is a structural walk of the tree:
//!
//! ```text
//! Text("hi")                      →  "hi"
//! Element { kind, attrs, children } →  [kind, {attrs…}, [children…]]
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;
use http::StatusCode;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::config::ImageConfig;
use crate::error::Error;
use crate::frame::ImageOptions;
use crate::middleware::BoxFuture;
use crate::request::Request;
use crate::response::{ContentType, IntoResponse, Response};

/// Query parameter holding the serialized tree.
pub const IMAGE_PARAM: &str = "image";

/// Trees nested deeper than this are rejected on deserialization.
const MAX_DEPTH: usize = 64;

/// A node in an image tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element: a kind (`"div"`, `"img"`, …), attributes, ordered children.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub kind: String,
    pub attrs: BTreeMap<String, Value>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), attrs: BTreeMap::new(), children: Vec::new() }
    }

    pub fn attr(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(name.into(), value);
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Walks the tree into its compact JSON form.
    pub fn serialize(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Element(element) => {
                let attrs: Map<String, Value> = element
                    .attrs
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                let children = element.children.iter().map(Node::serialize).collect();
                Value::Array(vec![
                    Value::String(element.kind.clone()),
                    Value::Object(attrs),
                    Value::Array(children),
                ])
            }
        }
    }

    /// Rebuilds a tree from its compact JSON form.
    pub fn deserialize(value: &Value) -> Result<Self, Error> {
        Self::deserialize_at(value, 0)
    }

    fn deserialize_at(value: &Value, depth: usize) -> Result<Self, Error> {
        if depth > MAX_DEPTH {
            return Err(Error::InvalidImage(format!("tree deeper than {MAX_DEPTH}")));
        }
        match value {
            Value::String(text) => Ok(Self::Text(text.clone())),
            Value::Array(parts) => match parts.as_slice() {
                [Value::String(kind), Value::Object(attrs), Value::Array(children)] => {
                    let children = children
                        .iter()
                        .map(|child| Self::deserialize_at(child, depth + 1))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Self::Element(Element {
                        kind: kind.clone(),
                        attrs: attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                        children,
                    }))
                }
                _ => Err(Error::InvalidImage("element must be [kind, attrs, children]".into())),
            },
            other => Err(Error::InvalidImage(format!("unexpected node {other}"))),
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self { Self::Element(element) }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self { Self::Text(text.to_owned()) }
}

impl From<String> for Node {
    fn from(text: String) -> Self { Self::Text(text) }
}

// ── Renderer seam ─────────────────────────────────────────────────────────────

/// Encoded image bytes produced by a renderer.
pub struct RenderedImage {
    pub content_type: ContentType,
    pub bytes: Bytes,
}

/// Turns a tree into an image. Rasterization lives outside this crate.
pub trait ImageRenderer: Send + Sync + 'static {
    fn render<'a>(
        &'a self,
        tree: &'a Node,
        options: ImageOptions,
    ) -> BoxFuture<'a, Result<RenderedImage, Error>>;
}

/// Serves `GET {frame}/image?image=<tree>&w=..&h=..`.
pub(crate) async fn serve(
    renderer: &dyn ImageRenderer,
    request: &Request,
    config: &ImageConfig,
) -> Response {
    let query = request.uri().query().unwrap_or_default();
    let mut tree = None;
    let mut options = ImageOptions { width: config.width, height: config.height };
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            IMAGE_PARAM => tree = Some(value.into_owned()),
            "w" => options.width = value.parse().unwrap_or(options.width),
            "h" => options.height = value.parse().unwrap_or(options.height),
            _ => {}
        }
    }

    let tree = match tree.as_deref().map(parse_tree) {
        Some(Ok(tree)) => tree,
        Some(Err(e)) => {
            debug!(error = %e, "rejecting image request");
            return StatusCode::BAD_REQUEST.into_response();
        }
        None => return StatusCode::BAD_REQUEST.into_response(),
    };

    match renderer.render(&tree, options).await {
        Ok(image) => Response::builder()
            .header("cache-control", &config.cache_control)
            .bytes(image.content_type, image.bytes),
        Err(e) => {
            error!(error = %e, "image rendering failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn parse_tree(raw: &str) -> Result<Node, Error> {
    let value: Value = serde_json::from_str(raw)?;
    Node::deserialize(&value)
}
