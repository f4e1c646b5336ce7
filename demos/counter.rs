//! A counter frame with a tiny SVG renderer.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example counter
//!
//! Try:
//!   curl http://localhost:3000/api
//!   curl -H 'accept: application/frame+json' http://localhost:3000/api

use bytes::Bytes;
use framekit::middleware::BoxFuture;
use framekit::{
    Button, ContentType, Element, Error, FrameConfig, FrameContext, FrameDefinition, ImageOptions,
    ImageRenderer, Node, RenderedImage, Router, Server,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Default, Deserialize, Serialize)]
struct Counter {
    count: i64,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let config = FrameConfig::from_toml_str(
        r#"
        base_path = "/api"
        title = "Counter"
        initial_state = { count = 0 }
        "#,
    )?;

    let router = Router::new(config)
        .renderer(SvgText)
        .frame("/", counter);

    Server::bind("0.0.0.0:3000")?.serve(router).await
}

async fn counter(ctx: FrameContext) -> Result<FrameDefinition, Error> {
    let mut state: Counter = ctx.state_as().unwrap_or_default();
    if let Some(delta) = ctx.button_state().and_then(|s| s["delta"].as_i64()) {
        state.count += delta;
    }

    let image = Element::new("div")
        .attr("style", json!({ "fontSize": 80 }))
        .child(format!("Count: {}", state.count));

    FrameDefinition::new(image)
        .button(Button::post("-1").state(json!({ "delta": -1 })))
        .button(Button::post("+1").state(json!({ "delta": 1 })))
        .button(Button::link("Source", "https://github.com/"))
        .state(&state)
}

/// Renders every text node of the tree as one line of SVG text.
struct SvgText;

impl ImageRenderer for SvgText {
    fn render<'a>(
        &'a self,
        tree: &'a Node,
        options: ImageOptions,
    ) -> BoxFuture<'a, Result<RenderedImage, Error>> {
        Box::pin(async move {
            let mut text = String::new();
            collect_text(tree, &mut text);
            let svg = format!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}"><rect width="100%" height="100%" fill="white"/><text x="50%" y="50%" font-size="64" text-anchor="middle">{text}</text></svg>"#,
                w = options.width,
                h = options.height,
            );
            Ok(RenderedImage { content_type: ContentType::Svg, bytes: Bytes::from(svg) })
        })
    }
}

fn collect_text(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(&text.replace('&', "&amp;").replace('<', "&lt;")),
        Node::Element(element) => element.children.iter().for_each(|child| collect_text(child, out)),
    }
}
