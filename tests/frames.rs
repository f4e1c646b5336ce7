use bytes::Bytes;
use framekit::message::envelope::{
    CastIdBody, FrameActionBody, Message, MessageData, MessageType, SignedEnvelope,
};
use framekit::middleware::{self, BoxFuture, Next};
use framekit::{
    App, Button, ButtonIndex, ContentType, ContextPatch, Element, Error, FrameConfig, FrameContext,
    FrameDefinition, FrameOutcome, FrameResponse, Hub, HubValidation, ImageOptions, ImageRenderer,
    Node, RenderedImage, Router,
};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use prost::Message as _;
use serde_json::{Value, json};

// ── Fixtures ──────────────────────────────────────────────────────────────────

struct FakeHub {
    valid: bool,
    fail: bool,
}

impl Hub for FakeHub {
    fn validate_message<'a>(
        &'a self,
        _envelope: &'a SignedEnvelope,
    ) -> BoxFuture<'a, Result<HubValidation, Error>> {
        Box::pin(async move {
            if self.fail {
                return Err(Error::HubStatus { status: 503, body: "unavailable".into() });
            }
            Ok(HubValidation {
                valid: self.valid,
                message: Some(json!({ "data": { "type": "MESSAGE_TYPE_FRAME_ACTION" } })),
            })
        })
    }
}

struct FixedRenderer;

impl ImageRenderer for FixedRenderer {
    fn render<'a>(
        &'a self,
        tree: &'a Node,
        options: ImageOptions,
    ) -> BoxFuture<'a, Result<RenderedImage, Error>> {
        let body = format!("{}x{} {}", options.width, options.height, tree.serialize());
        Box::pin(async move {
            Ok(RenderedImage { content_type: ContentType::Svg, bytes: Bytes::from(body) })
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Tenant(&'static str);

fn signed_body(fid: u64, button_index: u32, url: &str, state: &str) -> String {
    let message = Message {
        data: Some(MessageData {
            r#type: MessageType::FrameAction as i32,
            fid,
            timestamp: 1,
            network: 1,
            frame_action_body: Some(FrameActionBody {
                url: url.as_bytes().to_vec(),
                button_index,
                cast_id: Some(CastIdBody { fid: 1, hash: vec![0x01] }),
                state: state.as_bytes().to_vec(),
                ..Default::default()
            }),
        }),
        ..Default::default()
    };
    json!({
        "untrustedData": { "fid": fid, "buttonIndex": button_index },
        "trustedData": { "messageBytes": hex::encode(message.encode_to_vec()) },
    })
    .to_string()
}

fn config() -> FrameConfig {
    FrameConfig::from_toml_str(
        r#"
        base_path = "/api"
        title = "Inspector"
        initial_state = { count = 0 }
        "#,
    )
    .unwrap()
}

fn strict_config() -> FrameConfig {
    FrameConfig { verify_frame_url: true, ..config() }
}

async fn inspect(ctx: FrameContext) -> Result<FrameDefinition, Error> {
    let fid = ctx.message().map_or(0, |m| m.requester_fid);
    let button = ctx.button_index().map_or(0, ButtonIndex::get);
    let tenant = ctx.var::<Tenant>().map_or("none", |t| t.0);
    FrameDefinition::new(format!(
        "https://img.test/{fid}/{button}/{}/{tenant}.png",
        ctx.verified()
    ))
    .button(Button::post("Again"))
    .button(Button::post_redirect("Leave").target("/go"))
    .state(ctx.state())
}

async fn go(_ctx: FrameContext) -> FrameResponse {
    FrameResponse::redirect("/landing")
}

async fn crowded(_ctx: FrameContext) -> FrameDefinition {
    (0..5).fold(FrameDefinition::new("https://img.test/a.png"), |frame, i| {
        frame.button(Button::post(format!("b{i}")))
    })
}

async fn long_action(_ctx: FrameContext) -> FrameDefinition {
    FrameDefinition::new("https://img.test/a.png").action(format!("/{}", "x".repeat(300)))
}

async fn tree(_ctx: FrameContext) -> FrameDefinition {
    FrameDefinition::new(Element::new("div").child("hello"))
}

fn app(hub: FakeHub) -> App {
    app_with(config(), hub)
}

fn app_with(config: FrameConfig, hub: FakeHub) -> App {
    let tag = middleware::from_fn(
        |_ctx: FrameContext, next: Next<FrameContext, FrameOutcome>| async move {
            next.run(ContextPatch::new().var(Tenant("acme"))).await
        },
    );
    let gate = middleware::from_fn(
        |ctx: FrameContext, next: Next<FrameContext, FrameOutcome>| async move {
            if ctx.verified() {
                next.proceed().await
            } else {
                Ok(FrameResponse::redirect("https://example.test/denied"))
            }
        },
    );

    Router::new(config)
        .hub(hub)
        .renderer(FixedRenderer)
        .middleware(tag)
        .frame("/", inspect)
        .frame("/go", go)
        .frame("/crowded", crowded)
        .frame("/long", long_action)
        .frame("/tree", tree)
        .frame_with("/members", vec![gate], inspect)
        .build()
        .unwrap()
}

fn valid_app() -> App {
    app(FakeHub { valid: true, fail: false })
}

fn get(uri: &str, accept: Option<&str>) -> http::Request<Full<Bytes>> {
    let mut builder = http::Request::get(uri).header("host", "frames.test");
    if let Some(accept) = accept {
        builder = builder.header("accept", accept);
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

fn post(uri: &str, body: String) -> http::Request<Full<Bytes>> {
    http::Request::post(uri)
        .header("host", "frames.test")
        .header("accept", "application/frame+json")
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

async fn body_of(response: http::Response<Full<Bytes>>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn json_of(response: http::Response<Full<Bytes>>) -> Value {
    serde_json::from_slice(&body_of(response).await).unwrap()
}

// ── Rendering ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn initial_get_renders_html_meta_tags() {
    let response = valid_app().handle(get("/api", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/html; charset=utf-8");

    let html = String::from_utf8(body_of(response).await.to_vec()).unwrap();
    assert!(html.contains("<title>Inspector</title>"));
    assert!(html.contains(r#"<meta property="fc:frame" content="vNext"/>"#));
    assert!(html.contains(r#"content="https://img.test/0/0/false/acme.png""#));
    assert!(html.contains(r#"<meta property="fc:frame:post_url" content="http://frames.test/api"/>"#));
    assert!(html.contains(r#"<meta property="fc:frame:state" content="{&quot;count&quot;:0}"/>"#));
}

#[tokio::test]
async fn accept_header_selects_json() {
    let response = valid_app()
        .handle(get("/api", Some("application/frame+json")))
        .await;
    assert_eq!(response.headers()["content-type"], "application/frame+json");

    let json = json_of(response).await;
    assert_eq!(json["fc:frame:button:1"], "Again");
    assert_eq!(json["fc:frame:button:1:target"], "http://frames.test/api?__bi=1%3Ap");
    assert_eq!(json["fc:frame:button:2:action"], "post_redirect");
    assert_eq!(json["fc:frame:button:2:target"], "http://frames.test/api/go?__bi=2%3Apr");
}

// ── Actions ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn signed_click_reaches_handler_verified() {
    let body = signed_body(77, 2, "http://frames.test/api", r#"{"count":4}"#);
    let response = valid_app().handle(post("/api?__bi=2%3Ap", body)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_of(response).await;
    assert_eq!(json["fc:frame:image"], "https://img.test/77/2/true/acme.png");
    assert_eq!(json["fc:frame:state"], r#"{"count":4}"#);
    assert_eq!(json["fc:frame:post_url"], "http://frames.test/api");
}

#[tokio::test]
async fn hub_rejection_leaves_message_unverified() {
    let body = signed_body(77, 1, "http://frames.test/api", "");
    let response = app(FakeHub { valid: false, fail: false })
        .handle(post("/api?__bi=1%3Ap", body))
        .await;
    let json = json_of(response).await;
    assert_eq!(json["fc:frame:image"], "https://img.test/77/1/false/acme.png");
}

#[tokio::test]
async fn hub_failure_is_a_server_error() {
    let body = signed_body(77, 1, "http://frames.test/api", "");
    let response = app(FakeHub { valid: true, fail: true })
        .handle(post("/api?__bi=1%3Ap", body))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn unsigned_click_still_decodes_button() {
    let response = valid_app()
        .handle(post("/api?__bi=1%3Ap&__bs=%7B%7D", String::new()))
        .await;
    let json = json_of(response).await;
    assert_eq!(json["fc:frame:image"], "https://img.test/0/1/false/acme.png");
}

#[tokio::test]
async fn redirect_answers_302() {
    let response = valid_app()
        .handle(post("/api/go?__bi=2%3Apr", String::new()))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()["location"], "http://frames.test/landing");
}

#[tokio::test]
async fn route_middleware_can_halt() {
    let denied = valid_app().handle(get("/api/members", None)).await;
    assert_eq!(denied.status(), StatusCode::FOUND);
    assert_eq!(denied.headers()["location"], "https://example.test/denied");

    let body = signed_body(9, 1, "http://frames.test/api/members", "");
    let allowed = valid_app().handle(post("/api/members?__bi=1%3Ap", body)).await;
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn url_check_accepts_sibling_pages_behind_tls_proxy() {
    let app = app_with(strict_config(), FakeHub { valid: true, fail: false });
    let body = signed_body(9, 1, "https://frames.test/api/start", "");
    let response = app.handle(post("/api/members?__bi=1%3Ap", body)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn url_check_rejects_foreign_frames() {
    let app = app_with(strict_config(), FakeHub { valid: true, fail: false });
    let body = signed_body(9, 1, "https://elsewhere.test/api", "");
    let response = app.handle(post("/api/members?__bi=1%3Ap", body)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()["location"], "https://example.test/denied");
}

#[tokio::test]
async fn unsupported_forwarded_proto_is_a_bad_request() {
    let request = http::Request::get("/api")
        .header("host", "frames.test")
        .header("x-forwarded-proto", "javascript")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = valid_app().handle(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ── Limits ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn five_buttons_fail() {
    let response = valid_app().handle(get("/api/crowded", None)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn oversized_post_url_fails() {
    let response = valid_app().handle(get("/api/long", None)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn malformed_envelope_fails() {
    let body = json!({
        "untrustedData": {},
        "trustedData": { "messageBytes": "not hex" },
    })
    .to_string();
    let response = valid_app().handle(post("/api?__bi=1%3Ap", body)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// ── Image route ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn image_tree_points_at_image_route() {
    let app = valid_app();
    let json = json_of(app.handle(get("/api/tree", Some("application/frame+json"))).await).await;
    let image_url = url::Url::parse(json["fc:frame:image"].as_str().unwrap()).unwrap();
    assert_eq!(image_url.path(), "/api/tree/image");

    let path_and_query = format!("{}?{}", image_url.path(), image_url.query().unwrap());
    let image = app.handle(get(&path_and_query, None)).await;
    assert_eq!(image.status(), StatusCode::OK);
    assert_eq!(image.headers()["content-type"], "image/svg+xml");
    assert_eq!(image.headers()["cache-control"], "max-age=0");
    assert_eq!(body_of(image).await, Bytes::from(r#"1200x630 ["div",{},["hello"]]"#));
}

#[tokio::test]
async fn image_route_rejects_bad_requests() {
    let app = valid_app();

    let malformed = app.handle(get("/api/tree/image?image=%5B1%5D", None)).await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    let missing = app.handle(get("/api/tree/image", None)).await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let posted = app.handle(post("/api/tree/image", String::new())).await;
    assert_eq!(posted.status(), StatusCode::METHOD_NOT_ALLOWED);
}
