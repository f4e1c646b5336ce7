//! Frame action messages.
//!
//! A click arrives as a POST whose JSON body mirrors the action twice:
//!
//! ```text
//! {
//!   "untrustedData": { "fid": 2, "buttonIndex": 1, … },   ← convenience copy
//!   "trustedData":   { "messageBytes": "0a49…" }          ← signed envelope
//! }
//! ```
//!
//! [`parse_frame_message`] decodes the trusted half, asks the configured
//! [`Hub`] whether the signature holds, and returns a [`FrameMessage`].
//! The untrusted half is only used to flag divergence.

pub mod envelope;
pub mod hub;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::request::Request;

use envelope::{MessageType, SignedEnvelope};
use hub::{Hub, HubValidation};

/// A normalized, immutable view of a signed frame action.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameMessage {
    /// FID of the account that clicked.
    pub requester_fid: u64,
    pub button_index: u32,
    pub input_text: Option<String>,
    /// JSON state echoed back by the client, if any.
    pub state: Option<Value>,
    /// The frame URL the client says it posted from.
    pub url: String,
    pub cast_id: Option<CastId>,
    pub timestamp: u32,
    pub network: i32,
    pub transaction_id: Option<String>,
    pub address: Option<String>,
    /// `true` only when a hub confirmed the envelope.
    pub is_valid: bool,
}

/// The cast a frame was embedded in.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CastId {
    pub fid: u64,
    /// `0x`-prefixed hex.
    pub hash: String,
}

/// Knobs for [`parse_frame_message`].
#[derive(Clone, Debug)]
pub struct VerifyOptions {
    /// Also require the signed frame URL to live on the request's host and
    /// port, under `base_path`. The scheme is not compared. Off by default.
    pub verify_frame_url: bool,
    /// Mount point the signed URL must sit under when verifying.
    pub base_path: String,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self { verify_frame_url: false, base_path: "/".to_owned() }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionPayload {
    trusted_data: TrustedData,
    untrusted_data: UntrustedData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrustedData {
    message_bytes: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UntrustedData {
    #[serde(default)]
    button_index: Option<u32>,
    #[serde(default)]
    fid: Option<u64>,
}

/// Extracts and validates the frame action carried by `request`.
///
/// - not a POST, body not JSON, or either top-level key missing: `Ok(None)`;
/// - envelope not hex, not protobuf, or without message data: `Err`;
/// - hub says invalid, or returns no / the wrong kind of message:
///   `Ok(Some(message))` with `is_valid == false`;
/// - no hub given: decoded locally, `is_valid == false`.
pub async fn parse_frame_message(
    request: &Request,
    url: &Url,
    hub: Option<&dyn Hub>,
    options: &VerifyOptions,
) -> Result<Option<FrameMessage>, Error> {
    if request.method() != http::Method::POST {
        return Ok(None);
    }

    let payload: ActionPayload = match serde_json::from_slice(request.body()) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, "POST body carries no frame action");
            return Ok(None);
        }
    };

    let envelope = SignedEnvelope::from_hex(&payload.trusted_data.message_bytes)?;
    let mut message = normalize(&envelope)?;
    check_untrusted(&payload.untrusted_data, &message);

    message.is_valid = match hub {
        Some(hub) => {
            let validation = hub.validate_message(&envelope).await?;
            verdict(&validation, &envelope) && url_matches(&message, url, options)
        }
        None => {
            debug!(fid = message.requester_fid, "no hub configured, message left unverified");
            false
        }
    };

    Ok(Some(message))
}

fn normalize(envelope: &SignedEnvelope) -> Result<FrameMessage, Error> {
    let data = envelope.message.data.as_ref().ok_or(Error::MissingMessageData)?;
    let body = data.frame_action_body.clone().unwrap_or_default();

    Ok(FrameMessage {
        requester_fid: data.fid,
        button_index: body.button_index,
        input_text: non_empty_utf8(body.input_text, "inputText"),
        state: parse_state(&body.state),
        url: String::from_utf8_lossy(&body.url).into_owned(),
        cast_id: body.cast_id.map(|cast| CastId {
            fid: cast.fid,
            hash: format!("0x{}", hex::encode(cast.hash)),
        }),
        timestamp: data.timestamp,
        network: data.network,
        transaction_id: non_empty_hex(&body.transaction_id),
        address: non_empty_hex(&body.address),
        is_valid: false,
    })
}

/// Maps a hub answer onto a validity flag.
fn verdict(validation: &HubValidation, envelope: &SignedEnvelope) -> bool {
    if !validation.valid {
        warn!("hub rejected frame message");
        return false;
    }
    let Some(validated) = &validation.message else {
        warn!("hub accepted the envelope but returned no message");
        return false;
    };

    let hub_type = validated
        .pointer("/data/type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let expected = MessageType::FrameAction.hub_name();
    if hub_type != expected || envelope.message_type() != Some(MessageType::FrameAction) {
        warn!(hub_type, "validated message is not a frame action");
        return false;
    }
    true
}

fn url_matches(message: &FrameMessage, url: &Url, options: &VerifyOptions) -> bool {
    if !options.verify_frame_url {
        return true;
    }
    let matches = Url::parse(&message.url).is_ok_and(|signed| {
        signed.host_str() == url.host_str()
            && signed.port() == url.port()
            && within_base(signed.path(), &options.base_path)
    });
    if !matches {
        warn!(signed = %message.url, request = %url, "signed frame url is outside this frame app");
    }
    matches
}

fn within_base(path: &str, base_path: &str) -> bool {
    let base = base_path.trim_end_matches('/');
    base.is_empty()
        || path == base
        || path.strip_prefix(base).is_some_and(|rest| rest.starts_with('/'))
}

fn check_untrusted(untrusted: &UntrustedData, message: &FrameMessage) {
    if untrusted.button_index.is_some_and(|index| index != message.button_index) {
        warn!(
            untrusted = ?untrusted.button_index,
            signed = message.button_index,
            "untrustedData.buttonIndex diverges from signed message"
        );
    }
    if untrusted.fid.is_some_and(|fid| fid != message.requester_fid) {
        warn!(untrusted = ?untrusted.fid, signed = message.requester_fid, "untrustedData.fid diverges from signed message");
    }
}

fn parse_state(raw: &[u8]) -> Option<Value> {
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_slice(raw) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(error = %e, "discarding unparseable frame state");
            None
        }
    }
}

fn non_empty_utf8(raw: Vec<u8>, field: &'static str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    match String::from_utf8(raw) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, field, "discarding non-utf8 field");
            None
        }
    }
}

fn non_empty_hex(raw: &[u8]) -> Option<String> {
    (!raw.is_empty()).then(|| format!("0x{}", hex::encode(raw)))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;
    use prost::Message as _;
    use serde_json::json;

    use super::envelope::{CastIdBody, FrameActionBody, Message, MessageData};
    use super::*;
    use crate::middleware::BoxFuture;

    pub(crate) struct FakeHub {
        pub valid: bool,
        pub message_type: &'static str,
    }

    impl Hub for FakeHub {
        fn validate_message<'a>(
            &'a self,
            _envelope: &'a SignedEnvelope,
        ) -> BoxFuture<'a, Result<HubValidation, Error>> {
            let validation = HubValidation {
                valid: self.valid,
                message: Some(json!({ "data": { "type": self.message_type } })),
            };
            Box::pin(async move { Ok(validation) })
        }
    }

    pub(crate) fn signed_hex(fid: u64, button_index: u32, url: &str, state: &[u8]) -> String {
        let message = Message {
            data: Some(MessageData {
                r#type: MessageType::FrameAction as i32,
                fid,
                timestamp: 100,
                network: 1,
                frame_action_body: Some(FrameActionBody {
                    url: url.as_bytes().to_vec(),
                    button_index,
                    cast_id: Some(CastIdBody { fid: 3, hash: vec![0xab, 0xcd] }),
                    input_text: b"hello".to_vec(),
                    state: state.to_vec(),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        };
        hex::encode(message.encode_to_vec())
    }

    fn post(body: impl Into<Bytes>) -> Request {
        let (parts, ()) = http::Request::post("/").body(()).unwrap().into_parts();
        Request::new(parts, body.into(), HashMap::new())
    }

    fn url() -> Url {
        Url::parse("https://frames.test/").unwrap()
    }

    fn action_body(hex_str: &str) -> String {
        json!({
            "untrustedData": { "fid": 77, "buttonIndex": 2 },
            "trustedData": { "messageBytes": hex_str },
        })
        .to_string()
    }

    const VALID: FakeHub = FakeHub { valid: true, message_type: "MESSAGE_TYPE_FRAME_ACTION" };

    #[tokio::test]
    async fn valid_envelope_yields_verified_message() {
        let body = action_body(&signed_hex(77, 2, "https://frames.test/", br#"{"count":4}"#));
        let message = parse_frame_message(&post(body), &url(), Some(&VALID), &VerifyOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert!(message.is_valid);
        assert_eq!(message.button_index, 2);
        assert_eq!(message.requester_fid, 77);
        assert_eq!(message.input_text.as_deref(), Some("hello"));
        assert_eq!(message.state, Some(json!({ "count": 4 })));
        assert_eq!(message.cast_id, Some(CastId { fid: 3, hash: "0xabcd".into() }));
    }

    #[tokio::test]
    async fn get_requests_are_not_inspected() {
        let (parts, ()) = http::Request::get("/").body(()).unwrap().into_parts();
        let request = Request::new(parts, Bytes::from_static(b"not json"), HashMap::new());
        let parsed = parse_frame_message(&request, &url(), Some(&VALID), &VerifyOptions::default())
            .await
            .unwrap();
        assert_eq!(parsed, None);
    }

    #[tokio::test]
    async fn missing_keys_or_bad_json_mean_no_action() {
        for body in ["not json", r#"{"trustedData":{"messageBytes":"00"}}"#, r#"{"untrustedData":{}}"#] {
            let parsed = parse_frame_message(&post(body), &url(), Some(&VALID), &VerifyOptions::default())
                .await
                .unwrap();
            assert_eq!(parsed, None, "{body}");
        }
    }

    #[tokio::test]
    async fn undecodable_envelope_is_a_hard_error() {
        let result = parse_frame_message(
            &post(action_body("not-hex")),
            &url(),
            Some(&VALID),
            &VerifyOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(Error::EnvelopeHex(_))));
    }

    #[tokio::test]
    async fn hub_rejection_marks_message_invalid() {
        let hub = FakeHub { valid: false, message_type: "MESSAGE_TYPE_FRAME_ACTION" };
        let body = action_body(&signed_hex(77, 2, "https://frames.test/", b""));
        let message = parse_frame_message(&post(body), &url(), Some(&hub), &VerifyOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert!(!message.is_valid);
    }

    #[tokio::test]
    async fn wrong_message_type_marks_message_invalid() {
        let hub = FakeHub { valid: true, message_type: "MESSAGE_TYPE_CAST_ADD" };
        let body = action_body(&signed_hex(77, 2, "https://frames.test/", b""));
        let message = parse_frame_message(&post(body), &url(), Some(&hub), &VerifyOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert!(!message.is_valid);
    }

    struct SilentHub;

    impl Hub for SilentHub {
        fn validate_message<'a>(
            &'a self,
            _envelope: &'a SignedEnvelope,
        ) -> BoxFuture<'a, Result<HubValidation, Error>> {
            Box::pin(async { Ok(HubValidation { valid: true, message: None }) })
        }
    }

    #[tokio::test]
    async fn valid_verdict_without_message_marks_message_invalid() {
        let body = action_body(&signed_hex(77, 2, "https://frames.test/", b""));
        let message = parse_frame_message(&post(body), &url(), Some(&SilentHub), &VerifyOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert!(!message.is_valid);
    }

    #[tokio::test]
    async fn envelope_that_is_not_a_frame_action_is_invalid() {
        let envelope = Message {
            data: Some(MessageData {
                r#type: MessageType::CastAdd as i32,
                fid: 77,
                timestamp: 100,
                network: 1,
                frame_action_body: Some(FrameActionBody {
                    url: b"https://frames.test/".to_vec(),
                    button_index: 2,
                    ..Default::default()
                }),
            }),
            ..Default::default()
        };
        let body = action_body(&hex::encode(envelope.encode_to_vec()));
        let message = parse_frame_message(&post(body), &url(), Some(&VALID), &VerifyOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert!(!message.is_valid);
        assert_eq!(message.button_index, 2);
    }

    #[tokio::test]
    async fn bad_state_degrades_to_none() {
        let body = action_body(&signed_hex(77, 1, "https://frames.test/", b"{oops"));
        let message = parse_frame_message(&post(body), &url(), Some(&VALID), &VerifyOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert!(message.is_valid);
        assert_eq!(message.state, None);
    }

    fn strict(base_path: &str) -> VerifyOptions {
        VerifyOptions { verify_frame_url: true, base_path: base_path.to_owned() }
    }

    async fn validity(signed: &str, request_url: &str, options: &VerifyOptions) -> bool {
        let body = action_body(&signed_hex(77, 1, signed, b""));
        let url = Url::parse(request_url).unwrap();
        parse_frame_message(&post(body), &url, Some(&VALID), options)
            .await
            .unwrap()
            .unwrap()
            .is_valid
    }

    #[tokio::test]
    async fn frame_url_is_not_checked_by_default() {
        assert!(validity("https://elsewhere.test/", "https://frames.test/", &VerifyOptions::default()).await);
        assert!(
            validity(
                "https://frames.test/api/start",
                "https://frames.test/api/next?__bi=1%3Ap",
                &VerifyOptions::default(),
            )
            .await
        );
    }

    #[tokio::test]
    async fn foreign_frame_url_is_rejected_when_verifying() {
        assert!(!validity("https://elsewhere.test/", "https://frames.test/", &strict("/")).await);
        assert!(!validity("https://frames.test:8443/api", "https://frames.test/api", &strict("/api")).await);
        assert!(!validity("https://frames.test/other", "https://frames.test/api", &strict("/api")).await);
        assert!(!validity("https://frames.test/apiary", "https://frames.test/api", &strict("/api")).await);
    }

    #[tokio::test]
    async fn sibling_page_under_base_path_is_accepted() {
        assert!(
            validity(
                "https://frames.test/api/start",
                "https://frames.test/api/next?__bi=1%3Ap",
                &strict("/api"),
            )
            .await
        );
    }

    #[tokio::test]
    async fn tls_terminating_proxy_scheme_is_accepted() {
        assert!(
            validity(
                "https://frames.test/api",
                "http://frames.test/api?__bi=1%3Ap",
                &strict("/api/"),
            )
            .await
        );
    }

    #[tokio::test]
    async fn without_hub_message_is_unverified() {
        let body = action_body(&signed_hex(77, 3, "https://frames.test/", b""));
        let message = parse_frame_message(&post(body), &url(), None, &VerifyOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert!(!message.is_valid);
        assert_eq!(message.button_index, 3);
    }
}
