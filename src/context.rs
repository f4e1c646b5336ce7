//! The request context frame middleware and handlers see.

use std::sync::Arc;

use http::Extensions;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::button::{ButtonIndex, ButtonInformation};
use crate::message::FrameMessage;
use crate::middleware::{Context, Merge};
use crate::request::Request;

/// Everything known about the request being answered.
///
/// Built by the dispatcher, then extended by middleware through
/// [`ContextPatch`]es. A handler receives the fully patched value.
#[derive(Clone)]
pub struct FrameContext {
    request: Arc<Request>,
    url: Url,
    state: Value,
    initial_state: Value,
    clicked_button: Option<ButtonInformation>,
    message: Option<FrameMessage>,
    vars: Extensions,
}

impl FrameContext {
    pub(crate) fn new(request: Arc<Request>, url: Url, initial_state: Value) -> Self {
        Self {
            request,
            url,
            state: initial_state.clone(),
            initial_state,
            clicked_button: None,
            message: None,
            vars: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Absolute URL of the request, including the reserved button params.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Every query parameter, in order.
    pub fn search_params(&self) -> url::form_urlencoded::Parse<'_> {
        self.url.query_pairs()
    }

    /// First value of query parameter `name`.
    pub fn query(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Current frame state: the state echoed back by the client, or the
    /// initial state.
    pub fn state(&self) -> &Value {
        &self.state
    }

    /// [`state`](Self::state) deserialized into `T`; `None` if it does not fit.
    pub fn state_as<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.state.clone()).ok()
    }

    pub fn initial_state(&self) -> &Value {
        &self.initial_state
    }

    pub fn clicked_button(&self) -> Option<&ButtonInformation> {
        self.clicked_button.as_ref()
    }

    pub fn button_index(&self) -> Option<ButtonIndex> {
        self.clicked_button.as_ref().map(|button| button.index)
    }

    /// State attached to the clicked button.
    pub fn button_state(&self) -> Option<&Value> {
        self.clicked_button.as_ref().and_then(|button| button.state.as_ref())
    }

    pub fn message(&self) -> Option<&FrameMessage> {
        self.message.as_ref()
    }

    pub fn input_text(&self) -> Option<&str> {
        self.message.as_ref().and_then(|message| message.input_text.as_deref())
    }

    /// `true` when a hub confirmed the signed action.
    pub fn verified(&self) -> bool {
        self.message.as_ref().is_some_and(|message| message.is_valid)
    }

    /// A typed value set by middleware with [`ContextPatch::var`].
    pub fn var<T: Clone + Send + Sync + 'static>(&self) -> Option<&T> {
        self.vars.get::<T>()
    }
}

impl std::fmt::Debug for FrameContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameContext")
            .field("url", &self.url.as_str())
            .field("state", &self.state)
            .field("clicked_button", &self.clicked_button)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Additions a middleware hands to `next`.
#[derive(Default)]
pub struct ContextPatch {
    state: Option<Value>,
    clicked_button: Option<ButtonInformation>,
    message: Option<FrameMessage>,
    vars: Extensions,
}

impl ContextPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Adds a typed value, readable downstream with [`FrameContext::var`].
    pub fn var<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.vars.insert(value);
        self
    }

    pub(crate) fn clicked_button(mut self, button: ButtonInformation) -> Self {
        self.clicked_button = Some(button);
        self
    }

    pub(crate) fn message(mut self, message: FrameMessage) -> Self {
        self.message = Some(message);
        self
    }
}

impl Merge for ContextPatch {
    fn merge(&mut self, later: Self) {
        if later.state.is_some() {
            self.state = later.state;
        }
        if later.clicked_button.is_some() {
            self.clicked_button = later.clicked_button;
        }
        if later.message.is_some() {
            self.message = later.message;
        }
        self.vars.extend(later.vars);
    }
}

impl Context for FrameContext {
    type Patch = ContextPatch;

    fn apply(mut self, patch: ContextPatch) -> Self {
        if let Some(state) = patch.state {
            self.state = state;
        }
        if patch.clicked_button.is_some() {
            self.clicked_button = patch.clicked_button;
        }
        if patch.message.is_some() {
            self.message = patch.message;
        }
        self.vars.extend(patch.vars);
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::button::ButtonAction;

    #[derive(Clone, Debug, PartialEq)]
    struct User(&'static str);

    fn context() -> FrameContext {
        let (parts, ()) = http::Request::get("/api?page=2").body(()).unwrap().into_parts();
        let request = Request::new(parts, Bytes::new(), HashMap::new());
        FrameContext::new(
            Arc::new(request),
            Url::parse("https://frames.test/api?page=2").unwrap(),
            json!({ "count": 0 }),
        )
    }

    #[test]
    fn starts_from_initial_state() {
        let ctx = context();
        assert_eq!(ctx.state(), &json!({ "count": 0 }));
        assert_eq!(ctx.query("page").as_deref(), Some("2"));
        assert!(!ctx.verified());
        assert!(ctx.button_index().is_none());
    }

    #[test]
    fn apply_overrides_and_extends() {
        let button = ButtonInformation {
            index: ButtonIndex::new(3).unwrap(),
            action: ButtonAction::Post,
            state: Some(json!("b")),
        };
        let ctx = context().apply(
            ContextPatch::new()
                .state(json!({ "count": 4 }))
                .clicked_button(button)
                .var(User("alice")),
        );

        assert_eq!(ctx.state(), &json!({ "count": 4 }));
        assert_eq!(ctx.initial_state(), &json!({ "count": 0 }));
        assert_eq!(ctx.button_index().map(ButtonIndex::get), Some(3));
        assert_eq!(ctx.button_state(), Some(&json!("b")));
        assert_eq!(ctx.var::<User>(), Some(&User("alice")));
    }

    #[test]
    fn later_patch_wins_and_vars_accumulate() {
        let mut first = ContextPatch::new().state(json!(1)).var(User("alice")).var(7u32);
        first.merge(ContextPatch::new().state(json!(2)).var(User("bob")));

        let ctx = context().apply(first);
        assert_eq!(ctx.state(), &json!(2));
        assert_eq!(ctx.var::<User>(), Some(&User("bob")));
        assert_eq!(ctx.var::<u32>(), Some(&7));
    }

    #[test]
    fn state_as_deserializes() {
        #[derive(Deserialize)]
        struct Counter {
            count: u32,
        }
        let ctx = context();
        assert_eq!(ctx.state_as::<Counter>().map(|c| c.count), Some(0));
        assert!(ctx.state_as::<Vec<u8>>().is_none());
    }
}
