//! Button target codec.
//!
//! A frame is stateless: when a button is clicked, the client POSTs to the
//! button's target URL and nothing else. So the target URL itself carries
//! which button was clicked and any state scoped to that click, in two
//! reserved query parameters:
//!
//! | Param | Value | Example |
//! |---|---|---|
//! | `__bi` | `"{index}:{code}"`, code `p` (post) or `pr` (post_redirect) | `2:pr` |
//! | `__bs` | JSON-encoded button state, omitted when there is none | `{"n":3}` |
//!
//! Every other query parameter on the target is preserved.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::error::Error;

/// Reserved query parameter carrying `"{index}:{code}"`.
pub const BUTTON_INDEX_PARAM: &str = "__bi";

/// Reserved query parameter carrying the JSON button state.
pub const BUTTON_STATE_PARAM: &str = "__bs";

// ── ButtonIndex ───────────────────────────────────────────────────────────────

/// A button position, always within `1..=4`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ButtonIndex(u8);

impl ButtonIndex {
    pub const MAX: u8 = 4;

    /// Returns `None` unless `1 <= index <= 4`.
    pub fn new(index: u8) -> Option<Self> {
        (1..=Self::MAX).contains(&index).then_some(Self(index))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for ButtonIndex {
    type Error = String;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::new(index).ok_or_else(|| format!("button index {index} is outside 1..=4"))
    }
}

impl From<ButtonIndex> for u8 {
    fn from(index: ButtonIndex) -> u8 {
        index.0
    }
}

// ── ButtonAction ──────────────────────────────────────────────────────────────

/// The two button actions that round-trip through the server.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Post,
    PostRedirect,
}

impl ButtonAction {
    /// Short code used inside `__bi`.
    pub fn code(self) -> &'static str {
        match self {
            Self::Post         => "p",
            Self::PostRedirect => "pr",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "p"  => Some(Self::Post),
            "pr" => Some(Self::PostRedirect),
            _    => None,
        }
    }

    /// Wire name used in `fc:frame:button:N:action`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post         => "post",
            Self::PostRedirect => "post_redirect",
        }
    }
}

// ── ButtonInformation ─────────────────────────────────────────────────────────

/// Which button was clicked, decoded from the request URL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ButtonInformation {
    pub index: ButtonIndex,
    pub action: ButtonAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

/// Inputs to [`encode`].
pub struct ButtonTarget<'a> {
    pub index: ButtonIndex,
    pub action: ButtonAction,
    /// The URL of the request being answered.
    pub current_url: &'a Url,
    /// Mount point of the frame app; relative targets are joined onto it.
    pub base_path: &'a str,
    pub target: Option<&'a str>,
    pub state: Option<&'a Value>,
}

/// Builds the URL a button posts to.
pub fn encode(button: &ButtonTarget<'_>) -> Result<String, Error> {
    let mut url = match button.target {
        Some(target) => resolve_target(button.current_url, button.base_path, target)?,
        None => button.current_url.clone(),
    };

    let state = button.state.map(serde_json::to_string).transpose()?;
    let retained = retained_pairs(&url);
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        query.extend_pairs(retained);
        query.append_pair(
            BUTTON_INDEX_PARAM,
            &format!("{}:{}", button.index.get(), button.action.code()),
        );
        if let Some(state) = &state {
            query.append_pair(BUTTON_STATE_PARAM, state);
        }
    }

    Ok(url.into())
}

/// Reads the clicked button from `url`.
///
/// Returns `None` when `__bi` is missing or malformed. A `__bs` that is not
/// valid JSON is dropped with a warning; the button itself still decodes.
pub fn decode(url: &Url) -> Option<ButtonInformation> {
    let mut index_param = None;
    let mut state_param = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            BUTTON_INDEX_PARAM => index_param = Some(value.into_owned()),
            BUTTON_STATE_PARAM => state_param = Some(value.into_owned()),
            _ => {}
        }
    }

    let (index, code) = index_param?.split_once(':').map(|(i, c)| (i.to_owned(), c.to_owned()))?;
    let index = index.parse::<u8>().ok().and_then(ButtonIndex::new)?;
    let action = ButtonAction::from_code(&code)?;

    let state = state_param.and_then(|raw| match serde_json::from_str(&raw) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(error = %e, index = index.get(), "discarding unparseable button state");
            None
        }
    });

    Some(ButtonInformation { index, action, state })
}

/// Returns `url` without the reserved `__bi` / `__bs` parameters.
pub fn strip_reserved(url: &Url) -> Url {
    let mut stripped = url.clone();
    let retained = retained_pairs(url);
    if retained.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(retained);
    }
    stripped
}

/// Resolves `target` for a frame mounted at `base_path`.
///
/// Absolute URLs pass through. Anything else is joined onto `base_path`
/// segment by segment and re-rooted against `current_url`.
pub(crate) fn resolve_target(current_url: &Url, base_path: &str, target: &str) -> Result<Url, Error> {
    if let Ok(absolute) = Url::parse(target) {
        return Ok(absolute);
    }
    Ok(current_url.join(&join_path(base_path, target))?)
}

/// Joins path segments, collapsing duplicate slashes. A query on `target`
/// is kept as is.
pub(crate) fn join_path(base: &str, target: &str) -> String {
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    let mut joined = String::new();
    for segment in base.split('/').chain(path.split('/')).filter(|s| !s.is_empty()) {
        joined.push('/');
        joined.push_str(segment);
    }
    if joined.is_empty() {
        joined.push('/');
    }
    if let Some(query) = query {
        joined.push('?');
        joined.push_str(query);
    }
    joined
}

fn retained_pairs(url: &Url) -> Vec<(String, String)> {
    url.query_pairs()
        .filter(|(key, _)| key != BUTTON_INDEX_PARAM && key != BUTTON_STATE_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}
