//! Frame definition resolution.
//!
//! Validates a handler's [`FrameDefinition`] against the protocol limits and
//! turns every relative piece (button targets, image, post URL) into the
//! absolute strings the negotiator emits. Limit violations are hard errors:
//! a frame with five buttons is a bug, and truncating it would hide that.

use url::Url;

use crate::button::{self, ButtonAction, ButtonIndex, ButtonTarget};
use crate::config::ImageConfig;
use crate::error::Error;
use crate::frame::image::IMAGE_PARAM;
use crate::frame::meta::check_post_url;
use crate::frame::{AspectRatio, Button, ButtonKind, FrameDefinition, Image, ImageOptions};

/// Everything a definition is resolved against.
pub struct ResolveEnv<'a> {
    /// URL of the request being answered.
    pub url: &'a Url,
    pub base_path: &'a str,
    /// Path of the image route for trees, when a renderer is mounted.
    pub image_route: Option<&'a str>,
    pub title: &'a str,
    pub image: &'a ImageConfig,
}

/// A validated frame, ready to serialize.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedFrame {
    pub image: String,
    pub aspect_ratio: AspectRatio,
    pub post_url: String,
    pub buttons: Vec<ResolvedButton>,
    pub text_input: Option<String>,
    /// JSON-encoded state.
    pub state: Option<String>,
    pub title: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedButton {
    pub index: u8,
    pub label: String,
    pub kind: ButtonKind,
    pub target: Option<String>,
    pub post_url: Option<String>,
}

pub fn resolve(frame: FrameDefinition, env: &ResolveEnv<'_>) -> Result<ResolvedFrame, Error> {
    if frame.buttons.len() > usize::from(ButtonIndex::MAX) {
        return Err(Error::TooManyButtons(frame.buttons.len()));
    }

    let buttons = frame
        .buttons
        .iter()
        .zip(1u8..)
        .map(|(button, index)| resolve_button(button, index, env))
        .collect::<Result<Vec<_>, _>>()?;

    let post_url = match &frame.action {
        Some(action) => button::resolve_target(env.url, env.base_path, action)?,
        None => button::strip_reserved(env.url),
    };
    let post_url = String::from(post_url);
    check_post_url(&post_url)?;

    let options = frame
        .image_options
        .unwrap_or(ImageOptions { width: env.image.width, height: env.image.height });

    Ok(ResolvedFrame {
        image: resolve_image(&frame.image, options, env)?,
        aspect_ratio: frame.aspect_ratio.unwrap_or(env.image.aspect_ratio),
        post_url,
        buttons,
        text_input: frame.text_input,
        state: frame.state.as_ref().map(serde_json::to_string).transpose()?,
        title: frame.title.unwrap_or_else(|| env.title.to_owned()),
        headers: frame.headers,
    })
}

fn resolve_button(button: &Button, index: u8, env: &ResolveEnv<'_>) -> Result<ResolvedButton, Error> {
    let invalid = |reason: String| Error::InvalidButtonTarget { index: usize::from(index), reason };

    let (target, post_url) = match button.kind {
        ButtonKind::Post | ButtonKind::PostRedirect => {
            let action = if button.kind == ButtonKind::Post {
                ButtonAction::Post
            } else {
                ButtonAction::PostRedirect
            };
            let index = ButtonIndex::new(index).ok_or_else(|| invalid("index out of range".into()))?;
            let target = button::encode(&ButtonTarget {
                index,
                action,
                current_url: env.url,
                base_path: env.base_path,
                target: button.target.as_deref(),
                state: button.state.as_ref(),
            })?;
            check_post_url(&target)?;
            (Some(target), None)
        }
        ButtonKind::Link => {
            let href = required_target(button, &invalid)?;
            let parsed = Url::parse(href).map_err(|e| invalid(format!("link {href:?}: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(invalid(format!("link {href:?} must be http(s)")));
            }
            (Some(href.to_owned()), None)
        }
        ButtonKind::Mint => {
            let token = required_target(button, &invalid)?;
            if !is_caip10_token(token) {
                return Err(invalid(format!("mint target {token:?} is not a CAIP-10 address")));
            }
            (Some(token.to_owned()), None)
        }
        ButtonKind::Tx => {
            let path = required_target(button, &invalid)?;
            let target = String::from(button::resolve_target(env.url, env.base_path, path)?);
            let post_url = button
                .post_url
                .as_deref()
                .map(|p| button::resolve_target(env.url, env.base_path, p).map(String::from))
                .transpose()?;
            if let Some(post_url) = &post_url {
                check_post_url(post_url)?;
            }
            (Some(target), post_url)
        }
    };

    Ok(ResolvedButton {
        index,
        label: button.label.clone(),
        kind: button.kind,
        target,
        post_url,
    })
}

fn required_target<'b>(
    button: &'b Button,
    invalid: &impl Fn(String) -> Error,
) -> Result<&'b str, Error> {
    button
        .target
        .as_deref()
        .ok_or_else(|| invalid(format!("{} button needs a target", button.kind.as_str())))
}

fn resolve_image(image: &Image, options: ImageOptions, env: &ResolveEnv<'_>) -> Result<String, Error> {
    match image {
        Image::Url(url) if url.starts_with('/') => Ok(env.url.join(url)?.into()),
        Image::Url(url) => {
            Url::parse(url).map_err(|e| Error::InvalidImage(format!("{url:?}: {e}")))?;
            Ok(url.clone())
        }
        Image::Tree(tree) => {
            let route = env
                .image_route
                .ok_or_else(|| Error::InvalidImage("image tree given but no renderer is mounted".into()))?;
            let mut url = env.url.join(route)?;
            let serialized = tree.serialize().to_string();
            url.query_pairs_mut()
                .clear()
                .append_pair(IMAGE_PARAM, &serialized)
                .append_pair("w", &options.width.to_string())
                .append_pair("h", &options.height.to_string());
            Ok(url.into())
        }
    }
}

/// `namespace:reference:address[:token_id]`, with CAIP-2/10 character sets.
fn is_caip10_token(token: &str) -> bool {
    let parts: Vec<&str> = token.split(':').collect();
    let (namespace, reference, address, token_id) = match parts.as_slice() {
        [n, r, a] => (*n, *r, *a, None),
        [n, r, a, t] => (*n, *r, *a, Some(*t)),
        _ => return false,
    };

    let namespace_ok = (3..=8).contains(&namespace.len())
        && namespace.chars().all(|c| c == '-' || c.is_ascii_lowercase() || c.is_ascii_digit());
    let reference_ok = (1..=32).contains(&reference.len())
        && reference.chars().all(|c| c == '-' || c == '_' || c.is_ascii_alphanumeric());
    let address_ok = (1..=128).contains(&address.len())
        && address.chars().all(|c| matches!(c, '-' | '.' | '%') || c.is_ascii_alphanumeric());
    let token_ok = token_id.is_none_or(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()));

    namespace_ok && reference_ok && address_ok && token_ok
}
