//! Response negotiation: a resolved frame becomes HTML meta tags or JSON.

use serde_json::{Map, Value};
use tracing::error;

use crate::error::Error;
use crate::frame::resolve::ResolvedFrame;
use crate::response::{ContentType, Response};

/// Media type a client sends in `Accept` to get JSON instead of HTML.
pub const FRAME_JSON_MEDIA_TYPE: &str = "application/frame+json";

/// Longest post URL clients accept, in bytes.
pub const MAX_POST_URL_BYTES: usize = 256;

/// Rejects post URLs over [`MAX_POST_URL_BYTES`].
pub fn check_post_url(url: &str) -> Result<(), Error> {
    if url.len() > MAX_POST_URL_BYTES {
        error!(len = url.len(), url = %url, "post url exceeds {MAX_POST_URL_BYTES} bytes");
        return Err(Error::PostUrlTooLong { len: url.len(), url: url.to_owned() });
    }
    Ok(())
}

/// The frame's tags, in emission order.
pub fn meta_tags(frame: &ResolvedFrame) -> Vec<(String, String)> {
    let mut tags = vec![
        tag("fc:frame", "vNext"),
        tag("fc:frame:image", &frame.image),
        tag("fc:frame:image:aspect_ratio", frame.aspect_ratio.as_str()),
        tag("og:image", &frame.image),
        tag("og:title", &frame.title),
        tag("fc:frame:post_url", &frame.post_url),
    ];

    if let Some(placeholder) = &frame.text_input {
        tags.push(tag("fc:frame:input:text", placeholder));
    }
    if let Some(state) = &frame.state {
        tags.push(tag("fc:frame:state", state));
    }

    for button in &frame.buttons {
        let prefix = format!("fc:frame:button:{}", button.index);
        tags.push((prefix.clone(), button.label.clone()));
        tags.push((format!("{prefix}:action"), button.kind.as_str().to_owned()));
        if let Some(target) = &button.target {
            tags.push((format!("{prefix}:target"), target.clone()));
        }
        if let Some(post_url) = &button.post_url {
            tags.push((format!("{prefix}:post_url"), post_url.clone()));
        }
    }

    tags
}

fn tag(property: &str, content: &str) -> (String, String) {
    (property.to_owned(), content.to_owned())
}

/// Whether `Accept` asks for the JSON form.
pub fn wants_json(accept: Option<&str>) -> bool {
    accept.is_some_and(|accept| {
        accept
            .split(',')
            .map(|range| range.split(';').next().unwrap_or_default().trim())
            .any(|media| media.eq_ignore_ascii_case(FRAME_JSON_MEDIA_TYPE))
    })
}

pub fn render_html(frame: &ResolvedFrame) -> String {
    let mut html = String::from("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str(&format!("<title>{}</title>\n", escape(&frame.title)));
    for (property, content) in meta_tags(frame) {
        html.push_str(&format!(
            "<meta property=\"{}\" content=\"{}\"/>\n",
            escape(&property),
            escape(&content)
        ));
    }
    html.push_str("</head>\n<body></body>\n</html>\n");
    html
}

/// One key per meta tag.
pub fn render_json(frame: &ResolvedFrame) -> Result<Vec<u8>, Error> {
    let object: Map<String, Value> = meta_tags(frame)
        .into_iter()
        .map(|(property, content)| (property, Value::String(content)))
        .collect();
    Ok(serde_json::to_vec(&Value::Object(object))?)
}

/// Picks the representation from `Accept` and attaches the frame's headers.
pub fn negotiate(frame: &ResolvedFrame, accept: Option<&str>) -> Result<Response, Error> {
    let builder = Response::builder().headers(&frame.headers);
    if wants_json(accept) {
        Ok(builder.bytes(ContentType::FrameJson, render_json(frame)?))
    } else {
        Ok(builder.bytes(ContentType::Html, render_html(frame)))
    }
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&'  => escaped.push_str("&amp;"),
            '<'  => escaped.push_str("&lt;"),
            '>'  => escaped.push_str("&gt;"),
            '"'  => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _    => escaped.push(c),
        }
    }
    escaped
}
