//! Frame app configuration.
//!
//! Everything that used to live in environment variables (hub URL, hub
//! credentials, public origin) is an explicit [`FrameConfig`] handed to
//! [`Router::new`](crate::Router::new). It deserializes from TOML:
//!
//! ```toml
//! base_path = "/api"
//! origin = "https://frames.example.com"
//! title = "Counter"
//! initial_state = { count = 0 }
//!
//! [hub]
//! api_url = "https://hub.example.com"
//! headers = { api_key = "…" }
//! timeout_secs = 10
//!
//! [image]
//! aspect_ratio = "1:1"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::Error;
use crate::frame::AspectRatio;

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameConfig {
    /// Mount point of every frame route; relative button targets join onto it.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Public origin (`scheme://host[:port]`) used to build absolute URLs.
    /// When unset the `Host` and `X-Forwarded-Proto` headers are used, which
    /// any client can forge. Set it in production.
    #[serde(default)]
    pub origin: Option<String>,

    /// `og:title` and `<title>` of every frame.
    #[serde(default = "default_title")]
    pub title: String,

    /// State a frame starts with before any click carries one.
    #[serde(default)]
    pub initial_state: Value,

    /// Require the signed frame URL to share the request's host and port and
    /// to sit under `base_path`. The scheme is not compared.
    #[serde(default)]
    pub verify_frame_url: bool,

    /// Hub used to validate signed actions. Without one, actions are decoded
    /// but never marked valid.
    #[serde(default)]
    pub hub: Option<HubConfig>,

    #[serde(default)]
    pub image: ImageConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubConfig {
    pub api_url: String,

    /// Extra request headers, e.g. an API key.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default = "default_hub_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default = "default_image_width")]
    pub width: u32,
    #[serde(default = "default_image_height")]
    pub height: u32,
    /// `Cache-Control` sent with rendered images.
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
}

fn default_base_path() -> String {
    "/".to_string()
}

fn default_title() -> String {
    "Frame".to_string()
}

fn default_hub_timeout_secs() -> u64 {
    10
}

fn default_image_width() -> u32 {
    1200
}

fn default_image_height() -> u32 {
    630
}

fn default_cache_control() -> String {
    "max-age=0".to_string()
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            origin: None,
            title: default_title(),
            initial_state: Value::Null,
            verify_frame_url: false,
            hub: None,
            image: ImageConfig::default(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::default(),
            width: default_image_width(),
            height: default_image_height(),
            cache_control: default_cache_control(),
        }
    }
}

impl FrameConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks the fields serde cannot.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.base_path.starts_with('/') {
            return Err(Error::Config(format!(
                "base_path must start with '/', got {:?}",
                self.base_path
            )));
        }
        self.origin_url()?;
        if let Some(hub) = &self.hub {
            Url::parse(&hub.api_url)
                .map_err(|e| Error::Config(format!("hub.api_url {:?}: {e}", hub.api_url)))?;
        }
        Ok(())
    }

    /// The configured public origin, parsed.
    pub(crate) fn origin_url(&self) -> Result<Option<Url>, Error> {
        self.origin
            .as_deref()
            .map(|origin| {
                Url::parse(origin).map_err(|e| Error::Config(format!("origin {origin:?}: {e}")))
            })
            .transpose()
    }
}
