//! Hub capability: the external service that checks envelope signatures.
//!
//! framekit never verifies signatures itself. It forwards the envelope to a
//! [`Hub`] and maps the answer. [`HttpHub`] talks to a hub's HTTP API; tests
//! and alternative backends implement the trait directly.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::HubConfig;
use crate::error::Error;
use crate::message::envelope::SignedEnvelope;
use crate::middleware::BoxFuture;

/// The hub's verdict on one envelope.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct HubValidation {
    #[serde(default)]
    pub valid: bool,
    /// The hub's JSON rendering of the validated message, when it returns one.
    #[serde(default)]
    pub message: Option<Value>,
}

/// Validates signed envelopes.
pub trait Hub: Send + Sync + 'static {
    fn validate_message<'a>(
        &'a self,
        envelope: &'a SignedEnvelope,
    ) -> BoxFuture<'a, Result<HubValidation, Error>>;
}

const HUB_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A hub reached over its HTTP API (`POST /v1/validateMessage`).
pub struct HttpHub {
    client: Client,
    endpoint: String,
    headers: BTreeMap<String, String>,
}

impl HttpHub {
    pub fn new(config: &HubConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(HUB_CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: validate_endpoint(&config.api_url),
            headers: config.headers.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Hub for HttpHub {
    fn validate_message<'a>(
        &'a self,
        envelope: &'a SignedEnvelope,
    ) -> BoxFuture<'a, Result<HubValidation, Error>> {
        Box::pin(async move {
            let mut request = self
                .client
                .post(&self.endpoint)
                .header(http::header::CONTENT_TYPE, "application/octet-stream")
                .body(envelope.bytes.clone());
            for (name, value) in &self.headers {
                request = request.header(name, value);
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::HubStatus { status: status.as_u16(), body });
            }

            let validation: HubValidation = response.json().await?;
            debug!(valid = validation.valid, endpoint = %self.endpoint, "hub validated message");
            Ok(validation)
        })
    }
}

fn validate_endpoint(api_url: &str) -> String {
    format!("{}/v1/validateMessage", api_url.trim_end_matches('/'))
}
