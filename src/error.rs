//! Unified error type.

use thiserror::Error;

/// The error type returned by framekit's fallible operations.
///
/// Expected absences (a GET with no action, a malformed `__bi`, unparseable
/// state) are never errors: they surface as `None`. An `Error` means an
/// integration bug or an infrastructure failure, and the dispatcher answers
/// it with `500 Internal Server Error`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("invalid route `{path}`: {reason}")]
    Route { path: String, reason: String },

    #[error("cannot compose an empty middleware pipeline")]
    EmptyPipeline,

    #[error("cannot run an empty concurrent middleware group")]
    EmptyGroup,

    #[error("trustedData.messageBytes is not valid hex: {0}")]
    EnvelopeHex(#[from] hex::FromHexError),

    #[error("signed envelope failed to decode: {0}")]
    EnvelopeDecode(#[from] prost::DecodeError),

    #[error("signed envelope carries no message data")]
    MissingMessageData,

    #[error("hub request failed: {0}")]
    Hub(#[from] reqwest::Error),

    #[error("hub answered {status}: {body}")]
    HubStatus { status: u16, body: String },

    #[error("a frame can have at most 4 buttons, got {0}")]
    TooManyButtons(usize),

    #[error("button {index}: {reason}")]
    InvalidButtonTarget { index: usize, reason: String },

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("post_url is {len} bytes, the limit is 256: {url}")]
    PostUrlTooLong { len: usize, url: String },

    #[error("unsupported request scheme `{0}`")]
    UnsupportedScheme(String),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration: {0}")]
    Config(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
