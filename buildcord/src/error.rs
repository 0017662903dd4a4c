//! Error types for the relay.

/// Error types for gateway, REST and ingress operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Directory API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed frame: {0}")]
    Decode(String),

    #[error("Invalid handler registration: {0}")]
    Registration(String),

    #[error("Webhook key unavailable: {0}")]
    WebhookKey(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
