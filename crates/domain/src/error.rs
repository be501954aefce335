/// Shared error type used across all triage crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// A remote triage endpoint answered with a failure status.
    #[error("remote {endpoint}: {message}")]
    Remote { endpoint: String, message: String },

    /// A remote payload did not match the expected schema.
    #[error("decode {what}: {message}")]
    Decode { what: String, message: String },

    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("model is not loaded; call init_model() first")]
    ModelNotReady,

    #[error("model load cancelled")]
    Cancelled,

    #[error("store: {0}")]
    Store(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether retrying the same remote call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::Http(_) => true,
            Error::Remote { message, .. } => message.starts_with("HTTP 5"),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
