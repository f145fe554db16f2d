use thiserror::Error;

/// Errors raised while talking to the record platform or its local cache.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Http(String),

    #[error("platform returned {status}: {body}")]
    Status { status: u16, body: String },

    /// A report or record did not have the expected shape.
    #[error("unexpected platform data: {0}")]
    Shape(String),

    #[error("citation cache error: {0}")]
    Cache(String),

    #[error("no record fetched after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("platform configuration invalid: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlatformError {
    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape(message.into())
    }

    /// Worth another draw when fetching a random record: any unsuccessful
    /// response except a rejected api key.
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::Http(_) => true,
            PlatformError::Status { status, .. } => *status != 401,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        PlatformError::Http(err.to_string())
    }
}
