use thiserror::Error;

use crate::schema::ExtractionResult;

/// Failure of the external model call. Messages are passed through as received.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelCallError {
    #[error("model request failed: {0}")]
    Transport(String),

    #[error("model rejected credentials: {0}")]
    Auth(String),

    #[error("model returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("model response could not be read: {0}")]
    InvalidResponse(String),
}

impl ModelCallError {
    /// Worth retrying with the same request.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelCallError::Transport(_) | ModelCallError::Timeout { .. } => true,
            ModelCallError::Status { status, .. } => *status == 429 || *status >= 500,
            ModelCallError::Auth(_) | ModelCallError::InvalidResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ModelCallError {
    fn from(e: reqwest::Error) -> Self {
        ModelCallError::from_client_failure(e.is_decode(), e.to_string())
    }
}

impl ModelCallError {
    /// The HTTP client's own timeouts carry no duration; they stay transport failures
    /// with the client's message. Deadlines are reported by the extractor's timeout.
    fn from_client_failure(decode: bool, message: String) -> Self {
        if decode {
            ModelCallError::InvalidResponse(message)
        } else {
            ModelCallError::Transport(message)
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("no structured data found in the model response")]
    NoStructuredData,

    /// The envelope was found but lacks required keys. `partial` holds whatever validated.
    #[error("model response is missing required field(s): {}", missing.join(", "))]
    SchemaMismatch {
        missing: Vec<&'static str>,
        partial: Box<ExtractionResult>,
    },
}

impl ParseError {
    /// Best-effort result, if any survived.
    pub fn into_partial(self) -> Option<ExtractionResult> {
        match self {
            ParseError::SchemaMismatch { partial, .. } => Some(*partial),
            ParseError::NoStructuredData => None,
        }
    }
}
