use std::path::PathBuf;

use thiserror::Error;

/// Reply shown in place of a model answer when an exchange fails.
pub const CHAT_FALLBACK_REPLY: &str = "An error occurred. Please check the console for details.";

/// Failure of one remote request.
#[derive(Debug, Error)]
pub enum GenAiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("remote rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("remote returned no content")]
    NoContent,
    #[error("request cancelled")]
    Cancelled,
}

impl GenAiError {
    pub fn kind(&self) -> &'static str {
        match self {
            GenAiError::Network(_) => "network",
            GenAiError::Rejected { .. } => "rejected",
            GenAiError::Malformed(_) => "malformed",
            GenAiError::NoContent => "no_content",
            GenAiError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not a file", path.display())]
    NotAFile { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API_KEY environment variable not set")]
    MissingCredential,
    #[error("unknown backend '{0}' (expected 'gemini' or 'dryrun')")]
    UnknownBackend(String),
    #[error("invalid request timeout '{0}'")]
    InvalidTimeout(String),
    #[error("{0}")]
    NoModel(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session '{0}' already exists")]
    AlreadyExists(String),
}
