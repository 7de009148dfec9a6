use std::path::PathBuf;

use skillet_common::FromMessage;

pub use crate::parse::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolve(#[from] skillet_sources::Error),

    #[error("install conflict at {}: {message}", path.display())]
    InstallConflict { path: PathBuf, message: String },

    #[error("{0}")]
    AgentDetection(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid lockfile {}: {message}", path.display())]
    Lockfile { path: PathBuf, message: String },

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn conflict(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InstallConflict {
            path: path.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

skillet_common::impl_context!();
