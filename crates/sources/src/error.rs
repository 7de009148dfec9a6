use skillet_common::FromMessage;

/// Resolution failures, tagged by the resolver that produced them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid source '{input}': {message}")]
    InvalidSource { input: String, message: String },
    #[error("git: {message}")]
    Git { message: String },
    #[error("git command `{command}` failed: {stderr}")]
    GitCommand { command: String, stderr: String },
    #[error("archive: {message}")]
    Archive { message: String },
    #[error("oci: {message}")]
    Oci { message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Command(#[from] skillet_common::Error),
    #[error("{message}")]
    Message { message: String },
}

impl Error {
    pub fn invalid_source(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSource {
            input: input.into(),
            message: message.into(),
        }
    }

    pub fn git(message: impl Into<String>) -> Self {
        Self::Git {
            message: message.into(),
        }
    }

    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }

    pub fn oci(message: impl Into<String>) -> Self {
        Self::Oci {
            message: message.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

skillet_common::impl_context!();
