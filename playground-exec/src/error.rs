use std::fmt;
use thiserror::Error;

/// Request rejected before any sandbox work was done.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Code must not be empty")]
    EmptyCode,

    #[error("Code is {size} bytes, limit is {limit}")]
    CodeTooLarge { size: usize, limit: usize },

    #[error("Input is {size} bytes, limit is {limit}")]
    InputTooLarge { size: usize, limit: usize },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Image {image} unavailable: {reason}")]
    ImageUnavailable { image: String, reason: String },

    #[error("Sandbox launch failed: {0}")]
    LaunchFailed(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(ValidationError::UnsupportedLanguage(_)) => {
                ErrorKind::UnsupportedLanguage
            }
            Error::Validation(ValidationError::EmptyCode) => ErrorKind::EmptyCode,
            Error::Validation(ValidationError::CodeTooLarge { .. }) => ErrorKind::CodeTooLarge,
            Error::Validation(ValidationError::InputTooLarge { .. }) => ErrorKind::InputTooLarge,
            Error::ImageUnavailable { .. } => ErrorKind::ImageUnavailable,
            Error::LaunchFailed(_) => ErrorKind::LaunchFailed,
        }
    }

    /// True when the service, not the caller's request, is at fault.
    pub fn is_service_fault(&self) -> bool {
        matches!(self, Error::ImageUnavailable { .. } | Error::LaunchFailed(_))
    }
}

/// Machine-distinguishable error kind, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedLanguage,
    EmptyCode,
    CodeTooLarge,
    InputTooLarge,
    ImageUnavailable,
    LaunchFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedLanguage => "unsupported_language",
            ErrorKind::EmptyCode => "empty_code",
            ErrorKind::CodeTooLarge => "code_too_large",
            ErrorKind::InputTooLarge => "input_too_large",
            ErrorKind::ImageUnavailable => "image_unavailable",
            ErrorKind::LaunchFailed => "launch_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures reported by a [`ContainerEngine`](crate::engine::ContainerEngine) pull.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PullError {
    /// The reference can never be pulled (unknown image, access denied).
    #[error("image not found: {0}")]
    NotFound(String),

    /// Network or registry hiccup; worth another attempt.
    #[error("transient pull failure: {0}")]
    Transient(String),
}

/// Failures reported by a [`ContainerEngine`](crate::engine::ContainerEngine) run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Launch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Error::LaunchFailed(e.to_string())
    }
}
