//! Error types shared by the crawler and the e-book assembler.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification used by callers to decide whether a retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Parse,
    Render,
    Io,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("parse error during `{stage}`: {message}")]
    Parse {
        stage: &'static str,
        message: String,
    },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL `{0}`")]
    InvalidUrl(String),

    #[error("image `{0}` is referenced but not present in any chapter")]
    MissingImage(String),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("render error: {0}")]
    Render(String),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("an assembly into `{}` is already running", .0.display())]
    AssemblyInProgress(PathBuf),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn parse(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            stage,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) => ErrorKind::Network,
            Error::Parse { .. }
            | Error::Script(_)
            | Error::Json(_)
            | Error::InvalidUrl(_)
            | Error::Config(_) => ErrorKind::Parse,
            Error::MissingImage(_)
            | Error::Image(_)
            | Error::Render(_)
            | Error::Zip(_)
            | Error::AssemblyInProgress(_) => ErrorKind::Render,
            Error::Io(_) => ErrorKind::Io,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Network and filesystem hiccups may succeed on a second attempt;
    /// malformed data will not until the source changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Io)
            || matches!(self, Error::AssemblyInProgress(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_data_is_not_retryable() {
        let err = Error::parse("chapter_number", "`abc` is not a number");
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(!err.is_retryable());
    }

    #[test]
    fn render_failures_are_classified() {
        let err = Error::MissingImage("a.png".into());
        assert_eq!(err.kind(), ErrorKind::Render);
        assert!(!err.is_retryable());
        assert!(Error::AssemblyInProgress(PathBuf::from("book.epub")).is_retryable());
    }

    #[test]
    fn io_errors_are_retryable() {
        let err: Error = std::io::Error::other("disk busy").into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.is_retryable());
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
    }
}
