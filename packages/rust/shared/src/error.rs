//! Error types for folio.
//!
//! Library crates use [`FolioError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all folio operations.
#[derive(Debug, thiserror::Error)]
pub enum FolioError {
    /// The archive, its container descriptor, or its package manifest is unusable.
    #[error("cannot extract structure: {message}")]
    Structure { message: String },

    /// Every candidate chapter was dropped.
    #[error("no content extracted: {message}")]
    NoContent { message: String },

    /// Every candidate chapter was dropped and the dropped documents carried images.
    #[error("image-only content, OCR required: {message}")]
    ImageOnly { message: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Markup-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Coarse classification of a [`FolioError`], used by callers to pick a remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The input archive is malformed.
    MalformedInput,
    /// The input parsed but nothing survived extraction.
    NoContent,
    /// Nothing survived and the input looks like scanned pages.
    OcrRequired,
    /// Configuration or filesystem problem unrelated to the input's content.
    Environment,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FolioError>;

impl FolioError {
    /// Create a structural error from any displayable message.
    pub fn structure(msg: impl Into<String>) -> Self {
        Self::Structure {
            message: msg.into(),
        }
    }

    /// Create a no-content error from any displayable message.
    pub fn no_content(msg: impl Into<String>) -> Self {
        Self::NoContent {
            message: msg.into(),
        }
    }

    /// Create an image-only (OCR required) error from any displayable message.
    pub fn image_only(msg: impl Into<String>) -> Self {
        Self::ImageOnly {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The coarse category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Structure { .. } | Self::Conversion(_) => ErrorCategory::MalformedInput,
            Self::NoContent { .. } => ErrorCategory::NoContent,
            Self::ImageOnly { .. } => ErrorCategory::OcrRequired,
            Self::Config { .. } | Self::Io { .. } => ErrorCategory::Environment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = FolioError::structure("META-INF/container.xml is missing");
        assert_eq!(
            err.to_string(),
            "cannot extract structure: META-INF/container.xml is missing"
        );

        let err = FolioError::config("max_chapter_words must be positive");
        assert!(err.to_string().contains("max_chapter_words"));
    }

    #[test]
    fn categories_separate_empty_from_image_only() {
        assert_eq!(
            FolioError::no_content("nothing left").category(),
            ErrorCategory::NoContent
        );
        assert_eq!(
            FolioError::image_only("3 documents").category(),
            ErrorCategory::OcrRequired
        );
        assert_eq!(
            FolioError::structure("bad zip").category(),
            ErrorCategory::MalformedInput
        );
        let io = FolioError::io("book.epub", std::io::Error::other("denied"));
        assert_eq!(io.category(), ErrorCategory::Environment);
    }
}
