//! Error handling for the pbc library
//!
//! This module provides the crate-wide error type covering pattern parsing,
//! record compression/decompression, secondary-encoder failures and
//! configuration problems.

use thiserror::Error;

/// Main error type for the pbc library
#[derive(Error, Debug)]
pub enum PbcError {
    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed escape sequence or split structure in a pattern skeleton
    #[error("Invalid pattern: {message}")]
    InvalidPattern {
        /// Error message describing the issue
        message: String,
    },

    /// Compression failed: the matcher reported a pattern whose literal
    /// runs do not appear in order in the record
    #[error("Compression failed: {message}")]
    CompressFailed {
        /// Error message describing the issue
        message: String,
    },

    /// Decompression failed: bad mode tag, unknown pattern id, malformed
    /// varint, truncated stream or output cap exceeded
    #[error("Decompression failed: {message}")]
    DecompressFailed {
        /// Error message describing the issue
        message: String,
    },

    /// A secondary encoder returned an error; the codec degrades to the
    /// non-secondary framing instead of surfacing this to callers
    #[error("Secondary encoder failed: {message}")]
    SecondaryFailed {
        /// Error message from the secondary encoder
        message: String,
    },

    /// Configuration or parameter errors
    #[error("Invalid configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },
}

impl PbcError {
    /// Create an invalid pattern error
    pub fn invalid_pattern<S: Into<String>>(message: S) -> Self {
        Self::InvalidPattern {
            message: message.into(),
        }
    }

    /// Create a compression error
    pub fn compress_failed<S: Into<String>>(message: S) -> Self {
        Self::CompressFailed {
            message: message.into(),
        }
    }

    /// Create a decompression error
    pub fn decompress_failed<S: Into<String>>(message: S) -> Self {
        Self::DecompressFailed {
            message: message.into(),
        }
    }

    /// Create a secondary encoder error
    pub fn secondary_failed<S: Into<String>>(message: S) -> Self {
        Self::SecondaryFailed {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Get the error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::InvalidPattern { .. } => "pattern",
            Self::CompressFailed { .. } => "compress",
            Self::DecompressFailed { .. } => "decompress",
            Self::SecondaryFailed { .. } => "secondary",
            Self::Configuration { .. } => "config",
        }
    }

    /// Check if the error left the originating context usable.
    ///
    /// Codec errors never poison the compressor: the output buffer may hold
    /// partial bytes but subsequent records can still be processed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::CompressFailed { .. } => true,
            Self::DecompressFailed { .. } => true,
            Self::SecondaryFailed { .. } => true,
            Self::InvalidPattern { .. } => false,
            Self::Configuration { .. } => false,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PbcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PbcError::invalid_pattern("dangling escape");
        assert_eq!(err.category(), "pattern");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = PbcError::decompress_failed("unknown mode tag 0xff");
        let display = format!("{}", err);
        assert!(display.contains("Decompression failed"));
        assert!(display.contains("unknown mode tag"));
    }

    #[test]
    fn test_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no pattern file");
        let err: PbcError = io_error.into();
        assert_eq!(err.category(), "io");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_codec_errors_are_recoverable() {
        assert!(PbcError::compress_failed("x").is_recoverable());
        assert!(PbcError::decompress_failed("x").is_recoverable());
        assert!(PbcError::secondary_failed("x").is_recoverable());
        assert!(!PbcError::configuration("x").is_recoverable());
    }
}
