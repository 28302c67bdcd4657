//! Unified error type for clipforge.
//!
//! Every failure a conversion can end in is a variant of [`Error`]. Callers that
//! need a stable, serializable tag (status listeners, the message bridge) use
//! [`Error::kind`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::JobId;
use crate::media::MediaKind;

/// Unified error type covering all failure modes of a conversion.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input file name has no recognized audio or video extension.
    #[error("Unsupported file format: {file_name}")]
    UnsupportedFormat {
        /// The file name (or extension) that failed classification.
        file_name: String,
    },

    /// No conversion variant exists for this source/target pair.
    #[error("Unsupported conversion: {source_kind} source cannot be converted to {target} ({target_kind})")]
    UnsupportedConversion {
        source_kind: MediaKind,
        target_kind: MediaKind,
        target: String,
    },

    /// The decode source did not report metadata within the load budget.
    #[error("Source load timeout: metadata not available after {timeout_ms} ms")]
    SourceLoadTimeout {
        /// The computed budget that was exceeded.
        timeout_ms: u64,
    },

    /// The decode source reported an error before becoming ready.
    #[error("Failed to load source: {0}")]
    SourceLoadFailed(String),

    /// Audio extraction was requested on a source without an audio track.
    #[error("Source has no audio track to extract")]
    NoAudioTrack,

    /// MIME negotiation exhausted every candidate.
    #[error("No supported {kind} encoder found (tried: {})", .tried.join(", "))]
    NoSupportedEncoder {
        kind: MediaKind,
        /// Candidates queried, in order.
        tried: Vec<String>,
    },

    /// The decode source refused to start playback.
    #[error("Failed to start playback: {0}")]
    PlaybackFailed(String),

    /// The streaming encoder failed to start, reported an error, or failed to stop.
    #[error("Encoding failed: {0}")]
    EncodeFailed(String),

    /// A conversion is already running (single-flight violation).
    #[error("A conversion is already in progress (job {job_id})")]
    AlreadyRunning {
        /// The job that currently holds the slot.
        job_id: JobId,
    },

    /// Configuration failed to parse or validate.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serializable tag identifying the kind of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnsupportedFormat,
    UnsupportedConversion,
    SourceLoadTimeout,
    SourceLoadFailed,
    NoAudioTrack,
    NoSupportedEncoder,
    PlaybackFailed,
    EncodeFailed,
    AlreadyRunningError,
    Config,
    Io,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Error {
    /// Return the stable tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Error::UnsupportedConversion { .. } => ErrorKind::UnsupportedConversion,
            Error::SourceLoadTimeout { .. } => ErrorKind::SourceLoadTimeout,
            Error::SourceLoadFailed(_) => ErrorKind::SourceLoadFailed,
            Error::NoAudioTrack => ErrorKind::NoAudioTrack,
            Error::NoSupportedEncoder { .. } => ErrorKind::NoSupportedEncoder,
            Error::PlaybackFailed(_) => ErrorKind::PlaybackFailed,
            Error::EncodeFailed(_) => ErrorKind::EncodeFailed,
            Error::AlreadyRunning { .. } => ErrorKind::AlreadyRunningError,
            Error::Config(_) => ErrorKind::Config,
            Error::Io { .. } => ErrorKind::Io,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Convenience constructor for [`Error::UnsupportedFormat`].
    pub fn unsupported_format(file_name: impl Into<String>) -> Self {
        Error::UnsupportedFormat {
            file_name: file_name.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
