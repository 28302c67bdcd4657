//! Format classification: what a source file is and which conversion shape
//! a request needs.

use cf_core::{Error, FileFormat, MediaKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three supported source/target shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionVariant {
    /// Extract the audio track of a video.
    VideoToAudio,
    /// Transcode audio.
    AudioToAudio,
    /// Transcode video, carrying its audio when present.
    VideoToVideo,
}

impl ConversionVariant {
    /// Kind of the artifact this variant produces.
    pub fn target_kind(self) -> MediaKind {
        match self {
            Self::VideoToAudio | Self::AudioToAudio => MediaKind::Audio,
            Self::VideoToVideo => MediaKind::Video,
        }
    }

    /// Status line shown while the capture graph is built.
    pub fn status_text(self) -> &'static str {
        match self {
            Self::VideoToAudio => "Extracting audio from video...",
            Self::AudioToAudio => "Converting audio...",
            Self::VideoToVideo => "Converting video...",
        }
    }

    /// Prefix of the per-sample progress line.
    pub fn progress_label(self) -> &'static str {
        match self {
            Self::VideoToAudio => "Recording audio...",
            Self::AudioToAudio | Self::VideoToVideo => "Converting...",
        }
    }
}

impl fmt::Display for ConversionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoToAudio => write!(f, "video-to-audio"),
            Self::AudioToAudio => write!(f, "audio-to-audio"),
            Self::VideoToVideo => write!(f, "video-to-video"),
        }
    }
}

/// Classify a source by its file-name extension.
pub fn classify_media_kind(file_name: &str) -> Result<MediaKind> {
    FileFormat::from_file_name(file_name)
        .map(FileFormat::kind)
        .ok_or_else(|| Error::unsupported_format(file_name))
}

/// Pick the conversion variant for a source kind and a target format.
///
/// Audio sources can only produce audio; asking for a video target fails
/// with [`Error::UnsupportedConversion`].
pub fn classify_variant(source: MediaKind, target: FileFormat) -> Result<ConversionVariant> {
    match (source, target.kind()) {
        (MediaKind::Video, MediaKind::Audio) => Ok(ConversionVariant::VideoToAudio),
        (MediaKind::Audio, MediaKind::Audio) => Ok(ConversionVariant::AudioToAudio),
        (MediaKind::Video, MediaKind::Video) => Ok(ConversionVariant::VideoToVideo),
        (MediaKind::Audio, MediaKind::Video) => Err(Error::UnsupportedConversion {
            source_kind: source,
            target_kind: MediaKind::Video,
            target: target.to_string(),
        }),
    }
}
