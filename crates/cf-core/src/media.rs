//! Media-domain enums: media kinds, file formats, and quality tiers.
//!
//! All enums serialize in lowercase and implement `Display` with the same
//! string so log lines, config values, and wire messages agree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// Whether a file carries video (possibly with audio) or audio only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// The output format preselected for a freshly classified source.
    pub fn default_output(self) -> FileFormat {
        match self {
            Self::Video => FileFormat::Mp4,
            Self::Audio => FileFormat::Mp3,
        }
    }

    /// MIME top-level type (`video` or `audio`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FileFormat
// ---------------------------------------------------------------------------

/// Every file extension the converter recognizes, as input or as output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    // audio
    Mp3,
    Wav,
    Aac,
    Flac,
    Alac,
    Ogg,
    M4a,
    Amr,
    // video
    Mp4,
    Mov,
    Avi,
    Mkv,
    Webm,
    Flv,
    Wmv,
    Mpeg,
    Mpg,
    M4v,
    #[serde(rename = "3gp")]
    ThreeGp,
    Ts,
}

impl FileFormat {
    /// The fixed audio extension set.
    pub const AUDIO: [FileFormat; 8] = [
        Self::Mp3,
        Self::Wav,
        Self::Aac,
        Self::Flac,
        Self::Alac,
        Self::Ogg,
        Self::M4a,
        Self::Amr,
    ];

    /// The fixed video extension set.
    pub const VIDEO: [FileFormat; 12] = [
        Self::Mp4,
        Self::Mov,
        Self::Avi,
        Self::Mkv,
        Self::Webm,
        Self::Flv,
        Self::Wmv,
        Self::Mpeg,
        Self::Mpg,
        Self::M4v,
        Self::ThreeGp,
        Self::Ts,
    ];

    /// Canonical lowercase extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Alac => "alac",
            Self::Ogg => "ogg",
            Self::M4a => "m4a",
            Self::Amr => "amr",
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Avi => "avi",
            Self::Mkv => "mkv",
            Self::Webm => "webm",
            Self::Flv => "flv",
            Self::Wmv => "wmv",
            Self::Mpeg => "mpeg",
            Self::Mpg => "mpg",
            Self::M4v => "m4v",
            Self::ThreeGp => "3gp",
            Self::Ts => "ts",
        }
    }

    /// Look up a format by extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::AUDIO
            .iter()
            .chain(Self::VIDEO.iter())
            .copied()
            .find(|f| f.extension() == ext)
    }

    /// Look up a format from the last `.`-separated segment of a file name.
    ///
    /// A name without a dot is treated as a bare extension.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let ext = file_name.rsplit('.').next().unwrap_or(file_name);
        Self::from_extension(ext)
    }

    /// Which set this format belongs to.
    pub fn kind(self) -> MediaKind {
        if Self::AUDIO.contains(&self) {
            MediaKind::Audio
        } else {
            MediaKind::Video
        }
    }

    /// MIME type used when handing raw bytes of this format to a decoder.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
            Self::Mkv => "video/x-matroska",
            Self::Avi => "video/x-msvideo",
            Self::Mov => "video/quicktime",
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Ogg => "audio/ogg",
            Self::M4a => "audio/mp4",
            _ => "application/octet-stream",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| Error::unsupported_format(s))
    }
}

// ---------------------------------------------------------------------------
// QualityTier
// ---------------------------------------------------------------------------

/// User-selected quality tier.
///
/// Labels match exactly and case-sensitively. Parsing is lenient: any other
/// label becomes [`QualityTier::Medium`], whose bitrates are the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum QualityTier {
    High,
    #[default]
    Medium,
    Low,
}

impl QualityTier {
    /// Strict lookup; `None` for anything but `high`, `medium`, `low`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Lenient lookup falling back to the default tier.
    pub fn parse_lenient(label: &str) -> Self {
        Self::from_label(label).unwrap_or_else(|| {
            tracing::warn!("Unknown quality tier '{label}', using medium");
            Self::default()
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl From<String> for QualityTier {
    fn from(label: String) -> Self {
        Self::parse_lenient(&label)
    }
}

impl From<&str> for QualityTier {
    fn from(label: &str) -> Self {
        Self::parse_lenient(label)
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Name for the converted file: the source name with its last extension
/// replaced by `format`.
pub fn output_file_name(source_file_name: &str, format: FileFormat) -> String {
    let stem = match source_file_name.rfind('.') {
        Some(idx) if !source_file_name[idx + 1..].is_empty()
            && !source_file_name[idx + 1..].contains('/') =>
        {
            &source_file_name[..idx]
        }
        _ => source_file_name,
    };
    format!("{stem}.{}", format.extension())
}

/// Human-readable byte count (`1.5 KB`, `12.34 MB`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".into();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}
