//! Bitrate and container policy.
//!
//! Maps a quality tier and target format onto concrete encoder parameters,
//! then negotiates the container against what the runtime can actually
//! encode. The fallback order is fixed: preferred, then the webm container
//! with an explicit codec, then bare webm.

use cf_core::{Error, FileFormat, MediaKind, QualityTier, Result};

use crate::classify::ConversionVariant;
use crate::runtime::{EncoderCapabilities, EncoderOptions};

/// Audio bitrate used for an unrecognized tier.
pub const DEFAULT_AUDIO_BITRATE: u32 = 192_000;

/// Video bitrate used for an unrecognized tier.
pub const DEFAULT_VIDEO_BITRATE: u32 = 2_500_000;

/// Audio bits per second for a tier.
pub fn audio_bitrate(tier: QualityTier) -> u32 {
    match tier {
        QualityTier::High => 320_000,
        QualityTier::Medium => DEFAULT_AUDIO_BITRATE,
        QualityTier::Low => 128_000,
    }
}

/// Video bits per second for a tier.
pub fn video_bitrate(tier: QualityTier) -> u32 {
    match tier {
        QualityTier::High => 5_000_000,
        QualityTier::Medium => DEFAULT_VIDEO_BITRATE,
        QualityTier::Low => 1_000_000,
    }
}

/// Audio bitrate for a raw tier label. Anything but an exact tier name gets
/// the default; never fails.
pub fn resolve_audio_bitrate(label: &str) -> u32 {
    QualityTier::from_label(label).map_or(DEFAULT_AUDIO_BITRATE, audio_bitrate)
}

/// Video bitrate for a raw tier label. Never fails.
pub fn resolve_video_bitrate(label: &str) -> u32 {
    QualityTier::from_label(label).map_or(DEFAULT_VIDEO_BITRATE, video_bitrate)
}

/// Preferred container MIME for a target format.
///
/// Formats without a table entry get the webm family.
pub fn resolve_container_mime(format: FileFormat, is_audio: bool) -> &'static str {
    if is_audio {
        match format {
            FileFormat::Mp3 => "audio/mpeg",
            FileFormat::Wav => "audio/wav",
            FileFormat::Ogg => "audio/ogg;codecs=opus",
            FileFormat::M4a => "audio/mp4",
            _ => "audio/webm;codecs=opus",
        }
    } else {
        match format {
            FileFormat::Mp4 => "video/mp4",
            _ => "video/webm;codecs=vp9,opus",
        }
    }
}

/// First fallback: the webm container with an explicit codec.
pub fn codec_fallback(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Audio => "audio/webm;codecs=opus",
        MediaKind::Video => "video/webm;codecs=vp9,opus",
    }
}

/// Last resort: bare webm.
pub fn bare_fallback(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Audio => "audio/webm",
        MediaKind::Video => "video/webm",
    }
}

/// Candidates in negotiation order, without repeats.
pub fn candidate_chain(preferred: &str, kind: MediaKind) -> Vec<String> {
    let mut chain: Vec<String> = Vec::with_capacity(3);
    for candidate in [preferred, codec_fallback(kind), bare_fallback(kind)] {
        if !chain.iter().any(|c| c.eq_ignore_ascii_case(candidate)) {
            chain.push(candidate.to_string());
        }
    }
    chain
}

/// Pick the first candidate the runtime reports as encodable.
///
/// Each candidate is queried at most once; there is no fourth attempt.
pub fn negotiate_mime<C>(preferred: &str, kind: MediaKind, caps: &C) -> Result<String>
where
    C: EncoderCapabilities + ?Sized,
{
    let chain = candidate_chain(preferred, kind);
    let mut tried = Vec::with_capacity(chain.len());

    for candidate in chain {
        if caps.is_type_supported(&candidate) {
            if !tried.is_empty() {
                tracing::info!(
                    "Preferred container {preferred} unsupported; falling back to {candidate}"
                );
            }
            return Ok(candidate);
        }
        tracing::debug!("Encoder does not support {candidate}");
        tried.push(candidate);
    }

    Err(Error::NoSupportedEncoder { kind, tried })
}

/// Encoder parameters resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeProfile {
    /// Preferred container; the negotiated one may differ.
    pub container_mime_type: String,
    pub audio_bits_per_second: u32,
    /// Present only for video output.
    pub video_bits_per_second: Option<u32>,
    pub kind: MediaKind,
}

impl EncodeProfile {
    pub fn resolve(variant: ConversionVariant, target: FileFormat, tier: QualityTier) -> Self {
        let kind = variant.target_kind();
        let is_audio = kind == MediaKind::Audio;
        Self {
            container_mime_type: resolve_container_mime(target, is_audio).to_string(),
            audio_bits_per_second: audio_bitrate(tier),
            video_bits_per_second: (!is_audio).then(|| video_bitrate(tier)),
            kind,
        }
    }

    /// Negotiate the container and produce the encoder's constructor options.
    pub fn negotiate<C>(&self, caps: &C) -> Result<EncoderOptions>
    where
        C: EncoderCapabilities + ?Sized,
    {
        let mime_type = negotiate_mime(&self.container_mime_type, self.kind, caps)?;
        Ok(EncoderOptions {
            mime_type,
            audio_bits_per_second: self.audio_bits_per_second,
            video_bits_per_second: self.video_bits_per_second,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::StaticCapabilities;
    use parking_lot::Mutex;

    /// Records every query and answers from a fixed list.
    struct Recorder {
        supported: Vec<&'static str>,
        queries: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new(supported: Vec<&'static str>) -> Self {
            Self {
                supported,
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    impl EncoderCapabilities for Recorder {
        fn is_type_supported(&self, mime_type: &str) -> bool {
            self.queries.lock().push(mime_type.to_string());
            self.supported.contains(&mime_type)
        }
    }

    #[test]
    fn bitrates_for_known_tiers() {
        assert_eq!(resolve_audio_bitrate("high"), 320_000);
        assert_eq!(resolve_audio_bitrate("medium"), 192_000);
        assert_eq!(resolve_audio_bitrate("low"), 128_000);
        assert_eq!(resolve_video_bitrate("high"), 5_000_000);
        assert_eq!(resolve_video_bitrate("medium"), 2_500_000);
        assert_eq!(resolve_video_bitrate("low"), 1_000_000);
    }

    #[test]
    fn bitrates_default_for_anything_else() {
        for label in ["", "ultra", "HIGH", " low", "lossless", "42"] {
            assert_eq!(resolve_audio_bitrate(label), DEFAULT_AUDIO_BITRATE, "{label}");
            assert_eq!(resolve_video_bitrate(label), DEFAULT_VIDEO_BITRATE, "{label}");
        }
    }

    #[test]
    fn lenient_tier_agrees_with_raw_lookup() {
        for label in ["high", "medium", "low", "", "HIGH", " low", "ultra"] {
            let tier = QualityTier::parse_lenient(label);
            assert_eq!(audio_bitrate(tier), resolve_audio_bitrate(label), "{label}");
            assert_eq!(video_bitrate(tier), resolve_video_bitrate(label), "{label}");
        }
    }

    #[test]
    fn container_table() {
        assert_eq!(resolve_container_mime(FileFormat::Mp3, true), "audio/mpeg");
        assert_eq!(resolve_container_mime(FileFormat::Ogg, true), "audio/ogg;codecs=opus");
        assert_eq!(resolve_container_mime(FileFormat::Flac, true), "audio/webm;codecs=opus");
        assert_eq!(resolve_container_mime(FileFormat::Mp4, false), "video/mp4");
        assert_eq!(resolve_container_mime(FileFormat::Mkv, false), "video/webm;codecs=vp9,opus");
        assert_eq!(resolve_container_mime(FileFormat::Avi, false), "video/webm;codecs=vp9,opus");
    }

    #[test]
    fn negotiation_falls_through_in_order() {
        let caps = Recorder::new(vec!["audio/webm"]);
        let mime = negotiate_mime("audio/mpeg", MediaKind::Audio, &caps).unwrap();
        assert_eq!(mime, "audio/webm");
        assert_eq!(
            *caps.queries.lock(),
            vec!["audio/mpeg", "audio/webm;codecs=opus", "audio/webm"]
        );
    }

    #[test]
    fn negotiation_stops_after_three() {
        let caps = Recorder::new(vec![]);
        let err = negotiate_mime("video/mp4", MediaKind::Video, &caps).unwrap_err();
        match err {
            Error::NoSupportedEncoder { kind, tried } => {
                assert_eq!(kind, MediaKind::Video);
                assert_eq!(tried, vec!["video/mp4", "video/webm;codecs=vp9,opus", "video/webm"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(caps.queries.lock().len(), 3);
    }

    #[test]
    fn preferred_equal_to_fallback_is_queried_once() {
        let caps = Recorder::new(vec![]);
        let _ = negotiate_mime("audio/webm;codecs=opus", MediaKind::Audio, &caps);
        assert_eq!(
            *caps.queries.lock(),
            vec!["audio/webm;codecs=opus", "audio/webm"]
        );
    }

    #[test]
    fn preferred_wins_when_supported() {
        let caps = StaticCapabilities::new(["video/mp4", "video/webm"]);
        assert_eq!(negotiate_mime("video/mp4", MediaKind::Video, &caps).unwrap(), "video/mp4");
    }

    #[test]
    fn profile_for_audio_has_no_video_bitrate() {
        let profile = EncodeProfile::resolve(
            ConversionVariant::VideoToAudio,
            FileFormat::Mp3,
            QualityTier::High,
        );
        assert_eq!(profile.container_mime_type, "audio/mpeg");
        assert_eq!(profile.audio_bits_per_second, 320_000);
        assert_eq!(profile.video_bits_per_second, None);
        assert_eq!(profile.kind, MediaKind::Audio);
    }

    #[test]
    fn profile_negotiates_actual_mime() {
        let profile = EncodeProfile::resolve(
            ConversionVariant::VideoToVideo,
            FileFormat::Mp4,
            QualityTier::Low,
        );
        let caps = StaticCapabilities::new(["video/webm;codecs=vp9,opus"]);
        let options = profile.negotiate(&caps).unwrap();
        assert_eq!(options.mime_type, "video/webm;codecs=vp9,opus");
        assert_eq!(options.video_bits_per_second, Some(1_000_000));
        assert_eq!(options.audio_bits_per_second, 128_000);
    }
}
