//! Collaborator contracts the pipeline drives but does not implement.
//!
//! A host (browser bridge, native media stack, the synthetic runtime used in
//! tests) supplies a [`MediaRuntime`] that can open a real-time decode source,
//! route its audio into a capture stream, render frames onto a capturable
//! surface, and record the resulting stream with a chunked encoder.
//!
//! Events that a host would deliver as callbacks (metadata ready, end of
//! stream, data available) arrive over channels, so the pipeline can treat
//! them as suspension points.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Error reported by a collaborator. The pipeline maps it onto the typed
/// [`cf_core::Error`] that matches the stage it happened in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RuntimeError(pub String);

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Metadata reported once the decode source is ready.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    /// Duration in seconds; `None` or NaN when the container does not say.
    pub duration: Option<f64>,
    pub width: u32,
    pub height: u32,
    /// Natural frame rate, when known.
    pub frame_rate: Option<f64>,
}

/// Lifecycle events of a decode source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    MetadataLoaded(SourceMetadata),
    Ended,
    Error(String),
}

/// Output of a streaming encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderEvent {
    Data(Bytes),
    Error(String),
}

/// Receiving end of a decode source's events.
pub type SourceEvents = mpsc::UnboundedReceiver<SourceEvent>;

/// Where a streaming encoder delivers its chunks.
pub type ChunkSink = mpsc::UnboundedSender<EncoderEvent>;

/// Kind of a real-time media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Opaque handle to a live track inside the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaTrack {
    pub id: u64,
    pub kind: TrackKind,
}

/// The set of live tracks an encoder records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStream {
    tracks: Vec<MediaTrack>,
}

impl CaptureStream {
    pub fn push(&mut self, track: MediaTrack) {
        self.tracks.push(track);
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn has(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }
}

/// Concrete parameters handed to [`MediaRuntime::create_encoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOptions {
    /// The negotiated container/codec identifier.
    pub mime_type: String,
    pub audio_bits_per_second: u32,
    pub video_bits_per_second: Option<u32>,
}

/// "Can this runtime encode container+codec X?"
pub trait EncoderCapabilities: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;
}

/// A fixed list of supported MIME types, matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilities {
    supported: Vec<String>,
}

impl StaticCapabilities {
    pub fn new<I, S>(supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: supported.into_iter().map(Into::into).collect(),
        }
    }
}

impl EncoderCapabilities for StaticCapabilities {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported
            .iter()
            .any(|s| s.eq_ignore_ascii_case(mime_type))
    }
}

/// Factory for every transient resource of one pipeline run.
pub trait MediaRuntime: EncoderCapabilities {
    /// Bind raw bytes to a playable decode source. Metadata, end of stream,
    /// and decode errors are reported on the returned channel.
    fn open_source(
        &self,
        data: Bytes,
        mime_type: &str,
        muted: bool,
    ) -> Result<(Box<dyn DecodeSource>, SourceEvents), RuntimeError>;

    /// Route the source's audio into a real-time track. `Ok(None)` when the
    /// source has no audio.
    fn connect_audio(
        &self,
        source: &mut dyn DecodeSource,
    ) -> Result<Option<Box<dyn AudioRoute>>, RuntimeError>;

    /// Create a surface whose contents are captured as a video track at
    /// `frame_rate`.
    fn create_frame_surface(
        &self,
        width: u32,
        height: u32,
        frame_rate: f64,
    ) -> Result<Box<dyn FrameSurface>, RuntimeError>;

    /// Create a streaming encoder recording `stream`.
    fn create_encoder(
        &self,
        stream: CaptureStream,
        options: &EncoderOptions,
    ) -> Result<Box<dyn StreamingEncoder>, RuntimeError>;
}

/// A media-element equivalent: decodes by playing in real time.
#[async_trait]
pub trait DecodeSource: Send {
    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    /// Total duration in seconds, if known.
    fn duration(&self) -> Option<f64>;

    fn is_playing(&self) -> bool;

    /// Start real-time playback. Resolves once playback has begun.
    async fn play(&mut self) -> Result<(), RuntimeError>;

    /// Release the decoder and any object URLs/elements backing it.
    fn release(&mut self);
}

/// Audio graph routing a source into a capture track.
pub trait AudioRoute: Send {
    fn track(&self) -> MediaTrack;

    /// Stop the real-time track.
    fn stop(&mut self);

    /// Close the audio graph.
    fn close(&mut self);
}

/// Capturable drawing surface for decoded frames.
pub trait FrameSurface: Send {
    fn track(&self) -> MediaTrack;

    /// Render the source's current frame.
    fn draw(&mut self, source: &dyn DecodeSource);

    /// Stop the real-time track.
    fn stop(&mut self);

    fn release(&mut self);
}

/// Recorder that turns a live stream into encoded chunks.
#[async_trait]
pub trait StreamingEncoder: Send {
    /// Begin recording, flushing a chunk into `sink` every `timeslice`.
    fn start(&mut self, timeslice: Duration, sink: ChunkSink) -> Result<(), RuntimeError>;

    /// Stop recording. Any final buffered data must have been delivered to
    /// the sink by the time this resolves.
    async fn stop(&mut self) -> Result<(), RuntimeError>;

    fn release(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_capabilities_match_case_insensitively() {
        let caps = StaticCapabilities::new(["audio/webm;codecs=opus"]);
        assert!(caps.is_type_supported("audio/WEBM;codecs=opus"));
        assert!(!caps.is_type_supported("audio/mpeg"));
    }

    #[test]
    fn capture_stream_tracks_kinds() {
        let mut stream = CaptureStream::default();
        assert!(!stream.has(TrackKind::Audio));
        stream.push(MediaTrack { id: 1, kind: TrackKind::Video });
        assert!(stream.has(TrackKind::Video));
        assert!(!stream.has(TrackKind::Audio));
        assert_eq!(stream.tracks().len(), 1);
    }
}
