//! Deterministic in-process runtime.
//!
//! Plays a described media source on the tokio clock and records it with an
//! encoder that emits fixed-size chunks at the requested cadence. Used by the
//! test suites and the CLI `simulate` command; under a paused clock a
//! ten-minute source converts instantly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cf_core::MediaKind;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::runtime::{
    AudioRoute, CaptureStream, ChunkSink, DecodeSource, EncoderCapabilities, EncoderEvent,
    EncoderOptions, FrameSurface, MediaRuntime, MediaTrack, RuntimeError, SourceEvent,
    SourceEvents, SourceMetadata, StreamingEncoder, TrackKind,
};

/// Description of the media a [`SyntheticRuntime`] pretends to decode.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticMedia {
    pub kind: MediaKind,
    pub length_secs: f64,
    pub has_audio: bool,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
    pub load_delay: Duration,
    pub loads: bool,
    pub known_duration: bool,
    pub playback_fails: bool,
    pub load_error: Option<String>,
}

impl SyntheticMedia {
    pub fn video(length_secs: f64) -> Self {
        Self {
            kind: MediaKind::Video,
            length_secs,
            has_audio: true,
            width: 1280,
            height: 720,
            frame_rate: None,
            load_delay: Duration::from_millis(50),
            loads: true,
            known_duration: true,
            playback_fails: false,
            load_error: None,
        }
    }

    pub fn audio(length_secs: f64) -> Self {
        Self {
            kind: MediaKind::Audio,
            width: 0,
            height: 0,
            ..Self::video(length_secs)
        }
    }

    pub fn without_audio(mut self) -> Self {
        self.has_audio = false;
        self
    }

    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = Some(fps);
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Metadata is never reported.
    pub fn never_loads(mut self) -> Self {
        self.loads = false;
        self
    }

    /// Duration reads as NaN while playing.
    pub fn unknown_duration(mut self) -> Self {
        self.known_duration = false;
        self
    }

    pub fn failing_playback(mut self) -> Self {
        self.playback_fails = true;
        self
    }

    /// The source reports a decode error instead of metadata.
    pub fn failing_load(mut self, message: impl Into<String>) -> Self {
        self.load_error = Some(message.into());
        self
    }

    fn duration(&self) -> Option<f64> {
        if self.known_duration {
            Some(self.length_secs)
        } else {
            Some(f64::NAN)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderMode {
    Normal,
    Silent,
    Failing,
}

/// Counters of every resource the runtime handed out.
#[derive(Debug, Default)]
pub struct SyntheticStats {
    sources_opened: AtomicU64,
    sources_released: AtomicU64,
    audio_routes: AtomicU64,
    audio_closed: AtomicU64,
    surfaces: AtomicU64,
    surfaces_released: AtomicU64,
    encoders_created: AtomicU64,
    encoders_released: AtomicU64,
    frames_drawn: AtomicU64,
    chunks_emitted: AtomicU64,
}

impl SyntheticStats {
    pub fn sources_opened(&self) -> u64 {
        self.sources_opened.load(Ordering::SeqCst)
    }

    pub fn encoders_created(&self) -> u64 {
        self.encoders_created.load(Ordering::SeqCst)
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn.load(Ordering::SeqCst)
    }

    pub fn chunks_emitted(&self) -> u64 {
        self.chunks_emitted.load(Ordering::SeqCst)
    }

    /// Whether everything acquired has been released.
    pub fn all_released(&self) -> bool {
        let pairs = [
            (&self.sources_opened, &self.sources_released),
            (&self.audio_routes, &self.audio_closed),
            (&self.surfaces, &self.surfaces_released),
            (&self.encoders_created, &self.encoders_released),
        ];
        pairs
            .iter()
            .all(|(acquired, released)| acquired.load(Ordering::SeqCst) == released.load(Ordering::SeqCst))
    }
}

/// A [`MediaRuntime`] backed by a [`SyntheticMedia`] description.
pub struct SyntheticRuntime {
    media: SyntheticMedia,
    /// `None` accepts every MIME type.
    supported: Option<Vec<String>>,
    queries: Mutex<Vec<String>>,
    encoder_mode: EncoderMode,
    stats: Arc<SyntheticStats>,
    last_options: Mutex<Option<EncoderOptions>>,
    last_muted: AtomicBool,
    last_frame_rate: Mutex<Option<f64>>,
    next_track: AtomicU64,
}

impl SyntheticRuntime {
    pub fn new(media: SyntheticMedia) -> Self {
        Self {
            media,
            supported: None,
            queries: Mutex::new(Vec::new()),
            encoder_mode: EncoderMode::Normal,
            stats: Arc::new(SyntheticStats::default()),
            last_options: Mutex::new(None),
            last_muted: AtomicBool::new(false),
            last_frame_rate: Mutex::new(None),
            next_track: AtomicU64::new(1),
        }
    }

    /// Restrict encodable MIME types to `supported`.
    pub fn with_supported<I, S>(mut self, supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported = Some(supported.into_iter().map(Into::into).collect());
        self
    }

    /// Encoder that never emits data.
    pub fn with_silent_encoder(mut self) -> Self {
        self.encoder_mode = EncoderMode::Silent;
        self
    }

    /// Encoder that reports an error shortly after starting.
    pub fn with_failing_encoder(mut self) -> Self {
        self.encoder_mode = EncoderMode::Failing;
        self
    }

    pub fn media(&self) -> &SyntheticMedia {
        &self.media
    }

    /// Every capability query, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    pub fn stats(&self) -> Arc<SyntheticStats> {
        self.stats.clone()
    }

    pub fn last_encoder_options(&self) -> Option<EncoderOptions> {
        self.last_options.lock().clone()
    }

    pub fn last_source_muted(&self) -> bool {
        self.last_muted.load(Ordering::SeqCst)
    }

    /// Frame rate the last frame surface was created with.
    pub fn last_frame_rate(&self) -> Option<f64> {
        *self.last_frame_rate.lock()
    }

    fn track(&self, kind: TrackKind) -> MediaTrack {
        MediaTrack {
            id: self.next_track.fetch_add(1, Ordering::SeqCst),
            kind,
        }
    }
}

impl EncoderCapabilities for SyntheticRuntime {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.queries.lock().push(mime_type.to_string());
        match &self.supported {
            Some(list) => list.iter().any(|s| s.eq_ignore_ascii_case(mime_type)),
            None => true,
        }
    }
}

impl MediaRuntime for SyntheticRuntime {
    fn open_source(
        &self,
        data: Bytes,
        mime_type: &str,
        muted: bool,
    ) -> Result<(Box<dyn DecodeSource>, SourceEvents), RuntimeError> {
        tracing::trace!("Opening synthetic source ({} bytes, {mime_type})", data.len());
        self.stats.sources_opened.fetch_add(1, Ordering::SeqCst);
        self.last_muted.store(muted, Ordering::SeqCst);

        let (events, rx) = mpsc::unbounded_channel();
        let media = self.media.clone();
        let loader = if let Some(message) = media.load_error.clone() {
            let tx = events.clone();
            let delay = media.load_delay;
            Some(tokio::spawn(async move {
                time::sleep(delay).await;
                let _ = tx.send(SourceEvent::Error(message));
            }))
        } else if media.loads {
            let tx = events.clone();
            let metadata = SourceMetadata {
                duration: media.duration(),
                width: media.width,
                height: media.height,
                frame_rate: media.frame_rate,
            };
            let delay = media.load_delay;
            Some(tokio::spawn(async move {
                time::sleep(delay).await;
                let _ = tx.send(SourceEvent::MetadataLoaded(metadata));
            }))
        } else {
            None
        };

        let source = SyntheticSource {
            media,
            events,
            started: None,
            tasks: loader.into_iter().collect(),
            stats: self.stats.clone(),
            released: false,
        };
        Ok((Box::new(source), rx))
    }

    fn connect_audio(
        &self,
        _source: &mut dyn DecodeSource,
    ) -> Result<Option<Box<dyn AudioRoute>>, RuntimeError> {
        if !self.media.has_audio {
            return Ok(None);
        }
        self.stats.audio_routes.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Box::new(SyntheticAudio {
            track: self.track(TrackKind::Audio),
            stats: self.stats.clone(),
            closed: false,
        })))
    }

    fn create_frame_surface(
        &self,
        width: u32,
        height: u32,
        frame_rate: f64,
    ) -> Result<Box<dyn FrameSurface>, RuntimeError> {
        tracing::trace!("Synthetic surface {width}x{height} at {frame_rate} fps");
        *self.last_frame_rate.lock() = Some(frame_rate);
        self.stats.surfaces.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticSurface {
            track: self.track(TrackKind::Video),
            stats: self.stats.clone(),
            released: false,
        }))
    }

    fn create_encoder(
        &self,
        stream: CaptureStream,
        options: &EncoderOptions,
    ) -> Result<Box<dyn StreamingEncoder>, RuntimeError> {
        if stream.tracks().is_empty() {
            return Err(RuntimeError::new("capture stream has no tracks"));
        }
        self.stats.encoders_created.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(options.clone());

        let bits_per_second =
            u64::from(options.audio_bits_per_second) + u64::from(options.video_bits_per_second.unwrap_or(0));
        Ok(Box::new(SyntheticEncoder {
            mode: self.encoder_mode,
            bits_per_second,
            timeslice: Duration::ZERO,
            sink: None,
            task: None,
            stats: self.stats.clone(),
            released: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

struct SyntheticSource {
    media: SyntheticMedia,
    events: mpsc::UnboundedSender<SourceEvent>,
    started: Option<Instant>,
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<SyntheticStats>,
    released: bool,
}

impl SyntheticSource {
    fn elapsed(&self) -> f64 {
        self.started
            .map_or(0.0, |s| s.elapsed().as_secs_f64().min(self.media.length_secs))
    }
}

#[async_trait]
impl DecodeSource for SyntheticSource {
    fn current_time(&self) -> f64 {
        self.elapsed()
    }

    fn duration(&self) -> Option<f64> {
        self.media.duration()
    }

    fn is_playing(&self) -> bool {
        !self.released && self.started.is_some() && self.elapsed() < self.media.length_secs
    }

    async fn play(&mut self) -> Result<(), RuntimeError> {
        if self.media.playback_fails {
            return Err(RuntimeError::new("playback was blocked"));
        }
        self.started = Some(Instant::now());
        let tx = self.events.clone();
        let length = Duration::from_secs_f64(self.media.length_secs.max(0.0));
        self.tasks.push(tokio::spawn(async move {
            time::sleep(length).await;
            let _ = tx.send(SourceEvent::Ended);
        }));
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.stats.sources_released.fetch_add(1, Ordering::SeqCst);
    }
}

struct SyntheticAudio {
    track: MediaTrack,
    stats: Arc<SyntheticStats>,
    closed: bool,
}

impl AudioRoute for SyntheticAudio {
    fn track(&self) -> MediaTrack {
        self.track.clone()
    }

    fn stop(&mut self) {}

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.audio_closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct SyntheticSurface {
    track: MediaTrack,
    stats: Arc<SyntheticStats>,
    released: bool,
}

impl FrameSurface for SyntheticSurface {
    fn track(&self) -> MediaTrack {
        self.track.clone()
    }

    fn draw(&mut self, _source: &dyn DecodeSource) {
        self.stats.frames_drawn.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&mut self) {}

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stats.surfaces_released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct SyntheticEncoder {
    mode: EncoderMode,
    bits_per_second: u64,
    timeslice: Duration,
    sink: Option<ChunkSink>,
    task: Option<JoinHandle<()>>,
    stats: Arc<SyntheticStats>,
    released: bool,
}

impl SyntheticEncoder {
    fn chunk(&self) -> Bytes {
        let len = (self.bits_per_second * self.timeslice.as_millis() as u64 / 8000).max(1);
        Bytes::from(vec![0xA5; len as usize])
    }
}

#[async_trait]
impl StreamingEncoder for SyntheticEncoder {
    fn start(&mut self, timeslice: Duration, sink: ChunkSink) -> Result<(), RuntimeError> {
        if self.sink.is_some() {
            return Err(RuntimeError::new("encoder already started"));
        }
        self.timeslice = timeslice;

        let task = match self.mode {
            EncoderMode::Normal => {
                let chunk = self.chunk();
                let tx = sink.clone();
                let stats = self.stats.clone();
                Some(tokio::spawn(async move {
                    let mut ticker = time::interval_at(Instant::now() + timeslice, timeslice);
                    loop {
                        ticker.tick().await;
                        if tx.send(EncoderEvent::Data(chunk.clone())).is_err() {
                            break;
                        }
                        stats.chunks_emitted.fetch_add(1, Ordering::SeqCst);
                    }
                }))
            }
            EncoderMode::Failing => {
                let tx = sink.clone();
                Some(tokio::spawn(async move {
                    time::sleep(timeslice).await;
                    let _ = tx.send(EncoderEvent::Error("encoder crashed".into()));
                }))
            }
            EncoderMode::Silent => None,
        };
        self.task = task;
        self.sink = Some(sink);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RuntimeError> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let Some(sink) = self.sink.take() else {
            return Err(RuntimeError::new("encoder was not started"));
        };
        if self.mode == EncoderMode::Normal {
            let _ = sink.send(EncoderEvent::Data(self.chunk()));
            self.stats.chunks_emitted.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.sink = None;
        self.stats.encoders_released.fetch_add(1, Ordering::SeqCst);
    }
}
