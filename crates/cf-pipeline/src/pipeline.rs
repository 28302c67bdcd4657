//! The conversion state machine.
//!
//! One [`ConversionPipeline::run`] loads the source, builds the capture graph
//! for the request's variant, plays the source in real time while the encoder
//! records it, then finalizes the recorded chunks into one artifact. Every
//! exit path releases the [`PipelineHandle`] before returning.

use std::sync::Arc;
use std::time::Duration;

use cf_core::config::{is_usable_frame_rate, PipelineConfig};
use cf_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::classify::{classify_media_kind, classify_variant, ConversionVariant};
use crate::handle::PipelineHandle;
use crate::policy::EncodeProfile;
use crate::progress::{playback_percent, ProgressReporter};
use crate::request::{ConversionOutput, ConversionRequest};
use crate::runtime::{EncoderEvent, MediaRuntime, SourceEvent, SourceEvents, SourceMetadata};

pub const STATUS_LOADING: &str = "Loading file...";
pub const STATUS_FINALIZING: &str = "Finalizing...";
pub const STATUS_COMPLETE: &str = "Conversion complete!";

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Created,
    LoadingSource,
    BuildingGraph,
    Encoding,
    Finalizing,
    Succeeded,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// What a finished run did, for diagnostics and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub variant: Option<ConversionVariant>,
    pub negotiated_mime_type: Option<String>,
    /// Non-empty chunks received from the encoder.
    pub chunks_received: usize,
    /// Chunks still held by the handle after release. Always zero.
    pub chunks_retained: usize,
    pub frames_drawn: u64,
    pub progress_samples_skipped: u64,
    pub released: bool,
}

/// Drives one request through the decode/capture/encode sequence.
pub struct ConversionPipeline {
    runtime: Arc<dyn MediaRuntime>,
    config: PipelineConfig,
    progress: Arc<ProgressReporter>,
    state: PipelineState,
    transitions: Vec<PipelineState>,
    summary: RunSummary,
}

impl ConversionPipeline {
    pub fn new(runtime: Arc<dyn MediaRuntime>, config: PipelineConfig) -> Self {
        Self {
            runtime,
            config,
            progress: Arc::new(ProgressReporter::new()),
            state: PipelineState::Created,
            transitions: vec![PipelineState::Created],
            summary: RunSummary::default(),
        }
    }

    /// Use an existing reporter, typically one with listeners attached.
    pub fn with_progress(mut self, progress: Arc<ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &Arc<ProgressReporter> {
        &self.progress
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn transitions(&self) -> &[PipelineState] {
        &self.transitions
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Run `request` to completion. Not retried on failure.
    pub async fn run(&mut self, request: &ConversionRequest) -> Result<ConversionOutput> {
        if self.state != PipelineState::Created {
            return Err(Error::Internal(format!(
                "pipeline already used (state {:?})",
                self.state
            )));
        }

        let mut handle = PipelineHandle::new();
        let result = self.drive(request, &mut handle).await;

        handle.release();
        self.summary.chunks_retained = handle.chunk_count();
        self.summary.released = handle.is_released();

        match &result {
            Ok(output) => {
                self.transition(PipelineState::Succeeded);
                self.progress.report(100, STATUS_COMPLETE);
                tracing::info!(
                    "Conversion of {} succeeded: {} bytes of {}",
                    request.file_name,
                    output.size,
                    output.mime_type
                );
            }
            Err(e) => {
                self.transition(PipelineState::Failed);
                tracing::error!("Conversion of {} failed: {e}", request.file_name);
            }
        }
        result
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::debug!("Pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    async fn drive(
        &mut self,
        request: &ConversionRequest,
        handle: &mut PipelineHandle,
    ) -> Result<ConversionOutput> {
        let source_kind = classify_media_kind(&request.file_name)?;
        let variant = classify_variant(source_kind, request.output_format)?;
        let profile = EncodeProfile::resolve(variant, request.output_format, request.quality);
        self.summary.variant = Some(variant);
        tracing::info!(
            "Converting {} ({variant}) to {} at {} quality",
            request.file_name,
            request.output_format,
            request.quality
        );

        // Loading
        self.transition(PipelineState::LoadingSource);
        self.progress.report(0, STATUS_LOADING);
        let mut source_events = self.load_source(request, variant, handle).await?;

        // Graph
        self.transition(PipelineState::BuildingGraph);
        self.progress.set_status(variant.status_text());
        let metadata = source_events.metadata.take();
        let frame_period = self.build_graph(variant, metadata.as_ref(), handle)?;

        let options = profile.negotiate(self.runtime.as_ref())?;
        let encoder = self
            .runtime
            .create_encoder(handle.capture_stream(), &options)
            .map_err(|e| Error::EncodeFailed(e.to_string()))?;
        handle.attach_encoder(encoder);
        self.summary.negotiated_mime_type = Some(options.mime_type.clone());

        // Encoding
        self.transition(PipelineState::Encoding);
        let (chunk_tx, mut chunks) = mpsc::unbounded_channel();
        handle
            .encoder_mut()
            .ok_or_else(|| Error::Internal("encoder missing".into()))?
            .start(self.config.chunk_interval(), chunk_tx)
            .map_err(|e| Error::EncodeFailed(e.to_string()))?;
        handle
            .source_mut()
            .ok_or_else(|| Error::Internal("source missing".into()))?
            .play()
            .await
            .map_err(|e| Error::PlaybackFailed(e.to_string()))?;
        tracing::debug!("Playback started; recording as {}", options.mime_type);

        self.record(variant, frame_period, &mut source_events.events, &mut chunks, handle)
            .await?;

        // Finalizing
        self.transition(PipelineState::Finalizing);
        self.progress.set_status(STATUS_FINALIZING);
        self.finalize(&mut chunks, handle).await?;

        Ok(handle.take_artifact(&options.mime_type))
    }

    /// Bind the bytes to a decode source and wait for its metadata.
    async fn load_source(
        &mut self,
        request: &ConversionRequest,
        variant: ConversionVariant,
        handle: &mut PipelineHandle,
    ) -> Result<LoadedSource> {
        let sniffed = cf_core::FileFormat::from_file_name(&request.file_name)
            .map_or("application/octet-stream", cf_core::FileFormat::mime_type);
        let muted = variant == ConversionVariant::VideoToVideo;
        let (source, mut events) = self
            .runtime
            .open_source(request.source.clone(), sniffed, muted)
            .map_err(|e| Error::SourceLoadFailed(e.to_string()))?;
        handle.attach_source(source);

        let timeout_ms = self.config.load_timeout_ms(request.source_len());
        tracing::debug!(
            "Waiting up to {timeout_ms} ms for metadata of {} ({} bytes)",
            request.file_name,
            request.source_len()
        );

        let metadata = time::timeout(Duration::from_millis(timeout_ms), async {
            loop {
                match events.recv().await {
                    Some(SourceEvent::MetadataLoaded(metadata)) => return Ok(metadata),
                    Some(SourceEvent::Error(message)) => {
                        return Err(Error::SourceLoadFailed(message))
                    }
                    Some(SourceEvent::Ended) => {
                        return Err(Error::SourceLoadFailed(
                            "source ended before metadata was available".into(),
                        ))
                    }
                    None => {
                        return Err(Error::SourceLoadFailed(
                            "source closed before metadata was available".into(),
                        ))
                    }
                }
            }
        })
        .await
        .map_err(|_| Error::SourceLoadTimeout { timeout_ms })??;

        tracing::debug!(
            "Source ready: duration={:?} {}x{} fps={:?}",
            metadata.duration,
            metadata.width,
            metadata.height,
            metadata.frame_rate
        );
        Ok(LoadedSource {
            events,
            metadata: Some(metadata),
        })
    }

    /// Build the capture graph. Returns the frame period for video output.
    fn build_graph(
        &mut self,
        variant: ConversionVariant,
        metadata: Option<&SourceMetadata>,
        handle: &mut PipelineHandle,
    ) -> Result<Option<Duration>> {
        let graph_err = |e: crate::runtime::RuntimeError| Error::EncodeFailed(e.to_string());
        let source = handle
            .source_mut()
            .ok_or_else(|| Error::Internal("source missing".into()))?;
        let audio = self.runtime.connect_audio(source).map_err(graph_err)?;

        match variant {
            ConversionVariant::VideoToAudio | ConversionVariant::AudioToAudio => {
                let audio = audio.ok_or(Error::NoAudioTrack)?;
                handle.attach_audio(audio);
                Ok(None)
            }
            ConversionVariant::VideoToVideo => {
                let (width, height) = metadata.map_or((0, 0), |m| (m.width, m.height));
                let frame_rate = self.frame_rate(metadata.and_then(|m| m.frame_rate))?;
                let surface = self
                    .runtime
                    .create_frame_surface(width, height, frame_rate)
                    .map_err(graph_err)?;
                handle.attach_surface(surface);
                match audio {
                    Some(audio) => handle.attach_audio(audio),
                    None => tracing::info!("Source has no audio; output will be silent"),
                }
                Ok(Some(Duration::from_secs_f64(1.0 / frame_rate)))
            }
        }
    }

    /// Frame rate to sample the source at. Falls back to the configured rate
    /// when the source reports none or one outside the usable range.
    fn frame_rate(&self, reported: Option<f64>) -> Result<f64> {
        match reported {
            Some(fps) if is_usable_frame_rate(fps) => return Ok(fps),
            Some(fps) => tracing::warn!(
                "Source reported unusable frame rate {fps}; using {} fps",
                self.config.fallback_frame_rate
            ),
            None => {}
        }
        let fallback = self.config.fallback_frame_rate;
        if is_usable_frame_rate(fallback) {
            Ok(fallback)
        } else {
            Err(Error::Config(format!("unusable fallback frame rate {fallback}")))
        }
    }

    /// Collect chunks, sample progress, and draw frames until end of stream.
    async fn record(
        &mut self,
        variant: ConversionVariant,
        frame_period: Option<Duration>,
        source_events: &mut SourceEvents,
        chunks: &mut mpsc::UnboundedReceiver<EncoderEvent>,
        handle: &mut PipelineHandle,
    ) -> Result<()> {
        let progress_period = self.config.progress_interval();
        let mut progress_tick = time::interval_at(Instant::now() + progress_period, progress_period);
        progress_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let draws_frames = frame_period.is_some();
        let frame_period = frame_period.unwrap_or(progress_period);
        let mut frame_tick = time::interval(frame_period);
        frame_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut encoder_open = true;

        loop {
            tokio::select! {
                event = source_events.recv() => match event {
                    Some(SourceEvent::Ended) => {
                        tracing::debug!("Source reached end of stream");
                        return Ok(());
                    }
                    Some(SourceEvent::Error(message)) => {
                        return Err(Error::PlaybackFailed(message));
                    }
                    Some(SourceEvent::MetadataLoaded(_)) => {}
                    None => {
                        return Err(Error::PlaybackFailed(
                            "source closed before end of stream".into(),
                        ));
                    }
                },
                event = chunks.recv(), if encoder_open => match event {
                    Some(event) => self.on_encoder_event(event, handle)?,
                    None => encoder_open = false,
                },
                _ = progress_tick.tick() => self.sample_progress(variant, handle),
                _ = frame_tick.tick(), if draws_frames => {
                    if handle.draw_frame() {
                        self.summary.frames_drawn += 1;
                    }
                }
            }
        }
    }

    fn on_encoder_event(&mut self, event: EncoderEvent, handle: &mut PipelineHandle) -> Result<()> {
        match event {
            EncoderEvent::Data(chunk) => {
                if !chunk.is_empty() {
                    self.summary.chunks_received += 1;
                    tracing::trace!("Chunk of {} bytes", chunk.len());
                }
                handle.push_chunk(chunk);
                Ok(())
            }
            EncoderEvent::Error(message) => Err(Error::EncodeFailed(message)),
        }
    }

    fn sample_progress(&mut self, variant: ConversionVariant, handle: &PipelineHandle) {
        let Some(source) = handle.source() else {
            return;
        };
        match playback_percent(source.current_time(), source.duration()) {
            Some(percent) => {
                self.progress
                    .report(percent, format!("{} {percent}%", variant.progress_label()));
            }
            None => {
                self.summary.progress_samples_skipped += 1;
                tracing::debug!("Duration unavailable; skipping progress sample");
            }
        }
    }

    /// Grace delay, stop the encoder, stop tracks, then drain what is left.
    async fn finalize(
        &mut self,
        chunks: &mut mpsc::UnboundedReceiver<EncoderEvent>,
        handle: &mut PipelineHandle,
    ) -> Result<()> {
        time::sleep(self.config.finalize_grace()).await;

        handle
            .encoder_mut()
            .ok_or_else(|| Error::Internal("encoder missing".into()))?
            .stop()
            .await
            .map_err(|e| Error::EncodeFailed(e.to_string()))?;
        handle.stop_tracks();

        while let Ok(event) = chunks.try_recv() {
            self.on_encoder_event(event, handle)?;
        }
        tracing::debug!("Finalized with {} chunks", handle.chunk_count());
        Ok(())
    }
}

struct LoadedSource {
    events: SourceEvents,
    metadata: Option<SourceMetadata>,
}
