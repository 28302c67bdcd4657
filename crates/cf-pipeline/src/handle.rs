//! Ownership of the transient resources of one pipeline run.

use bytes::{Bytes, BytesMut};

use crate::request::ConversionOutput;
use crate::runtime::{AudioRoute, CaptureStream, DecodeSource, FrameSurface, StreamingEncoder};

/// Resources acquired by a single run, released together.
///
/// [`release`](Self::release) is idempotent and must be called on every exit
/// path. Dropping an unreleased handle releases it too, with a warning.
#[derive(Default)]
pub struct PipelineHandle {
    source: Option<Box<dyn DecodeSource>>,
    audio: Option<Box<dyn AudioRoute>>,
    surface: Option<Box<dyn FrameSurface>>,
    encoder: Option<Box<dyn StreamingEncoder>>,
    chunks: Vec<Bytes>,
    released: bool,
}

impl PipelineHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_source(&mut self, source: Box<dyn DecodeSource>) {
        self.source = Some(source);
    }

    pub fn attach_audio(&mut self, audio: Box<dyn AudioRoute>) {
        self.audio = Some(audio);
    }

    pub fn attach_surface(&mut self, surface: Box<dyn FrameSurface>) {
        self.surface = Some(surface);
    }

    pub fn attach_encoder(&mut self, encoder: Box<dyn StreamingEncoder>) {
        self.encoder = Some(encoder);
    }

    pub fn source(&self) -> Option<&dyn DecodeSource> {
        self.source.as_deref()
    }

    pub fn source_mut(&mut self) -> Option<&mut (dyn DecodeSource + 'static)> {
        self.source.as_deref_mut()
    }

    pub fn encoder_mut(&mut self) -> Option<&mut (dyn StreamingEncoder + 'static)> {
        self.encoder.as_deref_mut()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// The tracks currently routed into the graph.
    pub fn capture_stream(&self) -> CaptureStream {
        let mut stream = CaptureStream::default();
        if let Some(surface) = &self.surface {
            stream.push(surface.track());
        }
        if let Some(audio) = &self.audio {
            stream.push(audio.track());
        }
        stream
    }

    /// Append an encoded chunk. Empty chunks are dropped.
    pub fn push_chunk(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.chunks.push(chunk);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Render the current frame onto the surface while the source plays.
    /// Returns whether a frame was drawn.
    pub fn draw_frame(&mut self) -> bool {
        match (&self.source, &mut self.surface) {
            (Some(source), Some(surface)) if source.is_playing() => {
                surface.draw(&**source);
                true
            }
            _ => false,
        }
    }

    /// Stop every real-time track feeding the encoder.
    pub fn stop_tracks(&mut self) {
        if let Some(surface) = &mut self.surface {
            surface.stop();
        }
        if let Some(audio) = &mut self.audio {
            audio.stop();
        }
    }

    /// Concatenate the chunks in order into one artifact.
    pub fn take_artifact(&mut self, mime_type: &str) -> ConversionOutput {
        let total = self.chunks.iter().map(Bytes::len).sum();
        let mut data = BytesMut::with_capacity(total);
        for chunk in self.chunks.drain(..) {
            data.extend_from_slice(&chunk);
        }
        ConversionOutput::new(data.freeze(), mime_type)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release everything, encoder first and source last.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(mut encoder) = self.encoder.take() {
            encoder.release();
        }
        if let Some(mut surface) = self.surface.take() {
            surface.stop();
            surface.release();
        }
        if let Some(mut audio) = self.audio.take() {
            audio.stop();
            audio.close();
        }
        if let Some(mut source) = self.source.take() {
            source.release();
        }
        let dropped = self.chunks.len();
        self.chunks.clear();
        tracing::debug!("Pipeline resources released ({dropped} chunks discarded)");
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!("Pipeline handle dropped without explicit release");
            self.release();
        }
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("source", &self.source.is_some())
            .field("audio", &self.audio.is_some())
            .field("surface", &self.surface.is_some())
            .field("encoder", &self.encoder.is_some())
            .field("chunks", &self.chunks.len())
            .field("released", &self.released)
            .finish()
    }
}
