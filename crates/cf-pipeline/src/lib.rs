//! # cf-pipeline
//!
//! The conversion orchestration core.
//!
//! - **[`classify`]** -- media kind of a source and the conversion variant of
//!   a request.
//! - **[`policy`]** -- bitrates and container MIME per quality tier, with
//!   fallback negotiation against the runtime's encoder capabilities.
//! - **[`runtime`]** -- the decode source, audio route, frame surface, and
//!   streaming encoder contracts a host supplies.
//! - **[`ConversionPipeline`]** -- the load / build / encode / finalize state
//!   machine, owning its resources through a [`PipelineHandle`].
//! - **[`ProgressReporter`]** -- monotonic progress relay with a pollable
//!   last value.
//! - **[`synthetic`]** -- an in-process runtime driven by the tokio clock.

pub mod classify;
pub mod handle;
pub mod pipeline;
pub mod policy;
pub mod progress;
pub mod request;
pub mod runtime;
pub mod synthetic;

pub use classify::{classify_media_kind, classify_variant, ConversionVariant};
pub use handle::PipelineHandle;
pub use pipeline::{ConversionPipeline, PipelineState, RunSummary};
pub use policy::{
    negotiate_mime, resolve_audio_bitrate, resolve_container_mime, resolve_video_bitrate,
    EncodeProfile,
};
pub use progress::{playback_percent, Progress, ProgressReporter};
pub use request::{ConversionOutput, ConversionRequest};
pub use runtime::{EncoderCapabilities, MediaRuntime, StaticCapabilities};
pub use synthetic::{SyntheticMedia, SyntheticRuntime};
