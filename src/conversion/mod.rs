//! Conversion service.
//!
//! Accepts a request through the job coordinator, runs the pipeline on its
//! own task, and reports progress and the final result back to the
//! coordinator.

mod service;

pub use service::{ConversionService, JobHandle};
