//! clipforge - real-time media conversion orchestrator
//!
//! This library crate exposes the job coordinator, the conversion service,
//! and the cross-context message bridge for integration testing.

pub mod bridge;
pub mod conversion;
pub mod state;
