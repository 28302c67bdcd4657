//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which wires a [`JobCoordinator`] and a
//! [`ConversionService`] to a [`SyntheticRuntime`] with default
//! configuration. Tests run on a paused tokio clock, so real-time playback
//! of long sources completes instantly.

#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use cf_core::config::Config;
use cf_core::{FileFormat, QualityTier};
use cf_pipeline::{ConversionRequest, SyntheticMedia, SyntheticRuntime};
use clipforge::bridge::MessageBridge;
use clipforge::conversion::ConversionService;
use clipforge::state::JobCoordinator;

pub struct TestHarness {
    pub config: Config,
    pub runtime: Arc<SyntheticRuntime>,
    pub coordinator: Arc<JobCoordinator>,
    pub service: ConversionService,
}

impl TestHarness {
    /// Harness around a runtime that can encode every container.
    pub fn new(media: SyntheticMedia) -> Self {
        Self::with_runtime(SyntheticRuntime::new(media))
    }

    pub fn with_runtime(runtime: SyntheticRuntime) -> Self {
        let config = Config::default();
        let runtime = Arc::new(runtime);
        let coordinator = JobCoordinator::new(&config.coordinator);
        let service = ConversionService::new(
            coordinator.clone(),
            runtime.clone(),
            config.pipeline.clone(),
        );
        Self {
            config,
            runtime,
            coordinator,
            service,
        }
    }

    /// Start a message bridge routing to this harness's service.
    pub fn bridge(&self) -> MessageBridge {
        MessageBridge::spawn(self.service.clone(), self.config.coordinator.channel_capacity)
    }
}

/// A request with `size` zero bytes of source data.
pub fn request_sized(
    file_name: &str,
    format: FileFormat,
    quality: QualityTier,
    size: usize,
) -> ConversionRequest {
    ConversionRequest::new(Bytes::from(vec![0u8; size]), file_name, format, quality)
}

pub fn request(file_name: &str, format: FileFormat, quality: QualityTier) -> ConversionRequest {
    request_sized(file_name, format, quality, 64 * 1024)
}
