//! Application configuration types.
//!
//! [`Config`] is deserialized from TOML. Every section defaults to the
//! constants the converter has always used, so an empty file (or no file at
//! all) is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Locations searched by [`load_config_or_default`], in order.
const DEFAULT_PATHS: [&str; 3] = [
    "./clipforge.toml",
    "~/.config/clipforge/config.toml",
    "/etc/clipforge/config.toml",
];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub coordinator: CoordinatorConfig,
}

impl Config {
    /// Deserialize and validate a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str)
            .map_err(|e| Error::Config(format!("config parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.load_timeout_min_ms > p.load_timeout_max_ms {
            return Err(Error::Config(format!(
                "pipeline.load_timeout_min_ms ({}) exceeds load_timeout_max_ms ({})",
                p.load_timeout_min_ms, p.load_timeout_max_ms
            )));
        }
        if p.load_timeout_bytes_per_ms == 0 {
            return Err(Error::Config(
                "pipeline.load_timeout_bytes_per_ms cannot be 0".into(),
            ));
        }
        if p.chunk_interval_ms == 0 || p.progress_interval_ms == 0 {
            return Err(Error::Config(
                "pipeline chunk and progress intervals must be non-zero".into(),
            ));
        }
        if !is_usable_frame_rate(p.fallback_frame_rate) {
            return Err(Error::Config(format!(
                "pipeline.fallback_frame_rate must be within {MIN_FRAME_RATE}..={MAX_FRAME_RATE}, got {}",
                p.fallback_frame_rate
            )));
        }
        if self.coordinator.event_capacity == 0 || self.coordinator.channel_capacity == 0 {
            return Err(Error::Config(
                "coordinator event_capacity and channel_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Return a list of non-fatal configuration notes.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let p = &self.pipeline;

        if p.finalize_grace_ms < p.chunk_interval_ms {
            warnings.push(format!(
                "pipeline.finalize_grace_ms ({}) is shorter than chunk_interval_ms ({}); \
                 the last buffered chunk may be cut short",
                p.finalize_grace_ms, p.chunk_interval_ms
            ));
        }
        if p.progress_interval_ms < p.chunk_interval_ms {
            warnings.push(
                "pipeline.progress_interval_ms is shorter than chunk_interval_ms".into(),
            );
        }
        if self.coordinator.history_size == 0 {
            warnings.push("coordinator.history_size is 0; finished jobs are not kept".into());
        }

        warnings
    }
}

/// Slowest frame rate the pipeline will sample at.
pub const MIN_FRAME_RATE: f64 = 0.1;

/// Fastest frame rate the pipeline will sample at.
pub const MAX_FRAME_RATE: f64 = 1000.0;

/// Whether `fps` is a frame rate the pipeline can sample at.
pub fn is_usable_frame_rate(fps: f64) -> bool {
    (MIN_FRAME_RATE..=MAX_FRAME_RATE).contains(&fps)
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Timing parameters of the conversion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Lower bound of the source-load budget.
    pub load_timeout_min_ms: u64,
    /// Upper bound of the source-load budget.
    pub load_timeout_max_ms: u64,
    /// Source bytes granted per millisecond of load budget.
    pub load_timeout_bytes_per_ms: u64,
    /// Encoder flush cadence.
    pub chunk_interval_ms: u64,
    /// Progress sampling cadence.
    pub progress_interval_ms: u64,
    /// Delay between end of playback and stopping the encoder.
    pub finalize_grace_ms: u64,
    /// Frame sampling rate when the source does not report one.
    pub fallback_frame_rate: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            load_timeout_min_ms: 60_000,
            load_timeout_max_ms: 300_000,
            load_timeout_bytes_per_ms: 10,
            chunk_interval_ms: 100,
            progress_interval_ms: 500,
            finalize_grace_ms: 500,
            fallback_frame_rate: 30.0,
        }
    }
}

impl PipelineConfig {
    /// Source-load budget for a source of `source_len` bytes, in milliseconds.
    ///
    /// Scales linearly with size and is clamped to
    /// `[load_timeout_min_ms, load_timeout_max_ms]`.
    pub fn load_timeout_ms(&self, source_len: u64) -> u64 {
        let scaled = source_len / self.load_timeout_bytes_per_ms.max(1);
        scaled.clamp(self.load_timeout_min_ms, self.load_timeout_max_ms)
    }

    /// [`load_timeout_ms`](Self::load_timeout_ms) as a `Duration`.
    pub fn load_timeout(&self, source_len: u64) -> Duration {
        Duration::from_millis(self.load_timeout_ms(source_len))
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn finalize_grace(&self) -> Duration {
        Duration::from_millis(self.finalize_grace_ms)
    }
}

/// Job coordinator and message bridge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Broadcast buffer of the event bus.
    pub event_capacity: usize,
    /// Number of finished jobs kept for status queries.
    pub history_size: usize,
    /// Queue depth of the message bridge router.
    pub channel_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            history_size: 20,
            channel_capacity: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    Config::from_toml(&content)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

/// Load config from `custom_path`, else the first default location that
/// exists, else the built-in defaults.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            return load_config(path);
        }
    }

    tracing::debug!("No config file found; using defaults");
    Ok(Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_timeout_scales_and_clamps() {
        let p = PipelineConfig::default();
        assert_eq!(p.load_timeout_ms(0), 60_000);
        assert_eq!(p.load_timeout_ms(1_000_000), 100_000);
        assert_eq!(p.load_timeout_ms(4_000_000_000), 300_000);
        assert_eq!(p.load_timeout(2_000_000), Duration::from_secs(200));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [pipeline]
            progress_interval_ms = 250

            [coordinator]
            history_size = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.progress_interval_ms, 250);
        assert_eq!(config.pipeline.chunk_interval_ms, 100);
        assert_eq!(config.coordinator.history_size, 5);
        assert_eq!(config.coordinator.event_capacity, 256);
    }

    #[test]
    fn inverted_timeout_bounds_rejected() {
        let err = Config::from_toml(
            "[pipeline]\nload_timeout_min_ms = 10\nload_timeout_max_ms = 5\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn bad_frame_rate_rejected() {
        let mut config = Config::default();
        for fps in [0.0, -24.0, f64::NAN, f64::INFINITY, 1e-300, 1e10] {
            config.pipeline.fallback_frame_rate = fps;
            assert!(config.validate().is_err(), "{fps}");
        }
        config.pipeline.fallback_frame_rate = 24.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = Config::from_toml("[pipeline\n").unwrap_err();
        assert!(err.to_string().contains("config parse error"));
    }

    #[test]
    fn warnings_flag_short_grace() {
        let mut config = Config::default();
        assert!(config.warnings().is_empty());
        config.pipeline.finalize_grace_ms = 50;
        assert_eq!(config.warnings().len(), 1);
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipforge.toml");
        std::fs::write(&path, "[pipeline]\nfinalize_grace_ms = 750\n").unwrap();
        let config = load_config_or_default(Some(&path)).unwrap();
        assert_eq!(config.pipeline.finalize_grace_ms, 750);
    }

    #[test]
    fn missing_explicit_path_is_io_error() {
        let err = load_config(Path::new("/nonexistent/clipforge.toml")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
