//! Progress relay with a retained last value.
//!
//! The pipeline pushes `(percent, status)` updates; listeners registered with
//! [`ProgressReporter::add_listener`] receive them as callbacks, and anyone
//! holding the reporter can poll [`ProgressReporter::current`] at any time.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Last known progress of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 0..=100.
    pub percent: u8,
    pub status: String,
}

impl Progress {
    pub fn new(percent: u8, status: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            status: status.into(),
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(0, "")
    }
}

/// Percentage of `position` within `duration`, or `None` when the duration
/// is unknown, NaN, infinite, or non-positive.
pub fn playback_percent(position: f64, duration: Option<f64>) -> Option<u8> {
    let duration = duration.filter(|d| d.is_finite() && *d > 0.0)?;
    if !position.is_finite() {
        return None;
    }
    let percent = (position / duration * 100.0).round().clamp(0.0, 100.0);
    Some(percent as u8)
}

type Listener = Box<dyn Fn(&Progress) + Send + Sync>;

/// Relays progress to zero or more listeners and retains the last value.
///
/// Percent never decreases between [`reset`](Self::reset) calls; a lower
/// sample only updates the status text.
pub struct ProgressReporter {
    current: RwLock<Progress>,
    listeners: RwLock<Vec<Listener>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Progress::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener. It is not replayed the current value.
    pub fn add_listener(&self, listener: impl Fn(&Progress) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    /// Record an update and forward it to every listener.
    ///
    /// A sample below the stored percent is stale and dropped whole, status
    /// text included.
    pub fn report(&self, percent: u8, status: impl Into<String>) {
        let percent = percent.min(100);
        let snapshot = {
            let mut current = self.current.write();
            if percent < current.percent {
                tracing::trace!("Dropping stale progress sample {percent}% < {}%", current.percent);
                return;
            }
            current.percent = percent;
            current.status = status.into();
            current.clone()
        };
        for listener in self.listeners.read().iter() {
            listener(&snapshot);
        }
    }

    /// Change only the status text.
    pub fn set_status(&self, status: impl Into<String>) {
        let percent = self.current.read().percent;
        self.report(percent, status);
    }

    /// Last known value. Reading never mutates.
    pub fn current(&self) -> Progress {
        self.current.read().clone()
    }

    pub fn reset(&self) {
        *self.current.write() = Progress::default();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("current", &*self.current.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn percent_skips_unknown_duration() {
        assert_eq!(playback_percent(3.0, None), None);
        assert_eq!(playback_percent(3.0, Some(f64::NAN)), None);
        assert_eq!(playback_percent(3.0, Some(f64::INFINITY)), None);
        assert_eq!(playback_percent(3.0, Some(0.0)), None);
    }

    #[test]
    fn percent_rounds_and_clamps() {
        assert_eq!(playback_percent(0.0, Some(10.0)), Some(0));
        assert_eq!(playback_percent(2.5, Some(10.0)), Some(25));
        assert_eq!(playback_percent(1.0, Some(3.0)), Some(33));
        assert_eq!(playback_percent(12.0, Some(10.0)), Some(100));
        assert_eq!(playback_percent(-1.0, Some(10.0)), Some(0));
    }

    #[test]
    fn works_without_listeners() {
        let reporter = ProgressReporter::new();
        reporter.report(40, "Converting... 40%");
        assert_eq!(reporter.current(), Progress::new(40, "Converting... 40%"));
    }

    #[test]
    fn listeners_receive_updates() {
        let reporter = ProgressReporter::new();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let sink = seen.clone();
        reporter.add_listener(move |p| sink.write().push(p.percent));

        reporter.report(10, "a");
        reporter.report(20, "b");
        assert_eq!(*seen.read(), vec![10, 20]);
    }

    #[test]
    fn percent_is_monotonic() {
        let reporter = ProgressReporter::new();
        reporter.report(60, "Converting... 60%");
        reporter.report(40, "Converting... 40%");
        assert_eq!(reporter.current(), Progress::new(60, "Converting... 60%"));

        reporter.set_status("Finalizing...");
        assert_eq!(reporter.current(), Progress::new(60, "Finalizing..."));

        reporter.reset();
        assert_eq!(reporter.current().percent, 0);
    }

    #[test]
    fn polling_is_idempotent() {
        let reporter = ProgressReporter::new();
        reporter.report(37, "Converting... 37%");
        let first = reporter.current();
        for _ in 0..5 {
            assert_eq!(reporter.current(), first);
        }
    }
}
