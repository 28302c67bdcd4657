//! Job coordinator: the single source of truth for whether a conversion is
//! running, its latest progress, and the result of the last one.

mod types;

pub use types::*;

use std::collections::VecDeque;
use std::sync::Arc;

use cf_core::config::CoordinatorConfig;
use cf_core::events::{Event, EventBus, EventPayload};
use cf_core::{Error, JobId, Result};
use cf_pipeline::pipeline::STATUS_COMPLETE;
use cf_pipeline::{ConversionOutput, ConversionRequest, Progress};
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;

const STATUS_STARTING: &str = "Starting conversion...";

struct Slot {
    state: JobState,
    /// Progress of the last finished job, reported while idle.
    last_progress: Progress,
}

pub struct JobCoordinator {
    slot: RwLock<Slot>,
    finished: RwLock<Option<FinishedJob>>,
    history: RwLock<VecDeque<JobRecord>>,
    history_size: usize,
    events: EventBus,
}

impl JobCoordinator {
    pub fn new(config: &CoordinatorConfig) -> Arc<Self> {
        Arc::new(Self {
            slot: RwLock::new(Slot {
                state: JobState::Idle,
                last_progress: Progress::default(),
            }),
            finished: RwLock::new(None),
            history: RwLock::new(VecDeque::with_capacity(config.history_size)),
            history_size: config.history_size,
            events: EventBus::new(config.event_capacity),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// The `n` most recent lifecycle events, newest first.
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        self.events.recent_events(n)
    }

    /// Claim the slot for `request`.
    ///
    /// Fails with [`Error::AlreadyRunning`] while another job runs; the
    /// running job is left untouched and nothing is queued.
    pub fn start_job(&self, request: &ConversionRequest) -> Result<JobId> {
        let job_id = {
            let mut slot = self.slot.write();
            if let JobState::Running(running) = &slot.state {
                tracing::warn!(
                    "Rejecting {}: job {} is still running",
                    request.file_name,
                    running.job_id
                );
                return Err(Error::AlreadyRunning {
                    job_id: running.job_id,
                });
            }

            let job_id = JobId::new();
            slot.state = JobState::Running(RunningJob {
                job_id,
                file_name: request.file_name.clone(),
                output_format: request.output_format,
                quality: request.quality,
                progress: Progress::new(0, STATUS_STARTING),
                started_at: Utc::now(),
            });
            job_id
        };

        *self.finished.write() = None;
        tracing::info!("Job {job_id} started for {}", request.file_name);
        self.events.broadcast(EventPayload::JobStarted {
            job_id,
            file_name: request.file_name.clone(),
            output_format: request.output_format,
            quality: request.quality,
        });
        Ok(job_id)
    }

    /// Record progress of the running job. Updates for any other job are
    /// ignored.
    pub fn update_progress(&self, job_id: JobId, progress: &Progress) {
        {
            let mut slot = self.slot.write();
            match &mut slot.state {
                JobState::Running(running) if running.job_id == job_id => {
                    running.progress = progress.clone();
                }
                _ => {
                    tracing::debug!("Ignoring progress for inactive job {job_id}");
                    return;
                }
            }
        }
        self.events.broadcast(EventPayload::JobProgress {
            job_id,
            percent: progress.percent,
            status: progress.status.clone(),
        });
    }

    /// Return the slot to idle and retain the outcome.
    ///
    /// Returns `false` when `job_id` is not the running job.
    pub fn complete_job(&self, job_id: JobId, result: &Result<ConversionOutput>) -> bool {
        let running = {
            let mut slot = self.slot.write();
            let running = match &slot.state {
                JobState::Running(running) if running.job_id == job_id => running.clone(),
                _ => {
                    tracing::warn!("complete_job for inactive job {job_id}");
                    return false;
                }
            };
            slot.last_progress = match result {
                Ok(_) => Progress::new(100, STATUS_COMPLETE),
                Err(e) => Progress::new(running.progress.percent, format!("Conversion failed: {e}")),
            };
            slot.state = JobState::Idle;
            running
        };

        let outcome = match result {
            Ok(output) => JobOutcome::Succeeded {
                mime_type: output.mime_type.clone(),
                size: output.size,
            },
            Err(e) => JobOutcome::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        };

        *self.finished.write() = Some(FinishedJob {
            job_id,
            output_file_name: cf_core::output_file_name(&running.file_name, running.output_format),
            result: result.as_ref().map(Clone::clone).map_err(FailureResponse::from),
        });
        self.add_to_history(JobRecord {
            job_id,
            file_name: running.file_name,
            output_format: running.output_format,
            quality: running.quality,
            outcome: outcome.clone(),
            started_at: running.started_at,
            finished_at: Utc::now(),
        });

        match outcome {
            JobOutcome::Succeeded { mime_type, size } => {
                tracing::info!("Job {job_id} completed ({})", cf_core::format_bytes(size));
                self.events.broadcast(EventPayload::JobCompleted {
                    job_id,
                    mime_type,
                    size,
                });
            }
            JobOutcome::Failed { kind, message } => {
                tracing::error!("Job {job_id} failed: {message}");
                self.events.broadcast(EventPayload::JobFailed {
                    job_id,
                    kind,
                    message,
                });
            }
        }
        true
    }

    pub fn state(&self) -> JobState {
        self.slot.read().state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.slot.read().state.is_running()
    }

    /// Current status. Reading never changes it.
    pub fn status(&self) -> JobStatus {
        let slot = self.slot.read();
        match &slot.state {
            JobState::Running(running) => JobStatus {
                in_progress: true,
                progress: running.progress.clone(),
            },
            JobState::Idle => JobStatus {
                in_progress: false,
                progress: slot.last_progress.clone(),
            },
        }
    }

    /// Hand out the last finished result once.
    pub fn take_result(&self) -> Option<FinishedJob> {
        self.finished.write().take()
    }

    pub fn peek_result(&self) -> Option<FinishedJob> {
        self.finished.read().clone()
    }

    /// Finished jobs, newest first.
    pub fn history(&self, limit: usize) -> Vec<JobRecord> {
        self.history.read().iter().take(limit).cloned().collect()
    }

    fn add_to_history(&self, record: JobRecord) {
        let mut history = self.history.write();
        history.push_front(record);
        while history.len() > self.history_size {
            history.pop_back();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use cf_core::events::EventPayload;
    use cf_core::{ErrorKind, FileFormat, QualityTier};

    fn coordinator() -> Arc<JobCoordinator> {
        JobCoordinator::new(&CoordinatorConfig {
            history_size: 2,
            ..Default::default()
        })
    }

    fn request(name: &str) -> ConversionRequest {
        ConversionRequest::new(Bytes::from_static(b"data"), name, FileFormat::Mp3, QualityTier::High)
    }

    fn output() -> ConversionOutput {
        ConversionOutput::new(Bytes::from_static(b"out"), "audio/mpeg")
    }

    #[test]
    fn starts_idle() {
        let c = coordinator();
        assert_eq!(c.state(), JobState::Idle);
        assert!(!c.status().in_progress);
        assert!(c.take_result().is_none());
    }

    #[test]
    fn second_start_is_rejected_without_touching_the_first() {
        let c = coordinator();
        let first = c.start_job(&request("a.mp4")).unwrap();
        c.update_progress(first, &Progress::new(42, "Recording audio... 42%"));
        let before = c.state();

        let err = c.start_job(&request("b.mp4")).unwrap_err();
        assert_matches!(err, Error::AlreadyRunning { job_id } if job_id == first);
        assert_eq!(err.kind(), ErrorKind::AlreadyRunningError);
        assert_eq!(c.state(), before);
    }

    #[test]
    fn status_reads_are_idempotent() {
        let c = coordinator();
        let id = c.start_job(&request("a.mp4")).unwrap();
        c.update_progress(id, &Progress::new(17, "Converting... 17%"));
        let first = c.status();
        for _ in 0..10 {
            assert_eq!(c.status(), first);
        }
        assert_eq!(first.progress.percent, 17);
    }

    #[test]
    fn stale_progress_is_ignored() {
        let c = coordinator();
        let id = c.start_job(&request("a.mp4")).unwrap();
        c.update_progress(JobId::new(), &Progress::new(90, "nope"));
        assert_eq!(c.status().progress.percent, 0);
        assert!(c.complete_job(id, &Ok(output())));
        c.update_progress(id, &Progress::new(10, "late"));
        assert_eq!(c.status().progress, Progress::new(100, STATUS_COMPLETE));
    }

    #[test]
    fn success_records_final_progress_and_result() {
        let c = coordinator();
        let id = c.start_job(&request("clip.mp4")).unwrap();
        assert!(c.complete_job(id, &Ok(output())));

        assert_eq!(c.state(), JobState::Idle);
        let status = c.status();
        assert!(!status.in_progress);
        assert_eq!(status.progress.percent, 100);

        let finished = c.take_result().unwrap();
        assert_eq!(finished.job_id, id);
        assert_eq!(finished.output_file_name, "clip.mp3");
        assert_eq!(finished.result.unwrap().size, 3);
        assert!(c.take_result().is_none());
    }

    #[test]
    fn failure_is_exposed_to_listeners() {
        let c = coordinator();
        let mut rx = c.subscribe();
        let id = c.start_job(&request("clip.mp4")).unwrap();
        assert!(c.complete_job(id, &Err(Error::NoAudioTrack)));

        let finished = c.peek_result().unwrap();
        let failure = finished.result.unwrap_err();
        assert_eq!(failure.error_kind, ErrorKind::NoAudioTrack);
        assert!(c.status().progress.status.starts_with("Conversion failed"));

        assert_matches!(rx.try_recv().unwrap().payload, EventPayload::JobStarted { .. });
        assert_matches!(
            rx.try_recv().unwrap().payload,
            EventPayload::JobFailed { kind: ErrorKind::NoAudioTrack, .. }
        );
    }

    #[test]
    fn history_is_bounded() {
        let c = coordinator();
        for name in ["a.mp4", "b.mp4", "c.mp4"] {
            let id = c.start_job(&request(name)).unwrap();
            c.complete_job(id, &Ok(output()));
        }
        let history = c.history(10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].file_name, "c.mp4");
        assert!(history.iter().all(JobRecord::succeeded));
    }

    #[test]
    fn completing_an_unknown_job_is_a_no_op() {
        let c = coordinator();
        assert!(!c.complete_job(JobId::new(), &Ok(output())));
        assert_eq!(c.state(), JobState::Idle);
        assert!(c.history(10).is_empty());
    }
}
