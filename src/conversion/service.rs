//! Runs conversions detached from whichever surface requested them.

use std::sync::Arc;

use cf_core::config::PipelineConfig;
use cf_core::{Error, JobId, Result};
use cf_pipeline::{
    classify_media_kind, classify_variant, ConversionOutput, ConversionPipeline,
    ConversionRequest, MediaRuntime, ProgressReporter,
};
use tokio::task::JoinHandle;

use crate::state::JobCoordinator;

/// Starts pipeline runs through the [`JobCoordinator`].
///
/// A started job runs on its own task; nothing a surface does afterwards
/// (including disappearing) can cancel it.
#[derive(Clone)]
pub struct ConversionService {
    coordinator: Arc<JobCoordinator>,
    runtime: Arc<dyn MediaRuntime>,
    config: PipelineConfig,
}

impl ConversionService {
    pub fn new(
        coordinator: Arc<JobCoordinator>,
        runtime: Arc<dyn MediaRuntime>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            coordinator,
            runtime,
            config,
        }
    }

    pub fn coordinator(&self) -> &Arc<JobCoordinator> {
        &self.coordinator
    }

    /// Accept `request` and start converting it in the background.
    ///
    /// Requests that can never succeed (unknown source format, audio to
    /// video) are rejected before they claim the job slot.
    pub fn start(&self, request: ConversionRequest) -> Result<JobHandle> {
        let source_kind = classify_media_kind(&request.file_name)?;
        classify_variant(source_kind, request.output_format)?;

        let job_id = self.coordinator.start_job(&request)?;

        let progress = Arc::new(ProgressReporter::new());
        let listener = self.coordinator.clone();
        progress.add_listener(move |p| listener.update_progress(job_id, p));

        let pipeline = ConversionPipeline::new(self.runtime.clone(), self.config.clone())
            .with_progress(progress);
        let guard = CompletionGuard {
            coordinator: self.coordinator.clone(),
            job_id,
            armed: true,
        };

        let task = tokio::spawn(run_job(pipeline, request, guard));
        Ok(JobHandle { job_id, task })
    }

    /// Start `request` and wait for its result.
    pub async fn convert(&self, request: ConversionRequest) -> Result<ConversionOutput> {
        self.start(request)?.wait().await
    }
}

async fn run_job(
    mut pipeline: ConversionPipeline,
    request: ConversionRequest,
    mut guard: CompletionGuard,
) -> Result<ConversionOutput> {
    let result = pipeline.run(&request).await;
    guard.finish(&result);
    result
}

/// Marks the job complete even if the task unwinds or is aborted.
struct CompletionGuard {
    coordinator: Arc<JobCoordinator>,
    job_id: JobId,
    armed: bool,
}

impl CompletionGuard {
    fn finish(&mut self, result: &Result<ConversionOutput>) {
        self.armed = false;
        self.coordinator.complete_job(self.job_id, result);
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::error!("Conversion task for job {} ended without a result", self.job_id);
            self.coordinator.complete_job(
                self.job_id,
                &Err(Error::Internal("conversion task ended unexpectedly".into())),
            );
        }
    }
}

/// Handle to a started job. Dropping it detaches; the job keeps running.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    task: JoinHandle<Result<ConversionOutput>>,
}

impl JobHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> Result<ConversionOutput> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("conversion task failed: {e}")))?
    }
}
