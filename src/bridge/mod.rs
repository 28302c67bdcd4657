//! Cross-context message bridge.
//!
//! UI surfaces come and go independently of the running job. Each surface
//! talks to the bridge through its own [`SurfaceClient`]; a single router
//! task answers requests from the [`JobCoordinator`](crate::state::JobCoordinator),
//! which stays the only source of truth for whether a job is running.

mod messages;

pub use messages::{BridgeRequest, BridgeResponse, ResultResponse, StartConversion};

use cf_core::events::Event;
use cf_core::{ErrorKind, JobId, SurfaceId};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::conversion::ConversionService;
use crate::state::{FailureResponse, JobStatus};

struct Envelope {
    surface: SurfaceId,
    request: BridgeRequest,
    reply: oneshot::Sender<BridgeResponse>,
}

/// Owner of the router task.
pub struct MessageBridge {
    tx: mpsc::Sender<Envelope>,
    service: ConversionService,
    router: JoinHandle<()>,
}

impl MessageBridge {
    /// Start the router. `capacity` bounds the queue of pending requests.
    pub fn spawn(service: ConversionService, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let router = tokio::spawn(route(service.clone(), rx));
        Self {
            tx,
            service,
            router,
        }
    }

    /// Open a channel for a new surface.
    pub fn connect(&self) -> SurfaceClient {
        let id = SurfaceId::new();
        tracing::debug!("Surface {id} connected");
        SurfaceClient {
            id,
            tx: self.tx.clone(),
            events: self.service.coordinator().subscribe(),
        }
    }

    pub fn service(&self) -> &ConversionService {
        &self.service
    }

    /// Stop routing. Running jobs are not affected.
    pub fn shutdown(self) {
        self.router.abort();
    }
}

async fn route(service: ConversionService, mut rx: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = rx.recv().await {
        let response = handle(&service, envelope.surface, envelope.request);
        if envelope.reply.send(response).is_err() {
            tracing::debug!("Surface {} went away before its reply", envelope.surface);
        }
    }
    tracing::debug!("Message bridge closed");
}

fn handle(service: &ConversionService, surface: SurfaceId, request: BridgeRequest) -> BridgeResponse {
    let coordinator = service.coordinator();
    match request {
        BridgeRequest::StartConversion { data } => {
            tracing::info!("Surface {surface} requested conversion of {}", data.file_name);
            let started = data.into_request().and_then(|request| service.start(request));
            match started {
                // The handle is dropped; the job runs detached from the surface.
                Ok(job) => BridgeResponse::Started {
                    job_id: job.job_id(),
                },
                Err(e) => BridgeResponse::Error(FailureResponse::from(&e)),
            }
        }
        BridgeRequest::IsConversionInProgress | BridgeRequest::GetStatus => {
            BridgeResponse::Status(coordinator.status())
        }
        BridgeRequest::TakeResult => BridgeResponse::Result(
            coordinator
                .take_result()
                .map_or_else(ResultResponse::empty, ResultResponse::from),
        ),
    }
}

fn bridge_closed() -> FailureResponse {
    FailureResponse::new(ErrorKind::Internal, "message bridge is closed")
}

fn unexpected(response: BridgeResponse) -> FailureResponse {
    match response {
        BridgeResponse::Error(failure) => failure,
        other => FailureResponse::new(ErrorKind::Internal, format!("unexpected reply: {other:?}")),
    }
}

/// One surface's channel to the bridge.
///
/// Requests take `&mut self`, so a channel never has more than one request
/// in flight. Dropping the client does not affect any job.
pub struct SurfaceClient {
    id: SurfaceId,
    tx: mpsc::Sender<Envelope>,
    events: broadcast::Receiver<Event>,
}

impl SurfaceClient {
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub async fn request(&mut self, request: BridgeRequest) -> Result<BridgeResponse, FailureResponse> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Envelope {
                surface: self.id,
                request,
                reply,
            })
            .await
            .map_err(|_| bridge_closed())?;
        response.await.map_err(|_| bridge_closed())
    }

    pub async fn start_conversion(&mut self, data: StartConversion) -> Result<JobId, FailureResponse> {
        match self.request(BridgeRequest::StartConversion { data }).await? {
            BridgeResponse::Started { job_id } => Ok(job_id),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status(&mut self) -> Result<JobStatus, FailureResponse> {
        match self.request(BridgeRequest::GetStatus).await? {
            BridgeResponse::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    pub async fn is_conversion_in_progress(&mut self) -> Result<bool, FailureResponse> {
        match self.request(BridgeRequest::IsConversionInProgress).await? {
            BridgeResponse::Status(status) => Ok(status.in_progress),
            other => Err(unexpected(other)),
        }
    }

    pub async fn take_result(&mut self) -> Result<ResultResponse, FailureResponse> {
        match self.request(BridgeRequest::TakeResult).await? {
            BridgeResponse::Result(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    /// Wait until `job_id` finishes, then take its result.
    pub async fn wait_for_completion(&mut self, job_id: JobId) -> Result<ResultResponse, FailureResponse> {
        if self.status().await?.in_progress {
            loop {
                match self.events.recv().await {
                    Ok(event) if event.payload.job_id() == job_id && event.payload.is_terminal() => {
                        break
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Surface {} skipped {skipped} events", self.id);
                        if !self.status().await?.in_progress {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        self.take_result().await
    }
}

impl Drop for SurfaceClient {
    fn drop(&mut self) {
        tracing::debug!("Surface {} disconnected", self.id);
    }
}
