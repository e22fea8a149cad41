//! Background execution of a generation session.
//!
//! The worker owns its session and request for the duration of the call and
//! reports back over a channel with three one-way signals. Nothing else is
//! shared with the thread that started it.

use crate::context::MissingFilePolicy;
use crate::error::Result;
use crate::provider::Provider;
use crate::session::{GenerationRequest, GenerationSession};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Human-readable description of what is being generated.
    Started(String),
    Succeeded(String),
    Failed(String),
}

impl WorkerEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerEvent::Started(_))
    }
}

pub struct GenerationWorker;

impl GenerationWorker {
    /// Resolve the provider, then run the session on a tokio task.
    ///
    /// Configuration errors are returned here, before anything is spawned.
    pub fn start(
        request: GenerationRequest,
        http: reqwest::Client,
        policy: MissingFilePolicy,
    ) -> Result<WorkerHandle> {
        let mut session = GenerationSession::new(http, policy);
        session.resolve_provider(&request.provider)?;
        Ok(Self::spawn(session, request))
    }

    /// Run an already-prepared session on a tokio task.
    pub fn spawn(mut session: GenerationSession, request: GenerationRequest) -> WorkerHandle {
        let (tx, rx) = mpsc::unbounded_channel::<WorkerEvent>();

        let task = tokio::spawn(async move {
            let (provider, model) = match session.resolve_provider(&request.provider) {
                Ok(p) => (p.name(), p.model().to_string()),
                Err(e) => {
                    let _ = tx.send(WorkerEvent::Failed(e.to_string()));
                    return;
                }
            };

            let _ = tx.send(WorkerEvent::Started(format!(
                "Generating content with {provider} (model: {model}) for target '{}'...",
                request.target_file_name
            )));
            tracing::info!(
                event = "ui_generation_thread_start",
                provider,
                model = %model,
                target_file = %request.target_file_name
            );

            match session.run(&request).await {
                Ok(result) => {
                    tracing::info!(event = "ui_generation_thread_success", output_length = result.char_length);
                    let _ = tx.send(WorkerEvent::Succeeded(result.text));
                }
                Err(e) => {
                    tracing::error!(event = "ui_generation_thread_error", error_type = ?e, message = %e);
                    let _ = tx.send(WorkerEvent::Failed(e.to_string()));
                }
            }
        });

        WorkerHandle { events: rx, task }
    }
}

/// The caller's side of a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Next signal from the worker; `None` once the worker is gone.
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// True once the task has ended. Its last event may still be queued.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the worker abruptly. Output not yet delivered is lost and the
    /// backend request may keep running server-side.
    pub fn terminate(&self) {
        tracing::info!(event = "worker_terminate");
        self.task.abort();
    }

    /// Wait for the worker task to end, whether it finished or was aborted.
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}
