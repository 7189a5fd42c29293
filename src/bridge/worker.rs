use super::factory::EngineFactory;
use super::protocol::{WorkerRequest, WorkerResponse};
use crate::engine::{Engine, EngineError, ProgressReporter};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub(super) const WORKER_THREAD_NAME: &str = "parrot-engine";

/// Starts the engine on its own OS thread with a private single-threaded runtime.
pub(super) fn spawn(
    factory: Arc<dyn EngineFactory>,
    requests: mpsc::UnboundedReceiver<WorkerRequest>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Engine worker: failed to start runtime: {}", e);
                    return;
                }
            };
            runtime.block_on(run(factory, requests, responses));
        })
}

/// Handles requests strictly in arrival order, one task at a time.
async fn run(
    factory: Arc<dyn EngineFactory>,
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
) {
    let mut engine: Option<Engine> = None;

    while let Some(request) = requests.recv().await {
        let (task_id, task) = match request {
            WorkerRequest::Initialize { credentials } => {
                let reply = if engine.is_some() {
                    debug!("Engine worker: already initialized");
                    WorkerResponse::Initialized
                } else {
                    match factory.build(&credentials) {
                        Ok(built) => {
                            info!("Engine worker: initialized");
                            engine = Some(built);
                            WorkerResponse::Initialized
                        }
                        Err(e) => {
                            error!("Engine worker: initialization failed: {:#}", e);
                            WorkerResponse::InitializeFailed {
                                error: EngineError::EngineUnavailable(format!(
                                    "initialization failed: {:#}",
                                    e
                                )),
                            }
                        }
                    }
                };
                if responses.send(reply).is_err() {
                    break;
                }
                continue;
            }
            other => match other.into_task() {
                Some(task) => task,
                None => continue,
            },
        };

        let reply = match engine.as_ref() {
            None => WorkerResponse::Error {
                task_id,
                error: EngineError::EngineUnavailable("engine is not initialized".to_string()),
            },
            Some(engine) => {
                debug!("Engine worker: running {} task {}", task.name(), task_id);
                let progress_tx = responses.clone();
                let reporter = ProgressReporter::new(move |event| {
                    let _ = progress_tx.send(WorkerResponse::progress(event));
                });

                match engine.run(&task, &reporter).await {
                    Ok(data) => {
                        debug!("Engine worker: {} task {} completed", task.name(), task_id);
                        WorkerResponse::Result { task_id, data }
                    }
                    Err(error) => {
                        warn!(
                            "Engine worker: {} task {} failed: {}",
                            task.name(),
                            task_id,
                            error
                        );
                        WorkerResponse::Error { task_id, error }
                    }
                }
            }
        };

        if responses.send(reply).is_err() {
            break;
        }
    }

    debug!("Engine worker: request channel closed, shutting down");
}
