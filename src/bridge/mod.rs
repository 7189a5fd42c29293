//! Runs an [`Engine`](crate::engine::Engine) away from the bot's event loop.
//!
//! The bridge owns a worker thread with its own runtime and talks to it only
//! through [`protocol`] messages. Requests are admitted in FIFO order and the
//! worker executes one at a time; each request gets its own progress stream
//! and result through a [`TaskHandle`].

pub mod factory;
pub mod protocol;
mod worker;

use crate::corpus::Filter;
use crate::engine::{
    CollectRequest, EngineError, GenerateRequest, ProgressEvent, TaskOutput, TaskRequest,
};
use factory::EngineFactory;
use protocol::{EngineCredentials, WorkerRequest, WorkerResponse};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

type TaskResult = Result<TaskOutput, EngineError>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PendingTask {
    task_id: u64,
    progress: mpsc::UnboundedSender<ProgressEvent>,
    result: oneshot::Sender<TaskResult>,
}

/// State shared between the bridge and its response dispatcher.
struct Shared {
    pending: Mutex<VecDeque<PendingTask>>,
    init_waiters: Mutex<VecDeque<oneshot::Sender<Result<(), EngineError>>>>,
    alive: AtomicBool,
    initialized: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            init_waiters: Mutex::new(VecDeque::new()),
            alive: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
        }
    }

    fn is_ready(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && self.initialized.load(Ordering::SeqCst)
    }

    fn handle(&self, response: WorkerResponse) {
        match response {
            WorkerResponse::Initialized => {
                self.initialized.store(true, Ordering::SeqCst);
                if let Some(waiter) = lock(&self.init_waiters).pop_front() {
                    let _ = waiter.send(Ok(()));
                }
            }
            WorkerResponse::InitializeFailed { error } => {
                if let Some(waiter) = lock(&self.init_waiters).pop_front() {
                    let _ = waiter.send(Err(error));
                }
            }
            WorkerResponse::Progress { event, data } => {
                let pending = lock(&self.pending);
                match pending.front() {
                    Some(task) => {
                        let _ = task.progress.send(data);
                    }
                    None => debug!("Bridge: dropping {} with no outstanding task", event),
                }
            }
            WorkerResponse::Result { task_id, data } => self.complete(task_id, Ok(data)),
            WorkerResponse::Error { task_id, error } => self.complete(task_id, Err(error)),
        }
    }

    fn complete(&self, task_id: u64, outcome: TaskResult) {
        let task = {
            let mut pending = lock(&self.pending);
            pending
                .iter()
                .position(|t| t.task_id == task_id)
                .and_then(|pos| pending.remove(pos))
        };
        match task {
            Some(task) => {
                let _ = task.result.send(outcome);
            }
            None => {
                let err = EngineError::Protocol(format!("reply for unknown task {}", task_id));
                warn!("Bridge: ignoring {}", err);
            }
        }
    }

    fn remove(&self, task_id: u64) {
        lock(&self.pending).retain(|t| t.task_id != task_id);
    }

    /// Rejects everything still waiting on a dead worker.
    fn fail_all(&self, reason: &str) -> usize {
        let tasks: Vec<PendingTask> = lock(&self.pending).drain(..).collect();
        let waiters: Vec<_> = lock(&self.init_waiters).drain(..).collect();
        let failed = tasks.len() + waiters.len();

        for task in tasks {
            let _ = task
                .result
                .send(Err(EngineError::EngineUnavailable(reason.to_string())));
        }
        for waiter in waiters {
            let _ = waiter.send(Err(EngineError::EngineUnavailable(reason.to_string())));
        }
        failed
    }
}

async fn dispatch(
    shared: Arc<Shared>,
    mut responses: mpsc::UnboundedReceiver<WorkerResponse>,
    worker: thread::JoinHandle<()>,
) {
    while let Some(response) = responses.recv().await {
        shared.handle(response);
    }

    shared.alive.store(false, Ordering::SeqCst);
    let panicked = matches!(
        tokio::task::spawn_blocking(move || worker.join()).await,
        Ok(Err(_))
    );
    let reason = if panicked {
        "engine worker crashed"
    } else {
        "engine worker stopped"
    };

    let failed = shared.fail_all(reason);
    if panicked {
        error!("Bridge: {}, rejected {} pending requests", reason, failed);
    } else if failed > 0 {
        warn!("Bridge: {}, rejected {} pending requests", reason, failed);
    } else {
        debug!("Bridge: {}", reason);
    }
}

struct WorkerLink {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    shared: Arc<Shared>,
}

/// A submitted request: its progress stream and eventual result.
pub struct TaskHandle {
    task_id: u64,
    progress: mpsc::UnboundedReceiver<ProgressEvent>,
    result: oneshot::Receiver<TaskResult>,
}

impl TaskHandle {
    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    /// Next progress event, or `None` once the task has finished.
    pub async fn next_progress(&mut self) -> Option<ProgressEvent> {
        self.progress.recv().await
    }

    pub async fn wait(self) -> TaskResult {
        self.result.await.map_err(|_| {
            EngineError::EngineUnavailable("engine dropped the request".to_string())
        })?
    }
}

pub struct EngineBridge {
    factory: Arc<dyn EngineFactory>,
    link: Mutex<Option<Arc<WorkerLink>>>,
    credentials: Mutex<Option<EngineCredentials>>,
    next_task_id: AtomicU64,
}

impl EngineBridge {
    /// Creates a bridge; no worker runs until [`EngineBridge::initialize`].
    pub fn new(factory: impl EngineFactory) -> Self {
        Self {
            factory: Arc::new(factory),
            link: Mutex::new(None),
            credentials: Mutex::new(None),
            next_task_id: AtomicU64::new(1),
        }
    }

    /// Starts the worker if needed and has it build its engine.
    ///
    /// Calling this on an initialized, live bridge does nothing. After the
    /// worker has died this starts a fresh one. Successful credentials are
    /// kept for [`EngineBridge::submit_or_restart`].
    pub async fn initialize(&self, credentials: EngineCredentials) -> Result<(), EngineError> {
        let link = self.ensure_worker()?;
        if link.shared.initialized.load(Ordering::SeqCst) {
            debug!("Bridge: engine already initialized");
            return Ok(());
        }

        let (tx, rx) = oneshot::channel();
        lock(&link.shared.init_waiters).push_back(tx);
        if link
            .requests
            .send(WorkerRequest::Initialize {
                credentials: credentials.clone(),
            })
            .is_err()
        {
            return Err(EngineError::EngineUnavailable(
                "engine worker is not running".to_string(),
            ));
        }

        rx.await.map_err(|_| {
            EngineError::EngineUnavailable("engine worker stopped during initialization".to_string())
        })??;
        *lock(&self.credentials) = Some(credentials);
        info!("Bridge: engine ready");
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        lock(&self.link)
            .as_ref()
            .map_or(false, |link| link.shared.is_ready())
    }

    /// Detaches the worker; it exits once the requests already queued have
    /// been served. A later [`EngineBridge::initialize`] starts a new one.
    pub fn shutdown(&self) {
        lock(&self.credentials).take();
        if lock(&self.link).take().is_some() {
            info!("Bridge: shutting down engine worker");
        }
    }

    pub fn collect(&self, request: CollectRequest) -> Result<TaskHandle, EngineError> {
        self.submit(TaskRequest::Collect(request))
    }

    pub fn generate(&self, request: GenerateRequest) -> Result<TaskHandle, EngineError> {
        self.submit(TaskRequest::Generate(request))
    }

    pub fn stats(&self, filter: Filter) -> Result<TaskHandle, EngineError> {
        self.submit(TaskRequest::Stats(filter))
    }

    /// Like [`EngineBridge::submit`], but a dead worker is restarted once with
    /// the credentials of the last successful initialize before giving up.
    pub async fn submit_or_restart(&self, task: TaskRequest) -> Result<TaskHandle, EngineError> {
        match self.submit(task.clone()) {
            Err(EngineError::EngineUnavailable(reason)) => {
                let credentials = lock(&self.credentials).clone().ok_or_else(|| {
                    EngineError::EngineUnavailable(reason.clone())
                })?;
                warn!("Bridge: {}, restarting engine", reason);
                self.initialize(credentials).await?;
                self.submit(task)
            }
            other => other,
        }
    }

    /// Queues a task behind any already submitted.
    pub fn submit(&self, task: TaskRequest) -> Result<TaskHandle, EngineError> {
        let link = lock(&self.link)
            .as_ref()
            .filter(|link| link.shared.is_ready())
            .cloned()
            .ok_or_else(|| {
                EngineError::EngineUnavailable("engine is not initialized".to_string())
            })?;

        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();

        debug!("Bridge: queueing {} task {}", task.name(), task_id);
        {
            // Queue order has to match send order: progress is routed to the front.
            let mut pending = lock(&link.shared.pending);
            pending.push_back(PendingTask {
                task_id,
                progress: progress_tx,
                result: result_tx,
            });
            if link.requests.send(WorkerRequest::task(task_id, task)).is_err() {
                pending.pop_back();
                return Err(EngineError::EngineUnavailable(
                    "engine worker is not running".to_string(),
                ));
            }
        }
        if !link.shared.alive.load(Ordering::SeqCst) {
            link.shared.remove(task_id);
            return Err(EngineError::EngineUnavailable(
                "engine worker is not running".to_string(),
            ));
        }

        Ok(TaskHandle {
            task_id,
            progress: progress_rx,
            result: result_rx,
        })
    }

    fn ensure_worker(&self) -> Result<Arc<WorkerLink>, EngineError> {
        let mut slot = lock(&self.link);
        if let Some(link) = slot.as_ref() {
            if link.shared.alive.load(Ordering::SeqCst) {
                return Ok(link.clone());
            }
            info!("Bridge: restarting engine worker");
        }

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let handle = worker::spawn(self.factory.clone(), request_rx, response_tx).map_err(|e| {
            EngineError::EngineUnavailable(format!("failed to start engine worker: {}", e))
        })?;

        let shared = Arc::new(Shared::new());
        tokio::spawn(dispatch(shared.clone(), response_rx, handle));

        let link = Arc::new(WorkerLink {
            requests: request_tx,
            shared,
        });
        *slot = Some(link.clone());
        Ok(link)
    }
}
