//! Single-lane dispatcher for outbound LLM backend calls.
//!
//! Callers [`submit`](Dispatcher::submit) tasks from any number of tokio tasks. One worker
//! drains the backlog in submission order and runs at most one transport call at a time.

use crate::core::backlog::Backlog;
use crate::core::error::{DispatchError, TransportError};
use crate::core::traits::Transport;
use futures_util::FutureExt;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::{Notify, Semaphore, TryAcquireError, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Request verb understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            _ => Err(DispatchError::InvalidTask(format!("unknown method `{s}`"))),
        }
    }
}

/// What [`Dispatcher::submit`] does when the backlog is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    /// Fail immediately with [`DispatchError::QueueFull`].
    #[default]
    Reject,
    /// Wait for a free slot. Waiters are admitted in the order they started waiting.
    Block,
}

impl Display for BackpressurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackpressurePolicy::Reject => f.write_str("reject"),
            BackpressurePolicy::Block => f.write_str("block"),
        }
    }
}

impl FromStr for BackpressurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(BackpressurePolicy::Reject),
            "block" => Ok(BackpressurePolicy::Block),
            _ => Err(format!("expected `reject` or `block`, got `{s}`")),
        }
    }
}

/// Largest backlog a dispatcher accepts. Slots are allocated up front, and each one is also
/// a semaphore permit, so this stays far below [`Semaphore::MAX_PERMITS`].
pub const MAX_CAPACITY: usize = 1 << 20;

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Maximum number of queued tasks, not counting the one in flight.
    pub capacity: usize,
    pub policy: BackpressurePolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            policy: BackpressurePolicy::Reject,
        }
    }
}

/// Snapshot of the backlog, for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BacklogStatus {
    pub capacity: usize,
    pub occupancy: usize,
    pub policy: BackpressurePolicy,
}

type Completion = oneshot::Sender<Result<Value, DispatchError>>;

/// One queued unit of outbound work.
#[derive(Debug)]
pub struct Task {
    id: Uuid,
    method: Method,
    address: String,
    payload: Value,
    completion: Completion,
}

impl Task {
    /// Creates a task and the future its result will be delivered to.
    ///
    /// The address must be a non-empty path starting with `/`.
    pub fn new(
        method: Method,
        address: impl Into<String>,
        payload: Value,
    ) -> Result<(Task, Pending), DispatchError> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(DispatchError::InvalidTask("address is empty".to_owned()));
        }
        if !address.starts_with('/') {
            return Err(DispatchError::InvalidTask(format!(
                "address `{address}` must start with `/`"
            )));
        }

        let (sender, receiver) = oneshot::channel();

        Ok((
            Task {
                id: Uuid::new_v4(),
                method,
                address,
                payload,
                completion: sender,
            },
            Pending { receiver },
        ))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Result of a submitted task, resolved once by the dispatcher.
///
/// Dropping it does not cancel the task; the result is discarded when it arrives.
#[derive(Debug)]
#[must_use = "the task runs regardless, but its result is lost if this is dropped"]
pub struct Pending {
    receiver: oneshot::Receiver<Result<Value, DispatchError>>,
}

impl Future for Pending {
    type Output = Result<Value, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(DispatchError::Dropped)))
    }
}

struct State {
    backlog: Backlog<Task>,
    closed: bool,
}

enum Step {
    Ran,
    Idle,
    Finished,
}

struct Shared {
    state: Mutex<State>,
    /// One permit per free backlog slot.
    slots: Semaphore,
    ready: Notify,
    /// Held for the whole of a drain step, so at most one task is in flight.
    lane: tokio::sync::Mutex<()>,
    transport: Arc<dyn Transport>,
    config: DispatcherConfig,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enqueue(&self, task: Task) -> Result<(), DispatchError> {
        let mut state = self.state();
        if state.closed {
            self.slots.add_permits(1);
            return Err(DispatchError::Closed);
        }

        let id = task.id;
        if state.backlog.push(task).is_err() {
            // Only reachable if slot accounting and the backlog disagree.
            self.slots.add_permits(1);
            return Err(DispatchError::QueueFull {
                capacity: self.config.capacity,
            });
        }
        let occupancy = state.backlog.len();
        drop(state);

        debug!("task {id} enqueued, occupancy {occupancy}");
        self.ready.notify_one();
        Ok(())
    }

    async fn drain_step(&self) -> Step {
        let _lane = self.lane.lock().await;

        let task = {
            let mut state = self.state();
            match state.backlog.pop() {
                Some(task) => task,
                None if state.closed => return Step::Finished,
                None => return Step::Idle,
            }
        };
        self.slots.add_permits(1);

        self.execute(task).await;
        Step::Ran
    }

    async fn execute(&self, task: Task) {
        let Task {
            id,
            method,
            address,
            payload,
            completion,
        } = task;

        debug!("task {id}: {method} {address}");
        let outcome = AssertUnwindSafe(self.transport.execute(method, &address, &payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(TransportError::Panicked(panic_message(panic))));

        match &outcome {
            Ok(_) => debug!("task {id} succeeded"),
            Err(e) => debug!("task {id} failed: {e}"),
        }

        if completion
            .send(outcome.map_err(DispatchError::Transport))
            .is_err()
        {
            debug!("task {id}: caller stopped waiting, result discarded");
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

async fn worker_loop(shared: Arc<Shared>) {
    loop {
        match shared.drain_step().await {
            Step::Ran => {}
            Step::Idle => shared.ready.notified().await,
            Step::Finished => {
                info!("dispatcher stopped, backlog drained");
                return;
            }
        }
    }
}

/// Serializes calls to a [`Transport`] through a bounded FIFO backlog.
///
/// Created idle by [`Dispatcher::new`]; [`Dispatcher::start`] spawns the worker that drains
/// the backlog. Dropping the dispatcher stops it.
pub struct Dispatcher {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, config: DispatcherConfig) -> Self {
        let capacity = config.capacity;

        Dispatcher {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    backlog: Backlog::with_capacity(capacity),
                    closed: false,
                }),
                slots: Semaphore::new(capacity),
                ready: Notify::new(),
                lane: tokio::sync::Mutex::new(()),
                transport,
                config,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawns the worker onto the current tokio runtime. Does nothing if it already runs.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        if worker.is_none() {
            info!(
                "starting dispatcher (capacity {}, {} policy)",
                self.shared.config.capacity, self.shared.config.policy
            );
            *worker = Some(tokio::spawn(worker_loop(self.shared.clone())));
        }
    }

    /// Stops accepting tasks. Already queued tasks are still executed.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        // Wakes submitters blocked on a full backlog.
        self.shared.slots.close();
        self.shared.ready.notify_one();
    }

    /// Stops the dispatcher and waits until the worker has drained the backlog.
    pub async fn shutdown(&self) {
        self.stop();
        let worker = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("dispatcher worker ended abnormally: {e}");
            }
        }
    }

    /// Queues a task and returns the future its result is delivered to.
    ///
    /// Under [`BackpressurePolicy::Reject`] a full backlog fails with
    /// [`DispatchError::QueueFull`] and leaves the backlog untouched. Under
    /// [`BackpressurePolicy::Block`] this waits for a free slot.
    pub async fn submit(
        &self,
        method: Method,
        address: impl Into<String>,
        payload: Value,
    ) -> Result<Pending, DispatchError> {
        let (task, pending) = Task::new(method, address, payload)?;

        let permit = match self.shared.config.policy {
            BackpressurePolicy::Reject => {
                self.shared.slots.try_acquire().map_err(|e| match e {
                    TryAcquireError::Closed => DispatchError::Closed,
                    TryAcquireError::NoPermits => DispatchError::QueueFull {
                        capacity: self.shared.config.capacity,
                    },
                })?
            }
            BackpressurePolicy::Block => self
                .shared
                .slots
                .acquire()
                .await
                .map_err(|_| DispatchError::Closed)?,
        };
        // The slot is handed back by the worker when it dequeues the task.
        permit.forget();

        self.shared.enqueue(task)?;
        Ok(pending)
    }

    /// Submits a task and waits for its result.
    pub async fn call(
        &self,
        method: Method,
        address: impl Into<String>,
        payload: Value,
    ) -> Result<Value, DispatchError> {
        self.submit(method, address, payload).await?.await
    }

    /// Runs a single drain step on the caller's task.
    ///
    /// Returns `false` if there was nothing to run. Waits for the step currently in flight, if
    /// the worker is running one, so this never breaks single-flight.
    pub async fn drain_step(&self) -> bool {
        matches!(self.shared.drain_step().await, Step::Ran)
    }

    pub fn status(&self) -> BacklogStatus {
        BacklogStatus {
            capacity: self.shared.config.capacity,
            occupancy: self.shared.state().backlog.len(),
            policy: self.shared.config.policy,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state().closed
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
