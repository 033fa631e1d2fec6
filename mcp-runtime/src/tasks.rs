//! Long-running task store: pollable status handles with TTL, cancellation,
//! and a background sweeper.
//!
//! Task IDs are opaque and distinct from the JSON-RPC request IDs that
//! created them. A task's status moves through `Working`/`InputRequired`
//! and lands exactly once in a terminal state; whichever terminal
//! transition happens first wins. Terminal records linger for one TTL so
//! clients keep a polling window, then the sweeper evicts them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use mcp_types::JSONRPCErrorError;
use mcp_types::RequestId;
use mcp_types::Task;
use mcp_types::TaskStatus;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_TASK_TTL: Duration = Duration::from_secs(300);

struct TaskRecord {
    status: TaskStatus,
    created: Instant,
    created_at_ms: u64,
    ttl: Duration,
    origin_request_id: RequestId,
    session_id: String,
    cancel: CancellationToken,
    result: Option<Value>,
    error: Option<JSONRPCErrorError>,
    terminal_at: Option<Instant>,
    notify: Arc<Notify>,
    observers: Arc<AtomicUsize>,
}

impl TaskRecord {
    fn to_wire(&self, task_id: &str) -> Task {
        Task {
            task_id: task_id.to_string(),
            status: self.status,
            created_at: self.created_at_ms,
            ttl_ms: self.ttl.as_millis() as u64,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }

    fn enter_terminal(&mut self, status: TaskStatus, now: Instant) {
        self.status = status;
        self.terminal_at = Some(now);
        self.notify.notify_waiters();
    }
}

/// Concurrent keyed store of task records. Cheap to clone; all clones share
/// the same map.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<TaskStoreInner>,
}

struct TaskStoreInner {
    tasks: Mutex<HashMap<String, TaskRecord>>,
    default_ttl: Duration,
    sweep_interval: Duration,
}

/// Producer-side handle. Only the creator of a task receives one, which is
/// what makes "mutated only by its producer" hold.
pub struct TaskHandle {
    task_id: String,
    store: TaskStore,
    cancel: CancellationToken,
}

impl TaskHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Fires when the task is cancelled externally or expires.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn set_input_required(&self) {
        self.store
            .transition_nonterminal(&self.task_id, TaskStatus::InputRequired)
            .await;
    }

    pub async fn set_working(&self) {
        self.store
            .transition_nonterminal(&self.task_id, TaskStatus::Working)
            .await;
    }

    pub async fn complete(self, result: Value) {
        self.store
            .finish(&self.task_id, TaskStatus::Completed, Some(result), None)
            .await;
    }

    pub async fn fail(self, error: JSONRPCErrorError) {
        self.store
            .finish(&self.task_id, TaskStatus::Failed, None, Some(error))
            .await;
    }
}

impl TaskStore {
    pub fn new(default_ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            inner: Arc::new(TaskStoreInner {
                tasks: Mutex::new(HashMap::new()),
                default_ttl,
                sweep_interval,
            }),
        }
    }

    pub async fn create(
        &self,
        origin_request_id: RequestId,
        session_id: String,
        ttl: Option<Duration>,
    ) -> TaskHandle {
        let task_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let record = TaskRecord {
            status: TaskStatus::Working,
            created: Instant::now(),
            created_at_ms: unix_millis(),
            ttl: ttl.unwrap_or(self.inner.default_ttl),
            origin_request_id,
            session_id,
            cancel: cancel.clone(),
            result: None,
            error: None,
            terminal_at: None,
            notify: Arc::new(Notify::new()),
            observers: Arc::new(AtomicUsize::new(0)),
        };
        self.inner
            .tasks
            .lock()
            .await
            .insert(task_id.clone(), record);
        TaskHandle {
            task_id,
            store: self.clone(),
            cancel,
        }
    }

    pub async fn get(&self, task_id: &str) -> Option<Task> {
        self.inner
            .tasks
            .lock()
            .await
            .get(task_id)
            .map(|r| r.to_wire(task_id))
    }

    /// All live records for one session, oldest first.
    pub async fn list(&self, session_id: &str) -> Vec<Task> {
        let tasks = self.inner.tasks.lock().await;
        let mut out: Vec<Task> = tasks
            .iter()
            .filter(|(_, r)| r.session_id == session_id)
            .map(|(id, r)| r.to_wire(id))
            .collect();
        out.sort_by_key(|t| t.created_at);
        out
    }

    /// Cancel a task. Idempotent: a terminal task is returned unchanged.
    pub async fn cancel(&self, task_id: &str) -> Option<Task> {
        let mut tasks = self.inner.tasks.lock().await;
        let record = tasks.get_mut(task_id)?;
        if !record.status.is_terminal() {
            record.cancel.cancel();
            record.enter_terminal(TaskStatus::Cancelled, Instant::now());
        }
        Some(record.to_wire(task_id))
    }

    /// Await the task's first terminal transition.
    pub async fn wait(&self, task_id: &str) -> Option<Task> {
        loop {
            let (notify, observers) = {
                let tasks = self.inner.tasks.lock().await;
                let record = tasks.get(task_id)?;
                if record.status.is_terminal() {
                    return Some(record.to_wire(task_id));
                }
                (record.notify.clone(), record.observers.clone())
            };

            let notified = notify.notified();
            tokio::pin!(notified);
            // Register for wakeups, then re-check: a transition landing
            // between the check above and here must not be missed.
            notified.as_mut().enable();
            {
                let tasks = self.inner.tasks.lock().await;
                let record = tasks.get(task_id)?;
                if record.status.is_terminal() {
                    return Some(record.to_wire(task_id));
                }
            }

            observers.fetch_add(1, Ordering::Relaxed);
            notified.await;
            observers.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// The JSON-RPC request and session a task originated from.
    pub async fn origin(&self, task_id: &str) -> Option<(RequestId, String)> {
        self.inner
            .tasks
            .lock()
            .await
            .get(task_id)
            .map(|r| (r.origin_request_id.clone(), r.session_id.clone()))
    }

    async fn transition_nonterminal(&self, task_id: &str, status: TaskStatus) {
        let mut tasks = self.inner.tasks.lock().await;
        if let Some(record) = tasks.get_mut(task_id)
            && !record.status.is_terminal()
        {
            record.status = status;
        }
    }

    async fn finish(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<JSONRPCErrorError>,
    ) {
        let mut tasks = self.inner.tasks.lock().await;
        if let Some(record) = tasks.get_mut(task_id) {
            if record.status.is_terminal() {
                return;
            }
            record.result = result;
            record.error = error;
            record.enter_terminal(status, Instant::now());
        }
    }

    /// Expire overdue non-terminal tasks and evict terminal ones whose
    /// polling window has passed.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut tasks = self.inner.tasks.lock().await;
        tasks.retain(|task_id, record| {
            if let Some(terminal_at) = record.terminal_at {
                let keep = now < terminal_at + record.ttl;
                if !keep {
                    debug!("evicting task {task_id}");
                }
                return keep;
            }
            if now >= record.created + record.ttl {
                debug!("task {task_id} exceeded its TTL");
                record.cancel.cancel();
                record.enter_terminal(TaskStatus::Expired, now);
            }
            true
        });
    }

    /// Run the sweeper until the store is dropped or `shutdown` fires.
    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(store.inner.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => store.sweep().await,
                }
            }
        })
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
