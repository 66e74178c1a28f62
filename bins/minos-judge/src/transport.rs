use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use minos_common::redis as queue;
use minos_common::types::{RunnerTask, TaskEvent, TaskResult};
use redis::aio::ConnectionManager;
use tokio::sync::oneshot;
use tracing::debug;

/// RPC-like seam to the runner pool.
///
/// An implementation delivers exactly one result or one transport error
/// per task and fires `started` at most once, strictly before the result.
#[async_trait]
pub trait RunnerTransport: Send + Sync {
    async fn run_task(
        &self,
        task: RunnerTask,
        started: oneshot::Sender<()>,
    ) -> Result<TaskResult>;
}

/// Queue-backed transport: tasks go out on a per-priority list, events
/// come back on a per-task list.
pub struct RedisTransport {
    conn: ConnectionManager,
    /// Give up after this many seconds without any event from the runner
    result_timeout_secs: u64,
}

const EVENT_POLL_SECONDS: f64 = 5.0;

impl RedisTransport {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            result_timeout_secs: 600,
        }
    }
}

#[async_trait]
impl RunnerTransport for RedisTransport {
    async fn run_task(
        &self,
        task: RunnerTask,
        started: oneshot::Sender<()>,
    ) -> Result<TaskResult> {
        let mut conn = self.conn.clone();
        let task_id = task.id;
        queue::push_task(&mut conn, &task)
            .await
            .context("failed to enqueue runner task")?;
        debug!(task_id = %task_id, priority = task.priority, "runner task enqueued");

        let mut started = Some(started);
        let mut silent_secs = 0u64;
        loop {
            let event = queue::next_task_event(&mut conn, &task_id, EVENT_POLL_SECONDS)
                .await
                .context("failed to poll task events")?;
            match event {
                Some(TaskEvent::Started) => {
                    debug!(task_id = %task_id, "runner picked up task");
                    silent_secs = 0;
                    if let Some(tx) = started.take() {
                        let _ = tx.send(());
                    }
                }
                Some(TaskEvent::Done { result }) => return Ok(result),
                Some(TaskEvent::Failed { message }) => {
                    bail!("runner reported failure: {}", message)
                }
                None => {
                    silent_secs += EVENT_POLL_SECONDS as u64;
                    if silent_secs >= self.result_timeout_secs {
                        bail!(
                            "no response from runner pool after {}s",
                            self.result_timeout_secs
                        );
                    }
                }
            }
        }
    }
}
