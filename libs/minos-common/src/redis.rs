use crate::types::{JudgeResult, RunnerTask, Submission, SubmissionReport, TaskEvent};
use redis::{AsyncCommands, RedisResult};
use uuid::Uuid;

/// Redis queue semantics - defines only semantics, not runtime logic.
/// Keeps the daemon, the CLI and the runner pool from drifting on key
/// layout, and makes every key deterministic.

pub const SUBMISSION_QUEUE: &str = "minos:queue:submissions";
pub const SUBMISSION_RETRY_QUEUE: &str = "minos:queue:submissions:retry";
pub const SUBMISSION_DLQ: &str = "minos:queue:submissions:dead";
pub const TASK_QUEUE_PREFIX: &str = "minos:queue:tasks";
pub const TASK_EVENTS_PREFIX: &str = "minos:task";
pub const REPORT_PREFIX: &str = "minos:report";
pub const STATUS_PREFIX: &str = "minos:status";
pub const PROGRESS_PREFIX: &str = "minos:progress";
pub const EXECUTABLE_PREFIX: &str = "minos:executable";

/// Stored reports and progress snapshots expire after 24 hours
const RESULT_TTL_SECONDS: u64 = 86_400;

/// Generate the task queue name for a priority level
/// Runners consume lower-numbered queues first
pub fn task_queue(priority: u32) -> String {
    format!("{}:{}", TASK_QUEUE_PREFIX, priority)
}

/// Generate the event list key for a runner task
pub fn task_events_key(task_id: &Uuid) -> String {
    format!("{}:{}:events", TASK_EVENTS_PREFIX, task_id)
}

/// Generate the report key for a submission
pub fn report_key(submission_id: &Uuid) -> String {
    format!("{}:{}", REPORT_PREFIX, submission_id)
}

/// Generate the status key for a submission
pub fn status_key(submission_id: &Uuid) -> String {
    format!("{}:{}", STATUS_PREFIX, submission_id)
}

/// Generate the live-progress key for a submission
pub fn progress_key(submission_id: &Uuid) -> String {
    format!("{}:{}", PROGRESS_PREFIX, submission_id)
}

/// Generate the registry key of a stored executable
pub fn executable_key(name: &str) -> String {
    format!("{}:{}", EXECUTABLE_PREFIX, name)
}

fn json_error(context: &'static str, e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, context, e.to_string()))
}

/// Push a submission to the intake queue
/// Uses RPUSH for FIFO semantics
pub async fn push_submission(
    conn: &mut redis::aio::ConnectionManager,
    submission: &Submission,
) -> RedisResult<()> {
    let payload =
        serde_json::to_string(submission).map_err(|e| json_error("serialization error", e))?;
    conn.rpush(SUBMISSION_QUEUE, payload).await
}

/// Pop a submission, preferring the main queue over the retry queue
/// Uses BLPOP with timeout for graceful shutdown
pub async fn pop_submission_with_retry(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<Submission>> {
    let result: Option<(String, String)> = conn
        .blpop(&[SUBMISSION_QUEUE, SUBMISSION_RETRY_QUEUE], timeout_seconds)
        .await?;

    match result {
        Some((_key, payload)) => {
            let submission: Submission = serde_json::from_str(&payload)
                .map_err(|e| json_error("deserialization error", e))?;
            Ok(Some(submission))
        }
        None => Ok(None),
    }
}

/// Requeue a submission after an internal judging fault
pub async fn push_to_retry_queue(
    conn: &mut redis::aio::ConnectionManager,
    submission: &Submission,
) -> RedisResult<()> {
    let payload =
        serde_json::to_string(submission).map_err(|e| json_error("serialization error", e))?;
    conn.rpush(SUBMISSION_RETRY_QUEUE, payload).await
}

/// Park a submission that exhausted its attempts
pub async fn push_to_dlq(
    conn: &mut redis::aio::ConnectionManager,
    submission: &Submission,
) -> RedisResult<()> {
    let payload =
        serde_json::to_string(submission).map_err(|e| json_error("serialization error", e))?;
    conn.rpush(SUBMISSION_DLQ, payload).await
}

/// Enqueue a task for the runner pool on its priority queue
pub async fn push_task(
    conn: &mut redis::aio::ConnectionManager,
    task: &RunnerTask,
) -> RedisResult<()> {
    let queue = task_queue(task.priority);
    let payload = serde_json::to_string(task).map_err(|e| json_error("serialization error", e))?;
    conn.rpush(&queue, payload).await
}

/// Block for the next event of a runner task
/// Returns None on timeout so callers can re-check for shutdown
pub async fn next_task_event(
    conn: &mut redis::aio::ConnectionManager,
    task_id: &Uuid,
    timeout_seconds: f64,
) -> RedisResult<Option<TaskEvent>> {
    let key = task_events_key(task_id);
    let result: Option<(String, String)> = conn.blpop(&key, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => {
            let event: TaskEvent = serde_json::from_str(&payload)
                .map_err(|e| json_error("deserialization error", e))?;
            Ok(Some(event))
        }
        None => Ok(None),
    }
}

/// Store the final submission report
/// Status is stored separately for quick polling
pub async fn store_report(
    conn: &mut redis::aio::ConnectionManager,
    report: &SubmissionReport,
) -> RedisResult<()> {
    let key = report_key(&report.submission_id);
    let payload =
        serde_json::to_string(report).map_err(|e| json_error("serialization error", e))?;
    let _: () = conn.set_ex(&key, payload, RESULT_TTL_SECONDS).await?;

    let status_key_str = status_key(&report.submission_id);
    let status_str =
        serde_json::to_string(&report.status).map_err(|e| json_error("serialization error", e))?;
    let _: () = conn
        .set_ex(&status_key_str, status_str, RESULT_TTL_SECONDS)
        .await?;

    Ok(())
}

/// Retrieve a stored submission report
pub async fn get_report(
    conn: &mut redis::aio::ConnectionManager,
    submission_id: &Uuid,
) -> RedisResult<Option<SubmissionReport>> {
    let key = report_key(submission_id);
    let payload: Option<String> = conn.get(&key).await?;

    match payload {
        Some(data) => {
            let report: SubmissionReport = serde_json::from_str(&data)
                .map_err(|e| json_error("deserialization error", e))?;
            Ok(Some(report))
        }
        None => Ok(None),
    }
}

/// Store a live progress snapshot, overwriting the previous one
pub async fn store_progress(
    conn: &mut redis::aio::ConnectionManager,
    submission_id: &Uuid,
    result: &JudgeResult,
) -> RedisResult<()> {
    let key = progress_key(submission_id);
    let payload =
        serde_json::to_string(result).map_err(|e| json_error("serialization error", e))?;
    let _: () = conn.set_ex(&key, payload, RESULT_TTL_SECONDS).await?;
    Ok(())
}

/// Retrieve the latest progress snapshot of a submission
pub async fn get_progress(
    conn: &mut redis::aio::ConnectionManager,
    submission_id: &Uuid,
) -> RedisResult<Option<JudgeResult>> {
    let key = progress_key(submission_id);
    let payload: Option<String> = conn.get(&key).await?;

    match payload {
        Some(data) => {
            let result: JudgeResult = serde_json::from_str(&data)
                .map_err(|e| json_error("deserialization error", e))?;
            Ok(Some(result))
        }
        None => Ok(None),
    }
}

/// Drop an executable from the registry once a run no longer needs it
pub async fn release_executable(
    conn: &mut redis::aio::ConnectionManager,
    name: &str,
) -> RedisResult<()> {
    let _: () = conn.del(executable_key(name)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_queue_naming() {
        assert_eq!(task_queue(0), "minos:queue:tasks:0");
        assert_eq!(task_queue(7), "minos:queue:tasks:7");
    }

    #[test]
    fn test_report_key_deterministic() {
        let id = Uuid::new_v4();
        let key1 = report_key(&id);
        let key2 = report_key(&id);
        assert_eq!(key1, key2);
        assert!(key1.starts_with("minos:report:"));
    }

    #[test]
    fn test_event_key_format() {
        let id = Uuid::new_v4();
        let key = task_events_key(&id);
        assert!(key.starts_with("minos:task:"));
        assert!(key.ends_with(":events"));
        assert!(key.contains(&id.to_string()));
    }

    #[test]
    fn test_executable_key_format() {
        assert_eq!(executable_key("exec-abc"), "minos:executable:exec-abc");
    }
}
