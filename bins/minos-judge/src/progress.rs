use minos_common::types::{JudgeResult, SubtaskResult};
use tokio::sync::{mpsc, Mutex};

/// Owns the shared result vector and ships full snapshots to the
/// progress stream.
///
/// The lock is held across the channel send, so snapshot delivery order
/// matches mutation order: once a case reaches a terminal state, no later
/// snapshot can show it in an earlier one. Subtask runners only ever touch
/// their own slot; cross-subtask reads go through the completion handles,
/// never through this vector.
pub struct Reporter {
    results: Mutex<Vec<SubtaskResult>>,
    sink: mpsc::Sender<JudgeResult>,
}

impl Reporter {
    pub fn new(initial: Vec<SubtaskResult>, sink: mpsc::Sender<JudgeResult>) -> Self {
        Reporter {
            results: Mutex::new(initial),
            sink,
        }
    }

    /// Apply a mutation and ship the resulting snapshot.
    /// A hung-up progress consumer does not stop judging.
    pub async fn update<T>(&self, mutate: impl FnOnce(&mut Vec<SubtaskResult>) -> T) -> T {
        let mut results = self.results.lock().await;
        let value = mutate(&mut results);
        let snapshot = JudgeResult {
            subtasks: results.clone(),
        };
        let _ = self.sink.send(snapshot).await;
        value
    }

    /// Read-only view, used by the diagnostics eligibility scan.
    pub async fn with_results<T>(&self, read: impl FnOnce(&[SubtaskResult]) -> T) -> T {
        let results = self.results.lock().await;
        read(&results)
    }

    /// Current state without emitting a snapshot.
    pub async fn snapshot(&self) -> JudgeResult {
        JudgeResult {
            subtasks: self.results.lock().await.clone(),
        }
    }
}
