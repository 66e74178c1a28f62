use crate::judger::Judger;
use minos_common::types::{TestcaseDetails, TestcaseJudge};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, OnceCell};

/// Outcome of one shared case evaluation.
/// `Faulted` is a runner/transport breakdown, not a program verdict.
#[derive(Debug, Clone)]
pub enum CaseOutcome {
    Done(TestcaseDetails),
    Faulted(String),
}

/// Per-run map from case name to its single evaluation.
///
/// Sharing is by outstanding evaluation, not only by completed result:
/// two subtasks that reference the same case name while both are running
/// collapse onto one runner task. The map lives for exactly one judge run.
#[derive(Default)]
pub struct CaseCache {
    cells: Mutex<HashMap<String, Arc<OnceCell<CaseOutcome>>>>,
}

impl CaseCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, name: &str) -> Arc<OnceCell<CaseOutcome>> {
        let mut cells = self.cells.lock().expect("case cache lock poisoned");
        cells.entry(name.to_string()).or_default().clone()
    }

    /// Evaluate a case at most once per run.
    ///
    /// The first referent triggers the judger; later referents (possibly
    /// concurrent, possibly from other subtasks) await and share the same
    /// outcome. Only the first referent's `started` sender can fire - the
    /// others are dropped unfired, so their cases never enter Running.
    pub async fn judge(
        &self,
        judger: &dyn Judger,
        case: &TestcaseJudge,
        started: oneshot::Sender<()>,
    ) -> CaseOutcome {
        let cell = self.cell(&case.name);
        cell.get_or_init(|| async move {
            match judger.judge_testcase(case, started).await {
                Ok(details) => CaseOutcome::Done(details),
                Err(e) => CaseOutcome::Faulted(format!("{:#}", e)),
            }
        })
        .await
        .clone()
    }
}
