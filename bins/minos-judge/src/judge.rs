use crate::dedup::CaseCache;
use crate::diagnostics;
use crate::graph;
use crate::judger::Judger;
use crate::progress::Reporter;
use crate::subtask;
use anyhow::{ensure, Result};
use futures_util::future::join_all;
use minos_common::config::DiagnosticsConfig;
use minos_common::types::{
    CaseResult, JudgeResult, ResourceLimits, RunStatus, ScoringMode, SubtaskResult, TestData,
};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Drive one judge run to completion.
///
/// One cooperative task per subtask, launched in topological order; each
/// first awaits its dependencies' completion handles, so a dependent only
/// ever sees final dependency scores. Every state change ships a full
/// `JudgeResult` snapshot through `progress`. All run-scoped state (the
/// deduplication cache, the result vector, the completion handles) is
/// created here and dropped on return.
pub async fn judge(
    judger: &dyn Judger,
    test_data: &TestData,
    limits: ResourceLimits,
    diagnostics_cfg: &DiagnosticsConfig,
    progress: mpsc::Sender<JudgeResult>,
) -> Result<JudgeResult> {
    let subtasks = &test_data.subtasks;
    ensure!(!subtasks.is_empty(), "test data declares no subtasks");
    for (index, s) in subtasks.iter().enumerate() {
        ensure!(!s.cases.is_empty(), "subtask {} declares no cases", index);
    }
    let order = graph::topological_order(subtasks)?;
    debug!(?order, "subtask processing order");

    let initial: Vec<SubtaskResult> = subtasks
        .iter()
        .map(|s| SubtaskResult {
            status: RunStatus::Waiting,
            // Optimistic baseline: skippable modes assume full credit
            // until a case says otherwise, summation accrues from zero.
            score: if s.mode == ScoringMode::Summation {
                0.0
            } else {
                s.score
            },
            cases: vec![CaseResult::waiting(); s.cases.len()],
        })
        .collect();

    let reporter = Reporter::new(initial, progress);
    reporter.update(|_| ()).await; // publish the baseline snapshot
    let cache = CaseCache::new();
    let weights: Vec<f64> = subtasks.iter().map(|s| s.score).collect();

    let mut senders = Vec::with_capacity(subtasks.len());
    let mut receivers = Vec::with_capacity(subtasks.len());
    for _ in 0..subtasks.len() {
        let (tx, rx) = watch::channel(None);
        senders.push(Some(tx));
        receivers.push(rx);
    }

    let runners: Vec<_> = order
        .into_iter()
        .map(|index| {
            let deps: Vec<_> = subtasks[index]
                .dependencies
                .iter()
                .map(|&dep| (dep, receivers[dep].clone()))
                .collect();
            let done = senders[index]
                .take()
                .expect("topological order visits each subtask once");
            subtask::run_subtask(
                index,
                &subtasks[index],
                &weights,
                deps,
                done,
                judger,
                &cache,
                &reporter,
            )
        })
        .collect();
    join_all(runners).await;

    if diagnostics_cfg.enabled && judger.supports_diagnostics() {
        diagnostics::run(judger, test_data, limits, diagnostics_cfg, &reporter).await;
    }

    Ok(reporter.snapshot().await)
}
