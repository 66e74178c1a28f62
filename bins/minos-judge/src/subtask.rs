use crate::dedup::{CaseCache, CaseOutcome};
use crate::judger::Judger;
use crate::progress::Reporter;
use crate::score;
use futures_util::future::join_all;
use minos_common::types::{CaseResult, RunStatus, ScoringMode, Subtask, SubtaskResult};
use tokio::sync::{oneshot, watch};
use tracing::debug;

/// Completion handle of one subtask: the final (possibly NaN) score.
pub type CompletionSender = watch::Sender<Option<f64>>;
pub type CompletionReceiver = watch::Receiver<Option<f64>>;

/// Drive one subtask after its dependencies settle.
///
/// Skippable modes (Minimum, Multiple) run their cases sequentially in
/// declared order and stop evaluating once a case earns zero; Summation
/// launches every case in parallel. The score cap inherited from
/// dependencies is applied after every refinement, so a dependent subtask
/// can never outscore what its weakest dependency allows.
#[allow(clippy::too_many_arguments)]
pub async fn run_subtask(
    index: usize,
    subtask: &Subtask,
    weights: &[f64],
    deps: Vec<(usize, CompletionReceiver)>,
    done: CompletionSender,
    judger: &dyn Judger,
    cache: &CaseCache,
    reporter: &Reporter,
) {
    let has_deps = !deps.is_empty();

    // Observe only final dependency scores, never intermediate state.
    let mut min_ratio = 1.0f64;
    for (dep_index, mut rx) in deps {
        let dep_score = match rx.wait_for(|v| v.is_some()).await {
            Ok(guard) => (*guard).expect("value present after wait_for"),
            // Producer vanished without reporting: same as a failed dependency.
            Err(_) => f64::NAN,
        };
        let weight = weights[dep_index];
        let ratio = if weight > 0.0 { dep_score / weight } else { 1.0 };
        if ratio.is_nan() {
            // A poisoned dependency earns its dependents nothing.
            min_ratio = 0.0;
        } else {
            min_ratio = min_ratio.min(ratio);
        }
    }
    let cap = min_ratio * subtask.score;

    if has_deps && cap <= 0.0 {
        debug!(subtask = index, "dependencies earned nothing; skipping subtask");
        reporter
            .update(|results| {
                let entry = &mut results[index];
                for case in entry.cases.iter_mut() {
                    *case = CaseResult::skipped();
                }
                entry.score = 0.0;
                entry.status = RunStatus::Skipped;
            })
            .await;
        let _ = done.send(Some(0.0));
        return;
    }

    reporter
        .update(|results| results[index].status = RunStatus::Running)
        .await;

    match subtask.mode {
        ScoringMode::Summation => {
            let cases = (0..subtask.cases.len())
                .map(|ci| judge_case(index, ci, subtask, cap, judger, cache, reporter));
            join_all(cases).await;
        }
        ScoringMode::Minimum | ScoringMode::Multiple => {
            for ci in 0..subtask.cases.len() {
                let earned_zero =
                    judge_case(index, ci, subtask, cap, judger, cache, reporter).await;
                if earned_zero {
                    if ci + 1 < subtask.cases.len() {
                        debug!(subtask = index, after_case = ci, "skipping remaining cases");
                        reporter
                            .update(|results| {
                                let entry = &mut results[index];
                                for case in entry.cases[ci + 1..].iter_mut() {
                                    *case = CaseResult::skipped();
                                }
                                refresh_score(entry, subtask, cap);
                            })
                            .await;
                    }
                    break;
                }
            }
        }
    }

    let final_score = reporter
        .update(|results| {
            let entry = &mut results[index];
            refresh_score(entry, subtask, cap);
            entry.status = subtask_status(entry);
            entry.score
        })
        .await;
    let _ = done.send(Some(final_score));
}

/// Judge one case through the deduplicating cache and fold the outcome
/// into the subtask slot. Returns true when a skippable subtask should
/// stop evaluating (the case earned zero); a transport fault never
/// triggers the skip, it only poisons the score.
async fn judge_case(
    index: usize,
    ci: usize,
    subtask: &Subtask,
    cap: f64,
    judger: &dyn Judger,
    cache: &CaseCache,
    reporter: &Reporter,
) -> bool {
    let case = &subtask.cases[ci];
    let (started_tx, mut started_rx) = oneshot::channel();
    let evaluation = cache.judge(judger, case, started_tx);
    tokio::pin!(evaluation);

    // The started signal fires only for the referent that owns the
    // underlying evaluation; shared referents jump straight to the result.
    let outcome = tokio::select! {
        outcome = &mut evaluation => outcome,
        started = &mut started_rx => {
            if started.is_ok() {
                reporter
                    .update(|results| results[index].cases[ci].status = RunStatus::Running)
                    .await;
            }
            evaluation.await
        }
    };

    match outcome {
        CaseOutcome::Done(details) => {
            let rate = details.scoring_rate;
            reporter
                .update(|results| {
                    let entry = &mut results[index];
                    entry.cases[ci] = CaseResult::done(details);
                    refresh_score(entry, subtask, cap);
                })
                .await;
            subtask.mode.is_skippable() && !(rate > 0.0)
        }
        CaseOutcome::Faulted(message) => {
            reporter
                .update(|results| {
                    let entry = &mut results[index];
                    entry.cases[ci] = CaseResult::failed(message);
                    refresh_score(entry, subtask, cap);
                })
                .await;
            false
        }
    }
}

/// Recompute the subtask score from current case states.
/// Pending cases keep the optimistic baseline (full credit for skippable
/// modes, nothing for summation); any Failed case poisons the score.
fn refresh_score(entry: &mut SubtaskResult, subtask: &Subtask, cap: f64) {
    if entry.cases.iter().any(|c| c.status == RunStatus::Failed) {
        entry.score = f64::NAN;
        return;
    }
    let ratios: Vec<f64> = entry
        .cases
        .iter()
        .map(|case| match case.status {
            RunStatus::Done => {
                let rate = case.result.as_ref().map(|d| d.scoring_rate).unwrap_or(0.0);
                if rate.is_finite() {
                    rate.clamp(0.0, 1.0)
                } else {
                    0.0
                }
            }
            RunStatus::Skipped => 0.0,
            _ => {
                if subtask.mode == ScoringMode::Summation {
                    0.0
                } else {
                    1.0
                }
            }
        })
        .collect();
    let raw = score::combine_ratios(subtask.mode, &ratios) * subtask.score;
    entry.score = score::nan_min(raw, cap);
}

fn subtask_status(entry: &SubtaskResult) -> RunStatus {
    if entry.cases.iter().any(|c| c.status == RunStatus::Failed) {
        RunStatus::Failed
    } else if entry.cases.iter().all(|c| c.status == RunStatus::Skipped) {
        RunStatus::Skipped
    } else {
        RunStatus::Done
    }
}
