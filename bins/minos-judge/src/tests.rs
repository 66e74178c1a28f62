//! End-to-end tests of the judge orchestrator against a scripted judger.
//!
//! These cover the scheduling semantics: scoring modes, skip-on-zero,
//! per-run deduplication, dependency propagation, fault poisoning, the
//! diagnostics rerun and snapshot monotonicity.

use crate::judge;
use crate::judger::Judger;
use anyhow::{bail, Result};
use async_trait::async_trait;
use minos_common::config::DiagnosticsConfig;
use minos_common::types::{
    CompilationResult, ProblemType, ResourceLimits, RunStatus, ScoringMode, Subtask, TestData,
    TestcaseDetails, TestcaseJudge, TestcaseResultKind,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

/// Scripted behavior for one case name
#[derive(Clone)]
enum Script {
    Verdict {
        kind: TestcaseResultKind,
        rate: f64,
        time: u64,
        memory: u64,
        user_error: Option<String>,
    },
    Fault(String),
}

fn ok() -> Script {
    Script::Verdict {
        kind: TestcaseResultKind::Accepted,
        rate: 1.0,
        time: 10,
        memory: 1024,
        user_error: None,
    }
}

fn partial(rate: f64) -> Script {
    Script::Verdict {
        kind: TestcaseResultKind::PartiallyCorrect,
        rate,
        time: 10,
        memory: 1024,
        user_error: None,
    }
}

fn wrong() -> Script {
    Script::Verdict {
        kind: TestcaseResultKind::WrongAnswer,
        rate: 0.0,
        time: 10,
        memory: 1024,
        user_error: None,
    }
}

struct MockJudger {
    scripts: HashMap<String, Script>,
    calls: Mutex<HashMap<String, usize>>,
    supports_diagnostics: bool,
    diagnostics_compiles: AtomicUsize,
    case_delay_ms: u64,
}

impl MockJudger {
    fn new(scripts: Vec<(&str, Script)>) -> Self {
        MockJudger {
            scripts: scripts
                .into_iter()
                .map(|(name, script)| (name.to_string(), script))
                .collect(),
            calls: Mutex::new(HashMap::new()),
            supports_diagnostics: false,
            diagnostics_compiles: AtomicUsize::new(0),
            case_delay_ms: 0,
        }
    }

    fn with_diagnostics(mut self) -> Self {
        self.supports_diagnostics = true;
        self
    }

    fn with_case_delay(mut self, ms: u64) -> Self {
        self.case_delay_ms = ms;
        self
    }

    fn calls(&self, name: &str) -> usize {
        *self.calls.lock().unwrap().get(name).unwrap_or(&0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Judger for MockJudger {
    async fn preprocess_test_data(&self) -> Result<()> {
        Ok(())
    }

    async fn compile(&self) -> Result<CompilationResult> {
        Ok(CompilationResult::success(
            "exec-test".to_string(),
            String::new(),
        ))
    }

    async fn compile_with_diagnostics(&self) -> Result<CompilationResult> {
        self.diagnostics_compiles.fetch_add(1, Ordering::SeqCst);
        Ok(CompilationResult::success(
            "exec-test-debug".to_string(),
            String::new(),
        ))
    }

    fn supports_diagnostics(&self) -> bool {
        self.supports_diagnostics
    }

    async fn judge_testcase(
        &self,
        case: &TestcaseJudge,
        started: oneshot::Sender<()>,
    ) -> Result<TestcaseDetails> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(case.name.clone())
            .or_insert(0) += 1;
        let _ = started.send(());
        if self.case_delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.case_delay_ms)).await;
        }
        match self.scripts.get(&case.name) {
            Some(Script::Verdict {
                kind,
                rate,
                time,
                memory,
                user_error,
            }) => Ok(TestcaseDetails {
                kind: *kind,
                time: *time,
                memory: *memory,
                scoring_rate: *rate,
                user_output: None,
                user_error: user_error.clone(),
                spj_message: None,
                system_message: None,
                input: None,
                output: None,
                diagnostics: None,
            }),
            Some(Script::Fault(message)) => bail!("{}", message),
            None => bail!("no script for case {}", case.name),
        }
    }

    async fn cleanup(&self) {}
}

fn case(name: &str) -> TestcaseJudge {
    TestcaseJudge {
        name: name.to_string(),
        input: None,
        output: None,
    }
}

fn subtask(mode: ScoringMode, score: f64, names: &[&str], dependencies: Vec<usize>) -> Subtask {
    Subtask {
        mode,
        score,
        cases: names.iter().map(|n| case(n)).collect(),
        dependencies,
    }
}

fn test_data(subtasks: Vec<Subtask>) -> TestData {
    TestData {
        name: "pkg".to_string(),
        problem_type: ProblemType::Standard,
        subtasks,
        spj: None,
        extra_source_files: HashMap::new(),
    }
}

fn limits() -> ResourceLimits {
    ResourceLimits {
        time_ms: 1000,
        memory_mb: 256,
    }
}

fn diagnostics_off() -> DiagnosticsConfig {
    DiagnosticsConfig {
        enabled: false,
        max_time_ratio: 4.0,
        max_time_ms: 10_000,
        max_memory_ratio: 4.0,
        max_memory_kib: 1_048_576,
    }
}

fn diagnostics_on() -> DiagnosticsConfig {
    DiagnosticsConfig {
        enabled: true,
        ..diagnostics_off()
    }
}

/// Run the orchestrator and collect every progress snapshot.
async fn run(
    judger: &MockJudger,
    data: &TestData,
    cfg: &DiagnosticsConfig,
) -> (
    Result<minos_common::types::JudgeResult>,
    Vec<minos_common::types::JudgeResult>,
) {
    let (tx, mut rx) = mpsc::channel(64);
    let judging = judge::judge(judger, data, limits(), cfg, tx);
    let collector = async {
        let mut snapshots = Vec::new();
        while let Some(snapshot) = rx.recv().await {
            snapshots.push(snapshot);
        }
        snapshots
    };
    tokio::join!(judging, collector)
}

#[tokio::test]
async fn test_summation_all_accepted() {
    let judger = MockJudger::new(vec![("c1", ok()), ("c2", ok()), ("c3", ok()), ("c4", ok())]);
    let data = test_data(vec![subtask(
        ScoringMode::Summation,
        100.0,
        &["c1", "c2", "c3", "c4"],
        vec![],
    )]);

    let (outcome, _) = run(&judger, &data, &diagnostics_off()).await;
    let result = outcome.unwrap();

    assert_eq!(result.subtasks.len(), 1);
    assert_eq!(result.subtasks[0].score, 100.0);
    assert_eq!(result.subtasks[0].status, RunStatus::Done);
    for case_result in &result.subtasks[0].cases {
        assert_eq!(case_result.status, RunStatus::Done);
    }
    assert_eq!(result.total_score(), 100.0);
}

#[tokio::test]
async fn test_skip_after_zero_rate() {
    let judger = MockJudger::new(vec![("c1", ok()), ("c2", wrong()), ("c3", ok())]);
    let data = test_data(vec![subtask(
        ScoringMode::Minimum,
        100.0,
        &["c1", "c2", "c3"],
        vec![],
    )]);

    let (outcome, _) = run(&judger, &data, &diagnostics_off()).await;
    let result = outcome.unwrap();

    let cases = &result.subtasks[0].cases;
    assert_eq!(cases[0].status, RunStatus::Done);
    assert_eq!(cases[1].status, RunStatus::Done);
    assert_eq!(cases[2].status, RunStatus::Skipped);
    assert_eq!(result.subtasks[0].score, 0.0);
    // the skipped case never reached the runner
    assert_eq!(judger.calls("c3"), 0);
}

#[tokio::test]
async fn test_shared_case_judged_once() {
    let judger = MockJudger::new(vec![("shared", ok()), ("only-a", ok()), ("only-b", ok())])
        .with_case_delay(20);
    let data = test_data(vec![
        subtask(ScoringMode::Summation, 50.0, &["shared", "only-a"], vec![]),
        subtask(ScoringMode::Summation, 50.0, &["shared", "only-b"], vec![]),
    ]);

    let (outcome, _) = run(&judger, &data, &diagnostics_off()).await;
    let result = outcome.unwrap();

    // Both subtasks run concurrently and reference "shared" while the
    // first evaluation is still in flight; only one runner call happens.
    assert_eq!(judger.calls("shared"), 1);
    assert_eq!(result.subtasks[0].score, 50.0);
    assert_eq!(result.subtasks[1].score, 50.0);
    assert_eq!(result.subtasks[0].cases[0].status, RunStatus::Done);
    assert_eq!(result.subtasks[1].cases[0].status, RunStatus::Done);
}

#[tokio::test]
async fn test_dependency_caps_dependent_score() {
    let judger = MockJudger::new(vec![("a1", partial(0.4)), ("b1", ok())]);
    let data = test_data(vec![
        subtask(ScoringMode::Minimum, 50.0, &["a1"], vec![]),
        subtask(ScoringMode::Minimum, 100.0, &["b1"], vec![0]),
    ]);

    let (outcome, _) = run(&judger, &data, &diagnostics_off()).await;
    let result = outcome.unwrap();

    assert_eq!(result.subtasks[0].score, 20.0);
    // all of B's cases pass, but B cannot outscore A's ratio
    assert_eq!(result.subtasks[1].score, 40.0);
}

#[tokio::test]
async fn test_dependency_ratio_propagates_down_chains() {
    let judger = MockJudger::new(vec![("a1", partial(0.4)), ("b1", ok()), ("c1", ok())]);
    let data = test_data(vec![
        subtask(ScoringMode::Minimum, 50.0, &["a1"], vec![]),
        subtask(ScoringMode::Minimum, 100.0, &["b1"], vec![0]),
        subtask(ScoringMode::Minimum, 100.0, &["c1"], vec![1]),
    ]);

    let (outcome, _) = run(&judger, &data, &diagnostics_off()).await;
    let result = outcome.unwrap();

    // B is clamped to 40; C sees B's clamped score, not B's raw cases.
    assert_eq!(result.subtasks[1].score, 40.0);
    assert_eq!(result.subtasks[2].score, 40.0);
}

#[tokio::test]
async fn test_zero_dependency_skips_dependent_entirely() {
    let judger = MockJudger::new(vec![("a1", wrong()), ("b1", ok()), ("b2", ok())]);
    let data = test_data(vec![
        subtask(ScoringMode::Minimum, 50.0, &["a1"], vec![]),
        subtask(ScoringMode::Minimum, 100.0, &["b1", "b2"], vec![0]),
    ]);

    let (outcome, _) = run(&judger, &data, &diagnostics_off()).await;
    let result = outcome.unwrap();

    assert_eq!(result.subtasks[0].score, 0.0);
    assert_eq!(result.subtasks[1].score, 0.0);
    assert_eq!(result.subtasks[1].status, RunStatus::Skipped);
    for case_result in &result.subtasks[1].cases {
        assert_eq!(case_result.status, RunStatus::Skipped);
    }
    // B never touched the runner
    assert_eq!(judger.calls("b1"), 0);
    assert_eq!(judger.calls("b2"), 0);
}

#[tokio::test]
async fn test_dependency_cycle_aborts_before_any_case() {
    let judger = MockJudger::new(vec![("c1", ok()), ("c2", ok())]);
    let data = test_data(vec![
        subtask(ScoringMode::Minimum, 50.0, &["c1"], vec![1]),
        subtask(ScoringMode::Minimum, 50.0, &["c2"], vec![0]),
    ]);

    let (outcome, _) = run(&judger, &data, &diagnostics_off()).await;
    let err = outcome.unwrap_err();
    assert!(err.to_string().contains("loop detected"));
    assert_eq!(judger.total_calls(), 0);
}

#[tokio::test]
async fn test_fault_poisons_score_without_skipping() {
    let judger = MockJudger::new(vec![
        ("f1", Script::Fault("runner connection lost".to_string())),
        ("c2", ok()),
    ]);
    let data = test_data(vec![subtask(
        ScoringMode::Minimum,
        100.0,
        &["f1", "c2"],
        vec![],
    )]);

    let (outcome, _) = run(&judger, &data, &diagnostics_off()).await;
    let result = outcome.unwrap();

    let entry = &result.subtasks[0];
    assert_eq!(entry.cases[0].status, RunStatus::Failed);
    assert!(entry.cases[0]
        .error_message
        .as_ref()
        .unwrap()
        .contains("runner connection lost"));
    // a fault is not a verdict: the next case still runs
    assert_eq!(entry.cases[1].status, RunStatus::Done);
    assert_eq!(judger.calls("c2"), 1);
    assert!(entry.score.is_nan());
    assert_eq!(entry.status, RunStatus::Failed);
    // poisoned subtasks contribute nothing to the total
    assert_eq!(result.total_score(), 0.0);
}

#[tokio::test]
async fn test_failed_dependency_skips_dependent() {
    let judger = MockJudger::new(vec![
        ("a1", Script::Fault("runner gone".to_string())),
        ("b1", ok()),
    ]);
    let data = test_data(vec![
        subtask(ScoringMode::Minimum, 50.0, &["a1"], vec![]),
        subtask(ScoringMode::Minimum, 100.0, &["b1"], vec![0]),
    ]);

    let (outcome, _) = run(&judger, &data, &diagnostics_off()).await;
    let result = outcome.unwrap();

    assert!(result.subtasks[0].score.is_nan());
    // NaN must not leak into the dependent; it is skipped with zero
    assert_eq!(result.subtasks[1].score, 0.0);
    assert_eq!(result.subtasks[1].status, RunStatus::Skipped);
    assert_eq!(judger.calls("b1"), 0);
}

#[tokio::test]
async fn test_partial_credit_stays_in_range() {
    let judger = MockJudger::new(vec![("c1", partial(0.5)), ("c2", partial(0.7))]);
    let data = test_data(vec![subtask(
        ScoringMode::Minimum,
        80.0,
        &["c1", "c2"],
        vec![],
    )]);

    let (outcome, _) = run(&judger, &data, &diagnostics_off()).await;
    let result = outcome.unwrap();

    assert_eq!(result.subtasks[0].score, 40.0);
    assert!(result.subtasks[0].score >= 0.0 && result.subtasks[0].score <= 80.0);
}

#[tokio::test]
async fn test_multiple_mode_is_product() {
    let judger = MockJudger::new(vec![("c1", partial(0.5)), ("c2", partial(0.5))]);
    let data = test_data(vec![subtask(
        ScoringMode::Multiple,
        100.0,
        &["c1", "c2"],
        vec![],
    )]);

    let (outcome, _) = run(&judger, &data, &diagnostics_off()).await;
    let result = outcome.unwrap();
    assert_eq!(result.subtasks[0].score, 25.0);
}

#[tokio::test]
async fn test_baseline_snapshot_is_optimistic() {
    let judger = MockJudger::new(vec![("c1", ok()), ("s1", ok())]);
    let data = test_data(vec![
        subtask(ScoringMode::Minimum, 60.0, &["c1"], vec![]),
        subtask(ScoringMode::Summation, 40.0, &["s1"], vec![]),
    ]);

    let (outcome, snapshots) = run(&judger, &data, &diagnostics_off()).await;
    outcome.unwrap();

    let first = &snapshots[0];
    // skippable modes start from full credit, summation from zero
    assert_eq!(first.subtasks[0].score, 60.0);
    assert_eq!(first.subtasks[1].score, 0.0);
    assert_eq!(first.subtasks[0].cases[0].status, RunStatus::Waiting);
}

#[tokio::test]
async fn test_snapshots_are_monotonic_per_case() {
    let judger = MockJudger::new(vec![
        ("c1", ok()),
        ("c2", wrong()),
        ("c3", ok()),
        ("s1", ok()),
        ("s2", Script::Fault("runner gone".to_string())),
    ]);
    let data = test_data(vec![
        subtask(ScoringMode::Minimum, 50.0, &["c1", "c2", "c3"], vec![]),
        subtask(ScoringMode::Summation, 50.0, &["s1", "s2"], vec![]),
    ]);

    let (outcome, snapshots) = run(&judger, &data, &diagnostics_off()).await;
    outcome.unwrap();
    assert!(!snapshots.is_empty());

    let terminal = |status: RunStatus| {
        matches!(
            status,
            RunStatus::Done | RunStatus::Skipped | RunStatus::Failed
        )
    };
    for si in 0..data.subtasks.len() {
        for ci in 0..data.subtasks[si].cases.len() {
            let mut settled: Option<RunStatus> = None;
            for snapshot in &snapshots {
                let status = snapshot.subtasks[si].cases[ci].status;
                if let Some(expected) = settled {
                    assert_eq!(
                        status, expected,
                        "case ({}, {}) changed after reaching a terminal state",
                        si, ci
                    );
                } else if terminal(status) {
                    settled = Some(status);
                }
            }
        }
    }
}

#[tokio::test]
async fn test_diagnostics_rerun_attaches_stderr() {
    let judger = MockJudger::new(vec![(
        "w1",
        Script::Verdict {
            kind: TestcaseResultKind::WrongAnswer,
            rate: 0.0,
            time: 50,
            memory: 8192,
            user_error: Some("heap-buffer-overflow on address 0x602".to_string()),
        },
    )])
    .with_diagnostics();
    let data = test_data(vec![subtask(ScoringMode::Minimum, 100.0, &["w1"], vec![])]);

    let (outcome, _) = run(&judger, &data, &diagnostics_on()).await;
    let result = outcome.unwrap();

    // the verdict is untouched, the rerun's stderr is attached
    let entry = &result.subtasks[0];
    assert_eq!(entry.score, 0.0);
    let details = entry.cases[0].result.as_ref().unwrap();
    assert_eq!(details.kind, TestcaseResultKind::WrongAnswer);
    assert!(details
        .diagnostics
        .as_ref()
        .unwrap()
        .contains("heap-buffer-overflow"));
    assert_eq!(judger.diagnostics_compiles.load(Ordering::SeqCst), 1);
    // one run for the verdict, one instrumented rerun past the case cache
    assert_eq!(judger.calls("w1"), 2);
}

#[tokio::test]
async fn test_diagnostics_skips_over_limit_cases() {
    // Recorded memory exceeds min(ratio x limit, cap): 256 MiB x 4 = 1 GiB
    // cap, recorded 2 GiB. No rerun may happen.
    let judger = MockJudger::new(vec![(
        "w1",
        Script::Verdict {
            kind: TestcaseResultKind::WrongAnswer,
            rate: 0.0,
            time: 50,
            memory: 2 * 1_048_576,
            user_error: Some("should never be attached".to_string()),
        },
    )])
    .with_diagnostics();
    let data = test_data(vec![subtask(ScoringMode::Minimum, 100.0, &["w1"], vec![])]);

    let (outcome, _) = run(&judger, &data, &diagnostics_on()).await;
    let result = outcome.unwrap();

    let details = result.subtasks[0].cases[0].result.as_ref().unwrap();
    assert!(details.diagnostics.is_none());
    assert_eq!(judger.diagnostics_compiles.load(Ordering::SeqCst), 0);
    assert_eq!(judger.calls("w1"), 1);
}

#[tokio::test]
async fn test_diagnostics_ignores_accepted_and_tle_cases() {
    let judger = MockJudger::new(vec![
        ("a1", ok()),
        (
            "t1",
            Script::Verdict {
                kind: TestcaseResultKind::TimeLimitExceeded,
                rate: 0.0,
                time: 2000,
                memory: 1024,
                user_error: Some("irrelevant".to_string()),
            },
        ),
    ])
    .with_diagnostics();
    let data = test_data(vec![
        subtask(ScoringMode::Summation, 50.0, &["a1"], vec![]),
        subtask(ScoringMode::Summation, 50.0, &["t1"], vec![]),
    ]);

    let (outcome, _) = run(&judger, &data, &diagnostics_on()).await;
    let result = outcome.unwrap();

    // neither Accepted nor TimeLimitExceeded is eligible
    assert_eq!(judger.diagnostics_compiles.load(Ordering::SeqCst), 0);
    for entry in &result.subtasks {
        assert!(entry.cases[0].result.as_ref().unwrap().diagnostics.is_none());
    }
}
