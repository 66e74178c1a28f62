use crate::judger::Judger;
use crate::progress::Reporter;
use anyhow::{bail, Context, Result};
use minos_common::config::DiagnosticsConfig;
use minos_common::types::{ResourceLimits, TestcaseResultKind, TestData};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Re-judge one failed case with an instrumented build and attach its
/// stderr to the recorded details.
///
/// Runs strictly after the main pass. Never touches the primary verdict:
/// every failure in here is logged at warning level and swallowed.
pub async fn run(
    judger: &dyn Judger,
    test_data: &TestData,
    limits: ResourceLimits,
    cfg: &DiagnosticsConfig,
    reporter: &Reporter,
) {
    if let Err(e) = try_run(judger, test_data, limits, cfg, reporter).await {
        warn!(error = %format!("{:#}", e), "diagnostics pass failed; verdict unaffected");
    }
}

async fn try_run(
    judger: &dyn Judger,
    test_data: &TestData,
    limits: ResourceLimits,
    cfg: &DiagnosticsConfig,
    reporter: &Reporter,
) -> Result<()> {
    // Eligibility ceilings. Limits are configured against the
    // submission's own limits: time in ms on both sides, memory given in
    // MiB but recorded in KiB, hence the 1024 factor.
    let max_time = (cfg.max_time_ratio * limits.time_ms as f64).min(cfg.max_time_ms as f64);
    let max_memory = (cfg.max_memory_ratio * (limits.memory_mb * 1024) as f64)
        .min(cfg.max_memory_kib as f64);

    // First eligible case in declared order (subtasks, then cases).
    let target = reporter
        .with_results(|results| {
            for (si, subtask) in test_data.subtasks.iter().enumerate() {
                for ci in 0..subtask.cases.len() {
                    let Some(details) = results[si].cases[ci].result.as_ref() else {
                        continue;
                    };
                    let reruns_usefully = matches!(
                        details.kind,
                        TestcaseResultKind::WrongAnswer | TestcaseResultKind::RuntimeError
                    );
                    if reruns_usefully
                        && (details.time as f64) <= max_time
                        && (details.memory as f64) <= max_memory
                    {
                        return Some((si, ci));
                    }
                }
            }
            None
        })
        .await;

    let Some((si, ci)) = target else {
        debug!("no case eligible for a diagnostics rerun");
        return Ok(());
    };
    let case = &test_data.subtasks[si].cases[ci];
    info!(subtask = si, case = %case.name, "rerunning case with instrumented build");

    let compile = judger
        .compile_with_diagnostics()
        .await
        .context("instrumented compile failed")?;
    if !compile.success {
        bail!(
            "instrumented compile rejected the source: {}",
            compile.message.lines().next().unwrap_or("")
        );
    }

    // Straight through the judger, bypassing the per-run case cache: the
    // cached outcome is exactly what we are re-deriving.
    let (started_tx, _started_rx) = oneshot::channel();
    let details = judger
        .judge_testcase(case, started_tx)
        .await
        .context("instrumented rerun failed")?;

    let captured = details.user_error.unwrap_or_default();
    reporter
        .update(|results| {
            if let Some(original) = results[si].cases[ci].result.as_mut() {
                original.diagnostics = Some(captured.clone());
            }
        })
        .await;
    Ok(())
}
