mod compiler;
mod dedup;
mod diagnostics;
mod graph;
mod judge;
mod judger;
mod progress;
mod score;
mod subtask;
mod testdata;
#[cfg(test)]
mod tests;
mod transport;

use anyhow::{Context, Result};
use compiler::CompileClient;
use judger::{AnswerSubmissionJudger, InteractiveJudger, Judger, StandardJudger};
use minos_common::config::Config;
use minos_common::redis as queue;
use minos_common::types::{
    ProblemType, Submission, SubmissionReport, SubmissionStatus,
};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use testdata::TestDataCache;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use transport::{RedisTransport, RunnerTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Minos judge daemon booting...");

    let config = Config::from_env();
    info!(
        test_data = %config.test_data.display(),
        priority = config.priority,
        diagnostics = config.diagnostics.enabled,
        "Configuration loaded"
    );

    let client =
        redis::Client::open(config.redis_url.as_str()).context("failed to create redis client")?;
    let conn = ConnectionManager::new(client)
        .await
        .context("failed to connect to redis")?;
    info!("Connected to redis: {}", config.redis_url);

    let transport: Arc<dyn RunnerTransport> = Arc::new(RedisTransport::new(conn.clone()));
    let compiler = CompileClient::new(transport.clone(), conn.clone());
    let test_data_cache = TestDataCache::new(config.test_data.clone());

    info!("Judge daemon is READY - waiting for submissions");

    // Setup graceful shutdown
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        warn!("Received SIGTERM/CTRL+C - initiating graceful shutdown");
        warn!("Daemon will finish the current submission and exit");
    };

    let mut loop_conn = conn.clone();
    tokio::select! {
        _ = worker_loop(&mut loop_conn, &config, &transport, &compiler, &test_data_cache) => {},
        _ = shutdown => {},
    }

    info!("Judge daemon shutdown complete");
    Ok(())
}

async fn worker_loop(
    conn: &mut ConnectionManager,
    config: &Config,
    transport: &Arc<dyn RunnerTransport>,
    compiler: &CompileClient,
    test_data_cache: &TestDataCache,
) -> Result<()> {
    loop {
        debug!("daemon IDLE - waiting for a submission");

        // BLPOP with 5 second timeout for graceful shutdown; the retry
        // queue is consumed alongside the main one (main has priority)
        match queue::pop_submission_with_retry(conn, 5.0).await {
            Ok(Some(mut submission)) => {
                let submission_id = submission.id;
                info!(
                    submission_id = %submission_id,
                    test_data = %submission.test_data,
                    language = %submission.language,
                    attempt = submission.metadata.attempts + 1,
                    max_attempts = submission.metadata.max_attempts,
                    phase = "dequeued",
                    "daemon BUSY - judging submission"
                );

                let start = std::time::Instant::now();
                let outcome = judge_submission(
                    conn,
                    config,
                    transport,
                    compiler,
                    test_data_cache,
                    &submission,
                )
                .await;

                match outcome {
                    Ok(report) => {
                        info!(
                            submission_id = %submission_id,
                            status = ?report.status,
                            score = report.score,
                            judge_ms = start.elapsed().as_millis() as u64,
                            phase = "judged",
                            "submission judged"
                        );
                        if let Err(e) = queue::store_report(conn, &report).await {
                            // Non-fatal - daemon continues
                            error!(
                                submission_id = %submission_id,
                                error = %e,
                                phase = "persist_failed",
                                "failed to persist report"
                            );
                        } else {
                            info!(submission_id = %submission_id, phase = "completed", "report persisted");
                        }
                    }
                    Err(e) => handle_fault(conn, &mut submission, e).await,
                }

                info!(submission_id = %submission_id, phase = "done", "daemon IDLE - submission finished");
            }
            Ok(None) => {
                // Timeout - check for shutdown (idle continues)
                continue;
            }
            Err(e) => {
                error!(error = %e, "redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Internal judging faults (not verdicts) go through the retry queue and
/// end in the DLQ with a system-error report once attempts run out.
async fn handle_fault(
    conn: &mut ConnectionManager,
    submission: &mut Submission,
    error: anyhow::Error,
) {
    error!(
        submission_id = %submission.id,
        error = %format!("{:#}", error),
        attempts = submission.metadata.attempts,
        phase = "judging_failed",
        "judging failed"
    );

    submission.metadata.attempts += 1;
    submission.metadata.last_failure_reason = Some(format!("{:#}", error));

    if submission.metadata.attempts < submission.metadata.max_attempts {
        warn!(
            submission_id = %submission.id,
            attempt = submission.metadata.attempts,
            max_attempts = submission.metadata.max_attempts,
            "sending submission to retry queue"
        );
        if let Err(retry_err) = queue::push_to_retry_queue(conn, submission).await {
            error!(
                submission_id = %submission.id,
                error = %retry_err,
                "failed to push submission to retry queue"
            );
        }
        return;
    }

    error!(
        submission_id = %submission.id,
        attempts = submission.metadata.attempts,
        "submission exceeded max attempts, sending to DLQ"
    );
    if let Err(dlq_err) = queue::push_to_dlq(conn, submission).await {
        error!(
            submission_id = %submission.id,
            error = %dlq_err,
            "failed to push submission to DLQ"
        );
    }

    let report = SubmissionReport {
        submission_id: submission.id,
        status: SubmissionStatus::SystemError,
        compile_message: None,
        system_message: submission.metadata.last_failure_reason.clone(),
        result: None,
        score: 0.0,
    };
    if let Err(store_err) = queue::store_report(conn, &report).await {
        error!(
            submission_id = %submission.id,
            error = %store_err,
            "failed to store system-error report"
        );
    }
}

/// Judge one submission end to end: build the judger for the problem
/// type, preprocess, compile, run the orchestrator while forwarding
/// progress snapshots, then clean up.
async fn judge_submission(
    conn: &ConnectionManager,
    config: &Config,
    transport: &Arc<dyn RunnerTransport>,
    compiler: &CompileClient,
    test_data_cache: &TestDataCache,
    submission: &Submission,
) -> Result<SubmissionReport> {
    let test_data = test_data_cache.load(&submission.test_data).await?;
    let test_data_dir = test_data_cache.package_dir(&submission.test_data);
    let priority = submission.priority.unwrap_or(config.priority);

    let judger: Box<dyn Judger> = match test_data.problem_type {
        ProblemType::Standard => Box::new(StandardJudger::new(
            transport.clone(),
            compiler.clone(),
            test_data.clone(),
            test_data_dir,
            submission.clone(),
            priority,
            config.data_display_limit,
        )),
        ProblemType::AnswerSubmission => Box::new(AnswerSubmissionJudger::new(
            transport.clone(),
            compiler.clone(),
            test_data.clone(),
            test_data_dir,
            submission.clone(),
            priority,
            config.data_display_limit,
        )),
        ProblemType::Interactive => Box::new(InteractiveJudger::new(
            transport.clone(),
            compiler.clone(),
            test_data.clone(),
            test_data_dir,
            submission.clone(),
            priority,
            config.data_display_limit,
        )),
    };

    judger
        .preprocess_test_data()
        .await
        .context("test data preprocessing failed")?;

    info!(submission_id = %submission.id, phase = "compiling", "compiling submission");
    let compilation = judger.compile().await.context("compile step failed")?;
    if !compilation.success {
        info!(submission_id = %submission.id, phase = "compile_error", "compilation rejected");
        judger.cleanup().await;
        return Ok(SubmissionReport {
            submission_id: submission.id,
            status: SubmissionStatus::CompileError,
            compile_message: Some(compilation.message),
            system_message: None,
            result: None,
            score: 0.0,
        });
    }

    // Forward every snapshot to the progress sink so the front-end can
    // poll live state; the channel closes when judging finishes.
    let (progress_tx, mut progress_rx) = mpsc::channel(16);
    let submission_id = submission.id;
    let mut progress_conn = conn.clone();
    let forwarder = async move {
        while let Some(snapshot) = progress_rx.recv().await {
            if let Err(e) = queue::store_progress(&mut progress_conn, &submission_id, &snapshot).await
            {
                warn!(
                    submission_id = %submission_id,
                    error = %e,
                    "failed to store progress snapshot"
                );
            }
        }
    };

    let judging = judge::judge(
        judger.as_ref(),
        &test_data,
        submission.limits,
        &config.diagnostics,
        progress_tx,
    );
    let (outcome, _) = tokio::join!(judging, forwarder);
    judger.cleanup().await;
    let result = outcome?;

    let compile_message = if compilation.message.is_empty() {
        None
    } else {
        Some(compilation.message)
    };
    Ok(SubmissionReport {
        submission_id: submission.id,
        status: SubmissionStatus::Judged,
        compile_message,
        system_message: None,
        score: result.total_score(),
        result: Some(result),
    })
}
