// CLI commands for driving the Minos judge
use anyhow::{Context, Result};
use minos_common::config::Config;
use minos_common::redis as queue;
use minos_common::types::{ResourceLimits, Submission, SubmissionMetadata};
use redis::aio::ConnectionManager;
use std::fs;
use uuid::Uuid;

async fn connect() -> Result<ConnectionManager> {
    let config = Config::from_env();
    let client =
        redis::Client::open(config.redis_url.as_str()).context("failed to create redis client")?;
    ConnectionManager::new(client)
        .await
        .context("failed to connect to redis")
}

/// Submit a source file and print the submission id
pub async fn submit(
    test_data: &str,
    language: &str,
    source_path: &str,
    time_ms: u64,
    memory_mb: u64,
    priority: Option<u32>,
) -> Result<()> {
    let source = fs::read_to_string(source_path)
        .with_context(|| format!("failed to read source file {}", source_path))?;

    let submission = Submission {
        id: Uuid::new_v4(),
        test_data: test_data.to_string(),
        language: language.to_string(),
        source,
        limits: ResourceLimits { time_ms, memory_mb },
        priority,
        metadata: SubmissionMetadata::default(),
    };

    let mut conn = connect().await?;
    queue::push_submission(&mut conn, &submission)
        .await
        .context("failed to enqueue submission")?;

    println!("Submitted {}", submission.id);
    println!("  test data: {}", test_data);
    println!("  language:  {}", language);
    println!("  limits:    {}ms / {}MiB", time_ms, memory_mb);
    Ok(())
}

/// Print the stored report of a submission
pub async fn result(id: &str) -> Result<()> {
    let submission_id = Uuid::parse_str(id).context("invalid submission id")?;
    let mut conn = connect().await?;

    match queue::get_report(&mut conn, &submission_id)
        .await
        .context("failed to fetch report")?
    {
        Some(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        None => {
            println!("No report yet for {} - still queued or judging", id);
        }
    }
    Ok(())
}

/// Poll live progress until the final report lands, then print it
pub async fn watch(id: &str, interval_ms: u64) -> Result<()> {
    let submission_id = Uuid::parse_str(id).context("invalid submission id")?;
    let mut conn = connect().await?;
    let mut last_line = String::new();

    loop {
        if let Some(report) = queue::get_report(&mut conn, &submission_id)
            .await
            .context("failed to fetch report")?
        {
            println!();
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        if let Some(progress) = queue::get_progress(&mut conn, &submission_id)
            .await
            .context("failed to fetch progress")?
        {
            let line = progress
                .subtasks
                .iter()
                .map(|s| {
                    if s.score.is_nan() {
                        "failed".to_string()
                    } else {
                        format!("{:.1}", s.score)
                    }
                })
                .collect::<Vec<_>>()
                .join(" | ");
            if line != last_line {
                println!("subtasks: {}", line);
                last_line = line;
            }
        }

        tokio::time::sleep(tokio::time::Duration::from_millis(interval_ms)).await;
    }
}
