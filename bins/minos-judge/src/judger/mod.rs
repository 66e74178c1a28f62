mod answer;
mod interactive;
mod standard;

pub use answer::AnswerSubmissionJudger;
pub use interactive::InteractiveJudger;
pub use standard::StandardJudger;

use crate::compiler::CompileClient;
use crate::testdata;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use minos_common::types::{
    CompilationResult, FilePreview, NamedData, TaskResult, TestData, TestcaseDetails,
    TestcaseJudge,
};
use std::path::Path;
use tokio::sync::oneshot;

/// Capability seam the orchestrator drives, one implementation per
/// problem type. Everything the orchestrator knows about compilation and
/// per-case execution goes through here.
#[async_trait]
pub trait Judger: Send + Sync {
    /// One-time setup before the user compile (e.g. compile the checker).
    /// Failing here aborts the whole run.
    async fn preprocess_test_data(&self) -> Result<()>;

    /// Compile the submission. Must be called, and succeed, before any
    /// `judge_testcase`.
    async fn compile(&self) -> Result<CompilationResult>;

    /// Recompile with the instrumented language variant. Only the
    /// diagnostics driver calls this.
    async fn compile_with_diagnostics(&self) -> Result<CompilationResult>;

    /// Whether an instrumented variant exists for this submission.
    fn supports_diagnostics(&self) -> bool;

    /// Judge a single case. `started` fires when the runner actually
    /// begins executing, at most once. Encapsulates all transport to the
    /// runner and the file-preview extraction.
    async fn judge_testcase(
        &self,
        case: &TestcaseJudge,
        started: oneshot::Sender<()>,
    ) -> Result<TestcaseDetails>;

    /// Release per-run resources (compiled artifacts).
    async fn cleanup(&self);
}

/// Instrumented variant used for the diagnostics rerun, when the
/// toolchain has one (sanitizers plus debug info).
pub fn diagnostics_language(language: &str) -> Option<String> {
    match language {
        "c" | "c11" | "cpp" | "cpp11" | "cpp14" | "cpp17" | "cpp20" => {
            Some(format!("{}-debug", language))
        }
        _ => None,
    }
}

/// Compile the special judge if the test data carries one.
/// Checker binaries are cached by the compile client across runs.
pub(crate) async fn compile_special_judge(
    compiler: &CompileClient,
    test_data: &TestData,
    dir: &Path,
    priority: u32,
) -> Result<Option<String>> {
    let Some(spj) = test_data.spj.as_ref() else {
        return Ok(None);
    };
    let source = tokio::fs::read_to_string(dir.join(&spj.source))
        .await
        .with_context(|| format!("failed to read special judge source {}", spj.source))?;
    let result = compiler
        .compile_cached(&spj.language, &source, priority)
        .await?;
    if !result.success {
        bail!("special judge compilation failed: {}", result.message);
    }
    Ok(result.executable)
}

/// Compile the submission together with the helper files the test data
/// attaches for its language.
pub(crate) async fn compile_user(
    compiler: &CompileClient,
    test_data: &TestData,
    dir: &Path,
    source: &str,
    language: &str,
    priority: u32,
) -> Result<CompilationResult> {
    let mut extra_files = Vec::new();
    if let Some(extras) = test_data.extra_source_files.get(language) {
        for extra in extras {
            let content = tokio::fs::read_to_string(dir.join(&extra.file))
                .await
                .with_context(|| format!("failed to read extra source file {}", extra.file))?;
            extra_files.push(NamedData {
                name: extra.name.clone(),
                content,
            });
        }
    }
    compiler.compile(language, source, extra_files, priority).await
}

/// Fold a runner execution result into case details, attaching bounded
/// previews of the case's input/output files.
pub(crate) async fn execution_details(
    result: TaskResult,
    case: &TestcaseJudge,
    dir: &Path,
    display_limit: usize,
) -> Result<TestcaseDetails> {
    let TaskResult::Execute {
        kind,
        time,
        memory,
        scoring_rate,
        user_output,
        user_error,
        spj_message,
        system_message,
    } = result
    else {
        bail!("runner returned a compile result for an execution task");
    };
    let input = preview(case.input.as_deref(), dir, display_limit).await;
    let output = preview(case.output.as_deref(), dir, display_limit).await;
    Ok(TestcaseDetails {
        kind,
        time,
        memory,
        scoring_rate,
        user_output,
        user_error,
        spj_message,
        system_message,
        input,
        output,
        diagnostics: None,
    })
}

async fn preview(name: Option<&str>, dir: &Path, limit: usize) -> Option<FilePreview> {
    let name = name?;
    Some(FilePreview {
        name: name.to_string(),
        content: testdata::read_file_head(&dir.join(name), limit).await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_language_variants() {
        assert_eq!(diagnostics_language("cpp17"), Some("cpp17-debug".to_string()));
        assert_eq!(diagnostics_language("c"), Some("c-debug".to_string()));
        assert_eq!(diagnostics_language("python"), None);
        assert_eq!(diagnostics_language("java"), None);
    }
}
