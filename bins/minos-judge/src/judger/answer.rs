use super::{compile_special_judge, execution_details, Judger};
use crate::compiler::CompileClient;
use crate::transport::RunnerTransport;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use minos_common::types::{
    CompilationResult, RunnerTask, Submission, TaskPayload, TestData, TestcaseDetails,
    TestcaseJudge,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::info;
use uuid::Uuid;

/// Judger for answer-submission problems: the user submits the answers
/// themselves, so there is nothing to compile; the checker compares the
/// submitted answer against the reference per case.
pub struct AnswerSubmissionJudger {
    transport: Arc<dyn RunnerTransport>,
    compiler: CompileClient,
    test_data: Arc<TestData>,
    test_data_dir: PathBuf,
    submission: Submission,
    priority: u32,
    display_limit: usize,
    spj_executable: Mutex<Option<String>>,
}

impl AnswerSubmissionJudger {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn RunnerTransport>,
        compiler: CompileClient,
        test_data: Arc<TestData>,
        test_data_dir: PathBuf,
        submission: Submission,
        priority: u32,
        display_limit: usize,
    ) -> Self {
        AnswerSubmissionJudger {
            transport,
            compiler,
            test_data,
            test_data_dir,
            submission,
            priority,
            display_limit,
            spj_executable: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Judger for AnswerSubmissionJudger {
    async fn preprocess_test_data(&self) -> Result<()> {
        let spj = compile_special_judge(
            &self.compiler,
            &self.test_data,
            &self.test_data_dir,
            self.priority,
        )
        .await?;
        if let Some(executable) = spj {
            info!(executable = %executable, "special judge ready");
            *self
                .spj_executable
                .lock()
                .expect("judger state lock poisoned") = Some(executable);
        }
        Ok(())
    }

    async fn compile(&self) -> Result<CompilationResult> {
        // Nothing to build; the submission is the answer itself.
        Ok(CompilationResult {
            success: true,
            message: String::new(),
            executable: None,
        })
    }

    async fn compile_with_diagnostics(&self) -> Result<CompilationResult> {
        bail!("answer submissions have nothing to recompile")
    }

    fn supports_diagnostics(&self) -> bool {
        false
    }

    async fn judge_testcase(
        &self,
        case: &TestcaseJudge,
        started: oneshot::Sender<()>,
    ) -> Result<TestcaseDetails> {
        let spj_executable = self
            .spj_executable
            .lock()
            .expect("judger state lock poisoned")
            .clone();
        let task = RunnerTask {
            id: Uuid::new_v4(),
            priority: self.priority,
            payload: TaskPayload::AnswerCheck {
                test_data_name: self.test_data.name.clone(),
                input_file: case.input.clone(),
                answer_file: case.output.clone(),
                user_answer: self.submission.source.clone(),
                spj_executable,
            },
        };
        let result = self
            .transport
            .run_task(task, started)
            .await
            .with_context(|| format!("runner task for case {} failed", case.name))?;
        execution_details(result, case, &self.test_data_dir, self.display_limit).await
    }

    async fn cleanup(&self) {
        // Checker binaries are cached by the compile client; nothing else
        // was created for this run.
    }
}
