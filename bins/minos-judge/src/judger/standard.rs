use super::{
    compile_special_judge, compile_user, diagnostics_language, execution_details, Judger,
};
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

/// Judger for standard batch problems: the compiled submission reads each
/// case's input, and its output is checked by diff or special judge on
/// the runner side.
pub struct StandardJudger {
    transport: Arc<dyn RunnerTransport>,
    compiler: CompileClient,
    test_data: Arc<TestData>,
    test_data_dir: PathBuf,
    submission: Submission,
    priority: u32,
    display_limit: usize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    user_executable: Option<String>,
    spj_executable: Option<String>,
    /// Artifacts compiled for this run alone; released by cleanup.
    /// Checker binaries are cached by the compile client and stay.
    owned_artifacts: Vec<String>,
}

impl StandardJudger {
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
        StandardJudger {
            transport,
            compiler,
            test_data,
            test_data_dir,
            submission,
            priority,
            display_limit,
            state: Mutex::new(State::default()),
        }
    }

    async fn compile_as(&self, language: &str) -> Result<CompilationResult> {
        let result = compile_user(
            &self.compiler,
            &self.test_data,
            &self.test_data_dir,
            &self.submission.source,
            language,
            self.priority,
        )
        .await?;
        if let Some(executable) = result.executable.clone() {
            let mut state = self.state.lock().expect("judger state lock poisoned");
            state.user_executable = Some(executable.clone());
            state.owned_artifacts.push(executable);
        }
        Ok(result)
    }

    fn payload_for(&self, case: &TestcaseJudge) -> Result<TaskPayload> {
        let state = self.state.lock().expect("judger state lock poisoned");
        let Some(user_executable) = state.user_executable.clone() else {
            bail!("judge_testcase called before a successful compile");
        };
        Ok(TaskPayload::Standard {
            test_data_name: self.test_data.name.clone(),
            input_file: case.input.clone(),
            answer_file: case.output.clone(),
            time_ms: self.submission.limits.time_ms,
            memory_mb: self.submission.limits.memory_mb,
            file_io_input: None,
            file_io_output: None,
            user_executable,
            spj_executable: state.spj_executable.clone(),
        })
    }
}

#[async_trait]
impl Judger for StandardJudger {
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
            self.state.lock().expect("judger state lock poisoned").spj_executable =
                Some(executable);
        }
        Ok(())
    }

    async fn compile(&self) -> Result<CompilationResult> {
        self.compile_as(&self.submission.language).await
    }

    async fn compile_with_diagnostics(&self) -> Result<CompilationResult> {
        let Some(language) = diagnostics_language(&self.submission.language) else {
            bail!(
                "no instrumented variant for language {}",
                self.submission.language
            );
        };
        self.compile_as(&language).await
    }

    fn supports_diagnostics(&self) -> bool {
        diagnostics_language(&self.submission.language).is_some()
    }

    async fn judge_testcase(
        &self,
        case: &TestcaseJudge,
        started: oneshot::Sender<()>,
    ) -> Result<TestcaseDetails> {
        let payload = self.payload_for(case)?;
        let task = RunnerTask {
            id: Uuid::new_v4(),
            priority: self.priority,
            payload,
        };
        let result = self
            .transport
            .run_task(task, started)
            .await
            .with_context(|| format!("runner task for case {} failed", case.name))?;
        execution_details(result, case, &self.test_data_dir, self.display_limit).await
    }

    async fn cleanup(&self) {
        let artifacts = {
            let mut state = self.state.lock().expect("judger state lock poisoned");
            state.user_executable = None;
            std::mem::take(&mut state.owned_artifacts)
        };
        for executable in artifacts {
            self.compiler.release(&executable).await;
        }
    }
}
