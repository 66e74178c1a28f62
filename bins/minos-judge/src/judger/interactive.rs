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

/// Judger for interactive problems: the submission talks to a
/// problem-supplied interactor over pipes. The test data's `spj` entry is
/// the interactor, and it is mandatory.
pub struct InteractiveJudger {
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
    interactor_executable: Option<String>,
    owned_artifacts: Vec<String>,
}

impl InteractiveJudger {
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
        InteractiveJudger {
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
}

#[async_trait]
impl Judger for InteractiveJudger {
    async fn preprocess_test_data(&self) -> Result<()> {
        if self.test_data.spj.is_none() {
            bail!(
                "interactive test data '{}' declares no interactor",
                self.test_data.name
            );
        }
        let interactor = compile_special_judge(
            &self.compiler,
            &self.test_data,
            &self.test_data_dir,
            self.priority,
        )
        .await?
        .context("interactor compilation yielded no executable")?;
        info!(executable = %interactor, "interactor ready");
        self.state
            .lock()
            .expect("judger state lock poisoned")
            .interactor_executable = Some(interactor);
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
        let (user_executable, interactor_executable) = {
            let state = self.state.lock().expect("judger state lock poisoned");
            let Some(user) = state.user_executable.clone() else {
                bail!("judge_testcase called before a successful compile");
            };
            let Some(interactor) = state.interactor_executable.clone() else {
                bail!("judge_testcase called before preprocess");
            };
            (user, interactor)
        };
        let task = RunnerTask {
            id: Uuid::new_v4(),
            priority: self.priority,
            payload: TaskPayload::Interactive {
                test_data_name: self.test_data.name.clone(),
                input_file: case.input.clone(),
                time_ms: self.submission.limits.time_ms,
                memory_mb: self.submission.limits.memory_mb,
                user_executable,
                interactor_executable,
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
