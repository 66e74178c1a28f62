use crate::transport::RunnerTransport;
use anyhow::{bail, Context, Result};
use minos_common::redis as queue;
use minos_common::types::{CompilationResult, NamedData, RunnerTask, TaskPayload, TaskResult};
use redis::aio::ConnectionManager;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// Client of the compiler service, spoken over the runner queue.
///
/// Compilation is just another task variant: the runner builds the source
/// and registers the produced executable under the name we choose here.
#[derive(Clone)]
pub struct CompileClient {
    transport: Arc<dyn RunnerTransport>,
    conn: ConnectionManager,
    /// source fingerprint -> executable name, for checkers and
    /// interactors reused across runs of the same test data
    cached: Arc<Mutex<HashMap<u64, String>>>,
}

impl CompileClient {
    pub fn new(transport: Arc<dyn RunnerTransport>, conn: ConnectionManager) -> Self {
        CompileClient {
            transport,
            conn,
            cached: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Compile a source; on success the returned result carries the
    /// handle of the stored executable.
    pub async fn compile(
        &self,
        language: &str,
        source: &str,
        extra_files: Vec<NamedData>,
        priority: u32,
    ) -> Result<CompilationResult> {
        let executable_name = format!("exec-{}", Uuid::new_v4());
        let task = RunnerTask {
            id: Uuid::new_v4(),
            priority,
            payload: TaskPayload::Compile {
                language: language.to_string(),
                source: source.to_string(),
                extra_files,
                executable_name: executable_name.clone(),
            },
        };
        let (started_tx, _started_rx) = oneshot::channel();
        let result = self
            .transport
            .run_task(task, started_tx)
            .await
            .context("compile task transport failed")?;

        match result {
            TaskResult::Compile {
                success: true,
                message,
            } => {
                debug!(language = %language, executable = %executable_name, "compilation succeeded");
                Ok(CompilationResult::success(executable_name, message))
            }
            TaskResult::Compile {
                success: false,
                message,
            } => Ok(CompilationResult::failure(message)),
            TaskResult::Execute { .. } => {
                bail!("runner returned an execution result for a compile task")
            }
        }
    }

    /// Compile with reuse: identical sources map to the same stored
    /// binary, so a checker is built once per daemon process.
    pub async fn compile_cached(
        &self,
        language: &str,
        source: &str,
        priority: u32,
    ) -> Result<CompilationResult> {
        let key = fingerprint(language, source);
        let hit = {
            let cached = self.cached.lock().expect("compile cache lock poisoned");
            cached.get(&key).cloned()
        };
        if let Some(executable) = hit {
            debug!(executable = %executable, "checker binary cache hit");
            return Ok(CompilationResult::success(executable, String::new()));
        }

        let result = self.compile(language, source, Vec::new(), priority).await?;
        if let Some(executable) = result.executable.clone() {
            self.cached
                .lock()
                .expect("compile cache lock poisoned")
                .insert(key, executable);
        }
        Ok(result)
    }

    /// Drop a per-run executable from the registry. Best effort.
    pub async fn release(&self, executable: &str) {
        let mut conn = self.conn.clone();
        if let Err(e) = queue::release_executable(&mut conn, executable).await {
            warn!(executable = %executable, error = %e, "failed to release executable");
        }
    }
}

fn fingerprint(language: &str, source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    language.hash(&mut hasher);
    source.hash(&mut hasher);
    hasher.finish()
}
