use anyhow::{bail, ensure, Context, Result};
use minos_common::types::{ProblemType, ScoringMode, Subtask, TestData, TestcaseJudge};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Loads test-data packages and keeps them cached for the daemon's
/// lifetime. A package is a directory under the configured root, either
/// carrying a `data.yml` manifest or relying on auto-detection.
pub struct TestDataCache {
    root: PathBuf,
    loaded: Mutex<HashMap<String, Arc<TestData>>>,
}

impl TestDataCache {
    pub fn new(root: PathBuf) -> Self {
        TestDataCache {
            root,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub async fn load(&self, name: &str) -> Result<Arc<TestData>> {
        if let Some(data) = self.loaded.lock().await.get(name).cloned() {
            debug!(package = %name, "test data cache hit");
            return Ok(data);
        }
        let data = Arc::new(read_package(&self.root, name).await?);
        info!(
            package = %name,
            subtasks = data.subtasks.len(),
            "test data package loaded"
        );
        self.loaded
            .lock()
            .await
            .insert(name.to_string(), data.clone());
        Ok(data)
    }

    /// Directory of a loaded package, for checker sources and previews.
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

async fn read_package(root: &Path, name: &str) -> Result<TestData> {
    ensure!(
        !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != "..",
        "invalid test data name '{}'",
        name
    );
    let dir = root.join(name);
    if !dir.is_dir() {
        bail!(
            "test data package '{}' not found under {}",
            name,
            root.display()
        );
    }

    let manifest_path = dir.join("data.yml");
    let mut data = if tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
        let raw = tokio::fs::read_to_string(&manifest_path)
            .await
            .context("failed to read data.yml")?;
        serde_yaml::from_str::<TestData>(&raw).context("failed to parse data.yml")?
    } else {
        auto_detect(&dir).await?
    };
    data.name = name.to_string();
    validate(&data)?;
    Ok(data)
}

fn validate(data: &TestData) -> Result<()> {
    ensure!(
        !data.subtasks.is_empty(),
        "test data declares no subtasks"
    );
    for (index, subtask) in data.subtasks.iter().enumerate() {
        ensure!(
            !subtask.cases.is_empty(),
            "subtask {} declares no cases",
            index
        );
        ensure!(
            subtask.score.is_finite() && subtask.score >= 0.0,
            "subtask {} has invalid score {}",
            index,
            subtask.score
        );
    }
    Ok(())
}

/// Manifest-less package: pair every `x.in` with `x.out` when present and
/// judge everything as one summation subtask worth the full 100 points.
async fn auto_detect(dir: &Path) -> Result<TestData> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .context("failed to list test data directory")?;
    let mut stems = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stem) = file_name.strip_suffix(".in") {
            stems.push(stem.to_string());
        }
    }
    ensure!(!stems.is_empty(), "no testcases found in {}", dir.display());
    stems.sort_by_key(|stem| natural_key(stem));

    let mut cases = Vec::with_capacity(stems.len());
    for stem in stems {
        let out = format!("{}.out", stem);
        let output = if tokio::fs::try_exists(dir.join(&out)).await.unwrap_or(false) {
            Some(out)
        } else {
            None
        };
        cases.push(TestcaseJudge {
            name: stem.clone(),
            input: Some(format!("{}.in", stem)),
            output,
        });
    }

    Ok(TestData {
        name: String::new(),
        problem_type: ProblemType::Standard,
        subtasks: vec![Subtask {
            mode: ScoringMode::Summation,
            score: 100.0,
            cases,
            dependencies: Vec::new(),
        }],
        spj: None,
        extra_source_files: HashMap::new(),
    })
}

/// Sort key putting purely numeric names in numeric order ("2" before
/// "10"), everything else lexicographically after them.
fn natural_key(stem: &str) -> (u8, u64, String) {
    match stem.parse::<u64>() {
        Ok(n) => (0, n, String::new()),
        Err(_) => (1, 0, stem.to_string()),
    }
}

/// Read at most `limit` bytes of a file, lossily decoded.
/// Missing or unreadable files read as the empty string.
pub async fn read_file_head(path: &Path, limit: usize) -> String {
    let Ok(file) = tokio::fs::File::open(path).await else {
        return String::new();
    };
    let mut buf = Vec::with_capacity(limit.min(64 * 1024));
    let mut head = file.take(limit as u64);
    if head.read_to_end(&mut buf).await.is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_key_orders_numbers_numerically() {
        let mut stems = vec!["10", "2", "1", "sample", "3"];
        stems.sort_by_key(|s| natural_key(s));
        assert_eq!(stems, vec!["1", "2", "3", "10", "sample"]);
    }

    #[test]
    fn test_manifest_parsing() {
        let manifest = r#"
type: standard
subtasks:
  - type: min
    score: 40
    cases:
      - name: c1
        input: c1.in
        output: c1.out
  - type: min
    score: 60
    dependencies: [0]
    cases:
      - name: c2
        input: c2.in
        output: c2.out
spj:
  language: cpp
  source: checker.cpp
"#;
        let data: TestData = serde_yaml::from_str(manifest).unwrap();
        assert_eq!(data.subtasks.len(), 2);
        assert_eq!(data.subtasks[0].mode, ScoringMode::Minimum);
        assert_eq!(data.subtasks[1].dependencies, vec![0]);
        assert_eq!(data.spj.as_ref().unwrap().source, "checker.cpp");
        assert!(validate(&data).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_subtask() {
        let data = TestData {
            name: "broken".to_string(),
            problem_type: ProblemType::Standard,
            subtasks: vec![Subtask {
                mode: ScoringMode::Summation,
                score: 100.0,
                cases: Vec::new(),
                dependencies: Vec::new(),
            }],
            spj: None,
            extra_source_files: HashMap::new(),
        };
        assert!(validate(&data).is_err());
    }
}
