use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Scoring mode of a subtask
/// - Minimum: the weakest case decides the whole subtask
/// - Multiple: product of per-case ratios
/// - Summation: mean of per-case ratios, cases run in parallel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    #[serde(alias = "min")]
    Minimum,
    #[serde(alias = "mul")]
    Multiple,
    #[serde(alias = "sum")]
    Summation,
}

impl ScoringMode {
    /// Minimum and Multiple subtasks stop evaluating once a case earns zero
    pub fn is_skippable(self) -> bool {
        matches!(self, ScoringMode::Minimum | ScoringMode::Multiple)
    }
}

/// Problem type - selects the judger specialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemType {
    Standard,
    AnswerSubmission,
    Interactive,
}

impl Default for ProblemType {
    fn default() -> Self {
        ProblemType::Standard
    }
}

/// One testcase as declared by the test data
///
/// `name` doubles as the deduplication key: within one judge run a case
/// name is evaluated at most once no matter how many subtasks list it.
/// `input`/`output` are file names relative to the test-data directory;
/// either may be absent (e.g. interactive problems have no output file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestcaseJudge {
    pub name: String,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

/// A named group of testcases sharing a scoring rule and weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    #[serde(rename = "type")]
    pub mode: ScoringMode,
    pub score: f64,
    pub cases: Vec<TestcaseJudge>,
    /// Indices into the sibling subtask list. Any DAG is allowed, but an
    /// edge may only connect Minimum subtasks.
    #[serde(default)]
    pub dependencies: Vec<usize>,
}

/// Special judge: problem-supplied checker source plus its language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialJudge {
    pub language: String,
    /// Source file name relative to the test-data directory
    pub source: String,
}

/// Helper file attached to the user's compilation for one language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraSourceFile {
    /// Destination file name next to the user's source
    pub name: String,
    /// Source file name relative to the test-data directory
    pub file: String,
}

/// Immutable input to a judge run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestData {
    /// Filled from the package directory name when loaded from a manifest
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub problem_type: ProblemType,
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub spj: Option<SpecialJudge>,
    /// Language name -> helper files compiled together with the submission
    #[serde(default)]
    pub extra_source_files: HashMap<String, Vec<ExtraSourceFile>>,
}

/// Program verdict for one testcase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestcaseResultKind {
    Accepted,
    WrongAnswer,
    PartiallyCorrect,
    MemoryLimitExceeded,
    TimeLimitExceeded,
    OutputLimitExceeded,
    FileError,
    RuntimeError,
    JudgementFailed,
    InvalidInteraction,
}

/// Truncated view of a testcase file shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePreview {
    pub name: String,
    pub content: String,
}

/// Everything recorded about one judged testcase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestcaseDetails {
    #[serde(rename = "type")]
    pub kind: TestcaseResultKind,
    /// Wall time in milliseconds
    pub time: u64,
    /// Peak memory in KiB
    pub memory: u64,
    /// Fraction of this case's credit earned, in [0, 1]
    pub scoring_rate: f64,
    #[serde(default)]
    pub user_output: Option<String>,
    #[serde(default)]
    pub user_error: Option<String>,
    #[serde(default)]
    pub spj_message: Option<String>,
    #[serde(default)]
    pub system_message: Option<String>,
    #[serde(default)]
    pub input: Option<FilePreview>,
    #[serde(default)]
    pub output: Option<FilePreview>,
    /// Stderr of the instrumented rerun, filled only by the diagnostics driver
    #[serde(default)]
    pub diagnostics: Option<String>,
}

/// Lifecycle state shared by cases and subtasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Waiting,
    Running,
    Done,
    Skipped,
    Failed,
}

/// State of one case inside a judge run
///
/// `Failed` means the runner or transport broke, not a program verdict;
/// the message lands in `error_message` and the owning subtask's score
/// becomes NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub status: RunStatus,
    #[serde(default)]
    pub result: Option<TestcaseDetails>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl CaseResult {
    pub fn waiting() -> Self {
        CaseResult {
            status: RunStatus::Waiting,
            result: None,
            error_message: None,
        }
    }

    pub fn done(details: TestcaseDetails) -> Self {
        CaseResult {
            status: RunStatus::Done,
            result: Some(details),
            error_message: None,
        }
    }

    pub fn skipped() -> Self {
        CaseResult {
            status: RunStatus::Skipped,
            result: None,
            error_message: None,
        }
    }

    pub fn failed(message: String) -> Self {
        CaseResult {
            status: RunStatus::Failed,
            result: None,
            error_message: Some(message),
        }
    }
}

/// Aggregated state of one subtask
///
/// `score` is in `[0, subtask.score]`, or NaN when any case Failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskResult {
    pub status: RunStatus,
    pub score: f64,
    pub cases: Vec<CaseResult>,
}

/// Full snapshot of a judge run; each snapshot supersedes its predecessor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeResult {
    pub subtasks: Vec<SubtaskResult>,
}

impl JudgeResult {
    /// Sum of subtask scores; subtasks poisoned to NaN contribute zero
    pub fn total_score(&self) -> f64 {
        self.subtasks
            .iter()
            .map(|s| if s.score.is_nan() { 0.0 } else { s.score })
            .sum()
    }
}

/// Per-submission resource limits forwarded to the runner
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub time_ms: u64,
    pub memory_mb: u64,
}

/// Retry bookkeeping for the submission intake loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    pub attempts: u8,
    pub max_attempts: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_reason: Option<String>,
}

impl Default for SubmissionMetadata {
    fn default() -> Self {
        Self {
            attempts: 0,
            max_attempts: 3,
            last_failure_reason: None,
        }
    }
}

/// Submission Input (Immutable)
/// A submission is write-once - the judge never mutates its fields.
/// `test_data` names the test-data package to judge against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub test_data: String,
    pub language: String,
    pub source: String,
    pub limits: ResourceLimits,
    /// Overrides the daemon's default task priority when set
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub metadata: SubmissionMetadata,
}

/// Outcome of compiling one source against one language descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilationResult {
    pub success: bool,
    pub message: String,
    /// Handle of the stored executable, present on success
    #[serde(default)]
    pub executable: Option<String>,
}

impl CompilationResult {
    pub fn success(executable: String, message: String) -> Self {
        CompilationResult {
            success: true,
            message,
            executable: Some(executable),
        }
    }

    pub fn failure(message: String) -> Self {
        CompilationResult {
            success: false,
            message,
            executable: None,
        }
    }
}

/// In-memory file shipped inside a task payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedData {
    pub name: String,
    pub content: String,
}

/// Task payload forwarded to a runner
///
/// The judge treats these as opaque beyond construction; the runner
/// resolves test-data files by name on its own copy of the package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskPayload {
    Compile {
        language: String,
        source: String,
        extra_files: Vec<NamedData>,
        /// Name under which the runner registers the produced executable
        executable_name: String,
    },
    Standard {
        test_data_name: String,
        input_file: Option<String>,
        answer_file: Option<String>,
        time_ms: u64,
        memory_mb: u64,
        file_io_input: Option<String>,
        file_io_output: Option<String>,
        user_executable: String,
        spj_executable: Option<String>,
    },
    AnswerCheck {
        test_data_name: String,
        input_file: Option<String>,
        answer_file: Option<String>,
        user_answer: String,
        spj_executable: Option<String>,
    },
    Interactive {
        test_data_name: String,
        input_file: Option<String>,
        time_ms: u64,
        memory_mb: u64,
        user_executable: String,
        interactor_executable: String,
    },
}

/// One unit of work on the runner queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerTask {
    pub id: Uuid,
    pub priority: u32,
    pub payload: TaskPayload,
}

/// Result delivered by a runner, one per task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskResult {
    Compile {
        success: bool,
        message: String,
    },
    Execute {
        kind: TestcaseResultKind,
        time: u64,
        memory: u64,
        scoring_rate: f64,
        #[serde(default)]
        user_output: Option<String>,
        #[serde(default)]
        user_error: Option<String>,
        #[serde(default)]
        spj_message: Option<String>,
        #[serde(default)]
        system_message: Option<String>,
    },
}

/// Event stream of one runner task, delivered over its event list
///
/// `started` arrives at most once, strictly before the terminal event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TaskEvent {
    Started,
    Done { result: TaskResult },
    Failed { message: String },
}

/// Terminal status of a judged submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    CompileError,
    Judged,
    SystemError,
}

/// Stored outcome of a submission - the persistent result sink record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub submission_id: Uuid,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub compile_message: Option<String>,
    /// Internal fault description, set only for `SystemError` reports
    #[serde(default)]
    pub system_message: Option<String>,
    #[serde(default)]
    pub result: Option<JudgeResult>,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoring_mode_serialization() {
        let mode = ScoringMode::Minimum;
        let json = serde_json::to_string(&mode).unwrap();
        assert_eq!(json, "\"minimum\"");

        let deserialized: ScoringMode = serde_json::from_str("\"min\"").unwrap();
        assert_eq!(deserialized, ScoringMode::Minimum);
        let deserialized: ScoringMode = serde_json::from_str("\"sum\"").unwrap();
        assert_eq!(deserialized, ScoringMode::Summation);
    }

    #[test]
    fn test_skippable_modes() {
        assert!(ScoringMode::Minimum.is_skippable());
        assert!(ScoringMode::Multiple.is_skippable());
        assert!(!ScoringMode::Summation.is_skippable());
    }

    #[test]
    fn test_subtask_deserialization_defaults() {
        let yaml_equivalent = r#"{
            "type": "min",
            "score": 40.0,
            "cases": [{"name": "c1", "input": "c1.in", "output": "c1.out"}]
        }"#;
        let subtask: Subtask = serde_json::from_str(yaml_equivalent).unwrap();
        assert_eq!(subtask.mode, ScoringMode::Minimum);
        assert!(subtask.dependencies.is_empty());
        assert_eq!(subtask.cases[0].name, "c1");
    }

    #[test]
    fn test_submission_round_trip() {
        let submission = Submission {
            id: Uuid::new_v4(),
            test_data: "aplusb".to_string(),
            language: "cpp".to_string(),
            source: "int main() {}".to_string(),
            limits: ResourceLimits {
                time_ms: 1000,
                memory_mb: 256,
            },
            priority: None,
            metadata: SubmissionMetadata::default(),
        };

        let json = serde_json::to_string(&submission).unwrap();
        let deserialized: Submission = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.test_data, "aplusb");
        assert_eq!(deserialized.limits.time_ms, 1000);
        assert_eq!(deserialized.metadata.max_attempts, 3);
    }

    #[test]
    fn test_task_payload_tagging() {
        let payload = TaskPayload::Standard {
            test_data_name: "aplusb".to_string(),
            input_file: Some("1.in".to_string()),
            answer_file: Some("1.out".to_string()),
            time_ms: 1000,
            memory_mb: 256,
            file_io_input: None,
            file_io_output: None,
            user_executable: "exec-1".to_string(),
            spj_executable: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"type\":\"standard\""));
    }

    #[test]
    fn test_task_event_wire_format() {
        let started: TaskEvent = serde_json::from_str(r#"{"event":"started"}"#).unwrap();
        assert!(matches!(started, TaskEvent::Started));

        let failed: TaskEvent =
            serde_json::from_str(r#"{"event":"failed","message":"runner gone"}"#).unwrap();
        match failed {
            TaskEvent::Failed { message } => assert_eq!(message, "runner gone"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_total_score_ignores_nan() {
        let result = JudgeResult {
            subtasks: vec![
                SubtaskResult {
                    status: RunStatus::Done,
                    score: 40.0,
                    cases: vec![],
                },
                SubtaskResult {
                    status: RunStatus::Failed,
                    score: f64::NAN,
                    cases: vec![],
                },
                SubtaskResult {
                    status: RunStatus::Done,
                    score: 25.0,
                    cases: vec![],
                },
            ],
        };
        assert_eq!(result.total_score(), 65.0);
    }
}
