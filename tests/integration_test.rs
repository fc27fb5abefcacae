use anyhow::Result;
use async_trait::async_trait;
use grading_engine::error::AppResult;
use grading_engine::models::{GradingEvaluation, QuestionType, RubricItem, SubmissionJob};
use grading_engine::orchestrator::{App, Collaborators, Coordinator, CoordinatorHandle};
use grading_engine::protocol::{GradeCategory, GradingCapacityCheck, SessionResult};
use grading_engine::services::{
    CsvResultsWriter, EvaluationRequest, Evaluator, FeedbackSynthesizer, ResultsWriter,
    RubricSource, TomlRubricSource,
};
use grading_engine::worker::{SelectionStrategy, TaskDispatcher, WorkerPool};
use grading_engine::{Config, CoordinatorConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ========== 测试用协作者 ==========

/// 返回固定评分表
struct FixedRubric(Vec<RubricItem>);

#[async_trait]
impl RubricSource for FixedRubric {
    async fn load(&self, _path: &Path) -> Result<Vec<RubricItem>> {
        Ok(self.0.clone())
    }
}

struct MissingRubric;

#[async_trait]
impl RubricSource for MissingRubric {
    async fn load(&self, path: &Path) -> Result<Vec<RubricItem>> {
        anyhow::bail!("file not found: {}", path.display())
    }
}

/// 按维度名称给出预设分数，未列出的维度返回错误
struct ScriptedEvaluator {
    scores: HashMap<String, u32>,
}

impl ScriptedEvaluator {
    fn new(scores: &[(&str, u32)]) -> Self {
        Self {
            scores: scores.iter().map(|(c, s)| (c.to_string(), *s)).collect(),
        }
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(&self, request: EvaluationRequest<'_>) -> Result<GradingEvaluation> {
        let score = self
            .scores
            .get(request.category)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("evaluator unavailable for {}", request.category))?;
        Ok(GradingEvaluation::new(
            request.category,
            score,
            request.max_points,
            format!("{} looks fine", request.category),
            "Good",
        ))
    }
}

#[derive(Default)]
struct CountingFeedback {
    calls: AtomicUsize,
}

#[async_trait]
impl FeedbackSynthesizer for CountingFeedback {
    async fn synthesize(&self, _content: &str, evaluations: &[GradingEvaluation]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Overall: {} categories reviewed", evaluations.len()))
    }
}

struct FailingFeedback;

#[async_trait]
impl FeedbackSynthesizer for FailingFeedback {
    async fn synthesize(&self, _content: &str, _evaluations: &[GradingEvaluation]) -> Result<String> {
        anyhow::bail!("model overloaded")
    }
}

/// 把会话结果留在内存中
#[derive(Default)]
struct RecordingWriter {
    results: Mutex<Vec<SessionResult>>,
}

#[async_trait]
impl ResultsWriter for RecordingWriter {
    async fn append(&self, result: &SessionResult) -> Result<PathBuf> {
        self.results.lock().unwrap().push(result.clone());
        Ok(PathBuf::from("memory"))
    }
}

struct FailingWriter;

#[async_trait]
impl ResultsWriter for FailingWriter {
    async fn append(&self, _result: &SessionResult) -> Result<PathBuf> {
        anyhow::bail!("disk full")
    }
}

/// 分派给真实工作者池，但从不回复容量探测
struct SilentCapacityDispatcher {
    inner: WorkerPool,
    held: Mutex<Vec<GradingCapacityCheck>>,
}

#[async_trait]
impl TaskDispatcher for SilentCapacityDispatcher {
    async fn submit(&self, task: GradeCategory) -> AppResult<usize> {
        self.inner.submit(task).await
    }

    fn request_capacity(&self, check: GradingCapacityCheck) {
        self.held.lock().unwrap().push(check);
    }
}

// ========== 辅助函数 ==========

fn essay_rubric() -> Vec<RubricItem> {
    vec![
        RubricItem::new("Content Quality", "Depth of ideas", 30),
        RubricItem::new("Organization", "Structure and flow", 30),
        RubricItem::new("Evidence", "Use of sources", 30),
        RubricItem::new("Mechanics", "Grammar and spelling", 10),
    ]
}

fn pool(evaluator: ScriptedEvaluator) -> WorkerPool {
    WorkerPool::spawn(4, Arc::new(evaluator), SelectionStrategy::LeastLoaded, 2).unwrap()
}

fn coordinator_config() -> CoordinatorConfig {
    CoordinatorConfig {
        capacity_check_timeout: Duration::from_millis(200),
        grading_timeout: Duration::from_secs(10),
        ..CoordinatorConfig::default()
    }
}

fn spawn_coordinator(
    rubric_source: Arc<dyn RubricSource>,
    dispatcher: Arc<dyn TaskDispatcher>,
    feedback: Arc<dyn FeedbackSynthesizer>,
    writer: Arc<dyn ResultsWriter>,
) -> CoordinatorHandle {
    Coordinator::spawn(
        0,
        coordinator_config(),
        Collaborators {
            rubric_source,
            dispatcher,
            feedback,
            writer,
        },
    )
}

fn essay_job(student_id: &str) -> SubmissionJob {
    SubmissionJob::new(student_id, "Essay 1", "The industrial revolution changed...", QuestionType::Essay)
}

const FULL_SCORES: &[(&str, u32)] = &[
    ("Content Quality", 30),
    ("Organization", 25),
    ("Evidence", 28),
    ("Mechanics", 9),
];

// ========== 测试 ==========

#[tokio::test]
async fn test_essay_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let results_path = dir.path().join("results.csv");
    let feedback = Arc::new(CountingFeedback::default());

    let handle = spawn_coordinator(
        Arc::new(FixedRubric(essay_rubric())),
        Arc::new(pool(ScriptedEvaluator::new(FULL_SCORES))),
        feedback.clone(),
        Arc::new(CsvResultsWriter::new(&results_path)),
    );

    let complete = handle.start_grading(essay_job("S1")).await.unwrap().unwrap();

    assert_eq!(complete.student_id, "S1");
    assert_eq!(complete.assignment_name, "Essay 1");
    assert_eq!(complete.total_score, 92);
    assert_eq!(complete.max_possible_score, 100);
    assert_eq!(complete.grade, "A");
    assert_eq!(complete.overall_feedback, "Overall: 4 categories reviewed");
    assert!(complete.detailed_mcq_feedback.is_none());
    assert_eq!(feedback.calls.load(Ordering::SeqCst), 1);

    let written = std::fs::read_to_string(&results_path).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("S1"));
    assert!(lines[1].contains("Content Quality=30/30"));
}

#[tokio::test]
async fn test_failed_category_degrades_to_zero() {
    let writer = Arc::new(RecordingWriter::default());
    let feedback = Arc::new(CountingFeedback::default());

    // Evidence 没有预设分数，评估失败
    let handle = spawn_coordinator(
        Arc::new(FixedRubric(essay_rubric())),
        Arc::new(pool(ScriptedEvaluator::new(&[
            ("Content Quality", 30),
            ("Organization", 25),
            ("Mechanics", 9),
        ]))),
        feedback.clone(),
        writer.clone(),
    );

    let complete = handle.start_grading(essay_job("S2")).await.unwrap().unwrap();
    assert_eq!(complete.total_score, 64);
    assert_eq!(complete.max_possible_score, 100);
    assert_eq!(complete.grade, "D");
    assert_eq!(feedback.calls.load(Ordering::SeqCst), 1);

    let results = writer.results.lock().unwrap();
    let evidence = &results[0].evaluations[2];
    assert_eq!(evidence.category, "Evidence");
    assert_eq!(evidence.score, 0);
    assert_eq!(evidence.max_points, 30);
    assert_eq!(evidence.score_band, "Needs Improvement");
    assert!(evidence.feedback.starts_with("Grading failed: "));
    assert!(evidence.feedback.contains("evaluator unavailable"));
}

#[tokio::test]
async fn test_rubric_load_failure_is_reported() {
    let feedback = Arc::new(CountingFeedback::default());
    let handle = spawn_coordinator(
        Arc::new(MissingRubric),
        Arc::new(pool(ScriptedEvaluator::new(FULL_SCORES))),
        feedback.clone(),
        Arc::new(RecordingWriter::default()),
    );

    let failed = handle.start_grading(essay_job("S3")).await.unwrap().unwrap_err();
    assert_eq!(failed.student_id, "S3");
    assert!(failed.reason.starts_with("Rubric load failed: "));
    assert!(failed.reason.contains("essay.toml"));
    assert_eq!(feedback.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_rubric_is_a_load_failure() {
    let handle = spawn_coordinator(
        Arc::new(FixedRubric(Vec::new())),
        Arc::new(pool(ScriptedEvaluator::new(FULL_SCORES))),
        Arc::new(CountingFeedback::default()),
        Arc::new(RecordingWriter::default()),
    );

    let failed = handle.start_grading(essay_job("S4")).await.unwrap().unwrap_err();
    assert!(failed.reason.starts_with("Rubric load failed: "));
}

#[tokio::test]
async fn test_results_write_failure_is_fatal() {
    let handle = spawn_coordinator(
        Arc::new(FixedRubric(essay_rubric())),
        Arc::new(pool(ScriptedEvaluator::new(FULL_SCORES))),
        Arc::new(CountingFeedback::default()),
        Arc::new(FailingWriter),
    );

    let failed = handle.start_grading(essay_job("S5")).await.unwrap().unwrap_err();
    assert!(failed.reason.starts_with("Results write failed: "));
    assert!(failed.reason.contains("disk full"));
}

#[tokio::test]
async fn test_feedback_failure_degrades() {
    let handle = spawn_coordinator(
        Arc::new(FixedRubric(essay_rubric())),
        Arc::new(pool(ScriptedEvaluator::new(FULL_SCORES))),
        Arc::new(FailingFeedback),
        Arc::new(RecordingWriter::default()),
    );

    let complete = handle.start_grading(essay_job("S6")).await.unwrap().unwrap();
    assert_eq!(complete.total_score, 92);
    assert_eq!(
        complete.overall_feedback,
        "Feedback generation failed: model overloaded"
    );
}

#[tokio::test]
async fn test_capacity_timeout_does_not_block_fan_out() {
    let dispatcher = Arc::new(SilentCapacityDispatcher {
        inner: pool(ScriptedEvaluator::new(FULL_SCORES)),
        held: Mutex::new(Vec::new()),
    });
    let handle = spawn_coordinator(
        Arc::new(FixedRubric(essay_rubric())),
        dispatcher.clone(),
        Arc::new(CountingFeedback::default()),
        Arc::new(RecordingWriter::default()),
    );

    let started = Instant::now();
    let complete = handle.start_grading(essay_job("S7")).await.unwrap().unwrap();

    assert_eq!(complete.total_score, 92);
    assert_eq!(dispatcher.held.lock().unwrap().len(), 1);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_mcq_flow_with_toml_rubric() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("mcq.toml"),
        r#"
[[items]]
category = "Answers"
description = "Multiple choice answers"
max_points = 100

[items.excellent]
description = "All answers correct"
points = 100
"#,
    )
    .unwrap();

    let config = CoordinatorConfig {
        rubric_folder: dir.path().to_path_buf(),
        ..coordinator_config()
    };
    let handle = Coordinator::spawn(
        0,
        config,
        Collaborators {
            rubric_source: Arc::new(TomlRubricSource),
            dispatcher: Arc::new(pool(ScriptedEvaluator::new(&[("Answers", 10)]))),
            feedback: Arc::new(CountingFeedback::default()),
            writer: Arc::new(RecordingWriter::default()),
        },
    );

    let key = "Question 1: 2+2?\nAnswer: B\nQuestion 2: Capital of France?\nAnswer: A\n\
               Question 3: H2O is?\nAnswer: C\nQuestion 4: Largest planet?\nAnswer: D\n";
    let answers = "Question 1: 2+2?\nAnswer: b\nQuestion 2: Capital of France?\nAnswer: A\n\
                   Question 3: H2O is?\nAnswer: C\nQuestion 4: Largest planet?\nAnswer:\n";
    let job = SubmissionJob::new("S8", "Quiz 1", answers, QuestionType::Mcq).with_correct_answers(key);

    let complete = handle.start_grading(job).await.unwrap().unwrap();
    assert_eq!(complete.total_score, 75);
    assert_eq!(complete.max_possible_score, 100);
    assert_eq!(complete.grade, "C");

    let detailed = complete.detailed_mcq_feedback.unwrap();
    assert!(detailed.starts_with("Score: 3/4 questions correct."));
    assert!(detailed.contains("Question 4: Incorrect. Your answer: no answer provided. Correct answer: D."));
}

#[tokio::test]
async fn test_app_grades_batches_through_router() {
    let writer = Arc::new(RecordingWriter::default());
    let config = Config {
        max_concurrent_submissions: 2,
        coordinator_count: 2,
        capacity_check_timeout_ms: 200,
        grading_timeout_secs: 10,
        ..Config::default()
    };
    let app = App::with_collaborators(
        config,
        Collaborators {
            rubric_source: Arc::new(FixedRubric(essay_rubric())),
            dispatcher: Arc::new(pool(ScriptedEvaluator::new(FULL_SCORES))),
            feedback: Arc::new(CountingFeedback::default()),
            writer: writer.clone(),
        },
    );

    let submissions = (1..=5).map(|i| essay_job(&format!("S{}", i))).collect();
    let stats = app.grade_all(submissions).await.unwrap();

    assert_eq!(stats.total, 5);
    assert_eq!(stats.success, 5);
    assert_eq!(stats.failed, 0);

    let mut students: Vec<String> = writer
        .results
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.student_id.clone())
        .collect();
    students.sort();
    assert_eq!(students, vec!["S1", "S2", "S3", "S4", "S5"]);
}

#[tokio::test]
async fn test_app_run_loads_submission_folder() {
    let dir = tempfile::tempdir().unwrap();
    let submissions = dir.path().join("submissions");
    std::fs::create_dir(&submissions).unwrap();
    std::fs::write(
        submissions.join("s1.toml"),
        r#"
student_id = "S1"
assignment_name = "Essay 1"
content = "An essay"
question_type = "ESSAY"
"#,
    )
    .unwrap();
    // 选择题缺少标准答案，加载时被跳过
    std::fs::write(
        submissions.join("s2.toml"),
        r#"
student_id = "S2"
assignment_name = "Quiz 1"
content = "Question 1: x\nAnswer: A"
question_type = "MCQ"
"#,
    )
    .unwrap();

    let config = Config {
        submissions_folder: submissions.to_string_lossy().into_owned(),
        coordinator_count: 1,
        ..Config::default()
    };
    let app = App::with_collaborators(
        config,
        Collaborators {
            rubric_source: Arc::new(FixedRubric(essay_rubric())),
            dispatcher: Arc::new(pool(ScriptedEvaluator::new(FULL_SCORES))),
            feedback: Arc::new(CountingFeedback::default()),
            writer: Arc::new(RecordingWriter::default()),
        },
    );

    let stats = app.run().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.success, 1);
}
