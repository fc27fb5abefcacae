//! 协调者与工作者之间交换的消息
//!
//! 所有消息构造后不再修改。投递方式有三种：
//! - 单向投递：发送后继续执行，不等待确认
//! - 请求 / 响应：消息内携带回复地址，接收方必须且只回复一次
//! - 转发：见 [`Envelope`](super::Envelope)

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::models::{CapacityReport, GradingEvaluation, QuestionType, RubricItem, SubmissionJob};
use crate::protocol::Envelope;

/// 会话编号，用于丢弃过期回复
pub type SessionId = u64;

/// 协调者的收件地址
pub type CoordinatorAddress = mpsc::Sender<CoordinatorMessage>;

/// 评分请求的最终回复
pub type GradingOutcome = Result<GradingComplete, GradingFailed>;

/// 单个评分维度的评分任务
#[derive(Debug, Clone)]
pub struct GradeCategory {
    pub session_id: SessionId,
    pub category: String,
    pub content: Arc<str>,
    pub rubric_item: Arc<RubricItem>,
    pub question_type: QuestionType,
    pub correct_answers: Option<Arc<str>>,
    pub reply_to: CoordinatorAddress,
}

/// 容量探测请求
#[derive(Debug)]
pub struct GradingCapacityCheck {
    pub reply_to: oneshot::Sender<GradingCapacityResponse>,
}

/// 容量探测响应
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradingCapacityResponse {
    pub available_workers: usize,
    pub total_capacity: usize,
    pub queued_jobs: usize,
}

impl From<CapacityReport> for GradingCapacityResponse {
    fn from(report: CapacityReport) -> Self {
        Self {
            available_workers: report.available_workers,
            total_capacity: report.total_capacity,
            queued_jobs: report.queued_jobs,
        }
    }
}

impl From<GradingCapacityResponse> for CapacityReport {
    fn from(response: GradingCapacityResponse) -> Self {
        Self {
            available_workers: response.available_workers,
            total_capacity: response.total_capacity,
            queued_jobs: response.queued_jobs,
        }
    }
}

/// 评分成功的最终回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingComplete {
    pub student_id: String,
    pub assignment_name: String,
    pub total_score: u32,
    pub max_possible_score: u32,
    pub grade: String,
    pub overall_feedback: String,
    pub detailed_mcq_feedback: Option<String>,
    pub detailed_feedback: Option<String>,
}

/// 评分失败的最终回复
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct GradingFailed {
    pub student_id: String,
    pub assignment_name: String,
    pub reason: String,
}

impl GradingFailed {
    pub fn new(job: &SubmissionJob, reason: impl Into<String>) -> Self {
        Self {
            student_id: job.student_id.clone(),
            assignment_name: job.assignment_name.clone(),
            reason: reason.into(),
        }
    }
}

/// 写入结果文件的会话结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResult {
    pub student_id: String,
    pub assignment_name: String,
    pub question_type: QuestionType,
    pub total_score: u32,
    pub max_possible_score: u32,
    pub grade: String,
    pub overall_feedback: String,
    /// 按评分表顺序排列
    pub evaluations: Vec<GradingEvaluation>,
}

/// 协调者收件箱中的全部消息类型
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// 调用方发起评分（请求 / 响应）
    StartGrading {
        job: SubmissionJob,
        reply_to: oneshot::Sender<GradingOutcome>,
    },
    /// 中转方转发来的提交，回复直接发给原始调用方
    ForwardedSubmission(Envelope<SubmissionJob>),
    /// 询问协调者自身容量
    CapacityCheck(GradingCapacityCheck),

    RubricLoaded {
        session_id: SessionId,
        items: Vec<RubricItem>,
    },
    RubricLoadFailed {
        session_id: SessionId,
        error: String,
    },
    /// 工作者容量探测结束（超时或失败时为 `None`）
    CapacityChecked {
        session_id: SessionId,
        report: Option<CapacityReport>,
    },
    CategoryGraded {
        session_id: SessionId,
        evaluation: GradingEvaluation,
    },
    CategoryGradingFailed {
        session_id: SessionId,
        category: String,
        error: String,
    },
    FeedbackGenerated {
        session_id: SessionId,
        text: String,
    },
    FeedbackGenerationFailed {
        session_id: SessionId,
        error: String,
    },
    ResultsWritten {
        session_id: SessionId,
        path: PathBuf,
    },
    ResultsWriteFailed {
        session_id: SessionId,
        error: String,
    },
}

impl CoordinatorMessage {
    /// 日志中显示的消息名称
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorMessage::StartGrading { .. } => "StartGrading",
            CoordinatorMessage::ForwardedSubmission(_) => "ForwardedSubmission",
            CoordinatorMessage::CapacityCheck(_) => "CapacityCheck",
            CoordinatorMessage::RubricLoaded { .. } => "RubricLoaded",
            CoordinatorMessage::RubricLoadFailed { .. } => "RubricLoadFailed",
            CoordinatorMessage::CapacityChecked { .. } => "CapacityChecked",
            CoordinatorMessage::CategoryGraded { .. } => "CategoryGraded",
            CoordinatorMessage::CategoryGradingFailed { .. } => "CategoryGradingFailed",
            CoordinatorMessage::FeedbackGenerated { .. } => "FeedbackGenerated",
            CoordinatorMessage::FeedbackGenerationFailed { .. } => "FeedbackGenerationFailed",
            CoordinatorMessage::ResultsWritten { .. } => "ResultsWritten",
            CoordinatorMessage::ResultsWriteFailed { .. } => "ResultsWriteFailed",
        }
    }

    /// 取回转发消息中的信封
    pub fn into_forwarded(self) -> Option<Envelope<SubmissionJob>> {
        match self {
            CoordinatorMessage::ForwardedSubmission(envelope) => Some(envelope),
            _ => None,
        }
    }
}

/// 工作者收件箱中的消息
#[derive(Debug)]
pub enum WorkerMessage {
    Grade(GradeCategory),
}
