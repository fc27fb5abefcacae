//! 评分会话
//!
//! 一个会话对应一份正在评分的提交，由协调者独占。
//! 从评分表加载完成到全部维度回收之间始终满足
//! `pending_count == rubric.len() - evaluations.len()`。

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::models::{summarize, GradingEvaluation, QuestionType, RubricItem, ScoreSummary, SubmissionJob};
use crate::protocol::{
    CoordinatorAddress, GradeCategory, GradingComplete, GradingOutcome, SessionId, SessionResult,
};

/// 记录一个维度结果的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// 该维度已有结果
    Duplicate,
    /// 评分表中没有该维度
    UnknownCategory,
}

pub struct GradingSession {
    pub id: SessionId,
    pub job: SubmissionJob,
    content: Arc<str>,
    correct_answers: Option<Arc<str>>,
    reply_to: Option<oneshot::Sender<GradingOutcome>>,
    /// 会话期间保持协调者收件箱可用
    address: CoordinatorAddress,
    rubric: Vec<Arc<RubricItem>>,
    pub pending_count: usize,
    evaluations: HashMap<String, GradingEvaluation>,
    pub generated_feedback: Option<String>,
    pub detailed_mcq_feedback: Option<String>,
    pub detailed_short_answer_feedback: Option<String>,
    summary: Option<ScoreSummary>,
}

impl GradingSession {
    pub fn new(
        id: SessionId,
        job: SubmissionJob,
        reply_to: oneshot::Sender<GradingOutcome>,
        address: CoordinatorAddress,
    ) -> Self {
        let content = Arc::from(job.content.as_str());
        let correct_answers = job.answer_key().map(Arc::from);
        Self {
            id,
            job,
            content,
            correct_answers,
            reply_to: Some(reply_to),
            address,
            rubric: Vec::new(),
            pending_count: 0,
            evaluations: HashMap::new(),
            generated_feedback: None,
            detailed_mcq_feedback: None,
            detailed_short_answer_feedback: None,
            summary: None,
        }
    }

    pub fn address(&self) -> &CoordinatorAddress {
        &self.address
    }

    pub fn content(&self) -> Arc<str> {
        self.content.clone()
    }

    /// 保存评分表，待回收数量等于评分项数量
    pub fn set_rubric(&mut self, items: Vec<RubricItem>) {
        self.rubric = items.into_iter().map(Arc::new).collect();
        self.evaluations.clear();
        self.pending_count = self.rubric.len();
    }

    pub fn rubric(&self) -> &[Arc<RubricItem>] {
        &self.rubric
    }

    pub fn rubric_max_for(&self, category: &str) -> Option<u32> {
        self.rubric
            .iter()
            .find(|item| item.category == category)
            .map(|item| item.max_points)
    }

    /// 每个评分项一个任务
    pub fn build_tasks(&self) -> Vec<GradeCategory> {
        self.rubric
            .iter()
            .map(|item| GradeCategory {
                session_id: self.id,
                category: item.category.clone(),
                content: self.content.clone(),
                rubric_item: item.clone(),
                question_type: self.job.question_type,
                correct_answers: self.correct_answers.clone(),
                reply_to: self.address.clone(),
            })
            .collect()
    }

    /// 记录工作者返回的评估，同时提取题型相关的附加反馈
    ///
    /// 选择题的逐题反馈超过 `mcq_feedback_min_len` 个字符时作为详细反馈保存；
    /// 简答题保存评估中的 `detailed_feedback`。
    pub fn record_graded(&mut self, evaluation: GradingEvaluation, mcq_feedback_min_len: usize) -> RecordOutcome {
        let outcome = self.check_category(&evaluation.category);
        if outcome != RecordOutcome::Recorded {
            return outcome;
        }

        match self.job.question_type {
            QuestionType::Mcq => {
                if evaluation.feedback.chars().count() > mcq_feedback_min_len {
                    self.detailed_mcq_feedback = Some(evaluation.feedback.clone());
                }
            }
            QuestionType::ShortAnswer => {
                if let Some(detailed) = &evaluation.detailed_feedback {
                    self.detailed_short_answer_feedback = Some(detailed.clone());
                }
            }
            QuestionType::Essay => {}
        }

        self.store(evaluation);
        RecordOutcome::Recorded
    }

    /// 维度评估失败，记为零分占位结果
    pub fn record_failed(&mut self, category: &str, error: &str) -> RecordOutcome {
        let outcome = self.check_category(category);
        if outcome != RecordOutcome::Recorded {
            return outcome;
        }

        let max_points = self.rubric_max_for(category).unwrap_or(0);
        self.store(GradingEvaluation::failed(category, max_points, error));
        RecordOutcome::Recorded
    }

    fn check_category(&self, category: &str) -> RecordOutcome {
        if self.rubric_max_for(category).is_none() {
            RecordOutcome::UnknownCategory
        } else if self.evaluations.contains_key(category) {
            RecordOutcome::Duplicate
        } else {
            RecordOutcome::Recorded
        }
    }

    fn store(&mut self, evaluation: GradingEvaluation) {
        self.evaluations.insert(evaluation.category.clone(), evaluation);
        self.pending_count = self.rubric.len() - self.evaluations.len();
    }

    pub fn evaluation_count(&self) -> usize {
        self.evaluations.len()
    }

    /// 全部维度都已回收
    pub fn is_graded(&self) -> bool {
        !self.rubric.is_empty() && self.pending_count == 0
    }

    /// 按评分表顺序排列的评估结果
    pub fn evaluations_in_rubric_order(&self) -> Vec<GradingEvaluation> {
        self.rubric
            .iter()
            .filter_map(|item| self.evaluations.get(&item.category).cloned())
            .collect()
    }

    /// 计算总分与等级
    pub fn summarize(&mut self) -> ScoreSummary {
        let summary = summarize(self.job.question_type, &self.evaluations_in_rubric_order());
        self.summary = Some(summary);
        summary
    }

    fn overall_feedback(&self) -> String {
        self.generated_feedback.clone().unwrap_or_default()
    }

    /// 写入结果文件的内容
    pub fn session_result(&mut self) -> SessionResult {
        let summary = self.summary.unwrap_or_else(|| self.summarize());
        SessionResult {
            student_id: self.job.student_id.clone(),
            assignment_name: self.job.assignment_name.clone(),
            question_type: self.job.question_type,
            total_score: summary.total_score,
            max_possible_score: summary.max_possible_score,
            grade: summary.grade.to_string(),
            overall_feedback: self.overall_feedback(),
            evaluations: self.evaluations_in_rubric_order(),
        }
    }

    /// 评分成功时给调用方的回复
    pub fn completion(&mut self) -> GradingComplete {
        let summary = self.summary.unwrap_or_else(|| self.summarize());
        GradingComplete {
            student_id: self.job.student_id.clone(),
            assignment_name: self.job.assignment_name.clone(),
            total_score: summary.total_score,
            max_possible_score: summary.max_possible_score,
            grade: summary.grade.to_string(),
            overall_feedback: self.overall_feedback(),
            detailed_mcq_feedback: self.detailed_mcq_feedback.clone(),
            detailed_feedback: self.detailed_short_answer_feedback.clone(),
        }
    }

    /// 取出回复地址，保证只回复一次
    pub fn take_reply_to(&mut self) -> Option<oneshot::Sender<GradingOutcome>> {
        self.reply_to.take()
    }
}
