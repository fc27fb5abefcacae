use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SubmissionError;

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    Mcq,
    ShortAnswer,
    Essay,
}

impl QuestionType {
    /// 协议与结果文件中使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Mcq => "MCQ",
            QuestionType::ShortAnswer => "SHORT_ANSWER",
            QuestionType::Essay => "ESSAY",
        }
    }

    /// 评分表文件名
    pub fn file_stem(&self) -> &'static str {
        match self {
            QuestionType::Mcq => "mcq",
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::Essay => "essay",
        }
    }

    /// 是否需要标准答案
    pub fn requires_answer_key(&self) -> bool {
        matches!(self, QuestionType::Mcq | QuestionType::ShortAnswer)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = SubmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "MCQ" => Ok(QuestionType::Mcq),
            "SHORT_ANSWER" => Ok(QuestionType::ShortAnswer),
            "ESSAY" => Ok(QuestionType::Essay),
            _ => Err(SubmissionError::UnknownQuestionType {
                value: s.to_string(),
            }),
        }
    }
}

/// 一份待评分的学生提交
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionJob {
    pub student_id: String,
    pub assignment_name: String,
    /// 原始作答文本
    pub content: String,
    pub question_type: QuestionType,
    /// 标准答案（选择题 / 简答题必填）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answers: Option<String>,
}

impl SubmissionJob {
    pub fn new(
        student_id: impl Into<String>,
        assignment_name: impl Into<String>,
        content: impl Into<String>,
        question_type: QuestionType,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            assignment_name: assignment_name.into(),
            content: content.into(),
            question_type,
            correct_answers: None,
        }
    }

    pub fn with_correct_answers(mut self, answers: impl Into<String>) -> Self {
        self.correct_answers = Some(answers.into());
        self
    }

    /// 非空的标准答案
    pub fn answer_key(&self) -> Option<&str> {
        self.correct_answers
            .as_deref()
            .filter(|answers| !answers.trim().is_empty())
    }

    /// 检查提交是否完整
    pub fn validate(&self) -> Result<(), SubmissionError> {
        if self.student_id.trim().is_empty() {
            return Err(SubmissionError::EmptyStudentId);
        }
        if self.question_type.requires_answer_key() && self.answer_key().is_none() {
            return Err(SubmissionError::MissingAnswerKey {
                question_type: self.question_type.to_string(),
            });
        }
        Ok(())
    }
}
