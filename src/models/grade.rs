//! 总分汇总与等级换算
//!
//! - 选择题 / 简答题：单一评分单元，总分取第一个评分维度的得分，满分固定为 100
//! - 作文：多维度，总分与满分分别为各维度之和

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{GradingEvaluation, QuestionType};

/// 等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// 按百分比换算等级
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            Grade::A
        } else if percentage >= 80.0 {
            Grade::B
        } else if percentage >= 70.0 {
            Grade::C
        } else if percentage >= 60.0 {
            Grade::D
        } else {
            Grade::F
        }
    }

    /// 按得分换算等级，满分为 0 时记为 F
    pub fn from_scores(total_score: u32, max_possible_score: u32) -> Self {
        if max_possible_score == 0 {
            return Grade::F;
        }
        Self::from_percentage(total_score as f64 / max_possible_score as f64 * 100.0)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 汇总结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreSummary {
    pub total_score: u32,
    pub max_possible_score: u32,
    pub grade: Grade,
}

/// 单一评分单元题型的固定满分
pub const SINGLE_UNIT_MAX_SCORE: u32 = 100;

/// 汇总各维度得分
///
/// `evaluations` 需按评分表顺序传入，单一评分单元题型取第一项。
pub fn summarize(question_type: QuestionType, evaluations: &[GradingEvaluation]) -> ScoreSummary {
    let (total_score, max_possible_score) = match question_type {
        QuestionType::Mcq | QuestionType::ShortAnswer => (
            evaluations.first().map(|e| e.score).unwrap_or(0),
            SINGLE_UNIT_MAX_SCORE,
        ),
        QuestionType::Essay => (
            evaluations.iter().map(|e| e.score).sum(),
            evaluations.iter().map(|e| e.max_points).sum(),
        ),
    };

    ScoreSummary {
        total_score,
        max_possible_score,
        grade: Grade::from_scores(total_score, max_possible_score),
    }
}
