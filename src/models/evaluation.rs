use serde::{Deserialize, Serialize};

use crate::models::BandLevel;

/// 单个评分维度的评估结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingEvaluation {
    pub category: String,
    pub score: u32,
    pub max_points: u32,
    /// 简短反馈
    pub feedback: String,
    pub score_band: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_feedback: Option<String>,
}

impl GradingEvaluation {
    pub fn new(
        category: impl Into<String>,
        score: u32,
        max_points: u32,
        feedback: impl Into<String>,
        score_band: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            score,
            max_points,
            feedback: feedback.into(),
            score_band: score_band.into(),
            detailed_feedback: None,
        }
    }

    pub fn with_detailed_feedback(mut self, detailed: impl Into<String>) -> Self {
        self.detailed_feedback = Some(detailed.into());
        self
    }

    /// 评估失败时的零分占位结果
    pub fn failed(category: impl Into<String>, max_points: u32, error: &str) -> Self {
        Self::new(
            category,
            0,
            max_points,
            format!("Grading failed: {}", error),
            BandLevel::NeedsImprovement.label(),
        )
    }
}

/// 工作者容量快照，只用于观测，不落盘
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapacityReport {
    pub available_workers: usize,
    pub total_capacity: usize,
    pub queued_jobs: usize,
}
