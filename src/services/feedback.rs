//! 总评生成 - 业务能力层
//!
//! 所有评分维度完成后，由 [`FeedbackSynthesizer`] 汇总生成整体反馈。

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::models::GradingEvaluation;
use crate::services::llm_service::LlmService;

/// 总评生成器契约
#[async_trait]
pub trait FeedbackSynthesizer: Send + Sync {
    async fn synthesize(&self, content: &str, evaluations: &[GradingEvaluation]) -> Result<String>;
}

/// 基于 LLM 的总评生成器
pub struct LlmFeedbackSynthesizer {
    llm: Arc<LlmService>,
}

impl LlmFeedbackSynthesizer {
    pub fn new(llm: Arc<LlmService>) -> Self {
        Self { llm }
    }

    fn build_feedback_messages(content: &str, evaluations: &[GradingEvaluation]) -> (String, String) {
        let system_message = "你是一名耐心的老师，根据各维度评分结果给学生写一段整体反馈。\
                              先肯定优点，再指出最重要的两到三个改进方向，语气具体、友善。"
            .to_string();

        let summary = evaluations
            .iter()
            .map(|e| {
                format!(
                    "- {}: {}/{} ({}) {}",
                    e.category, e.score, e.max_points, e.score_band, e.feedback
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let user_message = format!(
            "学生作答：\n{}\n\n各维度评分：\n{}\n\n请直接输出整体反馈正文，不要重复列出分数。",
            content, summary
        );

        (user_message, system_message)
    }
}

#[async_trait]
impl FeedbackSynthesizer for LlmFeedbackSynthesizer {
    async fn synthesize(&self, content: &str, evaluations: &[GradingEvaluation]) -> Result<String> {
        debug!("开始生成总评，维度数量: {}", evaluations.len());

        let (user_message, system_message) = Self::build_feedback_messages(content, evaluations);
        self.llm.send_to_llm(&user_message, Some(&system_message)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_prompt_lists_categories() {
        let evaluations = vec![
            GradingEvaluation::new("Content", 25, 30, "Strong ideas", "Good"),
            GradingEvaluation::failed("Mechanics", 10, "timeout"),
        ];
        let (user, _) = LlmFeedbackSynthesizer::build_feedback_messages("essay text", &evaluations);

        assert!(user.contains("essay text"));
        assert!(user.contains("- Content: 25/30 (Good) Strong ideas"));
        assert!(user.contains("- Mechanics: 0/10 (Needs Improvement) Grading failed: timeout"));
    }
}
