//! 外部评估器 - 业务能力层
//!
//! 工作者通过 [`Evaluator`] 对单个评分维度给出初步评估。
//! 默认实现 [`LlmEvaluator`] 调用 LLM 并解析其返回的 JSON。

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::models::{BandLevel, GradingEvaluation, QuestionType, ScoreBand};
use crate::services::llm_service::{extract_json_object, LlmService};

/// 一次评估需要的全部输入
#[derive(Debug, Clone, Copy)]
pub struct EvaluationRequest<'a> {
    pub content: &'a str,
    pub category: &'a str,
    pub description: &'a str,
    pub max_points: u32,
    pub bands: &'a [ScoreBand],
    pub question_type: QuestionType,
    pub correct_answers: Option<&'a str>,
}

/// 评估器契约
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: EvaluationRequest<'_>) -> Result<GradingEvaluation>;
}

/// 基于 LLM 的评估器
pub struct LlmEvaluator {
    llm: Arc<LlmService>,
}

/// LLM 返回的评分 JSON
#[derive(Debug, Deserialize)]
struct EvaluationResponse {
    score: f64,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    score_band: Option<String>,
    #[serde(default)]
    detailed_feedback: Option<String>,
}

impl LlmEvaluator {
    pub fn new(llm: Arc<LlmService>) -> Self {
        Self { llm }
    }

    /// 构建评分用的消息
    ///
    /// 返回 (user_message, system_message)
    fn build_evaluation_messages(request: &EvaluationRequest<'_>) -> (String, String) {
        let system_message = "你是一名严谨的阅卷老师，严格按照给定的评分标准对学生作答打分。\
                              只输出一个 JSON 对象，不要输出任何其他内容。"
            .to_string();

        let bands = if request.bands.is_empty() {
            "  （未提供档位说明）".to_string()
        } else {
            request
                .bands
                .iter()
                .map(|band| format!("  - {} (最高 {} 分): {}", band.level, band.points, band.description))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let answer_key = request
            .correct_answers
            .map(|answers| format!("\n标准答案：\n{}\n", answers))
            .unwrap_or_default();

        let detailed_hint = if request.question_type == QuestionType::ShortAnswer {
            "detailed_feedback 中逐条说明学生答案与标准答案的差异。"
        } else {
            "detailed_feedback 可以为 null。"
        };

        let user_message = format!(
            r#"请按以下评分维度为学生作答打分。

评分维度：{category}
维度说明：{description}
满分：{max_points}
题型：{question_type}
档位：
{bands}
{answer_key}
学生作答：
{content}

返回格式（JSON）：
{{"score": <0 到 {max_points} 的整数>, "feedback": "<一到两句简短反馈>", "score_band": "<Excellent | Good | Fair | Needs Improvement>", "detailed_feedback": "<详细反馈或 null>"}}
{detailed_hint}"#,
            category = request.category,
            description = request.description,
            max_points = request.max_points,
            question_type = request.question_type,
            bands = bands,
            answer_key = answer_key,
            content = request.content,
            detailed_hint = detailed_hint,
        );

        (user_message, system_message)
    }

    /// 解析 LLM 的评分响应，分数截断到 `[0, max_points]`
    fn parse_evaluation_response(request: &EvaluationRequest<'_>, response: &str) -> Result<GradingEvaluation> {
        let parsed: EvaluationResponse = extract_json_object(response)
            .and_then(|json| serde_json::from_str(json).ok())
            .ok_or_else(|| LlmError::UnparseableEvaluation {
                response: response.to_string(),
            })?;

        if !parsed.score.is_finite() {
            return Err(LlmError::UnparseableEvaluation {
                response: response.to_string(),
            }
            .into());
        }

        let raw_score = parsed.score.round();
        let score = raw_score.clamp(0.0, request.max_points as f64) as u32;
        if raw_score != score as f64 {
            warn!(
                "评分维度 {} 的分数 {} 超出范围 [0, {}]，已截断为 {}",
                request.category, parsed.score, request.max_points, score
            );
        }

        let score_band = parsed
            .score_band
            .filter(|band| !band.trim().is_empty())
            .unwrap_or_else(|| band_for_score(request.bands, score).to_string());

        let mut evaluation = GradingEvaluation::new(
            request.category,
            score,
            request.max_points,
            parsed.feedback.trim(),
            score_band,
        );
        if let Some(detailed) = parsed.detailed_feedback.filter(|d| !d.trim().is_empty()) {
            evaluation = evaluation.with_detailed_feedback(detailed);
        }

        Ok(evaluation)
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(&self, request: EvaluationRequest<'_>) -> Result<GradingEvaluation> {
        debug!(
            "开始 LLM 评分，维度: {}, 满分: {}, 模型: {}",
            request.category,
            request.max_points,
            self.llm.model_name()
        );

        let (user_message, system_message) = Self::build_evaluation_messages(&request);
        let response = self.llm.send_to_llm(&user_message, Some(&system_message)).await?;

        Self::parse_evaluation_response(&request, &response)
    }
}

/// LLM 没有给出档位时，按档位分数上限推断
///
/// 取上限不低于分数的最低档；分数高于所有上限时取最高档。
fn band_for_score(bands: &[ScoreBand], score: u32) -> BandLevel {
    bands
        .iter()
        .filter(|band| band.points >= score)
        .min_by_key(|band| band.points)
        .or_else(|| bands.iter().max_by_key(|band| band.points))
        .map(|band| band.level)
        .unwrap_or(BandLevel::NeedsImprovement)
}
