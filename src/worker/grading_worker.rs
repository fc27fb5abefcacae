//! 评分工作者
//!
//! 无会话状态的任务执行者：收到 [`GradeCategory`] 后评估，并向回复地址
//! 发送且只发送一次 `CategoryGraded` 或 `CategoryGradingFailed`。
//!
//! 评估在独立任务中进行，收件箱不会被一次缓慢的外部调用卡住；
//! 同时进行的评估数量由信号量限制。

use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::models::{GradingEvaluation, QuestionType};
use crate::protocol::{CoordinatorMessage, GradeCategory, WorkerMessage};
use crate::services::{EvaluationRequest, Evaluator, McqScorer};

/// 评估单个评分维度
///
/// 1. 由评分项构建档位集合
/// 2. 选择题且有标准答案时，先确定性判分
/// 3. 调用外部评估器得到初步评估
/// 4. 若第 2 步执行过，用判分结果覆盖分数和反馈，保留评估器给出的档位
pub async fn evaluate_category(
    evaluator: &dyn Evaluator,
    scorer: &McqScorer,
    task: &GradeCategory,
) -> Result<GradingEvaluation> {
    let item = &task.rubric_item;
    let bands = item.bands();
    let answer_key = task
        .correct_answers
        .as_deref()
        .filter(|answers| !answers.trim().is_empty());

    let mcq_outcome = match (task.question_type, answer_key) {
        (QuestionType::Mcq, Some(key)) => Some(scorer.score(&task.content, key)?),
        _ => None,
    };

    let request = EvaluationRequest {
        content: &task.content,
        category: &task.category,
        description: &item.description,
        max_points: item.max_points,
        bands: &bands,
        question_type: task.question_type,
        correct_answers: answer_key,
    };
    let mut evaluation = evaluator.evaluate(request).await?;
    evaluation.category = task.category.clone();

    if let Some(outcome) = mcq_outcome {
        debug!(
            "评分维度 {} 使用选择题判分: {}/{}",
            task.category, outcome.correct, outcome.total
        );
        evaluation.score = outcome.scaled_score(evaluation.max_points);
        evaluation.feedback = outcome.feedback();
    }

    Ok(evaluation)
}

/// 评分工作者
pub struct GradingWorker {
    id: usize,
    evaluator: Arc<dyn Evaluator>,
    scorer: Arc<McqScorer>,
    limiter: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
}

impl GradingWorker {
    pub fn new(
        id: usize,
        evaluator: Arc<dyn Evaluator>,
        scorer: Arc<McqScorer>,
        max_in_flight: usize,
        in_flight: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            id,
            evaluator,
            scorer,
            limiter: Arc::new(Semaphore::new(max_in_flight.max(1))),
            in_flight,
        }
    }

    /// 工作者主循环，收件箱关闭后退出
    pub async fn run(self, mut inbox: mpsc::Receiver<WorkerMessage>) {
        info!("[工作者 {}] 已启动", self.id);

        while let Some(message) = inbox.recv().await {
            match message {
                WorkerMessage::Grade(task) => self.dispatch(task),
            }
        }

        debug!("[工作者 {}] 收件箱已关闭，退出", self.id);
    }

    fn dispatch(&self, task: GradeCategory) {
        let worker_id = self.id;
        let evaluator = self.evaluator.clone();
        let scorer = self.scorer.clone();
        let limiter = self.limiter.clone();
        let in_flight = self.in_flight.clone();

        tokio::spawn(async move {
            // 信号量只在工作者退出时关闭，关闭后照常执行
            let _permit = limiter.acquire_owned().await.ok();

            debug!(
                "[工作者 {}] 开始评估 [会话 {}] 维度 {}",
                worker_id, task.session_id, task.category
            );

            // 在独立任务中评估，评估器 panic 时也能回复失败
            let isolated = task.clone();
            let outcome = tokio::spawn(async move {
                evaluate_category(evaluator.as_ref(), &scorer, &isolated).await
            })
            .await
            .unwrap_or_else(|e| Err(anyhow::anyhow!("评估任务异常终止: {}", e)));

            let reply = match outcome {
                Ok(evaluation) => {
                    debug!(
                        "[工作者 {}] 维度 {} 评估完成: {}/{}",
                        worker_id, evaluation.category, evaluation.score, evaluation.max_points
                    );
                    CoordinatorMessage::CategoryGraded {
                        session_id: task.session_id,
                        evaluation,
                    }
                }
                Err(e) => {
                    warn!(
                        "[工作者 {}] ⚠️ 维度 {} 评估失败: {:#}",
                        worker_id, task.category, e
                    );
                    CoordinatorMessage::CategoryGradingFailed {
                        session_id: task.session_id,
                        category: task.category.clone(),
                        error: format!("{:#}", e),
                    }
                }
            };

            if task.reply_to.send(reply).await.is_err() {
                warn!(
                    "[工作者 {}] 会话 {} 的协调者已关闭，结果被丢弃",
                    worker_id, task.session_id
                );
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }
}
