//! 评分协调者
//!
//! 每个协调者是一个独立的 actor：拥有自己的收件箱，一次只处理一条消息，
//! 同一时间最多持有一个评分会话。所有外部调用（加载评分表、容量探测、
//! 生成反馈、写结果）都在后台任务中执行，完成后以消息形式回到收件箱，
//! 协调者本身从不阻塞在外部调用上。
//!
//! ```text
//! Idle → RubricLoading → Distributing → Aggregating → FeedbackGeneration → Persisting → Idle
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{AppError, AppResult};
use crate::models::{validate_rubric, CapacityReport, GradingEvaluation, RubricItem, SubmissionJob};
use crate::orchestrator::session::{GradingSession, RecordOutcome};
use crate::protocol::{
    CoordinatorAddress, CoordinatorMessage, Envelope, GradingCapacityCheck,
    GradingCapacityResponse, GradingFailed, GradingOutcome, SessionId,
};
use crate::services::{FeedbackSynthesizer, ResultsWriter, RubricSource};
use crate::utils::truncate_text;
use crate::worker::TaskDispatcher;

const COORDINATOR_INBOX_SIZE: usize = 256;

/// 会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    RubricLoading,
    Distributing,
    Aggregating,
    FeedbackGeneration,
    Persisting,
}

/// 协调者依赖的外部协作者
#[derive(Clone)]
pub struct Collaborators {
    pub rubric_source: Arc<dyn RubricSource>,
    pub dispatcher: Arc<dyn TaskDispatcher>,
    pub feedback: Arc<dyn FeedbackSynthesizer>,
    pub writer: Arc<dyn ResultsWriter>,
}

/// 评分协调者
pub struct Coordinator {
    id: usize,
    config: CoordinatorConfig,
    collaborators: Collaborators,
    /// 弱引用，空闲时不阻止收件箱关闭
    self_address: mpsc::WeakSender<CoordinatorMessage>,
    phase: Phase,
    session: Option<GradingSession>,
    backlog: VecDeque<Envelope<SubmissionJob>>,
    next_session_id: SessionId,
}

impl Coordinator {
    /// 启动协调者，返回其地址
    ///
    /// 所有 [`CoordinatorHandle`] 被丢弃且没有进行中的会话时，协调者退出。
    pub fn spawn(id: usize, config: CoordinatorConfig, collaborators: Collaborators) -> CoordinatorHandle {
        let (address, inbox) = mpsc::channel(COORDINATOR_INBOX_SIZE);
        let grading_timeout = config.grading_timeout;

        let coordinator = Self {
            id,
            config,
            collaborators,
            self_address: address.downgrade(),
            phase: Phase::Idle,
            session: None,
            backlog: VecDeque::new(),
            next_session_id: 0,
        };
        tokio::spawn(coordinator.run(inbox));

        CoordinatorHandle {
            id,
            address,
            grading_timeout,
        }
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<CoordinatorMessage>) {
        info!("[协调者 {}] 已启动", self.id);

        while let Some(message) = inbox.recv().await {
            self.handle(message).await;
        }

        debug!("[协调者 {}] 收件箱已关闭，退出", self.id);
    }

    async fn handle(&mut self, message: CoordinatorMessage) {
        use CoordinatorMessage::*;

        match message {
            StartGrading { job, reply_to } => self.accept(Envelope::new(job, reply_to)),
            ForwardedSubmission(envelope) => {
                debug!(
                    "[协调者 {}] 收到转发的提交: {}",
                    self.id, envelope.payload.student_id
                );
                self.accept(envelope)
            }
            CapacityCheck(check) => self.reply_capacity(check),

            RubricLoaded { session_id, items } if self.in_phase(session_id, Phase::RubricLoading) => {
                self.on_rubric_loaded(items).await
            }
            RubricLoadFailed { session_id, error } if self.in_phase(session_id, Phase::RubricLoading) => {
                self.fail_session(format!("Rubric load failed: {}", error))
            }
            CapacityChecked { session_id, report } if self.in_phase(session_id, Phase::Distributing) => {
                self.on_capacity_checked(report).await
            }
            CategoryGraded { session_id, evaluation } if self.in_phase(session_id, Phase::Aggregating) => {
                self.on_category_graded(evaluation)
            }
            CategoryGradingFailed {
                session_id,
                category,
                error,
            } if self.in_phase(session_id, Phase::Aggregating) => self.on_category_failed(&category, &error),
            FeedbackGenerated { session_id, text } if self.in_phase(session_id, Phase::FeedbackGeneration) => {
                self.on_feedback(text)
            }
            FeedbackGenerationFailed { session_id, error }
                if self.in_phase(session_id, Phase::FeedbackGeneration) =>
            {
                warn!("[协调者 {}] ⚠️ 总体反馈生成失败: {}", self.id, error);
                self.on_feedback(format!("Feedback generation failed: {}", error))
            }
            ResultsWritten { session_id, path } if self.in_phase(session_id, Phase::Persisting) => {
                self.complete_session(path)
            }
            ResultsWriteFailed { session_id, error } if self.in_phase(session_id, Phase::Persisting) => {
                self.fail_session(format!("Results write failed: {}", error))
            }

            other => warn!(
                "[协调者 {}] ⚠️ 忽略过期或不符合当前阶段的消息 {} (阶段: {:?})",
                self.id,
                other.kind(),
                self.phase
            ),
        }
    }

    fn in_phase(&self, session_id: SessionId, phase: Phase) -> bool {
        self.phase == phase && self.session.as_ref().is_some_and(|s| s.id == session_id)
    }

    // ========== 接收提交 ==========

    fn accept(&mut self, envelope: Envelope<SubmissionJob>) {
        if self.phase == Phase::Idle {
            self.begin_session(envelope);
        } else if self.backlog.len() < self.config.max_queued_sessions {
            info!(
                "[协调者 {}] 📋 会话进行中，提交 {} 进入队列 (队列长度 {})",
                self.id,
                envelope.payload.student_id,
                self.backlog.len() + 1
            );
            self.backlog.push_back(envelope);
        } else {
            let (job, reply_to) = envelope.into_parts();
            warn!("[协调者 {}] ⚠️ 队列已满，拒绝提交 {}", self.id, job.student_id);
            let reason = format!(
                "Coordinator busy: {} submissions already queued",
                self.backlog.len()
            );
            let _ = reply_to.send(Err(GradingFailed::new(&job, reason)));
        }
    }

    fn begin_session(&mut self, envelope: Envelope<SubmissionJob>) {
        let (job, reply_to) = envelope.into_parts();

        let Some(address) = self.self_address.upgrade() else {
            let _ = reply_to.send(Err(GradingFailed::new(&job, "Coordinator shutting down")));
            return;
        };

        self.next_session_id += 1;
        let session_id = self.next_session_id;
        let rubric_path = self.config.rubric_path(job.question_type);

        info!(
            "[协调者 {}] 🚀 [会话 {}] 开始评分: 学生 {} / {} ({})",
            self.id, session_id, job.student_id, job.assignment_name, job.question_type
        );
        debug!(
            "[会话 {}] 内容: {}",
            session_id,
            truncate_text(&job.content, 80)
        );

        self.session = Some(GradingSession::new(session_id, job, reply_to, address));
        self.phase = Phase::RubricLoading;

        let source = self.collaborators.rubric_source.clone();
        self.notify_self(async move {
            match source.load(&rubric_path).await {
                Ok(items) => CoordinatorMessage::RubricLoaded { session_id, items },
                Err(e) => CoordinatorMessage::RubricLoadFailed {
                    session_id,
                    error: format!("{:#}", e),
                },
            }
        });
    }

    // ========== 各阶段处理 ==========

    async fn on_rubric_loaded(&mut self, items: Vec<RubricItem>) {
        if let Err(e) = validate_rubric(&items) {
            self.fail_session(format!("Rubric load failed: {}", e));
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        info!(
            "[协调者 {}] ✓ [会话 {}] 评分表已加载: {} 个维度",
            self.id,
            session.id,
            items.len()
        );
        session.set_rubric(items);
        self.phase = Phase::Distributing;

        if self.config.capacity_check_enabled {
            self.probe_capacity();
        } else {
            self.fan_out().await;
        }
    }

    /// 探测工作者容量，结果只用于日志，不影响分发
    fn probe_capacity(&self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let session_id = session.id;
        let coordinator_id = self.id;
        let dispatcher = self.collaborators.dispatcher.clone();
        let timeout = self.config.capacity_check_timeout;

        self.notify_self(async move {
            let (reply_to, response) = oneshot::channel();
            dispatcher.request_capacity(GradingCapacityCheck { reply_to });

            let report = match tokio::time::timeout(timeout, response).await {
                Ok(Ok(response)) => Some(CapacityReport::from(response)),
                Ok(Err(_)) => {
                    warn!("[协调者 {}] ⚠️ 工作者池未回复容量探测", coordinator_id);
                    None
                }
                Err(_) => {
                    warn!(
                        "[协调者 {}] ⚠️ 容量探测超时 ({:?})，直接分发",
                        coordinator_id, timeout
                    );
                    None
                }
            };
            CoordinatorMessage::CapacityChecked { session_id, report }
        });
    }

    async fn on_capacity_checked(&mut self, report: Option<CapacityReport>) {
        if let Some(report) = report {
            info!(
                "[协调者 {}] 📊 工作者容量: 空闲 {}/{}, 进行中 {}",
                self.id, report.available_workers, report.total_capacity, report.queued_jobs
            );
        }
        self.fan_out().await;
    }

    /// 每个评分项发一个任务
    async fn fan_out(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let session_id = session.id;
        let tasks = session.build_tasks();
        self.phase = Phase::Aggregating;

        info!(
            "[协调者 {}] 📦 [会话 {}] 分发 {} 个评分维度",
            self.id,
            session_id,
            tasks.len()
        );

        for task in tasks {
            let category = task.category.clone();
            if let Err(e) = self.collaborators.dispatcher.submit(task).await {
                warn!(
                    "[协调者 {}] ⚠️ [会话 {}] 维度 {} 分派失败: {}",
                    self.id, session_id, category, e
                );
                self.on_category_failed(&category, &e.to_string());
            }
        }
    }

    fn on_category_graded(&mut self, evaluation: GradingEvaluation) {
        let min_len = self.config.mcq_feedback_min_len;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let category = evaluation.category.clone();
        let (score, max_points) = (evaluation.score, evaluation.max_points);
        let outcome = session.record_graded(evaluation, min_len);
        if outcome != RecordOutcome::Recorded {
            warn!(
                "[协调者 {}] ⚠️ [会话 {}] 忽略维度 {} 的评估结果: {:?}",
                self.id, session.id, category, outcome
            );
            return;
        }
        info!(
            "[协调者 {}] ✓ [会话 {}] 维度 {} 得分 {}/{} (剩余 {})",
            self.id, session.id, category, score, max_points, session.pending_count
        );

        self.check_fan_in();
    }

    fn on_category_failed(&mut self, category: &str, error: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let outcome = session.record_failed(category, error);
        if outcome != RecordOutcome::Recorded {
            warn!(
                "[协调者 {}] ⚠️ [会话 {}] 忽略维度 {} 的失败回复: {:?}",
                self.id, session.id, category, outcome
            );
            return;
        }
        warn!(
            "[协调者 {}] ⚠️ [会话 {}] 维度 {} 评分失败，记 0 分: {} (剩余 {})",
            self.id, session.id, category, error, session.pending_count
        );

        self.check_fan_in();
    }

    /// 全部维度回收后进入反馈生成阶段，只触发一次
    fn check_fan_in(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if self.phase != Phase::Aggregating || !session.is_graded() {
            return;
        }

        let session_id = session.id;
        let content = session.content();
        let evaluations = session.evaluations_in_rubric_order();
        self.phase = Phase::FeedbackGeneration;

        info!(
            "[协调者 {}] [会话 {}] 全部维度已回收，生成总体反馈",
            self.id, session_id
        );

        let synthesizer = self.collaborators.feedback.clone();
        self.notify_self(async move {
            match synthesizer.synthesize(&content, &evaluations).await {
                Ok(text) => CoordinatorMessage::FeedbackGenerated { session_id, text },
                Err(e) => CoordinatorMessage::FeedbackGenerationFailed {
                    session_id,
                    error: format!("{:#}", e),
                },
            }
        });
    }

    fn on_feedback(&mut self, text: String) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.generated_feedback = Some(text);
        let summary = session.summarize();
        let result = session.session_result();
        let session_id = session.id;
        self.phase = Phase::Persisting;

        info!(
            "[协调者 {}] [会话 {}] 总分 {}/{}，等级 {}，写入结果",
            self.id, session_id, summary.total_score, summary.max_possible_score, summary.grade
        );

        let writer = self.collaborators.writer.clone();
        self.notify_self(async move {
            match writer.append(&result).await {
                Ok(path) => CoordinatorMessage::ResultsWritten { session_id, path },
                Err(e) => CoordinatorMessage::ResultsWriteFailed {
                    session_id,
                    error: format!("{:#}", e),
                },
            }
        });
    }

    // ========== 结束会话 ==========

    fn complete_session(&mut self, path: PathBuf) {
        if let Some(mut session) = self.session.take() {
            let complete = session.completion();
            info!(
                "[协调者 {}] ✅ [会话 {}] 评分完成: {} {}/{} ({})，结果已写入 {}",
                self.id,
                session.id,
                complete.student_id,
                complete.total_score,
                complete.max_possible_score,
                complete.grade,
                path.display()
            );
            Self::reply(session.id, session.take_reply_to(), Ok(complete));
            self.finish_session(Some(session.address().clone()));
        } else {
            self.finish_session(None);
        }
    }

    fn fail_session(&mut self, reason: String) {
        if let Some(mut session) = self.session.take() {
            error!(
                "[协调者 {}] ❌ [会话 {}] 评分失败: {}",
                self.id, session.id, reason
            );
            let failed = GradingFailed::new(&session.job, reason);
            Self::reply(session.id, session.take_reply_to(), Err(failed));
            self.finish_session(Some(session.address().clone()));
        } else {
            self.finish_session(None);
        }
    }

    fn reply(
        session_id: SessionId,
        reply_to: Option<oneshot::Sender<GradingOutcome>>,
        outcome: GradingOutcome,
    ) {
        let delivered = reply_to.is_some_and(|tx| tx.send(outcome).is_ok());
        if !delivered {
            info!("[会话 {}] 调用方已放弃等待，结果被丢弃", session_id);
        }
    }

    /// 回到空闲状态并开始下一个排队的提交
    ///
    /// `keep_alive` 是刚结束会话的收件箱地址。排队的提交开始前一直持有它，
    /// 外部句柄全部释放后收件箱仍然可用。
    fn finish_session(&mut self, keep_alive: Option<CoordinatorAddress>) {
        self.session = None;
        self.phase = Phase::Idle;
        let _keep_alive = keep_alive;

        while self.phase == Phase::Idle {
            let Some(next) = self.backlog.pop_front() else {
                break;
            };
            self.begin_session(next);
        }
    }

    // ========== 工具方法 ==========

    /// 协调者自身容量：空闲为 1，忙碌为 0
    fn reply_capacity(&self, check: GradingCapacityCheck) {
        let response = GradingCapacityResponse {
            available_workers: usize::from(self.session.is_none()),
            total_capacity: 1,
            queued_jobs: self.session.as_ref().map_or(0, |s| s.pending_count),
        };
        let _ = check.reply_to.send(response);
    }

    /// 在后台执行外部调用，结果作为消息发回自己的收件箱
    fn notify_self<F>(&self, task: F)
    where
        F: Future<Output = CoordinatorMessage> + Send + 'static,
    {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let address = session.address().clone();
        let coordinator_id = self.id;

        tokio::spawn(async move {
            let message = task.await;
            if address.send(message).await.is_err() {
                debug!("[协调者 {}] 收件箱已关闭，丢弃内部消息", coordinator_id);
            }
        });
    }
}

/// 协调者地址
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    id: usize,
    address: CoordinatorAddress,
    grading_timeout: Duration,
}

impl CoordinatorHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn address(&self) -> CoordinatorAddress {
        self.address.clone()
    }

    /// 发起评分并等待结果，超过 `grading_timeout` 返回超时错误
    ///
    /// 超时后会话仍在后台继续，其结果会被丢弃。
    pub async fn start_grading(&self, job: SubmissionJob) -> AppResult<GradingOutcome> {
        let (reply_to, outcome) = oneshot::channel();
        self.address
            .send(CoordinatorMessage::StartGrading { job, reply_to })
            .await
            .map_err(|_| AppError::mailbox_closed(self.target()))?;

        await_outcome(outcome, self.grading_timeout, &self.target()).await
    }

    /// 转发一个信封，协调者直接回复信封中的原始调用方
    ///
    /// 收件箱已关闭时原样退回信封。
    pub async fn forward(&self, envelope: Envelope<SubmissionJob>) -> Result<(), Envelope<SubmissionJob>> {
        match self
            .address
            .send(CoordinatorMessage::ForwardedSubmission(envelope))
            .await
        {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(message)) => message.into_forwarded().map_or(Ok(()), Err),
        }
    }

    /// 查询协调者是否空闲
    pub async fn check_capacity(&self, timeout: Duration) -> AppResult<CapacityReport> {
        let (reply_to, response) = oneshot::channel();
        self.address
            .send(CoordinatorMessage::CapacityCheck(GradingCapacityCheck { reply_to }))
            .await
            .map_err(|_| AppError::mailbox_closed(self.target()))?;

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(response)) => Ok(response.into()),
            Ok(Err(_)) => Err(AppError::no_reply(self.target())),
            Err(_) => Err(AppError::timeout(self.target(), timeout)),
        }
    }

    fn target(&self) -> String {
        format!("协调者 {}", self.id)
    }
}

/// 等待评分回复
pub(crate) async fn await_outcome(
    outcome: oneshot::Receiver<GradingOutcome>,
    timeout: Duration,
    target: &str,
) -> AppResult<GradingOutcome> {
    match tokio::time::timeout(timeout, outcome).await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(_)) => Err(AppError::no_reply(target)),
        Err(_) => Err(AppError::timeout(target, timeout)),
    }
}
