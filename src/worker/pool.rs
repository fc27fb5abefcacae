//! 工作者池
//!
//! 协调者只依赖 [`TaskDispatcher`]，不关心工作者如何发现与选择。

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, ProtocolError};
use crate::models::CapacityReport;
use crate::protocol::{GradeCategory, GradingCapacityCheck, GradingCapacityResponse, WorkerMessage};
use crate::services::{Evaluator, McqScorer};
use crate::worker::GradingWorker;

const WORKER_INBOX_SIZE: usize = 256;

/// 工作者选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    #[default]
    RoundRobin,
    LeastLoaded,
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionStrategy::RoundRobin => f.write_str("round_robin"),
            SelectionStrategy::LeastLoaded => f.write_str("least_loaded"),
        }
    }
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(SelectionStrategy::RoundRobin),
            "least_loaded" => Ok(SelectionStrategy::LeastLoaded),
            other => Err(format!("未知的分派策略: {}", other)),
        }
    }
}

/// 任务分派契约
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// 把任务交给某个工作者，返回工作者编号
    async fn submit(&self, task: GradeCategory) -> AppResult<usize>;

    /// 容量探测（请求 / 响应），回复发送到 `check.reply_to`
    fn request_capacity(&self, check: GradingCapacityCheck);
}

struct WorkerSlot {
    id: usize,
    inbox: mpsc::Sender<WorkerMessage>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerSlot {
    fn load(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// 工作者池
pub struct WorkerPool {
    slots: Vec<WorkerSlot>,
    strategy: SelectionStrategy,
    cursor: AtomicUsize,
}

impl WorkerPool {
    /// 启动 `size` 个工作者，必须在 tokio 运行时内调用
    pub fn spawn(
        size: usize,
        evaluator: Arc<dyn Evaluator>,
        strategy: SelectionStrategy,
        max_in_flight: usize,
    ) -> anyhow::Result<Self> {
        let scorer = Arc::new(McqScorer::new()?);

        let slots = (0..size)
            .map(|id| {
                let (inbox, inbox_rx) = mpsc::channel(WORKER_INBOX_SIZE);
                let in_flight = Arc::new(AtomicUsize::new(0));
                let worker = GradingWorker::new(
                    id,
                    evaluator.clone(),
                    scorer.clone(),
                    max_in_flight,
                    in_flight.clone(),
                );
                tokio::spawn(worker.run(inbox_rx));
                WorkerSlot { id, inbox, in_flight }
            })
            .collect();

        info!("✓ 工作者池已启动: {} 个工作者, 策略 {}", size, strategy);

        Ok(Self {
            slots,
            strategy,
            cursor: AtomicUsize::new(0),
        })
    }

    /// 当前容量快照
    pub fn capacity(&self) -> CapacityReport {
        CapacityReport {
            available_workers: self.slots.iter().filter(|s| s.load() == 0).count(),
            total_capacity: self.slots.len(),
            queued_jobs: self.slots.iter().map(WorkerSlot::load).sum(),
        }
    }

    fn select(&self) -> Option<&WorkerSlot> {
        if self.slots.is_empty() {
            return None;
        }
        match self.strategy {
            SelectionStrategy::RoundRobin => {
                let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.slots.len();
                self.slots.get(index)
            }
            // 负载相同时取编号最小的
            SelectionStrategy::LeastLoaded => self.slots.iter().min_by_key(|s| (s.load(), s.id)),
        }
    }
}

#[async_trait]
impl TaskDispatcher for WorkerPool {
    async fn submit(&self, task: GradeCategory) -> AppResult<usize> {
        let slot = self.select().ok_or(AppError::Protocol(ProtocolError::NoWorkers))?;

        debug!(
            "[会话 {}] 维度 {} 分派给工作者 {}",
            task.session_id, task.category, slot.id
        );

        slot.in_flight.fetch_add(1, Ordering::SeqCst);
        if slot.inbox.send(WorkerMessage::Grade(task)).await.is_err() {
            slot.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(AppError::mailbox_closed(format!("工作者 {}", slot.id)));
        }

        Ok(slot.id)
    }

    fn request_capacity(&self, check: GradingCapacityCheck) {
        let response = GradingCapacityResponse::from(self.capacity());
        // 请求方已放弃等待时忽略
        let _ = check.reply_to.send(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GradingEvaluation, QuestionType, RubricItem};
    use crate::protocol::CoordinatorMessage;
    use crate::services::EvaluationRequest;
    use std::time::Duration;
    use tokio::sync::{oneshot, Notify};

    /// 等待放行信号后才返回的评估器
    struct GatedEvaluator {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl Evaluator for GatedEvaluator {
        async fn evaluate(&self, request: EvaluationRequest<'_>) -> anyhow::Result<GradingEvaluation> {
            self.gate.notified().await;
            Ok(GradingEvaluation::new(request.category, 1, request.max_points, "ok", "Good"))
        }
    }

    fn task(category: &str, reply_to: mpsc::Sender<CoordinatorMessage>) -> GradeCategory {
        GradeCategory {
            session_id: 1,
            category: category.to_string(),
            content: Arc::from("text"),
            rubric_item: Arc::new(RubricItem::new(category, "", 10)),
            question_type: QuestionType::Essay,
            correct_answers: None,
            reply_to,
        }
    }

    fn gated_pool(size: usize, strategy: SelectionStrategy) -> (WorkerPool, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let pool = WorkerPool::spawn(size, Arc::new(GatedEvaluator { gate: gate.clone() }), strategy, 4)
            .unwrap();
        (pool, gate)
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("round-robin".parse::<SelectionStrategy>().unwrap(), SelectionStrategy::RoundRobin);
        assert_eq!("LEAST_LOADED".parse::<SelectionStrategy>().unwrap(), SelectionStrategy::LeastLoaded);
        assert!("random".parse::<SelectionStrategy>().is_err());
    }

    #[tokio::test]
    async fn test_round_robin_cycles_workers() {
        let (pool, _gate) = gated_pool(3, SelectionStrategy::RoundRobin);
        let (tx, _rx) = mpsc::channel(16);

        let mut assigned = Vec::new();
        for i in 0..6 {
            assigned.push(pool.submit(task(&format!("C{}", i), tx.clone())).await.unwrap());
        }
        assert_eq!(assigned, vec![0, 1, 2, 0, 1, 2]);
    }

    #[tokio::test]
    async fn test_least_loaded_prefers_idle_worker() {
        let (pool, _gate) = gated_pool(2, SelectionStrategy::LeastLoaded);
        let (tx, _rx) = mpsc::channel(16);

        assert_eq!(pool.submit(task("A", tx.clone())).await.unwrap(), 0);
        assert_eq!(pool.submit(task("B", tx.clone())).await.unwrap(), 1);
        assert_eq!(pool.submit(task("C", tx.clone())).await.unwrap(), 0);

        let report = pool.capacity();
        assert_eq!(report.total_capacity, 2);
        assert_eq!(report.available_workers, 0);
        assert_eq!(report.queued_jobs, 3);
    }

    #[tokio::test]
    async fn test_capacity_recovers_after_replies() {
        let (pool, gate) = gated_pool(2, SelectionStrategy::RoundRobin);
        let (tx, mut rx) = mpsc::channel(16);

        pool.submit(task("A", tx.clone())).await.unwrap();
        assert_eq!(pool.capacity().queued_jobs, 1);

        gate.notify_one();
        assert!(matches!(rx.recv().await, Some(CoordinatorMessage::CategoryGraded { .. })));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let report = pool.capacity();
        assert_eq!(report.queued_jobs, 0);
        assert_eq!(report.available_workers, 2);
    }

    #[tokio::test]
    async fn test_request_capacity_replies() {
        let (pool, _gate) = gated_pool(4, SelectionStrategy::RoundRobin);
        let (reply_to, reply_rx) = oneshot::channel();

        pool.request_capacity(GradingCapacityCheck { reply_to });
        let response = reply_rx.await.unwrap();
        assert_eq!(
            response,
            GradingCapacityResponse {
                available_workers: 4,
                total_capacity: 4,
                queued_jobs: 0
            }
        );
    }

    #[tokio::test]
    async fn test_empty_pool_rejects_tasks() {
        let (pool, _gate) = gated_pool(0, SelectionStrategy::LeastLoaded);
        let (tx, _rx) = mpsc::channel(1);

        assert!(matches!(
            pool.submit(task("A", tx)).await,
            Err(AppError::Protocol(ProtocolError::NoWorkers))
        ));
    }
}
