//! 提交路由
//!
//! 持有一组协调者，把提交装进 [`Envelope`] 转发给其中一个。
//! 选中的协调者直接回复信封中的原始调用方，路由本身不经手结果。

use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, ProtocolError};
use crate::models::SubmissionJob;
use crate::orchestrator::coordinator::{await_outcome, CoordinatorHandle};
use crate::protocol::{Envelope, GradingFailed, GradingOutcome};

pub struct SubmissionRouter {
    coordinators: Vec<CoordinatorHandle>,
    cursor: AtomicUsize,
    probe_timeout: Duration,
    grading_timeout: Duration,
}

impl SubmissionRouter {
    pub fn new(coordinators: Vec<CoordinatorHandle>, probe_timeout: Duration, grading_timeout: Duration) -> Self {
        Self {
            coordinators,
            cursor: AtomicUsize::new(0),
            probe_timeout,
            grading_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.coordinators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }

    /// 转发一个提交，返回接收它的协调者编号
    ///
    /// 先并发探测所有协调者，从轮询起点开始取第一个空闲的；
    /// 没有空闲协调者（或探测全部失败）时使用轮询起点。
    /// 收件箱已关闭的协调者会被跳过。
    pub async fn route(&self, envelope: Envelope<SubmissionJob>) -> AppResult<usize> {
        if self.coordinators.is_empty() {
            return Err(AppError::Protocol(ProtocolError::NoCoordinators));
        }

        let count = self.coordinators.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % count;
        let reports = join_all(
            self.coordinators
                .iter()
                .map(|handle| handle.check_capacity(self.probe_timeout)),
        )
        .await;

        let idle = (0..count)
            .map(|offset| (start + offset) % count)
            .find(|&index| {
                matches!(&reports[index], Ok(report) if report.available_workers > 0)
            });
        let first = idle.unwrap_or_else(|| {
            debug!("没有空闲的协调者，按轮询选择 {}", start);
            start
        });

        let student_id = envelope.payload.student_id.clone();
        let mut envelope = envelope;
        for offset in 0..count {
            let handle = &self.coordinators[(first + offset) % count];
            match handle.forward(envelope).await {
                Ok(()) => {
                    debug!("提交 {} 已转发给协调者 {}", student_id, handle.id());
                    return Ok(handle.id());
                }
                Err(returned) => {
                    warn!("⚠️ 协调者 {} 已关闭，尝试下一个", handle.id());
                    envelope = returned;
                }
            }
        }

        let (job, reply_to) = envelope.into_parts();
        let _ = reply_to.send(Err(GradingFailed::new(&job, "No coordinator available")));
        Err(AppError::mailbox_closed("全部协调者"))
    }

    /// 转发并等待结果
    pub async fn grade(&self, job: SubmissionJob) -> AppResult<GradingOutcome> {
        let (reply_to, outcome) = oneshot::channel();
        self.route(Envelope::new(job, reply_to)).await?;
        await_outcome(outcome, self.grading_timeout, "提交路由").await
    }
}
