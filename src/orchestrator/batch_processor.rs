//! 批量评分处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量提交的评分和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：创建 LLM 服务、工作者池、协调者和提交路由
//! 2. **批量加载**：扫描并加载所有待评分的提交（`Vec<SubmissionJob>`）
//! 3. **并发控制**：使用 Semaphore 限制同时评分的提交数量
//! 4. **分批处理**：将提交分批次评分，每批完成后再开始下一批
//! 5. **全局统计**：汇总所有提交的评分结果

use crate::config::Config;
use crate::models::SubmissionJob;
use crate::orchestrator::{Collaborators, Coordinator, SubmissionRouter};
use crate::services::{
    CsvResultsWriter, Evaluator, LlmEvaluator, LlmFeedbackSynthesizer, LlmService, TomlRubricSource,
};
use crate::utils::logging;
use crate::worker::WorkerPool;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    router: Arc<SubmissionRouter>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(&config);

        if config.llm_api_key.is_empty() {
            warn!("⚠️ 未设置 LLM_API_KEY，LLM 调用可能失败");
        }

        let llm = Arc::new(LlmService::new(&config));
        let evaluator: Arc<dyn Evaluator> = Arc::new(LlmEvaluator::new(llm.clone()));
        let pool = WorkerPool::spawn(
            config.worker_count,
            evaluator,
            config.dispatch_strategy,
            config.worker_max_in_flight,
        )?;

        let collaborators = Collaborators {
            rubric_source: Arc::new(TomlRubricSource),
            dispatcher: Arc::new(pool),
            feedback: Arc::new(LlmFeedbackSynthesizer::new(llm)),
            writer: Arc::new(CsvResultsWriter::new(&config.results_file)),
        };

        Ok(Self::with_collaborators(config, collaborators))
    }

    /// 使用给定的协作者启动协调者（必须在 tokio 运行时内调用）
    pub fn with_collaborators(config: Config, collaborators: Collaborators) -> Self {
        let coordinator_config = config.coordinator_config();
        let coordinators = (0..config.coordinator_count.max(1))
            .map(|id| Coordinator::spawn(id, coordinator_config.clone(), collaborators.clone()))
            .collect();

        let router = SubmissionRouter::new(
            coordinators,
            coordinator_config.capacity_check_timeout,
            Duration::from_secs(config.grading_timeout_secs),
        );
        info!("✓ 已启动 {} 个协调者", router.len());

        Self {
            config,
            router: Arc::new(router),
        }
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<ProcessingStats> {
        let submissions = self.load_submissions().await?;

        if submissions.is_empty() {
            warn!("⚠️ 没有找到待评分的 TOML 文件，程序结束");
            return Ok(ProcessingStats::default());
        }

        logging::log_submissions_loaded(submissions.len(), self.batch_size());

        let stats = self.grade_all(submissions).await?;
        logging::print_final_stats(stats.success, stats.failed, stats.total, &self.config.results_file);

        Ok(stats)
    }

    /// 加载提交
    async fn load_submissions(&self) -> Result<Vec<SubmissionJob>> {
        info!("📁 正在扫描待评分的提交...");
        crate::models::load_all_submissions(&self.config.submissions_folder).await
    }

    fn batch_size(&self) -> usize {
        self.config.max_concurrent_submissions.max(1)
    }

    /// 分批评分所有提交
    pub async fn grade_all(&self, submissions: Vec<SubmissionJob>) -> Result<ProcessingStats> {
        let batch_size = self.batch_size();
        let semaphore = Arc::new(Semaphore::new(batch_size));
        let total = submissions.len();
        let total_batches = total.div_ceil(batch_size);
        let mut stats = ProcessingStats {
            total,
            ..Default::default()
        };

        for (batch_index, batch) in submissions.chunks(batch_size).enumerate() {
            let batch_start = batch_index * batch_size;
            let batch_num = batch_index + 1;
            logging::log_batch_start(batch_num, total_batches, batch_start + 1, batch_start + batch.len(), total);

            let batch_result = self.grade_batch(batch, batch_start, semaphore.clone()).await?;

            stats.success += batch_result.success;
            stats.failed += batch_result.failed;

            logging::log_batch_complete(
                batch_num,
                batch_result.success,
                batch_result.success + batch_result.failed,
            );
        }

        Ok(stats)
    }

    /// 评分单个批次
    async fn grade_batch(
        &self,
        batch: &[SubmissionJob],
        batch_start: usize,
        semaphore: Arc<Semaphore>,
    ) -> Result<BatchResult> {
        let mut handles = Vec::new();

        for (idx, job) in batch.iter().enumerate() {
            let index = batch_start + idx + 1;
            let permit = semaphore.clone().acquire_owned().await?;
            let router = self.router.clone();
            let job = job.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let student_id = job.student_id.clone();
                match router.grade(job).await {
                    Ok(Ok(complete)) => {
                        info!(
                            "[提交 {}] ✅ {} 得分 {}/{} ({})",
                            index,
                            complete.student_id,
                            complete.total_score,
                            complete.max_possible_score,
                            complete.grade
                        );
                        true
                    }
                    Ok(Err(failed)) => {
                        error!("[提交 {}] ❌ {} 评分失败: {}", index, failed.student_id, failed.reason);
                        false
                    }
                    Err(e) => {
                        error!("[提交 {}] ❌ {} 未收到评分结果: {}", index, student_id, e);
                        false
                    }
                }
            });
            handles.push((index, handle));
        }

        let mut result = BatchResult::default();

        for (index, handle) in handles {
            match handle.await {
                Ok(true) => result.success += 1,
                Ok(false) => result.failed += 1,
                Err(e) => {
                    error!("[提交 {}] 任务执行失败: {}", index, e);
                    result.failed += 1;
                }
            }
        }

        Ok(result)
    }
}

/// 评分统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingStats {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}

/// 批次评分结果
#[derive(Debug, Default)]
struct BatchResult {
    success: usize,
    failed: usize,
}
