//! 工作者层
//!
//! - [`GradingWorker`]：无状态的评分维度执行者
//! - [`WorkerPool`]：持有全部工作者，按策略分派任务并提供容量快照
//! - [`TaskDispatcher`]：协调者依赖的分派接口

pub mod grading_worker;
pub mod pool;

pub use grading_worker::{evaluate_category, GradingWorker};
pub use pool::{SelectionStrategy, TaskDispatcher, WorkerPool};
