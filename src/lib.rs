//! # Grading Engine
//!
//! 基于 actor 的作业评分引擎：一份提交按评分表拆成多个评分维度，
//! 由工作者并行评估，协调者回收结果、汇总分数、生成总体反馈并写入结果文件。
//!
//! ## 架构设计
//!
//! ### ① 数据模型（Models）
//! - `models/` - 评分表、提交、评估结果、等级换算，以及 TOML 加载
//!
//! ### ② 消息协议（Protocol）
//! - `protocol/` - 协调者与工作者之间的不可变消息、转发信封
//!
//! ### ③ 业务能力层（Services）
//! - `McqScorer` - 选择题确定性判分
//! - `LlmEvaluator` / `LlmFeedbackSynthesizer` - LLM 评估与总体反馈
//! - `TomlRubricSource` - 评分表来源
//! - `CsvResultsWriter` - 追加写入评分结果
//!
//! ### ④ 工作者层（Worker）
//! - `GradingWorker` - 评估单个评分维度
//! - `WorkerPool` - 按策略分派任务
//!
//! ### ⑤ 编排层（Orchestration）
//! - `Coordinator` - 单个提交的评分状态机
//! - `SubmissionRouter` - 在多个协调者之间转发提交
//! - `App` - 批量评分
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod protocol;
pub mod services;
pub mod utils;
pub mod worker;

// 重新导出常用类型
pub use config::{Config, CoordinatorConfig};
pub use error::{AppError, AppResult};
pub use models::{GradingEvaluation, QuestionType, RubricItem, SubmissionJob};
pub use orchestrator::{App, Collaborators, Coordinator, CoordinatorHandle, SubmissionRouter};
pub use protocol::{GradingComplete, GradingFailed, GradingOutcome};
