//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `coordinator` - 评分协调者
//! - 每个实例同一时间持有一个评分会话，其余提交排队
//! - 驱动会话状态机：加载评分表 → 分发 → 回收 → 生成反馈 → 写结果
//! - 外部调用在后台执行，结果以消息形式回到收件箱
//!
//! ### `session` - 评分会话
//! - 评分表、已回收的评估、待回收数量
//!
//! ### `router` - 提交路由
//! - 探测协调者容量，把提交装进信封转发给空闲的协调者
//!
//! ### `batch_processor` - 批量评分处理器
//! - 管理应用生命周期，分批评分，输出全局统计
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<SubmissionJob>)
//!     ↓
//! router (选择协调者)
//!     ↓
//! coordinator (处理单个提交)
//!     ↓
//! worker (处理单个评分维度)
//!     ↓
//! services (能力层：rubric / llm / mcq / results)
//! ```

pub mod batch_processor;
pub mod coordinator;
pub mod router;
pub mod session;

// 重新导出主要类型
pub use batch_processor::{App, ProcessingStats};
pub use coordinator::{Collaborators, Coordinator, CoordinatorHandle, Phase};
pub use router::SubmissionRouter;
pub use session::{GradingSession, RecordOutcome};
