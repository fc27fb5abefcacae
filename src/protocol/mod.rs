//! 消息协议
//!
//! 只有不可变的值类型，不含逻辑。

pub mod envelope;
pub mod messages;

pub use envelope::Envelope;
pub use messages::{
    CoordinatorAddress, CoordinatorMessage, GradeCategory, GradingCapacityCheck,
    GradingCapacityResponse, GradingComplete, GradingFailed, GradingOutcome, SessionId,
    SessionResult, WorkerMessage,
};
