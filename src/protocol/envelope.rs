use tokio::sync::oneshot;

use crate::protocol::GradingOutcome;

/// 转发信封
///
/// 中转方把原始调用方的回复地址和消息一起按值传递，
/// 最终处理方直接回复原始调用方，而不是上一跳。
#[derive(Debug)]
pub struct Envelope<T> {
    pub payload: T,
    pub original_requester: oneshot::Sender<GradingOutcome>,
}

impl<T> Envelope<T> {
    pub fn new(payload: T, original_requester: oneshot::Sender<GradingOutcome>) -> Self {
        Self {
            payload,
            original_requester,
        }
    }

    /// 拆开信封
    pub fn into_parts(self) -> (T, oneshot::Sender<GradingOutcome>) {
        (self.payload, self.original_requester)
    }
}
