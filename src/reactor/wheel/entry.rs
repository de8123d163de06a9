//! 时间轮条目实现
//! Entry implementation for the timing wheel

use crate::reactor::WakeupId;
use tokio::time::Instant;

/// 时间轮中的条目
/// Entry stored in the timing wheel
pub struct WheelEntry<T> {
    /// 条目ID
    /// Entry ID
    pub id: WakeupId,
    /// 到期时间
    /// Expiration time
    pub deadline: Instant,
    /// 到期时交还给调用方的负载
    /// Payload handed back to the caller on expiry
    pub payload: T,
}

impl<T> WheelEntry<T> {
    /// 创建新的时间轮条目
    /// Create new wheel entry
    pub fn new(id: WakeupId, deadline: Instant, payload: T) -> Self {
        Self {
            id,
            deadline,
            payload,
        }
    }
}

impl<T> std::fmt::Debug for WheelEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WheelEntry")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
