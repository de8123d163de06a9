//! 单线程反应器契约
//! Single-threaded reactor contract
//!
//! 反应器提供一次性的延迟唤醒调度与取消。每个被调度的唤醒都会恰好产生一次
//! 完成通知（正常触发或已取消），并且总是在调度或取消调用返回之后，
//! 在同一个执行上下文中异步地投递。
//!
//! A reactor provides one-shot delayed wake-up scheduling and cancellation.
//! Every scheduled wake-up yields exactly one completion notification (fired
//! or canceled), always delivered asynchronously, strictly after the call that
//! scheduled or canceled it returns, on the same execution context.

pub(crate) mod driver;
pub mod local;
pub mod manual;
pub mod wheel;

pub use local::LocalReactor;
pub use manual::ManualReactor;
pub use wheel::{TimingWheel, WheelEntry};

use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::Instant;

/// 唤醒ID，在单个反应器内唯一
/// Wake-up ID, unique within a single reactor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WakeupId(pub(crate) u64);

impl WakeupId {
    /// 原始数值
    /// Raw numeric value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WakeupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wakeup#{}", self.0)
    }
}

/// 完成通知的状态
/// Status carried by a completion notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupStatus {
    /// 唤醒自然到期
    /// The delay elapsed naturally
    Fired,
    /// 唤醒在到期前被取消
    /// The wake-up was canceled before it elapsed
    Canceled,
}

/// 完成回调，每个唤醒恰好调用一次
/// Completion callback, invoked exactly once per wake-up
pub type Completion = Box<dyn FnOnce(WakeupStatus)>;

/// The reactor contract consumed by [`PeriodicTimer`](crate::timer::PeriodicTimer).
///
/// 周期定时器所依赖的反应器契约。
///
/// Implementations must never invoke a completion from inside
/// `schedule_after` or `cancel`, and must deliver completions one at a time.
pub trait Reactor {
    /// 反应器的当前时间
    /// The reactor's notion of "now"
    fn now(&self) -> Instant;

    /// 调度一次性唤醒，从调用时刻开始计时
    /// Schedule a one-shot wake-up, counting from the call
    fn schedule_after(&self, delay: Duration, completion: Completion) -> WakeupId;

    /// 请求取消；如果唤醒已经到期，正常触发的通知仍会被投递
    /// Request cancellation; if the wake-up already elapsed its `Fired`
    /// completion is still delivered
    fn cancel(&self, wakeup: WakeupId);
}

impl<R: Reactor + ?Sized> Reactor for Rc<R> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn schedule_after(&self, delay: Duration, completion: Completion) -> WakeupId {
        (**self).schedule_after(delay, completion)
    }

    fn cancel(&self, wakeup: WakeupId) {
        (**self).cancel(wakeup)
    }
}

/// 反应器统计信息
/// Reactor statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactorStats {
    /// 已调度的唤醒数
    /// Wake-ups scheduled
    pub scheduled: u64,
    /// 自然到期的唤醒数
    /// Wake-ups that elapsed naturally
    pub fired: u64,
    /// 被取消的唤醒数
    /// Wake-ups canceled before elapsing
    pub canceled: u64,
    /// 已投递的完成通知数
    /// Completions delivered
    pub delivered: u64,
    /// 尚未投递完成通知的唤醒数
    /// Wake-ups whose completion has not been delivered yet
    pub outstanding: usize,
}

impl fmt::Display for ReactorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReactorStats {{ scheduled: {}, fired: {}, canceled: {}, delivered: {}, outstanding: {} }}",
            self.scheduled, self.fired, self.canceled, self.delivered, self.outstanding
        )
    }
}
