//! 手动驱动的虚拟时钟反应器
//! Manually driven virtual-clock reactor
//!
//! 时钟只在调用方要求时前进，因此每一次到期、取消和投递的顺序都是确定的。
//! 用于测试和离线仿真。
//!
//! The clock only moves when the caller says so, which makes the order of every
//! expiry, cancellation and delivery deterministic. Used for tests and offline
//! simulations.

use super::driver::ReactorCore;
use super::{Completion, Reactor, ReactorStats, WakeupId};
use crate::config::ReactorConfig;
use crate::error::Result;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// A deterministic reactor driven by explicit calls.
///
/// 由显式调用驱动的确定性反应器。克隆得到的是同一个反应器的句柄。
/// Clones are handles to the same reactor.
#[derive(Clone, Debug)]
pub struct ManualReactor {
    inner: Rc<ManualInner>,
}

#[derive(Debug)]
struct ManualInner {
    core: RefCell<ReactorCore>,
    origin: Instant,
    now: Cell<Instant>,
}

impl ManualReactor {
    /// 使用默认配置创建
    /// Create with the default configuration
    pub fn new() -> Self {
        Self::build(&ReactorConfig::default())
    }

    /// 使用指定配置创建
    /// Create with the given configuration
    pub fn with_config(config: &ReactorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: &ReactorConfig) -> Self {
        let origin = Instant::now();
        Self {
            inner: Rc::new(ManualInner {
                core: RefCell::new(ReactorCore::new(config, origin)),
                origin,
                now: Cell::new(origin),
            }),
        }
    }

    /// 自创建以来经过的虚拟时间
    /// Virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        self.inner.now.get() - self.inner.origin
    }

    /// Move the clock forward and queue every wake-up that became due,
    /// without delivering anything.
    ///
    /// 推进时钟并将到期的唤醒放入就绪队列，但不投递。可以在完成回调内部调用，
    /// 用来模拟耗时的处理函数。
    pub fn advance(&self, duration: Duration) {
        let now = self.inner.now.get() + duration;
        self.inner.now.set(now);
        let expired = self.inner.core.borrow_mut().expire(now);
        trace!(elapsed = ?self.elapsed(), expired, "Manual clock advanced");
    }

    /// 投递一个就绪的完成通知，没有可投递的则返回 false
    /// Deliver one ready completion; returns false if none was ready
    pub fn dispatch(&self) -> bool {
        let ready = self.inner.core.borrow_mut().pop_ready();
        match ready {
            Some(ready) => {
                ready.deliver();
                true
            }
            None => false,
        }
    }

    /// 投递所有已就绪的完成通知，不推进时钟
    /// Deliver every ready completion without moving the clock
    pub fn dispatch_ready(&self) -> usize {
        let mut delivered = 0;
        while self.dispatch() {
            delivered += 1;
        }
        delivered
    }

    /// Run until nothing is outstanding, jumping the clock from deadline to
    /// deadline. Never returns while a periodic timer keeps rescheduling.
    ///
    /// 运行直到没有未完成的唤醒。只要有周期定时器在运行就不会返回。
    pub fn run_until_idle(&self) -> usize {
        let mut delivered = 0;
        loop {
            if self.dispatch() {
                delivered += 1;
                continue;
            }
            let next = self.inner.core.borrow_mut().next_expiry();
            match next {
                Some(deadline) => self.jump_to(deadline),
                None => return delivered,
            }
        }
    }

    /// 运行到指定的虚拟时刻（含）
    /// Run up to and including the given virtual instant
    pub fn run_until(&self, end: Instant) -> usize {
        let mut delivered = 0;
        loop {
            if self.dispatch() {
                delivered += 1;
                continue;
            }
            let next = self.inner.core.borrow_mut().next_expiry();
            match next {
                Some(deadline) if deadline <= end => self.jump_to(deadline),
                _ => break,
            }
        }
        if self.inner.now.get() < end {
            self.inner.now.set(end);
        }
        delivered
    }

    /// 从当前虚拟时刻起运行给定时长
    /// Run for the given duration from the current virtual instant
    pub fn run_for(&self, duration: Duration) -> usize {
        self.run_until(self.inner.now.get() + duration)
    }

    /// 是否有等待投递的完成通知
    /// Whether completions are waiting to be dispatched
    pub fn has_ready(&self) -> bool {
        self.inner.core.borrow().has_ready()
    }

    /// 尚未投递完成通知的唤醒数量
    /// Number of wake-ups whose completion has not been delivered
    pub fn outstanding(&self) -> usize {
        self.inner.core.borrow().outstanding()
    }

    /// 获取统计信息
    /// Get statistics
    pub fn stats(&self) -> ReactorStats {
        self.inner.core.borrow().stats()
    }

    fn jump_to(&self, deadline: Instant) {
        let now = self.inner.now.get().max(deadline);
        self.inner.now.set(now);
        self.inner.core.borrow_mut().expire(now);
    }
}

impl Default for ManualReactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor for ManualReactor {
    fn now(&self) -> Instant {
        self.inner.now.get()
    }

    fn schedule_after(&self, delay: Duration, completion: Completion) -> WakeupId {
        let deadline = self.inner.now.get() + delay;
        self.inner.core.borrow_mut().schedule(deadline, completion)
    }

    fn cancel(&self, wakeup: WakeupId) {
        self.inner.core.borrow_mut().cancel(wakeup);
    }
}
