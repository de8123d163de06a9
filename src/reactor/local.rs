//! 基于 tokio 时钟的单线程反应器
//! Single-threaded reactor on the tokio clock
//!
//! 反应器本身不产生任务：调用方在当前线程上 `await` 它的某个运行方法，
//! 分发循环在其中等待下一个到期时间或新的调度请求，然后逐个投递完成通知。
//! 在 `tokio::time::pause` 下运行时，时钟会自动跳到下一个到期时间。
//!
//! The reactor spawns nothing: the caller awaits one of its run methods on the
//! current thread, and the dispatch loop waits for the next deadline or for a
//! new scheduling request, then delivers completions one at a time. Under
//! `tokio::time::pause` the clock auto-advances to the next deadline.

use super::driver::ReactorCore;
use super::{Completion, Reactor, ReactorStats, WakeupId};
use crate::config::ReactorConfig;
use crate::error::{Error, Result};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

/// A single-threaded reactor driven by the tokio clock.
///
/// 由 tokio 时钟驱动的单线程反应器。克隆得到的是同一个反应器的句柄。
/// Clones are handles to the same reactor.
#[derive(Clone, Debug)]
pub struct LocalReactor {
    inner: Rc<LocalInner>,
}

#[derive(Debug)]
struct LocalInner {
    core: RefCell<ReactorCore>,
    /// 新的调度或取消请求唤醒分发循环
    /// New schedule or cancel requests wake the dispatch loop
    notify: Notify,
    shutdown: Cell<bool>,
}

/// 分发循环的退出条件
/// Exit condition of the dispatch loop
#[derive(Debug, Clone, Copy)]
enum RunUntil {
    Shutdown,
    Idle,
    Deadline(Instant),
}

impl LocalReactor {
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
        Self {
            inner: Rc::new(LocalInner {
                core: RefCell::new(ReactorCore::new(config, Instant::now())),
                notify: Notify::new(),
                shutdown: Cell::new(false),
            }),
        }
    }

    /// 运行分发循环直到调用 [`shutdown`](Self::shutdown)
    /// Run the dispatch loop until [`shutdown`](Self::shutdown) is called
    pub async fn run(&self) -> Result<()> {
        self.drive(RunUntil::Shutdown).await
    }

    /// 运行直到没有未完成的唤醒
    /// Run until no wake-up is outstanding
    pub async fn run_until_idle(&self) -> Result<()> {
        self.drive(RunUntil::Idle).await
    }

    /// 运行给定时长
    /// Run for the given duration
    pub async fn run_for(&self, duration: Duration) -> Result<()> {
        self.drive(RunUntil::Deadline(Instant::now() + duration)).await
    }

    /// Request the dispatch loop to stop. Outstanding wake-ups, including
    /// completions already queued in the current round, are kept but will
    /// not be delivered by this reactor any more.
    ///
    /// 请求分发循环停止。未完成的唤醒（包括本轮已排队的完成通知）会保留，
    /// 但不会再被投递。
    pub fn shutdown(&self) {
        self.inner.shutdown.set(true);
        self.inner.notify.notify_one();
        debug!("Local reactor shutdown requested");
    }

    /// 是否已请求关闭
    /// Whether shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.get()
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

    async fn drive(&self, until: RunUntil) -> Result<()> {
        if self.is_shutdown() {
            return Err(Error::ReactorShutdown);
        }
        debug!(?until, "Local reactor dispatch loop started");

        loop {
            self.dispatch_round();
            if self.is_shutdown() {
                break;
            }

            let now = Instant::now();
            if matches!(until, RunUntil::Deadline(end) if now >= end) {
                break;
            }

            let busy = {
                let mut core = self.inner.core.borrow_mut();
                core.expire(now) > 0 || core.has_ready()
            };
            if busy {
                // 零延迟的重新调度不能饿死运行时上的其他任务
                // Zero-delay rescheduling must not starve other tasks on the runtime
                tokio::task::yield_now().await;
                continue;
            }

            let next = self.inner.core.borrow_mut().next_expiry();
            let wake_at = match (until, next) {
                (RunUntil::Deadline(end), Some(deadline)) => Some(deadline.min(end)),
                (RunUntil::Deadline(end), None) => Some(end),
                (RunUntil::Idle, None) => break,
                (_, next) => next,
            };

            match wake_at {
                Some(deadline) => {
                    tokio::select! {
                        _ = sleep_until(deadline) => {}
                        _ = self.inner.notify.notified() => {}
                    }
                }
                None => self.inner.notify.notified().await,
            }
        }

        debug!(stats = %self.stats(), "Local reactor dispatch loop stopped");
        Ok(())
    }

    /// Deliver the completions that were ready when the round started.
    /// Completions queued during the round wait for the next one, and
    /// nothing more is delivered once shutdown is requested.
    ///
    /// 投递本轮开始时已就绪的完成通知；关闭后不再投递。
    fn dispatch_round(&self) {
        let ready = self.inner.core.borrow().ready_len();
        let mut delivered = 0;
        while delivered < ready && !self.is_shutdown() {
            let Some(next) = self.inner.core.borrow_mut().pop_ready() else {
                break;
            };
            next.deliver();
            delivered += 1;
        }
    }
}

impl Default for LocalReactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor for LocalReactor {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule_after(&self, delay: Duration, completion: Completion) -> WakeupId {
        let id = self
            .inner
            .core
            .borrow_mut()
            .schedule(Instant::now() + delay, completion);
        self.inner.notify.notify_one();
        trace!(wakeup = %id, delay_ms = delay.as_millis(), "Wake-up scheduled");
        id
    }

    fn cancel(&self, wakeup: WakeupId) {
        if self.inner.core.borrow_mut().cancel(wakeup) {
            self.inner.notify.notify_one();
        }
    }
}
