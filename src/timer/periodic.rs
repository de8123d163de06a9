//! 可取消、可重启的周期定时器
//! Cancelable, restartable periodic timer
//!
//! 定时器通过 `Rc` 拥有自己的共享状态，而每个被调度的完成回调只持有一个
//! `Weak`。定时器被销毁后，所有仍在途中的完成通知都会发现句柄已失效并直接返回。
//!
//! The timer owns its shared state through an `Rc`, while every completion it
//! schedules only holds a `Weak`. Once the timer is dropped, every completion
//! still in flight finds a dead handle and returns without touching anything.

use super::state::{self, Effect, Operation, TimerState};
use crate::config::TimerConfig;
use crate::reactor::{Reactor, WakeupId, WakeupStatus};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

type Handler = Rc<dyn Fn()>;

/// 定时器统计信息
/// Timer statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    /// 处理函数被调用的次数
    /// Handler invocations
    pub executions: u64,
    /// 请求的唤醒次数
    /// Wake-ups requested from the reactor
    pub schedules: u64,
    /// 请求的取消次数
    /// Cancellations requested from the reactor
    pub cancellations: u64,
    /// 被停止或取消中的状态吸收、没有执行处理函数的完成通知
    /// Completions absorbed by a stopped or canceling state without running the handler
    pub stale_ticks: u64,
}

/// A fixed-delay periodic timer on a single-threaded [`Reactor`].
///
/// 基于单线程反应器的固定延迟周期定时器。
///
/// The next wake-up is scheduled one period after the previous handler
/// invocation returned. Every operation returns immediately and never runs the
/// handler synchronously; all of them may be called from inside the handler,
/// which may also drop the timer.
///
/// The handler usually reaches its own timer through a `Weak`, which avoids a
/// reference cycle through the stored handler:
///
/// ```
/// use kestrel_periodic::{ManualReactor, PeriodicTimer};
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let reactor = ManualReactor::new();
/// let timer = Rc::new(PeriodicTimer::new(reactor.clone()));
/// timer.set_period(Duration::from_millis(50));
///
/// let ticks = Rc::new(Cell::new(0));
/// let (count, weak) = (Rc::clone(&ticks), Rc::downgrade(&timer));
/// timer.set_handler(move || {
///     count.set(count.get() + 1);
///     if count.get() == 3 {
///         if let Some(timer) = weak.upgrade() {
///             timer.stop();
///         }
///     }
/// });
///
/// timer.start();
/// reactor.run_until_idle();
/// assert_eq!(ticks.get(), 3);
/// assert_eq!(reactor.elapsed(), Duration::from_millis(150));
/// ```
pub struct PeriodicTimer<R: Reactor + 'static> {
    shared: Rc<Shared<R>>,
}

struct Shared<R: Reactor + 'static> {
    id: u64,
    reactor: R,
    state: Cell<TimerState>,
    period: Cell<Duration>,
    handler: RefCell<Option<Handler>>,
    /// 完成通知尚未到达的唤醒
    /// Wake-up whose completion has not arrived yet
    pending: Cell<Option<WakeupId>>,
    stats: Cell<TimerStats>,
}

impl<R: Reactor + 'static> PeriodicTimer<R> {
    /// 创建没有处理函数的定时器，周期取默认配置
    /// Create a timer without a handler, using the default period
    pub fn new(reactor: R) -> Self {
        Self::from_config(reactor, &TimerConfig::default())
    }

    /// 创建带处理函数的定时器
    /// Create a timer with a handler
    pub fn with_handler<F>(reactor: R, handler: F) -> Self
    where
        F: Fn() + 'static,
    {
        let timer = Self::new(reactor);
        timer.set_handler(handler);
        timer
    }

    /// 根据配置创建定时器
    /// Create a timer from its configuration
    pub fn from_config(reactor: R, config: &TimerConfig) -> Self {
        let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
        trace!(timer_id = id, period = ?config.period, "Periodic timer created");
        Self {
            shared: Rc::new(Shared {
                id,
                reactor,
                state: Cell::new(TimerState::Stopped),
                period: Cell::new(config.period),
                handler: RefCell::new(None),
                pending: Cell::new(None),
                stats: Cell::new(TimerStats::default()),
            }),
        }
    }

    /// 进程内唯一的定时器ID，用于日志
    /// Process-unique timer ID, used in logs
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Set the period. Takes effect at the next scheduling decision; a
    /// wake-up that is already pending keeps its deadline.
    ///
    /// 设置周期。在下一次调度时生效，已挂起的唤醒保持原到期时间。
    pub fn set_period(&self, period: Duration) {
        self.shared.period.set(period);
    }

    /// 当前周期
    /// Current period
    pub fn period(&self) -> Duration {
        self.shared.period.get()
    }

    /// Replace the handler. An invocation already in progress keeps running the
    /// handler it started with.
    ///
    /// 替换处理函数。正在进行的调用继续使用开始时的处理函数。
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn() + 'static,
    {
        *self.shared.handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// 移除处理函数；定时器仍按周期运转
    /// Remove the handler; the timer keeps cycling
    pub fn clear_handler(&self) {
        self.shared.handler.borrow_mut().take();
    }

    /// 在一个周期后执行处理函数；如果已在运行，则从现在起重新计时
    /// Run the handler one period from now; restarts the countdown if running
    pub fn start(&self) {
        Shared::apply(&self.shared, Operation::Start);
    }

    /// 不再执行处理函数，直到再次调用 `start` 或 `fast_forward`
    /// No further handler invocations until `start` or `fast_forward`
    pub fn stop(&self) {
        Shared::apply(&self.shared, Operation::Stop);
    }

    /// Run the handler as soon as possible, but never inside this call: the
    /// invocation happens on a later reactor dispatch.
    ///
    /// 尽快执行处理函数，但绝不在本调用内部执行。
    pub fn fast_forward(&self) {
        Shared::apply(&self.shared, Operation::FastForward);
    }

    /// 当前状态
    /// Current state
    pub fn state(&self) -> TimerState {
        self.shared.state.get()
    }

    /// 是否会在将来执行处理函数（或正在执行）
    /// Whether the handler will run in the future (or is running)
    pub fn is_active(&self) -> bool {
        !matches!(
            self.shared.state.get(),
            TimerState::Stopped | TimerState::CancelingToStop
        )
    }

    /// 是否有完成通知尚未到达的唤醒
    /// Whether a wake-up's completion is still outstanding
    pub fn has_pending_wakeup(&self) -> bool {
        self.shared.pending.get().is_some()
    }

    /// 获取统计信息
    /// Get statistics
    pub fn stats(&self) -> TimerStats {
        self.shared.stats.get()
    }
}

impl<R: Reactor + 'static> Shared<R> {
    fn apply(this: &Rc<Self>, operation: Operation) {
        let from = this.state.get();
        let plan = state::resolve(from, operation);
        this.state.set(plan.next);

        trace!(
            timer_id = this.id,
            ?operation,
            from = from.name(),
            to = plan.next.name(),
            "Timer transition"
        );

        for effect in plan.effects() {
            match effect {
                Effect::Schedule => Self::schedule(this),
                Effect::Cancel => this.cancel_pending(),
                Effect::Execute | Effect::Violation => {
                    // Only a tick yields these, and ticks go through `on_wakeup`.
                    this.violation(from);
                }
            }
        }
    }

    /// 反应器投递的唯一完成回调
    /// The single completion callback handed to the reactor
    fn on_wakeup(weak: &Weak<Self>, status: WakeupStatus) {
        let Some(this) = weak.upgrade() else {
            trace!(?status, "Completion for a dropped timer ignored");
            return;
        };

        if this.pending.take().is_none() {
            warn!(timer_id = this.id, ?status, "Completion arrived without a pending wake-up");
        }

        let from = this.state.get();
        let plan = state::resolve(from, Operation::Tick);
        this.state.set(plan.next);

        trace!(
            timer_id = this.id,
            ?status,
            from = from.name(),
            to = plan.next.name(),
            "Timer tick"
        );

        if matches!(
            from,
            TimerState::Stopped | TimerState::CancelingToStop | TimerState::CancelingToStart
        ) {
            this.update_stats(|stats| stats.stale_ticks += 1);
        }

        for effect in plan.effects() {
            match effect {
                Effect::Schedule => Self::schedule(&this),
                Effect::Cancel => this.cancel_pending(),
                Effect::Execute => {
                    Self::execute(this);
                    return;
                }
                Effect::Violation => this.violation(from),
            }
        }
    }

    /// Run the handler. Consumes the strong reference so that a handler
    /// dropping the timer really frees it.
    fn execute(this: Rc<Self>) {
        let handler = this.handler.borrow().clone();
        this.update_stats(|stats| stats.executions += 1);
        let id = this.id;
        let weak = Rc::downgrade(&this);
        drop(this);

        if let Some(handler) = handler {
            handler();
        }

        let Some(this) = weak.upgrade() else {
            debug!(timer_id = id, "Timer dropped by its own handler");
            return;
        };

        // 处理函数没有改变状态：继续周期
        // The handler left the state alone: keep cycling
        if this.state.get() == TimerState::Executing {
            Self::apply(&this, Operation::Start);
        }
    }

    fn schedule(this: &Rc<Self>) {
        debug_assert!(
            this.pending.get().is_none(),
            "scheduling while a wake-up is pending"
        );

        let weak = Rc::downgrade(this);
        let period = this.period.get();
        let wakeup = this.reactor.schedule_after(
            period,
            Box::new(move |status| Self::on_wakeup(&weak, status)),
        );
        this.pending.set(Some(wakeup));
        this.update_stats(|stats| stats.schedules += 1);

        trace!(timer_id = this.id, %wakeup, ?period, "Wake-up scheduled");
    }

    fn cancel_pending(&self) {
        match self.pending.get() {
            Some(wakeup) => {
                self.reactor.cancel(wakeup);
                self.update_stats(|stats| stats.cancellations += 1);
            }
            None => warn!(timer_id = self.id, "Cancel requested without a pending wake-up"),
        }
    }

    fn violation(&self, from: TimerState) -> ! {
        error!(
            timer_id = self.id,
            state = from.name(),
            "Reactor delivered a wake-up while the handler was executing"
        );
        panic!(
            "periodic timer {} received a wake-up while its handler was executing (state {from})",
            self.id
        );
    }

    fn update_stats(&self, update: impl FnOnce(&mut TimerStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }
}

impl<R: Reactor + 'static> Drop for PeriodicTimer<R> {
    fn drop(&mut self) {
        // 只有 Running 还需要取消；取消中的状态已经发出过取消请求。
        // 在途的完成通知会看到失效的 Weak
        // Only Running still needs a cancel; the canceling states already
        // issued one. The in-flight completion will observe a dead Weak
        if let (TimerState::Running, Some(wakeup)) =
            (self.shared.state.get(), self.shared.pending.get())
        {
            self.shared.reactor.cancel(wakeup);
        }
        debug!(
            timer_id = self.shared.id,
            state = self.shared.state.get().name(),
            "Periodic timer dropped"
        );
    }
}

impl<R: Reactor + 'static> fmt::Debug for PeriodicTimer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicTimer")
            .field("id", &self.shared.id)
            .field("state", &self.shared.state.get())
            .field("period", &self.shared.period.get())
            .field("pending", &self.shared.pending.get())
            .field("has_handler", &self.shared.handler.borrow().is_some())
            .finish()
    }
}
