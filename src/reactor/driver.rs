//! 反应器共享簿记
//! Shared reactor bookkeeping
//!
//! 时间轮保存尚未到期的完成回调，就绪队列保存等待投递的回调。
//! 到期或取消只会把回调移入就绪队列；投递由各反应器的分发循环逐个完成，
//! 并且在调用回调之前释放所有借用。
//!
//! The wheel holds completions that have not elapsed yet; the ready queue holds
//! completions waiting for delivery. Expiry and cancellation only move a
//! completion into the ready queue; delivery happens one at a time from each
//! reactor's dispatch loop, with every borrow released before the call.

use super::wheel::TimingWheel;
use super::{Completion, ReactorStats, WakeupId, WakeupStatus};
use crate::config::ReactorConfig;
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::{trace, warn};

/// 等待投递的完成通知
/// A completion waiting for delivery
pub(crate) struct ReadyWakeup {
    pub(crate) id: WakeupId,
    pub(crate) status: WakeupStatus,
    completion: Completion,
}

impl ReadyWakeup {
    /// 投递完成通知
    /// Deliver the completion
    pub(crate) fn deliver(self) {
        trace!(wakeup = %self.id, status = ?self.status, "Delivering completion");
        (self.completion)(self.status);
    }
}

pub(crate) struct ReactorCore {
    wheel: TimingWheel<Completion>,
    ready: VecDeque<ReadyWakeup>,
    stats: ReactorStats,
}

impl ReactorCore {
    /// 配置必须已经通过校验
    /// The configuration must already be validated
    pub(crate) fn new(config: &ReactorConfig, origin: Instant) -> Self {
        Self {
            wheel: TimingWheel::new(config.slot_count, config.slot_duration, origin),
            ready: VecDeque::new(),
            stats: ReactorStats::default(),
        }
    }

    pub(crate) fn schedule(&mut self, deadline: Instant, completion: Completion) -> WakeupId {
        self.stats.scheduled += 1;
        self.wheel.insert(deadline, completion)
    }

    /// 将尚未到期的唤醒移入就绪队列；已到期或已投递的唤醒不受影响
    /// Move a not-yet-elapsed wake-up to the ready queue; elapsed or delivered
    /// wake-ups are left alone
    pub(crate) fn cancel(&mut self, id: WakeupId) -> bool {
        match self.wheel.remove(id) {
            Some(completion) => {
                self.stats.canceled += 1;
                self.ready.push_back(ReadyWakeup {
                    id,
                    status: WakeupStatus::Canceled,
                    completion,
                });
                trace!(wakeup = %id, "Wake-up canceled");
                true
            }
            None => {
                if self.ready.iter().any(|ready| ready.id == id) {
                    trace!(wakeup = %id, "Cancel raced with expiry, completion already queued");
                } else {
                    warn!(wakeup = %id, "Cancel requested for unknown or delivered wake-up");
                }
                false
            }
        }
    }

    /// 将所有到期的唤醒移入就绪队列，返回移入的数量
    /// Move every due wake-up to the ready queue, returning how many moved
    pub(crate) fn expire(&mut self, now: Instant) -> usize {
        let expired = self.wheel.advance(now);
        let count = expired.len();
        self.stats.fired += count as u64;
        self.ready.extend(expired.into_iter().map(|entry| ReadyWakeup {
            id: entry.id,
            status: WakeupStatus::Fired,
            completion: entry.payload,
        }));
        count
    }

    pub(crate) fn pop_ready(&mut self) -> Option<ReadyWakeup> {
        let ready = self.ready.pop_front()?;
        self.stats.delivered += 1;
        Some(ready)
    }

    pub(crate) fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub(crate) fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub(crate) fn next_expiry(&mut self) -> Option<Instant> {
        self.wheel.next_expiry()
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.wheel.len() + self.ready.len()
    }

    pub(crate) fn stats(&self) -> ReactorStats {
        ReactorStats {
            outstanding: self.outstanding(),
            ..self.stats
        }
    }
}

impl std::fmt::Debug for ReactorCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorCore")
            .field("wheel", &self.wheel)
            .field("ready", &self.ready.len())
            .field("stats", &self.stats)
            .finish()
    }
}
