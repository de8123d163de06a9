//! 时间轮数据结构实现
//! Timing Wheel Data Structure Implementation
//!
//! 时间轮将时间划分为固定数量的槽位，每个条目按其绝对到期时间落入对应槽位。
//! 超过一圈的条目留在槽位中，直到真正到期才会被取出，因此到期时间总是被精确遵守，
//! 槽位粒度只影响扫描成本。
//!
//! The timing wheel divides time into a fixed number of slots and files every
//! entry under the slot of its absolute deadline. Entries more than one
//! rotation ahead stay in their slot until they are actually due, so deadlines
//! are honored exactly and the slot granularity only affects scan cost.

mod entry;

pub use entry::WheelEntry;

use crate::reactor::WakeupId;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// 时间轮实现
/// Timing wheel implementation
pub struct TimingWheel<T> {
    /// 槽位数量（必须是2的幂以支持位运算优化）
    /// Number of slots (must be power of 2 for bitwise optimization)
    slot_count: usize,
    /// 槽位掩码 (slot_count - 1)
    /// Slot mask (slot_count - 1)
    slot_mask: usize,
    /// 每个槽位的时间间隔
    /// Time interval per slot
    slot_duration: Duration,
    /// 刻度零点
    /// Origin of tick zero
    origin: Instant,
    /// 最近一次推进所到达的刻度，下一次推进会重新扫描它
    /// Tick reached by the last advance; rescanned by the next one
    cursor_tick: u64,
    /// 槽位数组
    /// Slot array
    slots: Vec<VecDeque<WheelEntry<T>>>,
    /// 条目ID到槽位索引的映射
    /// Entry ID to slot index mapping
    index: HashMap<WakeupId, usize>,
    /// 下一个分配的条目ID
    /// Next entry ID to allocate
    next_id: u64,
    /// 缓存的下次到期时间
    /// Cached next expiry time
    cached_next_expiry: Option<Instant>,
}

impl<T> TimingWheel<T> {
    /// 创建新的时间轮
    /// Create new timing wheel
    ///
    /// # Arguments
    /// * `slot_count` - 槽位数量，必须是2的幂 / number of slots, must be a power of 2
    /// * `slot_duration` - 每个槽位的时间间隔 / time span of one slot
    /// * `origin` - 刻度零点 / instant of tick zero
    pub fn new(slot_count: usize, slot_duration: Duration, origin: Instant) -> Self {
        assert!(slot_count.is_power_of_two(), "slot_count must be a power of 2");
        assert!(!slot_duration.is_zero(), "slot_duration must be non-zero");

        let mut slots = Vec::with_capacity(slot_count);
        slots.resize_with(slot_count, VecDeque::new);

        Self {
            slot_count,
            slot_mask: slot_count - 1,
            slot_duration,
            origin,
            cursor_tick: 0,
            slots,
            index: HashMap::new(),
            next_id: 1,
            cached_next_expiry: None,
        }
    }

    /// 插入一个在 `deadline` 到期的条目
    /// Insert an entry that expires at `deadline`
    pub fn insert(&mut self, deadline: Instant, payload: T) -> WakeupId {
        let id = WakeupId(self.next_id);
        self.next_id += 1;

        // 已经过去的到期时间落在游标槽位，下一次推进即可取出
        // Deadlines in the past land on the cursor slot and come out on the next advance
        let tick = self.tick_of(deadline).max(self.cursor_tick);
        let slot_index = self.slot_of(tick);

        self.slots[slot_index].push_back(WheelEntry::new(id, deadline, payload));
        self.index.insert(id, slot_index);

        if self.cached_next_expiry.is_none_or(|earliest| deadline < earliest) {
            self.cached_next_expiry = Some(deadline);
        }

        trace!(entry_id = id.0, slot_index, tick, "Added entry to timing wheel");
        id
    }

    /// 移除条目，返回其负载
    /// Remove an entry and return its payload
    pub fn remove(&mut self, id: WakeupId) -> Option<T> {
        let slot_index = self.index.remove(&id)?;
        let slot = &mut self.slots[slot_index];
        let position = slot.iter().position(|entry| entry.id == id)?;
        let entry = slot.remove(position)?;

        if self.cached_next_expiry == Some(entry.deadline) {
            self.cached_next_expiry = None;
        }

        trace!(entry_id = id.0, slot_index, "Removed entry from timing wheel");
        Some(entry.payload)
    }

    /// 推进时间轮并返回所有到期条目，按 (到期时间, ID) 排序
    /// Advance the wheel and return every due entry, ordered by (deadline, id)
    pub fn advance(&mut self, now: Instant) -> Vec<WheelEntry<T>> {
        let now_tick = self.tick_of(now).max(self.cursor_tick);
        let span = (now_tick - self.cursor_tick + 1).min(self.slot_count as u64);

        let mut expired = Vec::new();
        for tick in self.cursor_tick..self.cursor_tick + span {
            let slot = &mut self.slots[(tick as usize) & self.slot_mask];
            if slot.is_empty() {
                continue;
            }
            let (due, keep): (Vec<_>, Vec<_>) =
                slot.drain(..).partition(|entry| entry.deadline <= now);
            *slot = keep.into();
            expired.extend(due);
        }
        self.cursor_tick = now_tick;

        if !expired.is_empty() {
            for entry in &expired {
                self.index.remove(&entry.id);
            }
            expired.sort_by_key(|entry| (entry.deadline, entry.id));
            self.cached_next_expiry = None;
            trace!(expired_count = expired.len(), now_tick, "Timing wheel advanced");
        }

        expired
    }

    /// 获取下一个条目的到期时间
    /// Get the deadline of the earliest entry
    pub fn next_expiry(&mut self) -> Option<Instant> {
        if let Some(cached) = self.cached_next_expiry {
            return Some(cached);
        }
        if self.index.is_empty() {
            return None;
        }

        let earliest = self
            .slots
            .iter()
            .flat_map(|slot| slot.iter().map(|entry| entry.deadline))
            .min();
        self.cached_next_expiry = earliest;
        earliest
    }

    /// 获取条目总数
    /// Get total number of entries
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// 检查是否为空
    /// Check whether the wheel is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn tick_of(&self, instant: Instant) -> u64 {
        let elapsed = instant.saturating_duration_since(self.origin);
        (elapsed.as_nanos() / self.slot_duration.as_nanos()) as u64
    }

    fn slot_of(&self, tick: u64) -> usize {
        (tick as usize) & self.slot_mask
    }
}

impl<T> std::fmt::Debug for TimingWheel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingWheel")
            .field("slot_count", &self.slot_count)
            .field("slot_duration", &self.slot_duration)
            .field("cursor_tick", &self.cursor_tick)
            .field("entries", &self.index.len())
            .finish()
    }
}
