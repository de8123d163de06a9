//! 周期定时器状态机
//! Periodic timer state machine
//!
//! 状态转换以表驱动的方式实现：每个基本输入（启动、停止、唤醒）在每个状态下
//! 都有一个确定的结果；组合操作（例如快进）是有限次查表的串联，而不是递归调用。
//! 这里只计算计划，副作用由定时器执行。
//!
//! Transitions are table driven: every primitive input (start, stop, tick)
//! has one defined outcome in every state, and composed operations (such as
//! fast-forward) are a bounded chain of table lookups instead of recursive
//! calls. This module only computes plans; the timer carries out the effects.

use std::fmt;

/// 定时器状态
/// Timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerState {
    /// 没有挂起的唤醒，也不会再调用处理函数
    /// No pending wake-up; the handler will not run
    Stopped,
    /// 有一个挂起的唤醒，到期后执行处理函数
    /// One wake-up is pending; the handler runs when it elapses
    Running,
    /// 处理函数正在执行，没有挂起的唤醒
    /// The handler is executing; nothing is pending
    Executing,
    /// 已请求取消，完成通知到达后进入 `Stopped`
    /// Cancellation requested; becomes `Stopped` when the completion arrives
    CancelingToStop,
    /// 已请求取消，完成通知到达后重新调度
    /// Cancellation requested; reschedules when the completion arrives
    CancelingToStart,
    /// 已请求取消，完成通知到达后立即执行处理函数
    /// Cancellation requested; runs the handler when the completion arrives
    CancelingToFastForward,
}

impl TimerState {
    /// 所有状态
    /// Every state
    pub const ALL: [TimerState; 6] = [
        TimerState::Stopped,
        TimerState::Running,
        TimerState::Executing,
        TimerState::CancelingToStop,
        TimerState::CancelingToStart,
        TimerState::CancelingToFastForward,
    ];

    /// 获取状态名称
    /// Gets the state name
    pub fn name(self) -> &'static str {
        match self {
            TimerState::Stopped => "Stopped",
            TimerState::Running => "Running",
            TimerState::Executing => "Executing",
            TimerState::CancelingToStop => "CancelingToStop",
            TimerState::CancelingToStart => "CancelingToStart",
            TimerState::CancelingToFastForward => "CancelingToFastForward",
        }
    }

    /// 是否在等待一次取消的完成通知
    /// Whether a cancellation completion is being awaited
    pub fn is_canceling(self) -> bool {
        matches!(
            self,
            TimerState::CancelingToStop
                | TimerState::CancelingToStart
                | TimerState::CancelingToFastForward
        )
    }
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 作用于定时器的外部事件
/// External events applied to the timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `start()`
    Start,
    /// `stop()`
    Stop,
    /// `fast_forward()`
    FastForward,
    /// 反应器投递了完成通知
    /// The reactor delivered a completion
    Tick,
}

impl Operation {
    /// 所有操作
    /// Every operation
    pub const ALL: [Operation; 4] = [
        Operation::Start,
        Operation::Stop,
        Operation::FastForward,
        Operation::Tick,
    ];

    fn inputs(self) -> &'static [Input] {
        match self {
            Operation::Start => &[Input::Start],
            Operation::Stop => &[Input::Stop],
            Operation::FastForward => &[Input::Start, Input::Stop, Input::ForceFastForward],
            Operation::Tick => &[Input::Tick],
        }
    }
}

/// 状态转换要求定时器执行的副作用
/// Side effect a transition asks the timer to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    /// 在一个周期后调度新的唤醒
    /// Schedule a new wake-up one period from now
    Schedule,
    /// 请求取消挂起的唤醒
    /// Request cancellation of the pending wake-up
    Cancel,
    /// 执行处理函数
    /// Run the handler
    Execute,
    /// 处理函数执行期间收到唤醒：契约被破坏
    /// Tick delivered while the handler executes: contract violated
    Violation,
}

/// 一个计划中最多的副作用数量
/// Maximum number of effects in one plan
pub const MAX_EFFECTS: usize = 2;

/// 单个基本输入最多的查表次数（包括后续输入）
/// Maximum lookups for one primitive input, follow-ups included
const MAX_CHAIN: usize = 2;

/// 一次操作的解析结果：目标状态加上按顺序执行的副作用
/// Result of resolving one operation: the target state plus effects in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// 目标状态
    /// Target state
    pub next: TimerState,
    effects: [Option<Effect>; MAX_EFFECTS],
}

impl Plan {
    fn new(state: TimerState) -> Self {
        Self {
            next: state,
            effects: [None; MAX_EFFECTS],
        }
    }

    fn push(&mut self, effect: Effect) {
        let slot = self.effects.iter_mut().find(|slot| slot.is_none());
        debug_assert!(slot.is_some(), "plan exceeded {MAX_EFFECTS} effects");
        if let Some(slot) = slot {
            *slot = Some(effect);
        }
    }

    /// 按顺序迭代副作用
    /// Iterate the effects in order
    pub fn effects(&self) -> impl Iterator<Item = Effect> + '_ {
        self.effects.iter().flatten().copied()
    }

    /// 是否没有任何副作用
    /// Whether the plan carries no effect
    pub fn is_pure(&self) -> bool {
        self.effects[0].is_none()
    }
}

/// 基本输入
/// Primitive inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Start,
    Stop,
    Tick,
    /// 快进的最后一步：把停止意图改写为快进意图
    /// Last step of fast-forward: relabel the stop intent as fast-forward
    ForceFastForward,
}

#[derive(Debug, Clone, Copy)]
struct Step {
    next: TimerState,
    effect: Option<Effect>,
    follow_up: Option<Input>,
}

impl Step {
    fn to(next: TimerState) -> Self {
        Self {
            next,
            effect: None,
            follow_up: None,
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }

    fn then(mut self, input: Input) -> Self {
        self.follow_up = Some(input);
        self
    }
}

/// 基本转换表
/// The primitive transition table
fn step(state: TimerState, input: Input) -> Step {
    use TimerState::*;

    match (state, input) {
        (Stopped, Input::Start) => Step::to(Running).with(Effect::Schedule),
        (Stopped, Input::Stop) => Step::to(Stopped),
        (Stopped, Input::Tick) => Step::to(Stopped),

        // 重启：先取消，再在取消中的状态上重新请求启动
        // Restart: cancel first, then re-request start from the canceling state
        (Running, Input::Start) => Step::to(CancelingToStop)
            .with(Effect::Cancel)
            .then(Input::Start),
        (Running, Input::Stop) => Step::to(CancelingToStop).with(Effect::Cancel),
        (Running, Input::Tick) => Step::to(Executing).with(Effect::Execute),

        (Executing, Input::Start) => Step::to(Running).with(Effect::Schedule),
        (Executing, Input::Stop) => Step::to(Stopped),
        (Executing, Input::Tick) => Step::to(Executing).with(Effect::Violation),

        (CancelingToStop, Input::Start) => Step::to(CancelingToStart),
        (CancelingToStop, Input::Stop) => Step::to(CancelingToStop),
        (CancelingToStop, Input::Tick) => Step::to(Stopped),

        (CancelingToStart, Input::Start) => Step::to(CancelingToStart),
        (CancelingToStart, Input::Stop) => Step::to(CancelingToStop),
        (CancelingToStart, Input::Tick) => Step::to(Running).with(Effect::Schedule),

        (CancelingToFastForward, Input::Start) => Step::to(CancelingToStart),
        (CancelingToFastForward, Input::Stop) => Step::to(CancelingToStop),
        (CancelingToFastForward, Input::Tick) => Step::to(Executing).with(Effect::Execute),

        (_, Input::ForceFastForward) => Step::to(CancelingToFastForward),
    }
}

/// 将一个操作解析为计划
/// Resolve an operation into a plan
pub fn resolve(state: TimerState, operation: Operation) -> Plan {
    let mut plan = Plan::new(state);

    for &input in operation.inputs() {
        let mut pending = Some(input);
        let mut lookups = 0;
        while let Some(input) = pending {
            lookups += 1;
            debug_assert!(lookups <= MAX_CHAIN, "transition chain did not terminate");

            let step = step(plan.next, input);
            plan.next = step.next;
            if let Some(effect) = step.effect {
                plan.push(effect);
            }
            pending = step.follow_up;
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use Effect::*;
    use TimerState::*;

    fn expected(state: TimerState, operation: Operation) -> (TimerState, Vec<Effect>) {
        match (state, operation) {
            (Stopped, Operation::Start) => (Running, vec![Schedule]),
            (Stopped, Operation::Stop) => (Stopped, vec![]),
            (Stopped, Operation::FastForward) => (CancelingToFastForward, vec![Schedule, Cancel]),
            (Stopped, Operation::Tick) => (Stopped, vec![]),

            (Running, Operation::Start) => (CancelingToStart, vec![Cancel]),
            (Running, Operation::Stop) => (CancelingToStop, vec![Cancel]),
            (Running, Operation::FastForward) => (CancelingToFastForward, vec![Cancel]),
            (Running, Operation::Tick) => (Executing, vec![Execute]),

            (Executing, Operation::Start) => (Running, vec![Schedule]),
            (Executing, Operation::Stop) => (Stopped, vec![]),
            (Executing, Operation::FastForward) => {
                (CancelingToFastForward, vec![Schedule, Cancel])
            }
            (Executing, Operation::Tick) => (Executing, vec![Violation]),

            (CancelingToStop, Operation::Start) => (CancelingToStart, vec![]),
            (CancelingToStop, Operation::Stop) => (CancelingToStop, vec![]),
            (CancelingToStop, Operation::FastForward) => (CancelingToFastForward, vec![]),
            (CancelingToStop, Operation::Tick) => (Stopped, vec![]),

            (CancelingToStart, Operation::Start) => (CancelingToStart, vec![]),
            (CancelingToStart, Operation::Stop) => (CancelingToStop, vec![]),
            (CancelingToStart, Operation::FastForward) => (CancelingToFastForward, vec![]),
            (CancelingToStart, Operation::Tick) => (Running, vec![Schedule]),

            (CancelingToFastForward, Operation::Start) => (CancelingToStart, vec![]),
            (CancelingToFastForward, Operation::Stop) => (CancelingToStop, vec![]),
            (CancelingToFastForward, Operation::FastForward) => (CancelingToFastForward, vec![]),
            (CancelingToFastForward, Operation::Tick) => (Executing, vec![Execute]),
        }
    }

    #[test]
    fn test_transition_table_is_total() {
        for state in TimerState::ALL {
            for operation in Operation::ALL {
                let plan = resolve(state, operation);
                let effects: Vec<Effect> = plan.effects().collect();
                assert_eq!(
                    (plan.next, effects),
                    expected(state, operation),
                    "{state} x {operation:?}"
                );
            }
        }
    }

    #[test]
    fn test_stop_on_stopped_is_pure() {
        let plan = resolve(Stopped, Operation::Stop);
        assert_eq!(plan.next, Stopped);
        assert!(plan.is_pure());
    }

    #[test]
    fn test_schedule_only_without_pending_wakeup() {
        // 只有在没有挂起唤醒的状态下才可能先调度
        // Scheduling first only happens in states without a pending wake-up
        for state in TimerState::ALL {
            for operation in Operation::ALL {
                let plan = resolve(state, operation);
                if plan.effects().next() == Some(Schedule) {
                    assert!(
                        matches!(state, Stopped | Executing | CancelingToStart),
                        "{state} x {operation:?} schedules first"
                    );
                }
            }
        }
    }

    #[test]
    fn test_fast_forward_always_ends_canceling_to_fast_forward() {
        for state in TimerState::ALL {
            assert_eq!(
                resolve(state, Operation::FastForward).next,
                CancelingToFastForward
            );
        }
    }

    #[test]
    fn test_fast_forward_never_executes_synchronously() {
        for state in TimerState::ALL {
            let plan = resolve(state, Operation::FastForward);
            assert!(plan.effects().all(|effect| effect != Execute));
        }
    }

    #[test]
    fn test_canceling_states() {
        assert!(!Stopped.is_canceling());
        assert!(!Running.is_canceling());
        assert!(!Executing.is_canceling());
        assert!(CancelingToStop.is_canceling());
        assert!(CancelingToStart.is_canceling());
        assert!(CancelingToFastForward.is_canceling());
        assert_eq!(CancelingToFastForward.to_string(), "CancelingToFastForward");
    }
}
