//! 周期定时器模块
//! Periodic Timer Module
//!
//! 该模块实现了构建在单线程反应器之上的固定延迟周期定时器。任意时刻最多只有
//! 一个挂起的唤醒；取消是异步的，由取消中的状态吸收随后到达的完成通知，
//! 并按最新的意图重新解释它。
//!
//! This module implements a fixed-delay periodic timer on top of a
//! single-threaded reactor. At most one wake-up is pending at any time;
//! cancellation is asynchronous, and the canceling states absorb whichever
//! completion arrives next and reinterpret it according to the latest intent.

mod periodic;
pub mod state;


pub use periodic::{PeriodicTimer, TimerStats};
pub use state::{Effect, Operation, Plan, TimerState};
