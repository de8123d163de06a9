#![deny(clippy::expect_used, clippy::unwrap_used)]

//! A cancelable, restartable fixed-delay periodic timer for single-threaded reactors.
//! 面向单线程反应器的可取消、可重启的固定延迟周期定时器。

pub mod config;
pub mod error;
pub mod reactor;
pub mod timer;

pub use config::{Config, ReactorConfig, TimerConfig};
pub use error::{Error, Result};
pub use reactor::{
    Completion, LocalReactor, ManualReactor, Reactor, ReactorStats, WakeupId, WakeupStatus,
};
pub use timer::{PeriodicTimer, TimerState, TimerStats};
