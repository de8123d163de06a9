//! 定义了定时器和反应器的可配置参数。
//! Defines configurable parameters for timers and reactors.

use crate::error::{Error, Result};
use std::time::Duration;

/// A structure containing all configurable parameters of the crate.
///
/// 包含本库所有可配置参数的结构体。
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Periodic timer parameters.
    /// 周期定时器参数。
    pub timer: TimerConfig,

    /// Reactor (event loop) parameters.
    /// 反应器（事件循环）参数。
    pub reactor: ReactorConfig,
}

/// Periodic timer parameters.
///
/// 周期定时器参数。
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// The delay between the end of one handler invocation and the next
    /// wake-up. A zero period fires on the next reactor dispatch.
    ///
    /// 一次处理函数调用结束到下一次唤醒之间的延迟。
    /// 周期为零时在下一次反应器分发时触发。
    pub period: Duration,
}

/// Reactor parameters. They only shape the internal timing wheel; deadlines
/// are always honored exactly regardless of slot granularity.
///
/// 反应器参数。仅影响内部时间轮的布局；无论槽位粒度如何，到期时间都会被精确遵守。
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Number of wheel slots. Must be a non-zero power of two.
    /// 时间轮槽位数量，必须是非零的2的幂。
    pub slot_count: usize,
    /// Time span covered by a single slot. Must be non-zero.
    /// 单个槽位覆盖的时间跨度，必须非零。
    pub slot_duration: Duration,
}

impl Config {
    /// Validates every section.
    /// 校验所有配置段。
    pub fn validate(&self) -> Result<()> {
        self.timer.validate()?;
        self.reactor.validate()
    }
}

impl TimerConfig {
    /// Any period is acceptable; kept for symmetry with the other sections.
    /// 任何周期都合法；与其他配置段保持一致。
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}

impl ReactorConfig {
    /// Checks the wheel geometry.
    /// 检查时间轮的几何参数。
    pub fn validate(&self) -> Result<()> {
        if self.slot_count == 0 || !self.slot_count.is_power_of_two() {
            return Err(Error::InvalidConfig {
                field: "reactor.slot_count",
                reason: "must be a non-zero power of two",
            });
        }
        if self.slot_duration.is_zero() {
            return Err(Error::InvalidConfig {
                field: "reactor.slot_duration",
                reason: "must be non-zero",
            });
        }
        Ok(())
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
        }
    }
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            slot_count: 256,
            slot_duration: Duration::from_millis(10), // ~2.56s per rotation
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timer.period, Duration::from_secs(1));
        assert_eq!(config.reactor.slot_count, 256);
    }

    #[test]
    fn test_rejects_bad_slot_count() {
        let mut config = ReactorConfig::default();
        config.slot_count = 7;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { field: "reactor.slot_count", .. })
        ));

        config.slot_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_slot_duration() {
        let config = ReactorConfig {
            slot_count: 8,
            slot_duration: Duration::ZERO,
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { field: "reactor.slot_duration", .. })
        ));
    }

    #[test]
    fn test_zero_period_is_allowed() {
        let config = TimerConfig {
            period: Duration::ZERO,
        };
        assert!(config.validate().is_ok());
    }
}
