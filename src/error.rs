//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use thiserror::Error;

/// The primary error type for the periodic timer library.
/// 周期定时器库的主要错误类型。
///
/// Timer operations themselves never fail; errors only come from building
/// or driving a reactor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A configuration value was rejected during validation.
    /// 配置值未通过校验。
    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfig {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },

    /// The reactor was asked to run after `shutdown` had been requested.
    /// 在请求关闭之后又要求反应器继续运行。
    #[error("reactor has been shut down")]
    ReactorShutdown,
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        match err {
            Error::InvalidConfig { .. } => std::io::Error::new(ErrorKind::InvalidInput, err),
            Error::ReactorShutdown => std::io::Error::new(ErrorKind::BrokenPipe, err),
        }
    }
}
