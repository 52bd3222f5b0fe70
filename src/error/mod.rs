//! The unified error handling system for the platform.

use std::fmt::Display;

pub use entitlement::EntitlementError;
pub use key_pool::KeyPoolError;
pub use types::PlatformError;

/// A unified `Result` type for the entire crate.
pub type Result<T> = std::result::Result<T, PlatformError>;

pub mod entitlement;
pub mod key_pool;
pub mod macros;
pub mod types;

/// 为错误附加上下文信息
pub trait Context<T, E> {
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display;

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<PlatformError>,
{
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display,
    {
        self.with_context(|| context)
    }

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(PlatformError::Context {
                context: context().to_string(),
                source: Box::new(error.into()),
            }),
        }
    }
}

/// Error category for monitoring and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caused by the caller (bad input, plan restrictions). 4xx.
    Client,
    /// Caused by the platform or its dependencies. 5xx.
    Server,
}
