//! # 错误处理宏

/// 快速创建配置错误的宏
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::PlatformError::config($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::PlatformError::config(format!($fmt, $($arg)*))
    };
}

/// 快速创建业务错误的宏
#[macro_export]
macro_rules! business_error {
    ($msg:expr) => {
        $crate::error::PlatformError::business($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::PlatformError::business(format!($fmt, $($arg)*))
    };
}

/// 确保条件成立，否则返回配置错误
#[macro_export]
macro_rules! ensure_config {
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::config_error!($msg));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::config_error!($fmt, $($arg)*));
        }
    };
}

/// 确保条件成立，否则返回参数校验错误
#[macro_export]
macro_rules! ensure_valid {
    ($cond:expr, $field:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::error::PlatformError::validation(
                $msg,
                Some(String::from($field)),
            ));
        }
    };
    ($cond:expr, $field:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::error::PlatformError::validation(
                format!($fmt, $($arg)*),
                Some(String::from($field)),
            ));
        }
    };
}
