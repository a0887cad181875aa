pub const DEFAULT_EXIT_CODE: i32 = 1;

/// Logs an error and terminates the process. Only used before the gateway
/// starts serving, where there is no caller to report the error to.
#[macro_export]
macro_rules! die {
    ($($arg:tt)*) => ({
        ::tracing::error!($($arg)*);
        ::std::process::exit($crate::utils::errors::DEFAULT_EXIT_CODE);
    })
}
