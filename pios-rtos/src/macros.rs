/// Hard assertion for caller contract violations.
///
/// These are not recoverable: the condition is logged and the system panics,
/// which halts firmware through its panic handler.
macro_rules! pios_assert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            log::error!("assertion failed: {}: {}", stringify!($cond), format_args!($($arg)+));
            panic!("assertion failed: {}: {}", stringify!($cond), format_args!($($arg)+));
        }
    };
}
