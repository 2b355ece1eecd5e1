//! Diagnostics that are forwarded to the `log` crate when the `logging`
//! feature is enabled and compiled out otherwise.
//!
//! Arguments must be passed explicitly (no inline `{name}` captures) so that
//! they still count as used when logging is disabled.

macro_rules! forward_log {
    ($level:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "logging")]
        ::log::$level!($fmt $(, $arg)*);
        #[cfg(not(feature = "logging"))]
        { $(let _ = &$arg;)* }
    }};
}

macro_rules! ltrace {
    ($($tt:tt)*) => {
        forward_log!(trace, $($tt)*)
    };
}

macro_rules! ldebug {
    ($($tt:tt)*) => {
        forward_log!(debug, $($tt)*)
    };
}

macro_rules! lwarn {
    ($($tt:tt)*) => {
        forward_log!(warn, $($tt)*)
    };
}
