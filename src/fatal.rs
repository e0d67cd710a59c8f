//! Fatal error reporting.
//!
//! Used for conditions that mean the process was mis-configured or
//! mis-provisioned: an incomplete executor topology, an unknown executor name,
//! an exhausted thread-local pool.
//!
//! Worker threads contain task panics, so a fatal error raised on one aborts
//! the process directly. Anywhere else it panics with the message, which
//! terminates startup (and the process, under the release profile's
//! `panic = "abort"`).

use crate::executor::on_worker_thread;

/// Logs `msg` and terminates the current execution path.
#[cold]
#[track_caller]
pub fn fatal_error(msg: String) -> ! {
    tracing::error!(target: "ranexec::fatal", "{}", msg);
    if on_worker_thread() {
        eprintln!("fatal error on worker thread: {msg}");
        std::process::abort();
    }
    panic!("{}", msg);
}

/// Reports a fatal error with a formatted message.
#[macro_export]
macro_rules! report_fatal_error {
    ($($arg:tt)+) => {
        $crate::fatal::fatal_error(::std::format!($($arg)+))
    };
}

/// Reports a fatal error when `cond` does not hold.
#[macro_export]
macro_rules! report_fatal_error_if_not {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::fatal::fatal_error(::std::format!($($arg)+));
        }
    };
}
