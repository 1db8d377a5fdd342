/*
 * Kernel error taxonomy
 *
 * Every blocking or fallible kernel entry point returns a `KernelError`
 * rather than panicking or signaling out-of-band; see the error handling
 * design in the project notes for the full propagation rules.
 */

use core::fmt;

/// Status code returned by kernel primitives.
///
/// Mirrors the fixed error taxonomy: argument validation failures,
/// capacity/ownership conflicts, timeouts, and deletion-while-waiting.
/// Internal invariant violations are not represented here; they are
/// asserted on in debug builds (see [`crate::kassert`]) and otherwise
/// handled defensively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// A required pointer/handle argument was null or otherwise absent.
    Null,
    /// An argument was out of its valid range (priority, slice, capacity).
    Invalid,
    /// Operation attempted on the wrong IPC kind (e.g. semaphore op on a queue).
    Unsupported,
    /// Resource at capacity with a zero timeout (semaphore/queue full).
    Busy,
    /// Generic failure: non-blocking call could not proceed, or acquire by non-owner.
    Err,
    /// The blocking call's deadline elapsed before the resource became available.
    Timeout,
    /// The IPC object was deleted while the caller was waiting on it.
    Deleted,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KernelError::Null => "null argument",
            KernelError::Invalid => "argument out of range",
            KernelError::Unsupported => "unsupported operation",
            KernelError::Busy => "resource busy",
            KernelError::Err => "operation failed",
            KernelError::Timeout => "timed out",
            KernelError::Deleted => "object deleted",
        };
        f.write_str(s)
    }
}

/// Result alias used throughout the kernel core.
pub type KernelResult<T> = Result<T, KernelError>;

/// Debug-only invariant assertion.
///
/// Internal invariant violations (a timer linked on two lists, a thread
/// queued while RUNNING, ...) indicate a kernel bug rather than a caller
/// error. In debug builds we assert; release builds fall through so a
/// single corrupted structure does not itself panic the system.
#[macro_export]
macro_rules! kassert {
    ($cond:expr, $($arg:tt)*) => {
        #[cfg(debug_assertions)]
        {
            if !($cond) {
                log::error!($($arg)*);
                panic!(concat!("kernel invariant violated: ", stringify!($cond)));
            }
        }
    };
}
