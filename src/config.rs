/*
 * Compile-time kernel configuration
 *
 * Sizing and policy constants that would be board/application specific in a
 * real deployment. These mirror the `*_Config.h` knobs of a typical RTOS
 * port: thread table capacity, default time slice, tick frequency, and the
 * priority numbering convention.
 */

/// Maximum number of threads the kernel can track at once, including the
/// idle thread. Backed by a fixed-capacity arena (see [`crate::thread`]),
/// so this bounds static memory rather than being a runtime limit.
pub const MAX_THREADS: usize = 32;

/// Number of distinct priority levels. Priorities are `0..PRIORITY_LEVELS`.
/// Must not exceed 32: the ready queue uses a single `u32` bitmap with one
/// bit per level (see [`crate::sched`]).
pub const PRIORITY_LEVELS: u8 = 32;

/// Default round-robin time slice, in ticks, assigned to a thread that does
/// not specify one explicitly.
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// Tick interrupt frequency in Hz. Informational for any embedder that
/// needs to convert a wall-clock duration to a tick count; the kernel core
/// itself only ever counts ticks, never wall time.
pub const TICK_HZ: u32 = 1000;

/// Number of levels in the timer engine's current/overflow list pair (see
/// [`crate::timer`]). Fixed at 1 - this crate does not implement the
/// reference's multi-level timer skip list, since a single ascending-order
/// list is sufficient at `MAX_THREADS`-scale timer populations.
pub const TIMER_LEVELS: usize = 1;

/// Stack size, in `usize` words, reserved for the idle thread by an
/// embedder that allocates its stack statically.
pub const IDLE_STACK_SIZE: usize = 256;

/// Capacity, in `usize` words, of the inline stack buffer carried inside
/// every [`crate::thread::Thread`] slot. A thread's requested stack size
/// must not exceed this - there is no general heap to fall back to (see
/// [`crate::heap`]'s optional byte pool, which is a separate, opt-in
/// concern), so every thread's worst-case stack has to fit the arena's
/// fixed per-slot allocation.
pub const THREAD_STACK_WORDS: usize = 256;

/// Maximum hold count a recursive mutex's owner may reach through repeated
/// re-entrant acquires; further acquires past this depth saturate instead of
/// overflowing the counter.
pub const RECURSIVE_MUTEX_MAX_DEPTH: u32 = u16::MAX as u32;

/// Idle thread priority. Always the lowest-urgency slot regardless of the
/// numbering convention in effect: level `0` when `priority-desc` makes
/// larger numbers more urgent, level `PRIORITY_LEVELS - 1` otherwise.
#[cfg(not(feature = "priority-desc"))]
pub const IDLE_THREAD_PRIORITY: u8 = PRIORITY_LEVELS - 1;

#[cfg(feature = "priority-desc")]
pub const IDLE_THREAD_PRIORITY: u8 = 0;

/// Sentinel used by the priority-inheritance protocol to mean "no saved
/// priority" without needing an `Option` field on the hot mutex-owner path.
pub const NO_SAVED_PRIORITY: u8 = 0xFF;

/// Value passed as a timeout meaning "block forever".
pub const WAIT_FOREVER: u32 = u32::MAX;

/// Value passed as a timeout meaning "do not block".
pub const WAIT_NONE: u32 = 0;

/// True when a smaller numeric value denotes a higher-urgency priority
/// (the default convention used throughout the worked examples). Enabling
/// the `priority-desc` feature flips this so that larger values win.
#[cfg(not(feature = "priority-desc"))]
pub const HIGHER_PRIORITY_IS_LOWER_NUMBER: bool = true;

#[cfg(feature = "priority-desc")]
pub const HIGHER_PRIORITY_IS_LOWER_NUMBER: bool = false;

/// Returns whether `a` is strictly more urgent than `b`, honoring the
/// active priority convention.
#[inline]
pub fn is_higher_priority(a: u8, b: u8) -> bool {
    if HIGHER_PRIORITY_IS_LOWER_NUMBER {
        a < b
    } else {
        a > b
    }
}

/// Returns the more urgent of two priorities.
#[inline]
pub fn higher_of(a: u8, b: u8) -> u8 {
    if is_higher_priority(a, b) { a } else { b }
}
