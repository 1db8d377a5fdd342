/*
 * Architecture boundary
 *
 * Everything that genuinely depends on the target CPU - disabling and
 * restoring interrupts, saving/restoring a thread's register context, and
 * building the initial stack frame a brand-new thread "returns into" - is
 * pushed behind the [`Arch`] trait. The kernel core never assumes a
 * particular calling convention or interrupt controller; an embedding
 * firmware supplies a concrete `Arch` implementation and drives the tick
 * entry point itself. A reference adapter for x86_64 is included behind the
 * `arch-x86_64` feature so the core can be exercised on a desktop host.
 */

#[cfg(feature = "arch-x86_64")]
pub mod x86_64;

/// Opaque interrupt-mask token returned by [`Arch::critical_enter`] and
/// consumed by [`Arch::critical_exit`]. Kept abstract so nested critical
/// sections compose correctly regardless of what "disabled" means on a
/// given target (a single global flag, a saved PRIMASK, ...).
pub trait CriticalMask: Copy {}

impl CriticalMask for bool {}

/// Per-target primitives the kernel core is built on. Implementors need
/// not be `Sync`/`Send` aware beyond what the single-core, single-privilege
/// target already guarantees.
pub trait Arch {
    type Mask: CriticalMask;

    /// Disables interrupts (or otherwise enters a critical section) and
    /// returns a token capturing whether they were enabled beforehand, so
    /// nested enter/exit pairs restore the outermost caller's state rather
    /// than unconditionally re-enabling.
    fn critical_enter() -> Self::Mask;

    /// Restores the interrupt state captured by a matching `critical_enter`.
    fn critical_exit(mask: Self::Mask);

    /// Builds the initial stack contents for a brand-new thread so that the
    /// first switch into it "returns" into `entry(arg)`. Returns the stack
    /// pointer value to record in the thread's control block.
    ///
    /// # Safety
    /// `stack` must be valid, writable, and large enough for one stack
    /// frame plus whatever the target's calling convention reserves.
    unsafe fn stack_init(stack: &mut [usize], entry: fn(usize), arg: usize) -> usize;

    /// Performs the first switch into a thread that has never run before.
    /// Does not return to its caller; control resumes at `entry(arg)` as
    /// set up by `stack_init`.
    ///
    /// # Safety
    /// `sp` must be a stack pointer previously returned by `stack_init` for
    /// a stack that is still valid and not in use elsewhere.
    unsafe fn first_switch(sp: usize) -> !;

    /// Saves the currently running thread's context onto its own stack,
    /// stores the resulting stack pointer at `*save_sp`, then restores and
    /// resumes the thread whose stack pointer is `resume_sp`.
    ///
    /// # Safety
    /// `save_sp` must point at the currently running thread's stack pointer
    /// slot; `resume_sp` must be a valid, previously saved stack pointer
    /// for a different thread.
    unsafe fn switch(save_sp: *mut usize, resume_sp: usize);
}

/// RAII guard pairing `Arch::critical_enter`/`critical_exit`, so a critical
/// section is released even if the guarded code returns early or panics.
pub struct CriticalGuard<A: Arch> {
    mask: A::Mask,
}

impl<A: Arch> CriticalGuard<A> {
    pub fn enter() -> Self {
        CriticalGuard { mask: A::critical_enter() }
    }
}

impl<A: Arch> Drop for CriticalGuard<A> {
    fn drop(&mut self) {
        A::critical_exit(self.mask);
    }
}
