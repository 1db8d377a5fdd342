/*
 * Kernel core: thread lifecycle, the tick entry point, and the blocking
 * protocol shared by every IPC primitive
 *
 * A single `Kernel<A>` instance owns the thread arena, the ready-queue
 * scheduler and the timer engine, and is the only thing that actually
 * calls into `Arch`. Applications reach it through the global singleton
 * in [`crate::kernel::global`], mirroring the `spin::Mutex<Option<T>>`
 * pattern used for shared kernel state elsewhere in this codebase.
 */

use crate::arch::Arch;
use crate::config::{DEFAULT_TIME_SLICE, IDLE_STACK_SIZE, IDLE_THREAD_PRIORITY, MAX_THREADS, WAIT_FOREVER, WAIT_NONE};
use crate::error::{KernelError, KernelResult};
use crate::ipc::mutex::{Mutex, Released};
use crate::ipc::queue::MessageQueue;
use crate::ipc::semaphore::Semaphore;
use crate::ipc::Blockable;
use crate::list::ListHead;
use crate::sched::{Decision, Scheduler};
use crate::thread::{ThreadId, ThreadState, ThreadTable, ThreadTimerArena, ThreadWaitArena, WaitReason};
use crate::tick::TickClock;
use crate::timer::TimerEngine;

pub struct Kernel<A: Arch> {
    threads: ThreadTable,
    sched: Scheduler,
    tick: TickClock,
    timers: TimerEngine,
    /// Threads that have exited or been deleted but not yet reclaimed;
    /// drained by the idle thread calling [`Kernel::reap`].
    termination_list: ListHead<ThreadId>,
    started: bool,
    _arch: core::marker::PhantomData<A>,
}

impl<A: Arch> Kernel<A> {
    pub fn new() -> Self {
        Kernel {
            threads: ThreadTable::new(),
            sched: Scheduler::new(),
            tick: TickClock::new(),
            timers: TimerEngine::new(),
            termination_list: ListHead::new(),
            started: false,
            _arch: core::marker::PhantomData,
        }
    }

    pub fn now(&self) -> u32 {
        self.tick.now()
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        self.sched.current()
    }

    /// Creates a new thread in the `Init` state. It will not run until
    /// [`Kernel::start_thread`] moves it to `Ready`. Builds the initial
    /// stacked context on the thread's own stack via `Arch::stack_init`
    /// before returning, so the thread is ready to be switched into the
    /// moment it becomes current.
    pub fn create_thread(
        &mut self,
        priority: u8,
        time_slice: u32,
        stack_words: usize,
        entry: fn(usize),
        arg: usize,
    ) -> KernelResult<ThreadId> {
        let id = self.threads.create(priority, time_slice, stack_words, entry, arg)?;
        let sp = unsafe {
            let stack = self.threads.stack_slice_mut(id)?;
            A::stack_init(stack, entry, arg)
        };
        self.threads.set_sp(id, sp)?;
        Ok(id)
    }

    /// Moves a thread from `Init` to `Ready`, making it a scheduling
    /// candidate. The idle thread must be the first one started.
    pub fn start_thread(&mut self, id: ThreadId) -> KernelResult<()> {
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let thread = self.threads.get_mut(id)?;
        if thread.state != ThreadState::Init {
            return Err(KernelError::Invalid);
        }
        thread.state = ThreadState::Ready;
        thread.remaining_slice = thread.time_slice;
        self.sched.insert_ready(&mut self.threads, id);
        drop(guard);
        self.reschedule(false);
        Ok(())
    }

    /// Creates and starts the idle thread at the lowest priority. Call
    /// exactly once during kernel bring-up, before any other thread is
    /// started.
    pub fn spawn_idle_thread(&mut self, entry: fn(usize)) -> KernelResult<ThreadId> {
        let id = self.create_thread(IDLE_THREAD_PRIORITY, DEFAULT_TIME_SLICE, IDLE_STACK_SIZE, entry, 0)?;
        self.start_thread(id)?;
        Ok(id)
    }

    /// The platform tick interrupt handler. The only in-scope entry point
    /// that runs in interrupt context: advances the tick counter, expires
    /// any due timers, decrements the running thread's time slice and
    /// rotates it out at zero, then reschedules if needed.
    pub fn tick_isr(&mut self) {
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let prev = self.tick.now();
        let now = self.tick.advance();
        let wrapped = TickClock::wrapped_on_advance(prev, now);

        let mut arena = ThreadTimerArena(&mut self.threads);
        let expired = self.timers.on_tick(&mut arena, wrapped, now);
        self.wake_expired(expired);

        let mut rotate = false;
        if let Some(current) = self.sched.current() {
            if let Ok(thread) = self.threads.get_mut(current) {
                if thread.remaining_slice > 0 {
                    thread.remaining_slice -= 1;
                }
                if thread.remaining_slice == 0 {
                    thread.remaining_slice = thread.time_slice;
                    rotate = true;
                }
            }
        }
        if rotate {
            if let Some(current) = self.sched.current() {
                let priority = self.threads.get(current).map(|t| t.priority).unwrap_or(0);
                self.sched.rotate(&mut self.threads, priority);
            }
        }
        drop(guard);
        self.reschedule(rotate);
    }

    fn wake_expired(&mut self, expired: ListHead<ThreadId>) {
        // Drained into a bounded buffer first rather than interleaving
        // `pop_front` with `wake_sleeping_or_timed_out`: the latter needs
        // `&mut self`, which would conflict with the arena's borrow of
        // `self.threads` still live for the next `pop_front`.
        let mut ids: heapless::Vec<ThreadId, MAX_THREADS> = heapless::Vec::new();
        {
            let mut arena = ThreadTimerArena(&mut self.threads);
            let mut list = expired;
            while let Some(id) = list.pop_front(&mut arena) {
                let _ = ids.push(id);
            }
        }
        for id in ids {
            self.wake_sleeping_or_timed_out(id);
        }
    }

    /// Called when a thread's armed timer fires. A plain sleep has nothing
    /// else to clean up. A timed-out IPC wait is trickier: the thread is
    /// still linked on the object's wait list, and this function has no way
    /// to reach that object to unlink it there and then, so `wait_reason`
    /// is deliberately left at `Ipc` (rather than cleared) as a marker that
    /// [`Kernel::block_on`]'s next call checks, and performs the deferred
    /// wait-list cleanup through the object reference it is given.
    fn wake_sleeping_or_timed_out(&mut self, id: ThreadId) {
        let Ok(thread) = self.threads.get_mut(id) else { return };
        if thread.state != ThreadState::Suspended {
            return;
        }
        if thread.wait_reason == WaitReason::Sleeping {
            thread.wait_reason = WaitReason::None;
        }
        thread.state = ThreadState::Ready;
        self.sched.insert_ready(&mut self.threads, id);
        log::trace!("timer expiry woke {:?}", id);
    }

    /// Completes a signal-driven IPC wake where the object handed the
    /// operation's result directly to `id` (`Semaphore::signal` or
    /// `Mutex::release` popping it straight off the wait list): its next
    /// `block_on` call reports success without retrying `try_now`.
    pub fn wake_ipc_waiter(&mut self, id: ThreadId) {
        self.wake_ipc(id, WaitReason::IpcGranted);
    }

    /// Completes an IPC wake where the object only became *possible* to
    /// retry (`MessageQueue::wake_receiver`/`wake_sender` after room or data
    /// frees up, but no specific message was handed over): its next
    /// `block_on` call retries `try_now` as if blocking for the first time.
    pub fn wake_ipc_retry(&mut self, id: ThreadId) {
        self.wake_ipc(id, WaitReason::None);
    }

    /// Completes a wake driven by the object itself being deleted
    /// (`drain_waiters`/`drain_all_waiters`): its next `block_on` call
    /// reports `Err(Deleted)` instead of retrying.
    pub fn wake_ipc_deleted(&mut self, id: ThreadId) {
        self.wake_ipc(id, WaitReason::IpcDeleted);
    }

    fn wake_ipc(&mut self, id: ThreadId, resolved: WaitReason) {
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let mut arena = ThreadTimerArena(&mut self.threads);
        self.timers.disarm(&mut arena, id);
        if let Ok(thread) = self.threads.get_mut(id) {
            if thread.state == ThreadState::Suspended {
                thread.wait_reason = resolved;
                thread.state = ThreadState::Ready;
                self.sched.insert_ready(&mut self.threads, id);
                log::trace!("ipc wake {:?} reason={:?}", id, resolved);
            }
        }
        drop(guard);
        self.reschedule(false);
    }

    /// Re-evaluates who should run and performs the switch if needed.
    /// `force` requests a switch away from the current thread even if it
    /// is still the most urgent ready thread (used after it blocks or
    /// exits).
    fn reschedule(&mut self, force: bool) {
        if !self.started {
            // Bring-up: the very first start_thread call just records the
            // idle thread as current without switching into it; execution
            // "is" already that thread's entry in the embedding firmware's
            // model. Real first-switch is an `Arch` responsibility invoked
            // explicitly by the embedder once, not from here.
            if let Some(id) = self.sched.pick_next() {
                self.sched.set_current(Some(id));
                if let Ok(t) = self.threads.get_mut(id) {
                    t.state = ThreadState::Running;
                }
                self.started = true;
            }
            return;
        }
        match self.sched.decide(&self.threads, force) {
            Decision::Continue | Decision::Idle => {}
            Decision::SwitchTo { from, to } => {
                log::trace!("switch {:?} -> {:?}", from, to);
                if let Some(cur) = self.sched.current() {
                    if cur != to {
                        if let Ok(t) = self.threads.get_mut(cur) {
                            if t.state == ThreadState::Running {
                                t.state = ThreadState::Ready;
                            }
                        }
                    }
                }
                self.sched.remove_ready(&mut self.threads, to, self.threads.get(to).map(|t| t.priority).unwrap_or(0));
                if let Ok(t) = self.threads.get_mut(to) {
                    t.state = ThreadState::Running;
                }
                self.sched.set_current(Some(to));
                // Actually performing the register-level switch is left to
                // the embedding firmware's drive loop; this core only
                // decides who should run next.
            }
        }
    }

    /// Suspends the calling thread for `ticks` ticks. `ticks == WAIT_NONE`
    /// returns immediately.
    pub fn sleep(&mut self, ticks: u32) -> KernelResult<()> {
        let current = self.sched.current().ok_or(KernelError::Invalid)?;
        if ticks == WAIT_NONE {
            return Ok(());
        }
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let now = self.tick.now();
        let deadline = now.wrapping_add(ticks);
        {
            let thread = self.threads.get_mut(current)?;
            thread.state = ThreadState::Suspended;
            thread.wait_reason = WaitReason::Sleeping;
            thread.deadline = deadline;
        }
        let mut arena = ThreadTimerArena(&mut self.threads);
        self.timers.arm(&mut arena, current, now, deadline);
        log::debug!("thread {:?} sleeping {} ticks (deadline {})", current, ticks, deadline);
        drop(guard);
        self.reschedule(true);
        Ok(())
    }

    /// Explicitly suspends `id` until [`Kernel::resume_thread`] is called.
    pub fn suspend_thread(&mut self, id: ThreadId) -> KernelResult<()> {
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let priority = {
            let thread = self.threads.get_mut(id)?;
            if thread.state != ThreadState::Ready && thread.state != ThreadState::Running {
                return Err(KernelError::Invalid);
            }
            let was_current = self.sched.current() == Some(id);
            thread.state = ThreadState::Suspended;
            if !was_current {
                Some(thread.priority)
            } else {
                None
            }
        };
        if let Some(priority) = priority {
            self.sched.remove_ready(&mut self.threads, id, priority);
        }
        let force = self.sched.current() == Some(id);
        drop(guard);
        self.reschedule(force);
        Ok(())
    }

    pub fn resume_thread(&mut self, id: ThreadId) -> KernelResult<()> {
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let thread = self.threads.get_mut(id)?;
        if thread.state != ThreadState::Suspended {
            return Err(KernelError::Invalid);
        }
        thread.wait_reason = WaitReason::None;
        thread.state = ThreadState::Ready;
        self.sched.insert_ready(&mut self.threads, id);
        drop(guard);
        self.reschedule(false);
        Ok(())
    }

    /// Sets a thread's priority. If boosting a blocked or ready thread that
    /// is currently linked into some list keyed by priority, re-links it so
    /// the change takes effect immediately.
    pub fn set_priority(&mut self, id: ThreadId, priority: u8) -> KernelResult<()> {
        if priority as u32 >= crate::config::PRIORITY_LEVELS as u32 {
            return Err(KernelError::Invalid);
        }
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let (old_priority, state) = {
            let thread = self.threads.get_mut(id)?;
            let old = thread.priority;
            thread.priority = priority;
            thread.base_priority = priority;
            (old, thread.state)
        };
        if state == ThreadState::Ready {
            self.sched.remove_ready(&mut self.threads, id, old_priority);
            self.sched.insert_ready(&mut self.threads, id);
        }
        drop(guard);
        self.reschedule(false);
        Ok(())
    }

    /// Terminates a thread: removed from the ready list and any timer,
    /// marked `Terminated`, and appended to the termination list for the
    /// idle thread's reaper to reclaim later. A thread may terminate itself
    /// (`id == current`, forcing a reschedule) or be terminated by another.
    pub fn terminate_thread(&mut self, id: ThreadId) -> KernelResult<()> {
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let (state, priority) = {
            let thread = self.threads.get_mut(id)?;
            (thread.state, thread.priority)
        };
        match state {
            ThreadState::Ready => self.sched.remove_ready(&mut self.threads, id, priority),
            ThreadState::Suspended => {
                let mut arena = ThreadTimerArena(&mut self.threads);
                self.timers.disarm(&mut arena, id);
            }
            ThreadState::Running => {}
            ThreadState::Terminated | ThreadState::Deleted | ThreadState::Init => {
                return Err(KernelError::Invalid);
            }
        }
        self.threads.get_mut(id)?.state = ThreadState::Terminated;
        self.termination_list.push_back(&mut self.threads, id);
        log::debug!("thread {:?} terminated", id);
        let force = self.sched.current() == Some(id);
        if force {
            self.sched.set_current(None);
        }
        drop(guard);
        self.reschedule(force);
        Ok(())
    }

    /// Reclaims every thread on the termination list. Intended to be
    /// called from the idle thread's body, the lowest-priority context
    /// that is always ready to run.
    pub fn reap(&mut self) {
        let guard = crate::arch::CriticalGuard::<A>::enter();
        while let Some(id) = self.termination_list.pop_front(&mut self.threads) {
            let _ = self.threads.reclaim(id);
        }
        drop(guard);
    }

    /// Restarts a `Deleted` thread from scratch, reusing its slot. Rebuilds
    /// the initial stacked context the same way [`Kernel::create_thread`]
    /// does, since a restarted thread runs its entry point from scratch
    /// rather than resuming whatever it was doing before termination.
    pub fn restart_thread(
        &mut self,
        id: ThreadId,
        priority: u8,
        time_slice: u32,
        stack_words: usize,
        entry: fn(usize),
        arg: usize,
    ) -> KernelResult<ThreadId> {
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let new_id = self.threads.restart(id, priority, time_slice, stack_words, entry, arg)?;
        drop(guard);
        let sp = unsafe {
            let stack = self.threads.stack_slice_mut(new_id)?;
            A::stack_init(stack, entry, arg)
        };
        self.threads.set_sp(new_id, sp)?;
        self.start_thread(new_id)?;
        Ok(new_id)
    }

    /// The blocking-with-timeout protocol shared by every generic IPC
    /// primitive (semaphore acquire, mutex acquire, queue send/recv). The
    /// caller's own thread body is expected to call this in a retry loop:
    ///
    /// ```ignore
    /// loop {
    ///     match kernel.block_on(&mut sem, timeout) {
    ///         Err(KernelError::Busy) => continue, // re-enters after a wake
    ///         other => break other,
    ///     }
    /// }
    /// ```
    ///
    /// The first call in such a loop either succeeds immediately
    /// (`Ok(())`), fails immediately for a zero timeout (`Err(Busy)`), or
    /// enqueues the current thread on `obj`'s wait list, arms a timeout
    /// unless `WAIT_FOREVER`, suspends it and requests a reschedule -
    /// actually suspending and later resuming this call is an
    /// `Arch::switch` concern external to this function, performed by the
    /// embedding firmware in response to the pending reschedule. Once the
    /// thread is genuinely running again (whether woken by the object's own
    /// `signal`/`release`/`wake_*` via [`Kernel::wake_ipc_waiter`], or by
    /// its timeout), the *next* call into this same function detects that
    /// it was the one waiting and either disarms cleanup and retries
    /// `try_now` (woken by signal) or unlinks itself from `obj`'s wait list
    /// and reports `Err(Timeout)` (woken by timeout) - the wait-list unlink
    /// on timeout has to happen here rather than in the tick interrupt,
    /// since only the caller holds a reference to which object it was
    /// waiting on.
    ///
    /// `obj`'s [`Blockable::before_block`] and [`Blockable::after_success`]
    /// hooks let the mutex apply priority inheritance at the moment a thread
    /// actually suspends, and let the queue wake the other side of a
    /// send/recv pair on a successful non-blocking completion, without this
    /// function needing to know which kind of object it was given.
    pub fn block_on<B: Blockable>(&mut self, obj: &mut B, timeout: u32) -> KernelResult<()> {
        let current = self.sched.current().ok_or(KernelError::Invalid)?;
        let guard = crate::arch::CriticalGuard::<A>::enter();

        match self.threads.get(current)?.wait_reason {
            WaitReason::Ipc => {
                // Re-entered after being made Ready again without a
                // matching `wake_ipc_waiter` call: the timeout fired first.
                // Only this call, holding `obj`, can unlink `current` from
                // its wait list.
                obj.wait_list_mut().remove(&mut self.threads, current);
                self.threads.get_mut(current)?.wait_reason = WaitReason::None;
                drop(guard);
                return Err(KernelError::Timeout);
            }
            WaitReason::IpcGranted => {
                // `wake_ipc_waiter` already completed the operation on this
                // thread's behalf (e.g. a semaphore unit handed directly
                // off the wait list); nothing left to retry.
                self.threads.get_mut(current)?.wait_reason = WaitReason::None;
                drop(guard);
                return Ok(());
            }
            WaitReason::IpcDeleted => {
                self.threads.get_mut(current)?.wait_reason = WaitReason::None;
                drop(guard);
                return Err(KernelError::Deleted);
            }
            WaitReason::None | WaitReason::Sleeping => {}
        }

        match obj.try_now(&mut self.threads, current) {
            Ok(()) => {
                let partner = obj.after_success(&mut self.threads);
                drop(guard);
                if let Some(id) = partner {
                    self.wake_ipc_retry(id);
                }
                return Ok(());
            }
            Err(KernelError::Busy) => {}
            Err(e) => return Err(e),
        }
        if timeout == WAIT_NONE {
            return Err(KernelError::Busy);
        }

        if let Some((boosted, priority)) = obj.before_block(&mut self.threads, current) {
            self.boost_priority(boosted, priority);
        }

        let now = self.tick.now();
        {
            let thread = self.threads.get_mut(current)?;
            thread.state = ThreadState::Suspended;
            thread.wait_reason = WaitReason::Ipc;
        }
        obj.wait_list_mut().insert(&mut self.threads, current);
        if timeout != WAIT_FOREVER {
            let deadline = now.wrapping_add(timeout);
            self.threads.get_mut(current)?.deadline = deadline;
            let mut arena = ThreadTimerArena(&mut self.threads);
            self.timers.arm(&mut arena, current, now, deadline);
        }
        log::trace!("thread {:?} blocked on ipc, timeout={}", current, timeout);
        drop(guard);
        self.reschedule(true);
        Err(KernelError::Busy)
    }

    /// Raises `id`'s current (not base) priority to `priority` for priority
    /// inheritance, re-homing it in the ready list if it is presently
    /// `Ready` so the bump takes effect immediately. Unlike
    /// [`Kernel::set_priority`], this never touches `base_priority`, since
    /// the original priority must still be recoverable when the boost is
    /// released.
    fn boost_priority(&mut self, id: ThreadId, priority: u8) {
        let Some((old, state)) = (match self.threads.get_mut(id) {
            Ok(thread) => {
                let old = thread.priority;
                if old == priority {
                    None
                } else {
                    thread.priority = priority;
                    Some((old, thread.state))
                }
            }
            Err(_) => None,
        }) else {
            return;
        };
        if state == ThreadState::Ready {
            self.sched.remove_ready(&mut self.threads, id, old);
            self.sched.insert_ready(&mut self.threads, id);
        }
    }

    /// Detaches every thread on `list`, in order, returning them in a
    /// bounded buffer - used by the `delete_*` wrappers below, which need to
    /// finish draining a wait list (via [`ThreadWaitArena`]) and drop the
    /// critical section before calling back into `self` to wake each one.
    fn drain_wait_ids(&mut self, mut list: ListHead<ThreadId>) -> heapless::Vec<ThreadId, MAX_THREADS> {
        let mut ids = heapless::Vec::new();
        let mut arena = ThreadWaitArena(&mut self.threads);
        while let Some(id) = list.pop_front(&mut arena) {
            let _ = ids.push(id);
        }
        ids
    }

    /// Releases one unit of `sem`, waking a blocked receiver directly if one
    /// is waiting rather than letting it retry against the incremented
    /// count.
    pub fn signal_semaphore(&mut self, sem: &mut Semaphore) -> KernelResult<()> {
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let woken = sem.signal(&mut self.threads)?;
        drop(guard);
        if let Some(id) = woken {
            self.wake_ipc_waiter(id);
        }
        Ok(())
    }

    /// Deletes `sem`, waking every waiter with `Err(Deleted)`.
    pub fn delete_semaphore(&mut self, sem: &mut Semaphore) {
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let waiters = sem.drain_waiters(&mut self.threads);
        let ids = self.drain_wait_ids(waiters);
        drop(guard);
        for id in ids {
            self.wake_ipc_deleted(id);
        }
    }

    /// Releases one level of ownership of `mtx` for the calling thread,
    /// restoring any priority boost and handing ownership to the next
    /// waiter directly, if any.
    pub fn release_mutex(&mut self, mtx: &mut Mutex) -> KernelResult<()> {
        let current = self.sched.current().ok_or(KernelError::Invalid)?;
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let outcome = mtx.release(&mut self.threads, current)?;
        drop(guard);
        if let Released::Free { woken, restore } = outcome {
            if let Some((id, priority)) = restore {
                self.boost_priority(id, priority);
            }
            if let Some(id) = woken {
                self.wake_ipc_waiter(id);
            }
        }
        Ok(())
    }

    /// Deletes `mtx`, waking every waiter with `Err(Deleted)`.
    pub fn delete_mutex(&mut self, mtx: &mut Mutex) {
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let waiters = mtx.drain_waiters(&mut self.threads);
        let ids = self.drain_wait_ids(waiters);
        drop(guard);
        for id in ids {
            self.wake_ipc_deleted(id);
        }
    }

    /// Deletes `queue`, waking every sender and receiver waiting on it with
    /// `Err(Deleted)`.
    pub fn delete_queue<const CAP: usize, const MSG_SIZE: usize>(&mut self, queue: &mut MessageQueue<CAP, MSG_SIZE>) {
        let guard = crate::arch::CriticalGuard::<A>::enter();
        let waiters = queue.drain_all_waiters(&mut self.threads);
        let ids = self.drain_wait_ids(waiters);
        drop(guard);
        for id in ids {
            self.wake_ipc_deleted(id);
        }
    }
}

pub mod global {
    //! Global kernel singleton, mirroring the `spin::Mutex<Option<T>>`
    //! pattern used throughout this codebase for shared mutable state that
    //! cannot use `lazy_static` in a `no_std` context without an allocator.

    use super::Kernel;
    use crate::arch::Arch;
    use spin::Mutex;

    pub static KERNEL: Mutex<Option<KernelSlot>> = Mutex::new(None);

    /// Type-erased slot; concrete `Arch` is selected by the embedder at
    /// init time via [`init`].
    pub enum KernelSlot {
        #[cfg(feature = "arch-x86_64")]
        X86_64(Kernel<crate::arch::x86_64::X86_64>),
    }

    #[cfg(feature = "arch-x86_64")]
    pub fn init_x86_64() {
        let mut slot = KERNEL.lock();
        if slot.is_none() {
            *slot = Some(KernelSlot::X86_64(Kernel::new()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::semaphore::Semaphore;
    use crate::ipc::WaitOrder;

    /// Test-only `Arch`: critical sections are real-enough (they just
    /// track nesting via a bool), and the switch primitives are never
    /// exercised because tests drive scheduling decisions, not literal
    /// register-level switches.
    struct MockArch;
    impl Arch for MockArch {
        type Mask = bool;
        fn critical_enter() -> bool { true }
        fn critical_exit(_mask: bool) {}
        unsafe fn stack_init(_stack: &mut [usize], _entry: fn(usize), _arg: usize) -> usize { 0 }
        unsafe fn first_switch(_sp: usize) -> ! { unreachable!() }
        unsafe fn switch(_save_sp: *mut usize, _resume_sp: usize) {}
    }

    fn noop(_arg: usize) {}

    #[test]
    fn idle_thread_becomes_current_on_start() {
        let mut kernel: Kernel<MockArch> = Kernel::new();
        let idle = kernel.spawn_idle_thread(noop).unwrap();
        assert_eq!(kernel.current_thread(), Some(idle));
    }

    #[test]
    fn higher_priority_thread_preempts_idle() {
        let mut kernel: Kernel<MockArch> = Kernel::new();
        kernel.spawn_idle_thread(noop).unwrap();
        let worker = kernel.create_thread(1, 10, 64, noop, 0).unwrap();
        kernel.start_thread(worker).unwrap();
        assert_eq!(kernel.current_thread(), Some(worker));
    }

    #[test]
    fn tick_isr_wakes_sleeping_thread_at_deadline() {
        let mut kernel: Kernel<MockArch> = Kernel::new();
        let idle = kernel.spawn_idle_thread(noop).unwrap();
        let worker = kernel.create_thread(1, 10, 64, noop, 0).unwrap();
        kernel.start_thread(worker).unwrap();
        assert_eq!(kernel.current_thread(), Some(worker));

        kernel.sleep(5).unwrap();
        assert_eq!(kernel.current_thread(), Some(idle));

        for _ in 0..4 {
            kernel.tick_isr();
            assert_eq!(kernel.current_thread(), Some(idle));
        }
        kernel.tick_isr();
        assert_eq!(kernel.current_thread(), Some(worker));
    }

    #[test]
    fn terminate_self_switches_to_next_ready_thread() {
        let mut kernel: Kernel<MockArch> = Kernel::new();
        let idle = kernel.spawn_idle_thread(noop).unwrap();
        let worker = kernel.create_thread(1, 10, 64, noop, 0).unwrap();
        kernel.start_thread(worker).unwrap();
        kernel.terminate_thread(worker).unwrap();
        assert_eq!(kernel.current_thread(), Some(idle));
        kernel.reap();
    }

    #[test]
    fn block_on_semaphore_times_out_when_never_signaled() {
        let mut kernel: Kernel<MockArch> = Kernel::new();
        let idle = kernel.spawn_idle_thread(noop).unwrap();
        let worker = kernel.create_thread(1, 10, 64, noop, 0).unwrap();
        kernel.start_thread(worker).unwrap();
        assert_eq!(kernel.current_thread(), Some(worker));

        let mut sem = Semaphore::new(0, 1, WaitOrder::Fifo).unwrap();
        // count is zero: the first call enqueues worker and switches to idle.
        assert_eq!(kernel.block_on(&mut sem, 3).unwrap_err(), KernelError::Busy);
        assert_eq!(kernel.current_thread(), Some(idle));

        // nothing signals it; the timeout fires on the third tick and
        // worker outranks idle, so it becomes current again.
        kernel.tick_isr();
        assert_eq!(kernel.current_thread(), Some(idle));
        kernel.tick_isr();
        assert_eq!(kernel.current_thread(), Some(idle));
        kernel.tick_isr();
        assert_eq!(kernel.current_thread(), Some(worker));

        // worker's retry call discovers the timeout and unlinks itself from
        // the semaphore's wait list instead of retrying try_now.
        assert_eq!(kernel.block_on(&mut sem, 3).unwrap_err(), KernelError::Timeout);
        assert!(sem.wait_list_mut().is_empty());
    }

    #[test]
    fn block_on_semaphore_succeeds_on_retry_after_direct_signal_handoff() {
        let mut kernel: Kernel<MockArch> = Kernel::new();
        kernel.spawn_idle_thread(noop).unwrap();
        let worker = kernel.create_thread(1, 10, 64, noop, 0).unwrap();
        kernel.start_thread(worker).unwrap();

        let mut sem = Semaphore::new(0, 1, WaitOrder::Fifo).unwrap();
        assert_eq!(kernel.block_on(&mut sem, WAIT_FOREVER).unwrap_err(), KernelError::Busy);

        // signal_semaphore hands the unit straight to worker and wakes it.
        kernel.signal_semaphore(&mut sem).unwrap();
        assert_eq!(kernel.current_thread(), Some(worker));

        // the retry call reports success without touching count again.
        assert_eq!(kernel.block_on(&mut sem, WAIT_FOREVER), Ok(()));
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn delete_semaphore_wakes_waiter_with_deleted_error() {
        let mut kernel: Kernel<MockArch> = Kernel::new();
        let idle = kernel.spawn_idle_thread(noop).unwrap();
        let worker = kernel.create_thread(1, 10, 64, noop, 0).unwrap();
        kernel.start_thread(worker).unwrap();

        let mut sem = Semaphore::new(0, 1, WaitOrder::Fifo).unwrap();
        assert_eq!(kernel.block_on(&mut sem, WAIT_FOREVER).unwrap_err(), KernelError::Busy);
        assert_eq!(kernel.current_thread(), Some(idle));

        kernel.delete_semaphore(&mut sem);
        assert_eq!(kernel.current_thread(), Some(worker));
        assert_eq!(kernel.block_on(&mut sem, WAIT_FOREVER).unwrap_err(), KernelError::Deleted);
    }

    #[test]
    fn block_on_mutex_applies_inheritance_then_succeeds_on_release() {
        use crate::ipc::mutex::Mutex;

        let mut kernel: Kernel<MockArch> = Kernel::new();
        kernel.spawn_idle_thread(noop).unwrap();
        let owner = kernel.create_thread(20, 10, 64, noop, 0).unwrap();
        kernel.start_thread(owner).unwrap();

        let mut mtx = Mutex::new(false, WaitOrder::Priority);
        assert_eq!(kernel.block_on(&mut mtx, WAIT_FOREVER), Ok(()));
        assert_eq!(mtx.owner(), Some(owner));

        // a higher-priority thread contends for it, becomes current, and
        // boosts owner's priority via before_block before blocking itself.
        let waiter = kernel.create_thread(2, 10, 64, noop, 0).unwrap();
        kernel.start_thread(waiter).unwrap();
        assert_eq!(kernel.current_thread(), Some(waiter));
        assert_eq!(kernel.block_on(&mut mtx, WAIT_FOREVER).unwrap_err(), KernelError::Busy);
        assert_eq!(kernel.current_thread(), Some(owner));

        // owner releases: waiter is handed ownership directly and its
        // retry call reports success without re-trying try_acquire.
        kernel.release_mutex(&mut mtx).unwrap();
        assert_eq!(kernel.current_thread(), Some(waiter));
        assert_eq!(kernel.block_on(&mut mtx, WAIT_FOREVER), Ok(()));
        assert_eq!(mtx.owner(), Some(waiter));
    }

    #[test]
    fn block_on_queue_recv_blocks_then_wakes_on_send() {
        use crate::ipc::queue::{QueueRecv, QueueSend};

        let mut kernel: Kernel<MockArch> = Kernel::new();
        let idle = kernel.spawn_idle_thread(noop).unwrap();
        let receiver = kernel.create_thread(1, 10, 64, noop, 0).unwrap();
        kernel.start_thread(receiver).unwrap();

        let mut queue: crate::ipc::queue::MessageQueue<1, 2> = crate::ipc::queue::MessageQueue::new(WaitOrder::Fifo);
        {
            let mut recv = QueueRecv::new(&mut queue);
            assert_eq!(kernel.block_on(&mut recv, WAIT_FOREVER).unwrap_err(), KernelError::Busy);
        }
        assert_eq!(kernel.current_thread(), Some(idle));

        // a sender's try_now succeeds immediately (the receiver is only
        // linked on the queue's wait list, not itself holding it) and
        // after_success wakes the blocked receiver.
        {
            let mut send = QueueSend::new(&mut queue, [7, 8]);
            assert_eq!(kernel.block_on(&mut send, WAIT_NONE), Ok(()));
        }
        assert_eq!(kernel.current_thread(), Some(receiver));

        let mut recv = QueueRecv::new(&mut queue);
        assert_eq!(kernel.block_on(&mut recv, WAIT_FOREVER), Ok(()));
        assert_eq!(recv.into_message(), [7, 8]);
    }
}
