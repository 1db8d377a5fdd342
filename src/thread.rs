/*
 * Thread table and lifecycle
 *
 * Threads live in a fixed-capacity arena (`MAX_THREADS` slots, see
 * [`crate::config`]); a thread "handle" is just the index of its slot plus
 * a generation counter so a stale `ThreadId` from a deleted-and-reused slot
 * is rejected rather than silently aliasing a new thread. Free slots are
 * tracked with a `heapless::Vec` acting as a stack-based free list, mirroring
 * the reference allocator's "pull a control block, push it back on delete"
 * pattern without needing a heap.
 *
 * Lifecycle: INIT -> READY -> RUNNING -> SUSPENDED -> TERMINATED -> DELETED,
 * with RUNNING threads also able to go straight to SUSPENDED (sleep/block)
 * and back to READY. DELETED threads may be restarted, reusing the same
 * slot and generation-bumping it.
 */

use crate::config::{DEFAULT_TIME_SLICE, MAX_THREADS, NO_SAVED_PRIORITY, THREAD_STACK_WORDS};
use crate::error::{KernelError, KernelResult};
use crate::list::{LinkedArena, ListLink};

/// Stable handle to a thread control block: slot index plus a generation
/// counter that is bumped every time the slot is reused, so a `ThreadId`
/// captured before a delete/restart cycle cannot alias the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId {
    index: u16,
    generation: u16,
}

impl ThreadId {
    fn new(index: usize, generation: u16) -> Self {
        ThreadId { index: index as u16, generation }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Init,
    Ready,
    Running,
    /// Blocked waiting on an IPC object, a sleep deadline, or both.
    Suspended,
    /// Exited or deleted by another thread; awaiting reclamation by the
    /// idle-thread reaper.
    Terminated,
    /// Reclaimed; slot may be reused by `restart` or by a fresh `create`.
    Deleted,
}

/// Why a thread is currently suspended. Drives what the reaper and the
/// wake path need to clean up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    None,
    Sleeping,
    /// Blocked on an IPC object's wait list, pending either a direct
    /// hand-off or a timeout.
    Ipc,
    /// Woken by a direct hand-off (e.g. `Semaphore::signal` popping this
    /// thread straight off the wait list): the operation already
    /// completed on its behalf, so its next `block_on` call should not
    /// retry `try_now`, only clear this marker and return success.
    IpcGranted,
    /// Woken because the object it was waiting on was deleted out from
    /// under it: its next `block_on` call reports `Err(Deleted)`.
    IpcDeleted,
}

pub struct Thread {
    generation: u16,
    occupied: bool,
    pub state: ThreadState,
    /// Current effective priority; may be temporarily boosted by priority
    /// inheritance.
    pub priority: u8,
    /// Priority the thread was created or last explicitly set to, restored
    /// when an inheritance boost is released.
    pub base_priority: u8,
    pub time_slice: u32,
    pub remaining_slice: u32,
    pub wait_reason: WaitReason,
    /// Absolute tick at which a pending sleep/timeout should fire; meaningful
    /// only while `wait_reason != None`.
    pub deadline: u32,
    /// Membership link for the ready list.
    pub(crate) sched_link: ListLink<ThreadId>,
    /// Membership link for an IPC object's wait list. Kept separate from
    /// `sched_link` so a thread can be made `Ready` again (linked via
    /// `sched_link`) before it has been unlinked from the wait list it
    /// timed out on - the wait list's owner is not reachable from the tick
    /// interrupt, so that unlink happens lazily the next time the owning
    /// object is touched.
    pub(crate) wait_link: ListLink<ThreadId>,
    /// Membership link for the timer engine's current/overflow lists.
    pub(crate) timer_link: ListLink<ThreadId>,
    entry: Option<fn(usize)>,
    arg: usize,
    /// Inline stack storage, sized to the arena's fixed per-slot capacity;
    /// only the leading `stack_words` of it belong to this thread.
    stack: [usize; THREAD_STACK_WORDS],
    /// Number of words of `stack` actually reserved for this thread, set at
    /// `create`/`restart` time and validated against `THREAD_STACK_WORDS`.
    stack_words: usize,
    /// Saved stack pointer: the initial value built by the architecture's
    /// stack-init primitive at creation, and thereafter the value left by
    /// the last context switch away from this thread.
    pub(crate) sp: usize,
}

impl Default for Thread {
    fn default() -> Self {
        Thread {
            generation: 0,
            occupied: false,
            state: ThreadState::Deleted,
            priority: NO_SAVED_PRIORITY,
            base_priority: NO_SAVED_PRIORITY,
            time_slice: DEFAULT_TIME_SLICE,
            remaining_slice: DEFAULT_TIME_SLICE,
            wait_reason: WaitReason::None,
            deadline: 0,
            sched_link: ListLink::new(),
            wait_link: ListLink::new(),
            timer_link: ListLink::new(),
            entry: None,
            arg: 0,
            stack: [0; THREAD_STACK_WORDS],
            stack_words: 0,
            sp: 0,
        }
    }
}

/// Fixed-capacity thread arena. Owns every `Thread` control block and the
/// free-slot stack; also doubles as the [`LinkedArena`] backing for the
/// ready list, since the ready list only ever links `ThreadId`s that live
/// here. Wait lists and timer lists use the separate [`ThreadWaitArena`]
/// and [`ThreadTimerArena`] views below.
pub struct ThreadTable {
    slots: [Thread; MAX_THREADS],
    free: heapless::Vec<u16, MAX_THREADS>,
}

impl ThreadTable {
    pub fn new() -> Self {
        let mut free = heapless::Vec::new();
        // Reverse order so slot 0 (conventionally the idle thread) is
        // handed out first.
        for i in (0..MAX_THREADS as u16).rev() {
            let _ = free.push(i);
        }
        ThreadTable {
            slots: core::array::from_fn(|_| Thread::default()),
            free,
        }
    }

    /// Allocates a slot and initializes it to `Init` state. Returns
    /// `Err(Invalid)` if `priority` is out of range, `time_slice` is zero,
    /// or `stack_words` is zero or exceeds `THREAD_STACK_WORDS`;
    /// `Err(Busy)` if the table is full. Does not build the initial stacked
    /// context - the arena has no `Arch` to call `stack_init` with, so the
    /// caller is expected to do that and then call `set_sp`.
    pub fn create(
        &mut self,
        priority: u8,
        time_slice: u32,
        stack_words: usize,
        entry: fn(usize),
        arg: usize,
    ) -> KernelResult<ThreadId> {
        if priority as u32 >= crate::config::PRIORITY_LEVELS as u32 {
            return Err(KernelError::Invalid);
        }
        if time_slice == 0 {
            return Err(KernelError::Invalid);
        }
        if stack_words == 0 || stack_words > THREAD_STACK_WORDS {
            return Err(KernelError::Invalid);
        }
        let index = self.free.pop().ok_or(KernelError::Busy)? as usize;
        let slot = &mut self.slots[index];
        let generation = slot.generation.wrapping_add(1);
        *slot = Thread {
            generation,
            occupied: true,
            state: ThreadState::Init,
            priority,
            base_priority: priority,
            time_slice,
            remaining_slice: time_slice,
            wait_reason: WaitReason::None,
            deadline: 0,
            sched_link: ListLink::new(),
            wait_link: ListLink::new(),
            timer_link: ListLink::new(),
            entry: Some(entry),
            arg,
            stack: [0; THREAD_STACK_WORDS],
            stack_words,
            sp: 0,
        };
        Ok(ThreadId::new(index, generation))
    }

    /// Looks up a thread, rejecting ids whose generation is stale (a slot
    /// that has since been deleted and reused).
    pub fn get(&self, id: ThreadId) -> KernelResult<&Thread> {
        let slot = self.slots.get(id.index as usize).ok_or(KernelError::Invalid)?;
        if !slot.occupied || slot.generation != id.generation {
            return Err(KernelError::Deleted);
        }
        Ok(slot)
    }

    pub fn get_mut(&mut self, id: ThreadId) -> KernelResult<&mut Thread> {
        let slot = self.slots.get_mut(id.index as usize).ok_or(KernelError::Invalid)?;
        if !slot.occupied || slot.generation != id.generation {
            return Err(KernelError::Deleted);
        }
        Ok(slot)
    }

    pub fn entry_of(&self, id: ThreadId) -> Option<(fn(usize), usize)> {
        self.slots.get(id.index as usize).and_then(|t| t.entry.map(|e| (e, t.arg)))
    }

    /// Marks a `Terminated` thread `Deleted` and frees its slot for reuse.
    /// Called only by the reaper once the thread is off every list.
    pub fn reclaim(&mut self, id: ThreadId) -> KernelResult<()> {
        let slot = self.get_mut(id)?;
        if slot.state != ThreadState::Terminated {
            return Err(KernelError::Invalid);
        }
        slot.state = ThreadState::Deleted;
        slot.occupied = false;
        // Keep generation; next create() at this index bumps it again so a
        // stale id from before this reclaim still fails the check above
        // even if immediately reused.
        let _ = self.free.push(id.index);
        Ok(())
    }

    /// Reinitializes a `Deleted` thread's slot in place, keeping the same
    /// index but bumping the generation, and returns it to `Init`.
    pub fn restart(
        &mut self,
        id: ThreadId,
        priority: u8,
        time_slice: u32,
        stack_words: usize,
        entry: fn(usize),
        arg: usize,
    ) -> KernelResult<ThreadId> {
        let slot = self.slots.get_mut(id.index as usize).ok_or(KernelError::Invalid)?;
        if slot.occupied || slot.state != ThreadState::Deleted {
            return Err(KernelError::Invalid);
        }
        if priority as u32 >= crate::config::PRIORITY_LEVELS as u32 || time_slice == 0 {
            return Err(KernelError::Invalid);
        }
        if stack_words == 0 || stack_words > THREAD_STACK_WORDS {
            return Err(KernelError::Invalid);
        }
        // Remove from the free list: restart reuses the slot directly
        // rather than going through the allocator stack.
        if let Some(pos) = self.free.iter().position(|&i| i == id.index) {
            self.free.swap_remove(pos);
        }
        let generation = slot.generation.wrapping_add(1);
        *slot = Thread {
            generation,
            occupied: true,
            state: ThreadState::Init,
            priority,
            base_priority: priority,
            time_slice,
            remaining_slice: time_slice,
            wait_reason: WaitReason::None,
            deadline: 0,
            sched_link: ListLink::new(),
            wait_link: ListLink::new(),
            timer_link: ListLink::new(),
            entry: Some(entry),
            arg,
            stack: [0; THREAD_STACK_WORDS],
            stack_words,
            sp: 0,
        };
        Ok(ThreadId::new(id.index, generation))
    }

    pub fn iter_occupied(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.slots.iter().enumerate().filter(|(_, t)| t.occupied).map(|(i, t)| ThreadId::new(i, t.generation))
    }

    /// Mutable view of the words actually reserved for `id`'s stack, for the
    /// caller to pass to an architecture's `stack_init`.
    pub fn stack_slice_mut(&mut self, id: ThreadId) -> KernelResult<&mut [usize]> {
        let slot = self.get_mut(id)?;
        let words = slot.stack_words;
        Ok(&mut slot.stack[..words])
    }

    /// Records the stack pointer produced by `stack_init` (or left behind by
    /// the last context switch away from this thread).
    pub fn set_sp(&mut self, id: ThreadId, sp: usize) -> KernelResult<()> {
        self.get_mut(id)?.sp = sp;
        Ok(())
    }
}

/// Backing for the ready list: the scheduler links threads through
/// `sched_link`.
impl LinkedArena<ThreadId> for ThreadTable {
    fn link(&self, key: ThreadId) -> ListLink<ThreadId> {
        self.slots[key.index as usize].sched_link
    }
    fn set_link(&mut self, key: ThreadId, link: ListLink<ThreadId>) {
        self.slots[key.index as usize].sched_link = link;
    }
}

/// Separate arena view for the timer engine's current/overflow lists, which
/// link threads through `timer_link` instead of `sched_link` since a
/// sleeping thread is simultaneously off the ready list and on a timer
/// list.
pub struct ThreadTimerArena<'a>(pub &'a mut ThreadTable);

impl<'a> LinkedArena<ThreadId> for ThreadTimerArena<'a> {
    fn link(&self, key: ThreadId) -> ListLink<ThreadId> {
        self.0.slots[key.index as usize].timer_link
    }
    fn set_link(&mut self, key: ThreadId, link: ListLink<ThreadId>) {
        self.0.slots[key.index as usize].timer_link = link;
    }
}

/// Separate arena view for IPC wait lists, linking threads through
/// `wait_link` instead of `sched_link`. Kept distinct so that a thread whose
/// wait has timed out can be made `Ready` (linked into the ready list via
/// `sched_link`) while it is still linked on the IPC object's wait list
/// (via `wait_link`) - the tick interrupt that notices the timeout has no
/// way to reach the owning object to unlink it there and then, so that
/// unlink is deferred to the next time the object itself is touched.
pub struct ThreadWaitArena<'a>(pub &'a mut ThreadTable);

impl<'a> LinkedArena<ThreadId> for ThreadWaitArena<'a> {
    fn link(&self, key: ThreadId) -> ListLink<ThreadId> {
        self.0.slots[key.index as usize].wait_link
    }
    fn set_link(&mut self, key: ThreadId, link: ListLink<ThreadId>) {
        self.0.slots[key.index as usize].wait_link = link;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_arg: usize) {}

    #[test]
    fn create_assigns_init_state_and_priority() {
        let mut table = ThreadTable::new();
        let id = table.create(5, 10, 64, noop, 0).unwrap();
        let t = table.get(id).unwrap();
        assert_eq!(t.state, ThreadState::Init);
        assert_eq!(t.priority, 5);
        assert_eq!(t.base_priority, 5);
    }

    #[test]
    fn create_rejects_out_of_range_priority() {
        let mut table = ThreadTable::new();
        let err = table.create(crate::config::PRIORITY_LEVELS, 10, 64, noop, 0).unwrap_err();
        assert_eq!(err, KernelError::Invalid);
    }

    #[test]
    fn create_rejects_zero_time_slice() {
        let mut table = ThreadTable::new();
        let err = table.create(1, 0, 64, noop, 0).unwrap_err();
        assert_eq!(err, KernelError::Invalid);
    }

    #[test]
    fn stale_id_after_reclaim_is_rejected() {
        let mut table = ThreadTable::new();
        let id = table.create(1, 10, 64, noop, 0).unwrap();
        table.get_mut(id).unwrap().state = ThreadState::Terminated;
        table.reclaim(id).unwrap();
        assert_eq!(table.get(id).unwrap_err(), KernelError::Deleted);
    }

    #[test]
    fn restart_bumps_generation_so_old_id_stays_invalid() {
        let mut table = ThreadTable::new();
        let old_id = table.create(1, 10, 64, noop, 0).unwrap();
        table.get_mut(old_id).unwrap().state = ThreadState::Terminated;
        table.reclaim(old_id).unwrap();
        let new_id = table.restart(old_id, 2, 20, 64, noop, 0).unwrap();
        assert_ne!(old_id, new_id);
        assert_eq!(table.get(old_id).unwrap_err(), KernelError::Deleted);
        assert_eq!(table.get(new_id).unwrap().priority, 2);
    }

    #[test]
    fn table_exhaustion_returns_busy() {
        let mut table = ThreadTable::new();
        for _ in 0..MAX_THREADS {
            table.create(1, 10, 64, noop, 0).unwrap();
        }
        assert_eq!(table.create(1, 10, 64, noop, 0).unwrap_err(), KernelError::Busy);
    }

    #[test]
    fn create_rejects_oversized_stack() {
        let mut table = ThreadTable::new();
        let err = table.create(1, 10, THREAD_STACK_WORDS + 1, noop, 0).unwrap_err();
        assert_eq!(err, KernelError::Invalid);
    }

    #[test]
    fn create_rejects_zero_stack() {
        let mut table = ThreadTable::new();
        let err = table.create(1, 10, 0, noop, 0).unwrap_err();
        assert_eq!(err, KernelError::Invalid);
    }
}
