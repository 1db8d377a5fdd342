/*
 * Ready queue and priority scheduling
 *
 * One FIFO list per priority level plus a 32-bit bitmap with one bit per
 * level: bit `p` is set iff that level's list is non-empty. Picking the
 * next thread to run is therefore a single bit-scan to find the most
 * urgent non-empty level followed by a peek at that level's front, with no
 * need to walk every level. This mirrors the reference scheduler's
 * `get_highest_ready_priority` + `t_sched_switch` pair, built on
 * `__t_ffs`/`__t_fls` depending on priority convention; here the scan
 * direction is selected once via [`crate::config::HIGHER_PRIORITY_IS_LOWER_NUMBER`].
 *
 * A thread is "ready" exactly when it is linked into its priority's list
 * and the corresponding bitmap bit is set; both are always updated
 * together so the bitmap never drifts out of sync with list occupancy.
 */

use crate::config::PRIORITY_LEVELS;
use crate::list::ListHead;
use crate::thread::{ThreadId, ThreadState, ThreadTable};

pub struct Scheduler {
    ready: [ListHead<ThreadId>; PRIORITY_LEVELS as usize],
    bitmap: u32,
    current: Option<ThreadId>,
    /// Nesting depth of scheduler-wide suspension; while nonzero, `switch`
    /// is a no-op even if a higher-priority thread becomes ready. Mirrors
    /// `t_sched_suspend`/`t_sched_resume`.
    suspend_depth: u32,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            ready: core::array::from_fn(|_| ListHead::new()),
            bitmap: 0,
            current: None,
            suspend_depth: 0,
        }
    }

    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    pub fn is_suspended(&self) -> bool {
        self.suspend_depth > 0
    }

    pub fn suspend(&mut self) {
        self.suspend_depth += 1;
    }

    pub fn resume(&mut self) {
        self.suspend_depth = self.suspend_depth.saturating_sub(1);
    }

    /// Links `id` into its priority's ready list and marks the level
    /// occupied in the bitmap. Caller must have already set the thread's
    /// state to `Ready`.
    pub fn insert_ready(&mut self, table: &mut ThreadTable, id: ThreadId) {
        let Ok(priority) = table.get(id).map(|t| t.priority) else {
            crate::kassert!(false, "insert_ready: invalid thread");
            return;
        };
        self.ready[priority as usize].push_back(table, id);
        self.bitmap |= 1 << priority;
    }

    /// Unlinks `id` from its priority's ready list, clearing the bitmap bit
    /// if that was the last thread at that level.
    pub fn remove_ready(&mut self, table: &mut ThreadTable, id: ThreadId, priority: u8) {
        self.ready[priority as usize].remove(table, id);
        if self.ready[priority as usize].is_empty() {
            self.bitmap &= !(1 << priority);
        }
    }

    /// Highest-urgency priority level with at least one ready thread.
    pub fn highest_ready_priority(&self) -> Option<u8> {
        if self.bitmap == 0 {
            return None;
        }
        let level = if crate::config::HIGHER_PRIORITY_IS_LOWER_NUMBER {
            self.bitmap.trailing_zeros()
        } else {
            31 - self.bitmap.leading_zeros()
        };
        Some(level as u8)
    }

    /// Front of the given priority level's ready list, without removing it.
    pub fn peek_ready(&self, priority: u8) -> Option<ThreadId> {
        self.ready[priority as usize].front()
    }

    /// Decides who should be running next. Returns `None` if scheduling is
    /// currently suspended or no thread is ready (the idle thread is always
    /// expected to be ready and so this should only be `None` before the
    /// idle thread has started).
    pub fn pick_next(&self) -> Option<ThreadId> {
        if self.is_suspended() {
            return self.current;
        }
        let priority = self.highest_ready_priority()?;
        self.peek_ready(priority)
    }

    /// Records `id` as the running thread without touching any list; the
    /// caller is responsible for having already removed it from the ready
    /// list (a running thread is not itself linked into the ready list).
    pub fn set_current(&mut self, id: Option<ThreadId>) {
        self.current = id;
    }

    /// Round-robins the front of `priority`'s ready list to its back. Used
    /// when the running thread's time slice is exhausted; has no effect if
    /// it is the only ready thread at that level.
    pub fn rotate(&mut self, table: &mut ThreadTable, priority: u8) {
        self.ready[priority as usize].rotate_front_to_back(table);
    }

    pub fn is_ready_empty(&self, priority: u8) -> bool {
        self.ready[priority as usize].is_empty()
    }
}

/// One step of the scheduling decision: whether a context switch is needed
/// and, if so, to which thread. Kept separate from actually performing the
/// switch so the decision can be tested without an `Arch` implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No switch needed; the current thread keeps running.
    Continue,
    /// Switch away from `from` (if any, e.g. it just terminated) to `to`.
    SwitchTo { from: Option<ThreadId>, to: ThreadId },
    /// Nothing is ready to run at all (only possible before the idle
    /// thread has started).
    Idle,
}

impl Scheduler {
    /// Computes what should happen next given the current ready set, without
    /// mutating any state. `force` requests a switch even to an
    /// equal-or-lower-priority thread (used after the running thread
    /// blocks or exits, when it is no longer a candidate at all).
    pub fn decide(&self, _table: &ThreadTable, force: bool) -> Decision {
        if self.is_suspended() && !force {
            return Decision::Continue;
        }
        let Some(priority) = self.highest_ready_priority() else {
            return Decision::Idle;
        };
        let Some(next) = self.peek_ready(priority) else {
            return Decision::Idle;
        };
        match self.current {
            Some(cur) if cur == next && !force => Decision::Continue,
            cur => Decision::SwitchTo { from: cur, to: next },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_thread(table: &mut ThreadTable, priority: u8) -> ThreadId {
        let id = table.create(priority, 10, 64, |_| {}, 0).unwrap();
        table.get_mut(id).unwrap().state = ThreadState::Ready;
        id
    }

    #[test]
    fn empty_scheduler_has_no_highest_priority() {
        let sched = Scheduler::new();
        assert_eq!(sched.highest_ready_priority(), None);
    }

    #[test]
    fn higher_urgency_thread_is_picked_first() {
        let mut table = ThreadTable::new();
        let mut sched = Scheduler::new();
        let low = ready_thread(&mut table, 20);
        let high = ready_thread(&mut table, 2);
        sched.insert_ready(&mut table, low);
        sched.insert_ready(&mut table, high);
        assert_eq!(sched.pick_next(), Some(high));
    }

    #[test]
    fn bitmap_bit_clears_when_level_empties() {
        let mut table = ThreadTable::new();
        let mut sched = Scheduler::new();
        let id = ready_thread(&mut table, 5);
        sched.insert_ready(&mut table, id);
        assert_eq!(sched.highest_ready_priority(), Some(5));
        sched.remove_ready(&mut table, id, 5);
        assert_eq!(sched.highest_ready_priority(), None);
    }

    #[test]
    fn rotate_round_robins_same_priority_threads() {
        let mut table = ThreadTable::new();
        let mut sched = Scheduler::new();
        let a = ready_thread(&mut table, 3);
        let b = ready_thread(&mut table, 3);
        sched.insert_ready(&mut table, a);
        sched.insert_ready(&mut table, b);
        assert_eq!(sched.pick_next(), Some(a));
        sched.rotate(&mut table, 3);
        assert_eq!(sched.pick_next(), Some(b));
    }

    #[test]
    fn suspended_scheduler_keeps_current_thread() {
        let mut table = ThreadTable::new();
        let mut sched = Scheduler::new();
        let a = ready_thread(&mut table, 3);
        sched.insert_ready(&mut table, a);
        sched.set_current(Some(a));
        sched.remove_ready(&mut table, a, 3);
        let b = ready_thread(&mut table, 1);
        sched.insert_ready(&mut table, b);
        sched.suspend();
        assert_eq!(sched.decide(&table, false), Decision::Continue);
        sched.resume();
        assert_eq!(sched.decide(&table, false), Decision::SwitchTo { from: Some(a), to: b });
    }

    #[test]
    fn forced_decision_switches_away_from_current_even_if_still_ready() {
        let mut table = ThreadTable::new();
        let mut sched = Scheduler::new();
        let a = ready_thread(&mut table, 3);
        sched.insert_ready(&mut table, a);
        sched.set_current(Some(a));
        let decision = sched.decide(&table, true);
        assert_eq!(decision, Decision::SwitchTo { from: Some(a), to: a });
    }
}
