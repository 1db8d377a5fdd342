/*
 * Software timer engine
 *
 * Timers are kept on two lists ordered by ascending absolute expiry tick:
 * `current` holds timers expiring before the tick counter next wraps,
 * `overflow` holds timers whose expiry tick is numerically less than `now`
 * because it lies beyond a wrap. On every wrap the two lists are swapped
 * (what was `overflow` becomes the new `current`), which is how the
 * reference engine (`t_tick_increase`/`t_timer_start`) avoids ever doing
 * modular comparisons between timers on the same list.
 *
 * `check` scans the front of `current` and detaches every timer whose
 * expiry has been reached into a local list, then fires callbacks for that
 * list outside of the caller's critical section. The reference engine
 * detaches by repeatedly calling its list-insert-after primitive on a
 * local sentinel, which (insert-after always targeting the sentinel head)
 * actually reverses relative order - its own inline comment claims FIFO but
 * the code produces LIFO dispatch. Ascending-expiry dispatch order is an
 * explicit, load-bearing guarantee here, so detachment instead appends to
 * the tail of the expired list, preserving true ascending-expiry order.
 */

use crate::list::ListHead;
use crate::tick::tick_diff;
use crate::thread::{ThreadId, ThreadTimerArena};

/// One-shot or would-be-periodic deadline entry. The kernel only uses
/// timers for sleep/timeout; each entry names the thread to wake and the
/// absolute tick at which it should fire.
pub struct TimerEngine {
    current: ListHead<ThreadId>,
    overflow: ListHead<ThreadId>,
}

impl TimerEngine {
    pub const fn new() -> Self {
        TimerEngine {
            current: ListHead::new(),
            overflow: ListHead::new(),
        }
    }

    /// Arms a timer for `id`, waking it at `deadline` (an absolute tick
    /// value, already computed by the caller as `now + timeout`). Threads
    /// are kept in ascending-expiry order within whichever list they land
    /// on, so `check` never has to sort.
    pub fn arm(&mut self, arena: &mut ThreadTimerArena, id: ThreadId, now: u32, deadline: u32) {
        let list = if deadline >= now {
            &mut self.current
        } else {
            // expiry tick is numerically behind `now`: it only makes sense
            // if the counter will wrap before reaching it again.
            &mut self.overflow
        };
        list.insert_ordered_by(
            arena,
            id,
            |t| arena_deadline(arena, t),
            |a, b| a < b,
        );
    }

    /// Disarms `id`'s pending timer, if any. No-op if it already fired or
    /// was never armed.
    pub fn disarm(&mut self, arena: &mut ThreadTimerArena, id: ThreadId) {
        self.current.remove(arena, id);
        self.overflow.remove(arena, id);
    }

    /// Called once per tick, after the tick counter has already been
    /// advanced. On wraparound, `current` and `overflow` trade places so
    /// timers that were waiting out a wrap become immediately comparable
    /// again. Returns the list of threads whose deadline has now been
    /// reached, in ascending-expiry order; the caller is expected to wake
    /// each one outside of whatever critical section protected this call.
    pub fn on_tick(&mut self, arena: &mut ThreadTimerArena, wrapped: bool, now: u32) -> ListHead<ThreadId> {
        if wrapped {
            core::mem::swap(&mut self.current, &mut self.overflow);
        }
        self.check(arena, now)
    }

    fn check(&mut self, arena: &mut ThreadTimerArena, now: u32) -> ListHead<ThreadId> {
        let mut expired = ListHead::new();
        loop {
            let Some(front) = self.current.front() else { break };
            let deadline = arena_deadline(arena, front);
            if tick_diff(now, deadline) > u32::MAX / 2 {
                // deadline is still ahead of now; list is expiry-ordered so
                // nothing further down is due either.
                break;
            }
            self.current.remove(arena, front);
            expired.push_back(arena, front);
        }
        expired
    }
}

fn arena_deadline(arena: &ThreadTimerArena, id: ThreadId) -> u32 {
    arena.0.get(id).map(|t| t.deadline).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadTable;

    fn make_thread(table: &mut ThreadTable, deadline: u32) -> ThreadId {
        let id = table.create(1, 10, 64, |_| {}, 0).unwrap();
        table.get_mut(id).unwrap().deadline = deadline;
        id
    }

    #[test]
    fn timers_fire_in_ascending_expiry_order_regardless_of_arm_order() {
        let mut table = ThreadTable::new();
        let mut engine = TimerEngine::new();
        let late = make_thread(&mut table, 300);
        let early = make_thread(&mut table, 100);
        let mid = make_thread(&mut table, 200);

        let mut arena = ThreadTimerArena(&mut table);
        engine.arm(&mut arena, late, 0, 300);
        engine.arm(&mut arena, early, 0, 100);
        engine.arm(&mut arena, mid, 0, 200);

        let expired = engine.on_tick(&mut arena, false, 350);
        let mut order = Vec::new();
        let mut cur = expired.front();
        while let Some(id) = cur {
            order.push(id);
            let next = crate::list::LinkedArena::link(&arena, id).next();
            cur = if next == expired.front() { None } else { next };
        }
        assert_eq!(order, vec![early, mid, late]);
    }

    #[test]
    fn not_yet_due_timers_stay_armed() {
        let mut table = ThreadTable::new();
        let mut engine = TimerEngine::new();
        let id = make_thread(&mut table, 500);
        let mut arena = ThreadTimerArena(&mut table);
        engine.arm(&mut arena, id, 0, 500);
        let expired = engine.on_tick(&mut arena, false, 100);
        assert!(expired.is_empty());
    }

    #[test]
    fn disarm_removes_before_expiry() {
        let mut table = ThreadTable::new();
        let mut engine = TimerEngine::new();
        let id = make_thread(&mut table, 50);
        let mut arena = ThreadTimerArena(&mut table);
        engine.arm(&mut arena, id, 0, 50);
        engine.disarm(&mut arena, id);
        let expired = engine.on_tick(&mut arena, false, 100);
        assert!(expired.is_empty());
    }

    #[test]
    fn wrap_swaps_overflow_timers_into_current() {
        let mut table = ThreadTable::new();
        let mut engine = TimerEngine::new();
        // armed when now is near the top of the range, deadline wrapped
        // past zero: numerically "behind" now, so it lands on overflow.
        let id = make_thread(&mut table, 50);
        let mut arena = ThreadTimerArena(&mut table);
        engine.arm(&mut arena, id, u32::MAX - 10, 50);
        // before the wrap, nothing should fire even though 50 < now.
        let expired = engine.check_for_test(&mut arena, u32::MAX - 10);
        assert!(expired.is_empty());
        // the tick ISR detects the wrap and swaps the lists before checking.
        let expired = engine.on_tick(&mut arena, true, 60);
        assert!(!expired.is_empty());
    }
}

#[cfg(test)]
impl TimerEngine {
    fn check_for_test(&mut self, arena: &mut ThreadTimerArena, now: u32) -> ListHead<ThreadId> {
        self.check(arena, now)
    }
}
