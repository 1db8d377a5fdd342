/*
 * Counting semaphore
 *
 * A non-negative count plus a wait list. `signal` either wakes the next
 * waiter directly (handing it the unit of resource without ever
 * incrementing the count, so a signal can never be "lost" between
 * incrementing and a waiter noticing) or, with no one waiting, increments
 * the count up to `max`. Grounded in the reference semaphore create/send/recv
 * pair described alongside `t_ipc_suspend`.
 */

use crate::error::{KernelError, KernelResult};
use crate::ipc::{Blockable, WaitList, WaitOrder};
use crate::thread::{ThreadId, ThreadTable};

pub struct Semaphore {
    count: u32,
    max: u32,
    waiters: WaitList,
}

impl Semaphore {
    /// Creates a semaphore with `initial` units available, saturating at
    /// `max`. `Err(Invalid)` if `initial > max` or `max == 0`.
    pub fn new(initial: u32, max: u32, order: WaitOrder) -> KernelResult<Self> {
        if max == 0 || initial > max {
            return Err(KernelError::Invalid);
        }
        Ok(Semaphore { count: initial, max, waiters: WaitList::new(order) })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Releases one unit: hands it straight to the next waiter if any,
    /// otherwise increments the count. Returns the thread that was woken,
    /// if any, so the caller can make it ready and reschedule.
    pub fn signal(&mut self, table: &mut ThreadTable) -> KernelResult<Option<ThreadId>> {
        if let Some(woken) = self.waiters.pop_one(table) {
            return Ok(Some(woken));
        }
        if self.count >= self.max {
            return Err(KernelError::Invalid);
        }
        self.count += 1;
        Ok(None)
    }

    /// Detaches every waiter (for object deletion), returning them so the
    /// caller can wake each with `Err(Deleted)`.
    pub fn drain_waiters(&mut self, table: &mut ThreadTable) -> crate::list::ListHead<ThreadId> {
        self.waiters.drain_all(table)
    }
}

impl Blockable for Semaphore {
    fn try_now(&mut self, _table: &mut ThreadTable, _current: ThreadId) -> KernelResult<()> {
        if self.count > 0 {
            self.count -= 1;
            Ok(())
        } else {
            Err(KernelError::Busy)
        }
    }

    fn wait_list_mut(&mut self) -> &mut WaitList {
        &mut self.waiters
    }
}
