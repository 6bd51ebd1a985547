//! The global thread table and the free-stack table, plus lookups by tid
//! and (on bare metal) by frame pointer.
//!
//! Both tables are plain FIFO queues of `TmrPtr` guarded by their own
//! mutex, rather than the intrusively-linked lists the original design
//! used for O(1) removal; see the note on [`crate::tmr::Tmr`].
use alloc::collections::VecDeque;
use core::cell::UnsafeCell;

use crate::mutex::Mutex;
use crate::tmr::TmrPtr;

struct Table {
    mutex: Mutex,
    entries: UnsafeCell<VecDeque<TmrPtr>>,
}

unsafe impl Sync for Table {}

impl Table {
    const fn new() -> Self {
        Table {
            mutex: Mutex::new_valid(),
            entries: UnsafeCell::new(VecDeque::new()),
        }
    }

    fn push_back(&self, tmr: TmrPtr) {
        self.mutex.lock();
        unsafe { &mut *self.entries.get() }.push_back(tmr);
        self.mutex.unlock();
    }

    fn push_front(&self, tmr: TmrPtr) {
        self.mutex.lock();
        unsafe { &mut *self.entries.get() }.push_front(tmr);
        self.mutex.unlock();
    }

    fn remove(&self, tmr: TmrPtr) {
        self.mutex.lock();
        let entries = unsafe { &mut *self.entries.get() };
        if let Some(pos) = entries.iter().position(|e| *e == tmr) {
            entries.remove(pos);
        }
        self.mutex.unlock();
    }

    fn pop_front(&self) -> Option<TmrPtr> {
        self.mutex.lock();
        let popped = unsafe { &mut *self.entries.get() }.pop_front();
        self.mutex.unlock();
        popped
    }

    fn find(&self, pred: impl Fn(&TmrPtr) -> bool) -> Option<TmrPtr> {
        self.mutex.lock();
        let found = unsafe { &*self.entries.get() }.iter().find(|e| pred(e)).copied();
        self.mutex.unlock();
        found
    }
}

static THREAD_TABLE: Table = Table::new();
static FREE_STACK_TABLE: Table = Table::new();

/// Registers a freshly created or recycled thread. The root thread (the
/// one thr_init runs on) is inserted at the front so it is never the
/// target of a free-stack recycle, matching the original's guarantee that
/// it "can't be removed from g_thr_table".
pub fn register(tmr: TmrPtr, is_root: bool) {
    if is_root {
        THREAD_TABLE.push_front(tmr);
    } else {
        THREAD_TABLE.push_back(tmr);
    }
}

pub fn unregister(tmr: TmrPtr) {
    THREAD_TABLE.remove(tmr);
}

pub fn recycle_stack(tmr: TmrPtr) {
    FREE_STACK_TABLE.push_back(tmr);
}

pub fn take_free_stack() -> Option<TmrPtr> {
    FREE_STACK_TABLE.pop_front()
}

pub fn lookup_by_tid(tid: u64) -> Option<TmrPtr> {
    THREAD_TABLE.find(|tmr| unsafe { tmr.as_ref() }.tid == Some(tid))
}

/// Finds the TMR whose stack range contains `fp`. Used by the crash handler,
/// which runs on its own dedicated stack and so must locate the faulting
/// thread by the frame pointer the kernel handed it rather than by its own.
pub fn find_by_frame_pointer(fp: usize) -> Option<TmrPtr> {
    THREAD_TABLE.find(|tmr| unsafe { tmr.as_ref() }.contains_frame_pointer(fp))
}

/// Returns the TMR of the calling thread.
#[cfg(not(feature = "hosted-mock"))]
pub fn current() -> Option<TmrPtr> {
    find_by_frame_pointer(read_frame_pointer())
}

/// Host builds have no meaningful frame-pointer range to scan (each
/// simulated thread is a real OS thread with its own unrelated call
/// stack), so `current` falls back to the kernel-assigned tid, which the
/// mock backend assigns consistently per host thread.
#[cfg(feature = "hosted-mock")]
pub fn current() -> Option<TmrPtr> {
    lookup_by_tid(sys::gettid())
}

#[cfg(not(feature = "hosted-mock"))]
fn read_frame_pointer() -> usize {
    let rbp: usize;
    unsafe {
        core::arch::asm!("mov {}, rbp", out(reg) rbp);
    }
    rbp
}
