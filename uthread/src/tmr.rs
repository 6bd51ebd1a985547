//! The thread metadata record (TMR): the fixed-layout record this library
//! anchors at the high end of every thread's stack.
use core::ptr::NonNull;

use crate::cond::CondVar;
use crate::mutex::Mutex;

/// Where a thread is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Unstarted,
    Runnable,
    NotRunnable,
    Waiting,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinFlag {
    NotJoining,
    Joining,
}

/// Which mode a thread is queued on an rwlock's wait queue for. Only
/// meaningful while the owning TMR is linked into that queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwRequest {
    Invalid,
    Read,
    Write,
}

/// The initial work handed to a thread at `thr_create` time.
pub type ThreadFunc = unsafe extern "C" fn(arg: *mut u8) -> *mut u8;

/// One record per live or recycled thread, stored at the high-address end
/// of that thread's stack.
///
/// The four intrusive-linkage fields the original design calls for (thread
/// table, free-stack table, condvar wait queue, rwlock wait queue) are
/// realized here as plain queue membership: every queue that can hold a TMR
/// stores a `NonNull<Tmr>`, and the TMR itself is never duplicated or
/// dropped while any queue could still reference it. This drops the
/// intrusive pointer bookkeeping the original needed for O(1) removal, at
/// the cost of an O(live waiters) scan to remove a specific entry. Thread
/// counts in this library are small enough that the scan cost is noise next
/// to the syscalls each wait/wake already pays.
pub struct Tmr {
    /// Serializes access to every field below.
    pub meta_mutex: Mutex,
    /// Signaled by thr_exit (or the crash handler); waited on by thr_join
    /// and by this thread's own start trampoline.
    pub meta_cv: CondVar,
    pub state: ThreadState,
    pub is_root: bool,
    /// `None` until the parent assigns a kernel tid (the `UNSIGNED` sentinel).
    pub tid: Option<u64>,
    pub func: Option<ThreadFunc>,
    pub arg: *mut u8,
    pub join_flag: JoinFlag,
    pub exit_status: *mut u8,
    pub rw_request: RwRequest,
    pub stack_high: usize,
    /// Fixed for the lifetime of the slot, except for the root thread's TMR:
    /// the autostack handler lowers it as the root stack grows.
    pub stack_low: usize,
}

// Tmr is only ever touched through `meta_mutex`, or read-only for the
// stack-bounds fields which are fixed for the lifetime of the slot.
unsafe impl Send for Tmr {}
unsafe impl Sync for Tmr {}

impl Tmr {
    /// Re-initializes a (possibly reused) TMR slot in place.
    ///
    /// On first use of a slot, `meta_mutex`/`meta_cv` are freshly
    /// constructed by the caller; on reuse they are left untouched so any
    /// thread still blocked on this TMR's condition variable (there should
    /// be none, by the time a slot is freed) is not disturbed.
    pub fn reinit(&mut self, func: ThreadFunc, arg: *mut u8, stack_high: usize, stack_low: usize) {
        self.state = ThreadState::Unstarted;
        self.is_root = false;
        self.tid = None;
        self.func = Some(func);
        self.arg = arg;
        self.join_flag = JoinFlag::NotJoining;
        self.exit_status = core::ptr::null_mut();
        self.rw_request = RwRequest::Invalid;
        self.stack_high = stack_high;
        self.stack_low = stack_low;
    }

    pub fn contains_frame_pointer(&self, fp: usize) -> bool {
        fp <= self.stack_high && fp >= self.stack_low
    }
}

pub type TmrPtr = NonNull<Tmr>;
