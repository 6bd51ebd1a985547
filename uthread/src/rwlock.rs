//! Reader/writer lock: one FIFO wait queue tagged by the mode each waiter
//! requested, so a release can dequeue either the whole contiguous prefix
//! of waiting readers or a single waiting writer.
use alloc::collections::VecDeque;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::PrimitiveError;
use crate::mutex::Mutex;
use crate::tmr::{RwRequest, TmrPtr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RwMode {
    Unlocked,
    Reading,
    Writing,
}

struct RwLockState {
    mode: RwMode,
    reader_count: i64,
    waiting: VecDeque<(TmrPtr, RwRequest)>,
}

pub struct RwLock {
    valid: AtomicBool,
    data_mutex: Mutex,
    state: UnsafeCell<RwLockState>,
}

// All access to `state` is mediated by `data_mutex`.
unsafe impl Send for RwLock {}
unsafe impl Sync for RwLock {}

impl RwLock {
    pub const fn new() -> Self {
        RwLock {
            valid: AtomicBool::new(false),
            data_mutex: Mutex::new(),
            state: UnsafeCell::new(RwLockState {
                mode: RwMode::Unlocked,
                reader_count: 0,
                waiting: VecDeque::new(),
            }),
        }
    }

    pub fn init(&self) -> Result<(), PrimitiveError> {
        if self.valid.load(Ordering::Acquire) {
            return Err(PrimitiveError::DoubleInitialization);
        }

        self.data_mutex.init()?;
        let state = unsafe { &mut *self.state.get() };
        state.mode = RwMode::Unlocked;
        state.reader_count = 0;
        state.waiting.clear();
        self.valid.store(true, Ordering::Release);
        Ok(())
    }

    /// Refuses to destroy a lock that is held or has waiters.
    pub fn destroy(&self) -> Result<(), PrimitiveError> {
        self.data_mutex.lock();
        let state = unsafe { &*self.state.get() };
        if state.mode != RwMode::Unlocked || !state.waiting.is_empty() {
            self.data_mutex.unlock();
            return Err(PrimitiveError::InitOnUse);
        }

        self.valid.store(false, Ordering::Release);
        self.data_mutex.unlock();
        self.data_mutex.destroy()?;
        Ok(())
    }

    /// Acquires the lock for reading or writing. `mode` must be
    /// [`RwRequest::Read`] or [`RwRequest::Write`]; `me` is the calling
    /// thread's own TMR, enqueued only if the request has to block.
    pub fn lock(&self, me: TmrPtr, mode: RwRequest) {
        if !self.valid.load(Ordering::Acquire) {
            sys::dprintln!("rwlock_lock: called on an uninitialized rwlock");
            return;
        }

        self.data_mutex.lock();

        match mode {
            RwRequest::Read => {
                let state = unsafe { &mut *self.state.get() };
                let acquires_immediately = match state.mode {
                    RwMode::Unlocked => true,
                    RwMode::Reading => state.waiting.is_empty(),
                    RwMode::Writing => false,
                };

                if acquires_immediately {
                    state.reader_count += 1;
                } else {
                    state.waiting.push_back((me, RwRequest::Read));
                    self.data_mutex.unlock();
                    block_self();
                    self.data_mutex.lock();
                    unsafe { &mut *self.state.get() }.reader_count += 1;
                }

                unsafe { &mut *self.state.get() }.mode = RwMode::Reading;
            }
            RwRequest::Write => {
                let state = unsafe { &mut *self.state.get() };
                if state.mode != RwMode::Unlocked {
                    state.waiting.push_back((me, RwRequest::Write));
                    self.data_mutex.unlock();
                    block_self();
                    self.data_mutex.lock();
                }

                unsafe { &mut *self.state.get() }.mode = RwMode::Writing;
            }
            RwRequest::Invalid => {
                sys::dprintln!("rwlock_lock: invalid request mode");
            }
        }

        self.data_mutex.unlock();
    }

    /// Releases a lock previously acquired with [`lock`](Self::lock).
    /// Assumes the caller actually holds it; this is not checked.
    pub fn unlock(&self) {
        if !self.valid.load(Ordering::Acquire) {
            sys::dprintln!("rwlock_unlock: called on an uninitialized rwlock");
            return;
        }

        self.data_mutex.lock();
        let state = unsafe { &mut *self.state.get() };
        state.mode = match state.mode {
            RwMode::Unlocked => {
                sys::dprintln!("rwlock_unlock: lock is already unlocked");
                RwMode::Unlocked
            }
            RwMode::Reading if state.reader_count > 1 => {
                state.reader_count -= 1;
                RwMode::Reading
            }
            RwMode::Reading => {
                state.reader_count -= 1;
                dequeue(state)
            }
            RwMode::Writing => dequeue(state),
        };
        self.data_mutex.unlock();
    }

    /// Converts the caller's write ownership into read ownership, handing
    /// the lock to any readers already queued at the front.
    pub fn downgrade(&self) {
        if !self.valid.load(Ordering::Acquire) {
            sys::dprintln!("rwlock_downgrade: called on an uninitialized rwlock");
            return;
        }

        self.data_mutex.lock();
        let state = unsafe { &mut *self.state.get() };
        if state.mode == RwMode::Writing {
            state.reader_count += 1;
            if matches!(state.waiting.front(), Some((_, RwRequest::Read))) {
                dequeue(state);
            }
            state.mode = RwMode::Reading;
        }
        self.data_mutex.unlock();
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Pops and wakes the front waiter, and if it was a reader, every other
/// reader contiguous with it at the front of the queue. Returns the mode
/// the lock is left in.
fn dequeue(state: &mut RwLockState) -> RwMode {
    let Some(&(_, front_mode)) = state.waiting.front() else {
        return RwMode::Unlocked;
    };

    match front_mode {
        RwRequest::Read => {
            while matches!(state.waiting.front(), Some((_, RwRequest::Read))) {
                let (tmr, _) = state.waiting.pop_front().unwrap();
                wake(tmr);
            }
            RwMode::Reading
        }
        RwRequest::Write => {
            let (tmr, _) = state.waiting.pop_front().unwrap();
            wake(tmr);
            RwMode::Writing
        }
        RwRequest::Invalid => RwMode::Unlocked,
    }
}

fn wake(tmr: TmrPtr) {
    let tid = unsafe { tmr.as_ref() }
        .tid
        .expect("a queued thread always has an assigned tid");

    while sys::make_runnable(tid).is_err() {
        let _ = sys::thread_yield(Some(tid));
    }
}

fn block_self() {
    let reject: i32 = 0;
    let _ = unsafe { sys::deschedule(&reject) };
}

#[cfg(all(test, feature = "hosted-mock"))]
mod tests {
    use super::*;
    use crate::sem::Semaphore;
    use crate::table;
    use crate::thread;
    use core::sync::atomic::AtomicUsize;

    static RW: RwLock = RwLock::new();
    static GATE: Semaphore = Semaphore::new();
    static READERS_ACTIVE: AtomicUsize = AtomicUsize::new(0);
    static MAX_CONCURRENT_READERS: AtomicUsize = AtomicUsize::new(0);
    static WRITER_RAN: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn writer0(_arg: *mut u8) -> *mut u8 {
        let me = table::current().expect("a running thread always has a TMR");
        RW.lock(me, RwRequest::Write);
        GATE.wait(me);
        RW.unlock();
        core::ptr::null_mut()
    }

    unsafe extern "C" fn reader(_arg: *mut u8) -> *mut u8 {
        let me = table::current().expect("a running thread always has a TMR");
        RW.lock(me, RwRequest::Read);
        let active = READERS_ACTIVE.fetch_add(1, Ordering::AcqRel) + 1;
        MAX_CONCURRENT_READERS.fetch_max(active, Ordering::AcqRel);
        std::thread::sleep(std::time::Duration::from_millis(20));
        READERS_ACTIVE.fetch_sub(1, Ordering::AcqRel);
        RW.unlock();
        core::ptr::null_mut()
    }

    unsafe extern "C" fn writer1(_arg: *mut u8) -> *mut u8 {
        let me = table::current().expect("a running thread always has a TMR");
        RW.lock(me, RwRequest::Write);
        assert_eq!(READERS_ACTIVE.load(Ordering::Acquire), 0);
        WRITER_RAN.fetch_add(1, Ordering::AcqRel);
        RW.unlock();
        core::ptr::null_mut()
    }

    #[test]
    fn five_queued_readers_run_together_then_a_queued_writer_runs_alone() {
        thread::test_init();
        RW.init().unwrap();
        GATE.init(0).unwrap();

        let w0 = thread::create(writer0, core::ptr::null_mut()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        let readers: alloc::vec::Vec<_> = (0..5)
            .map(|_| thread::create(reader, core::ptr::null_mut()).unwrap())
            .collect();
        std::thread::sleep(std::time::Duration::from_millis(50));

        let w1 = thread::create(writer1, core::ptr::null_mut()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        GATE.signal();

        for tid in readers {
            thread::join(tid).unwrap();
        }
        thread::join(w1).unwrap();
        thread::join(w0).unwrap();

        assert_eq!(MAX_CONCURRENT_READERS.load(Ordering::Acquire), 5);
        assert_eq!(WRITER_RAN.load(Ordering::Acquire), 1);

        RW.destroy().unwrap();
        GATE.destroy().unwrap();
    }
}
