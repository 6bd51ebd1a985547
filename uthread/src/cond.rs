//! Condition variables, built on the ticket mutex and the thread table's
//! tid lookup.
//!
//! `wait` does not rely on `deschedule`'s reject flag to close the
//! missed-wakeup window; the flag is a throwaway local that is never
//! touched by a signaler. Instead `signal`/`broadcast` spin, retrying
//! `make_runnable` and yielding to the target tid, until the waiter has
//! actually reached its own `deschedule` call (so `make_runnable` stops
//! failing) or the table shows the waiter is gone.
use alloc::collections::VecDeque;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::PrimitiveError;
use crate::mutex::Mutex;
use crate::tmr::TmrPtr;

pub struct CondVar {
    valid: AtomicBool,
    queue_mutex: Mutex,
    queue: UnsafeCell<VecDeque<TmrPtr>>,
}

// All access to `queue` is mediated by `queue_mutex`.
unsafe impl Send for CondVar {}
unsafe impl Sync for CondVar {}

impl CondVar {
    pub const fn new() -> Self {
        CondVar {
            valid: AtomicBool::new(false),
            queue_mutex: Mutex::new(),
            queue: UnsafeCell::new(VecDeque::new()),
        }
    }

    /// An already-valid condvar, for the metadata condvar embedded in every
    /// TMR: it is never exposed to user `cond_init`/`cond_destroy` calls, so
    /// it is simply valid for as long as its owning stack slot is live.
    pub const fn new_valid() -> Self {
        CondVar {
            valid: AtomicBool::new(true),
            queue_mutex: Mutex::new_valid(),
            queue: UnsafeCell::new(VecDeque::new()),
        }
    }

    pub fn init(&self) -> Result<(), PrimitiveError> {
        if self.valid.load(Ordering::Acquire) {
            return Err(PrimitiveError::DoubleInitialization);
        }

        self.queue_mutex.init()?;
        self.valid.store(true, Ordering::Release);
        Ok(())
    }

    /// Refuses to destroy a condvar with threads still queued on it.
    pub fn destroy(&self) -> Result<(), PrimitiveError> {
        self.queue_mutex.lock();
        let in_use = !unsafe { &*self.queue.get() }.is_empty();
        if in_use {
            self.queue_mutex.unlock();
            return Err(PrimitiveError::InitOnUse);
        }

        self.valid.store(false, Ordering::Release);
        self.queue_mutex.unlock();
        self.queue_mutex.destroy()?;
        Ok(())
    }

    /// Blocks the caller, atomically releasing `mutex` for the duration,
    /// until woken by a `signal` or `broadcast` on this condvar.
    ///
    /// `me` must be the calling thread's own TMR, and must stay alive and
    /// fixed in memory until this call returns.
    pub fn wait(&self, mutex: &Mutex, me: TmrPtr) {
        if !self.valid.load(Ordering::Acquire) {
            sys::dprintln!("cond_wait: called on an uninitialized condition variable");
            return;
        }

        self.queue_mutex.lock();
        unsafe { &mut *self.queue.get() }.push_back(me);
        self.queue_mutex.unlock();

        mutex.unlock();

        let reject: i32 = 0;
        let _ = unsafe { sys::deschedule(&reject) };

        mutex.lock();
    }

    /// Wakes a single waiter, guaranteed runnable by the time this returns
    /// unless that thread has already vanished.
    pub fn signal(&self) {
        self.wake_one();
    }

    pub fn broadcast(&self) {
        while self.wake_one() {}
    }

    fn wake_one(&self) -> bool {
        self.queue_mutex.lock();
        let next = unsafe { &mut *self.queue.get() }.pop_front();
        self.queue_mutex.unlock();

        let Some(tmr) = next else {
            return false;
        };

        let tid = unsafe { tmr.as_ref() }
            .tid
            .expect("a queued thread always has an assigned tid");

        while sys::make_runnable(tid).is_err() {
            if crate::table::lookup_by_tid(tid).is_none() {
                break;
            }
            let _ = sys::thread_yield(Some(tid));
        }

        true
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "hosted-mock"))]
mod tests {
    use super::*;
    use crate::mutex::Mutex;
    use crate::table;
    use crate::thread;
    use core::sync::atomic::AtomicUsize;

    static LOCK: Mutex = Mutex::new();
    static CV: CondVar = CondVar::new();
    static READY: AtomicUsize = AtomicUsize::new(0);
    static DONE: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn waiter(_arg: *mut u8) -> *mut u8 {
        let me = table::current().expect("a running thread always has a TMR");
        LOCK.lock();
        while READY.load(Ordering::Acquire) == 0 {
            CV.wait(&LOCK, me);
        }
        LOCK.unlock();
        DONE.fetch_add(1, Ordering::AcqRel);
        core::ptr::null_mut()
    }

    #[test]
    fn broadcast_wakes_every_waiter() {
        thread::test_init();
        LOCK.init().unwrap();
        CV.init().unwrap();

        let tids: alloc::vec::Vec<_> = (0..4)
            .map(|_| thread::create(waiter, core::ptr::null_mut()).unwrap())
            .collect();

        // Give every waiter a chance to reach `wait` before broadcasting.
        std::thread::sleep(std::time::Duration::from_millis(50));

        LOCK.lock();
        READY.store(1, Ordering::Release);
        CV.broadcast();
        LOCK.unlock();

        for tid in tids {
            thread::join(tid).unwrap();
        }

        assert_eq!(DONE.load(Ordering::Acquire), 4);
        LOCK.destroy().unwrap();
        CV.destroy().unwrap();
    }
}
