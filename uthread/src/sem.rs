//! Counting semaphore, built directly on [`Mutex`] and [`CondVar`].
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::cond::CondVar;
use crate::error::PrimitiveError;
use crate::mutex::Mutex;
use crate::tmr::TmrPtr;

pub struct Semaphore {
    valid: AtomicBool,
    lock: Mutex,
    cv: CondVar,
    count: UnsafeCell<i64>,
}

// `count` is only ever touched while `lock` is held.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub const fn new() -> Self {
        Semaphore {
            valid: AtomicBool::new(false),
            lock: Mutex::new(),
            cv: CondVar::new(),
            count: UnsafeCell::new(0),
        }
    }

    /// Initializes the semaphore's own internal mutex and condition
    /// variable along with its count, mirroring the source's `sem_init`
    /// rather than treating them as process-wide singletons: a semaphore
    /// can be destroyed and reused like any other primitive.
    pub fn init(&self, count: i64) -> Result<(), PrimitiveError> {
        if self.valid.load(Ordering::Acquire) {
            return Err(PrimitiveError::DoubleInitialization);
        }

        self.lock.init()?;
        self.cv.init()?;

        self.lock.lock();
        unsafe { *self.count.get() = count };
        self.valid.store(true, Ordering::Release);
        self.lock.unlock();
        Ok(())
    }

    /// Blocks `me` until the count is positive, then atomically claims one
    /// unit. `me` is the calling thread's own TMR, passed through to
    /// [`CondVar::wait`].
    pub fn wait(&self, me: TmrPtr) {
        if !self.valid.load(Ordering::Acquire) {
            sys::dprintln!("sem_wait: called on an uninitialized semaphore");
            return;
        }

        self.lock.lock();
        while unsafe { *self.count.get() } <= 0 {
            self.cv.wait(&self.lock, me);
        }
        unsafe { *self.count.get() -= 1 };
        self.lock.unlock();
    }

    pub fn signal(&self) {
        if !self.valid.load(Ordering::Acquire) {
            sys::dprintln!("sem_signal: called on an uninitialized semaphore");
            return;
        }

        self.lock.lock();
        unsafe { *self.count.get() += 1 };
        self.cv.signal();
        self.lock.unlock();
    }

    /// Refuses to destroy a semaphore that was never successfully
    /// initialized.
    pub fn destroy(&self) -> Result<(), PrimitiveError> {
        if !self.valid.load(Ordering::Acquire) {
            return Err(PrimitiveError::InitOnUse);
        }

        self.lock.lock();
        self.valid.store(false, Ordering::Release);
        unsafe { *self.count.get() = 0 };
        self.lock.unlock();

        self.lock.destroy()?;
        self.cv.destroy()?;
        Ok(())
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmr::{JoinFlag, RwRequest, ThreadState, Tmr};

    #[test]
    fn signalling_ahead_of_time_does_not_block() {
        let sem = Semaphore::new();
        sem.init(0).unwrap();
        sem.signal();
        sem.signal();

        // `wait` only touches `me` if it actually has to block, so a
        // throwaway TMR that is never registered anywhere is fine here.
        let mut dummy = Tmr {
            meta_mutex: Mutex::new_valid(),
            meta_cv: CondVar::new_valid(),
            state: ThreadState::Runnable,
            is_root: false,
            tid: Some(1),
            func: None,
            arg: core::ptr::null_mut(),
            join_flag: JoinFlag::NotJoining,
            exit_status: core::ptr::null_mut(),
            rw_request: RwRequest::Invalid,
            stack_high: 0,
            stack_low: 0,
        };
        let me = TmrPtr::new(&mut dummy as *mut Tmr).unwrap();

        sem.wait(me);
        sem.wait(me);
        sem.destroy().unwrap();
    }

    #[test]
    fn destroy_refuses_on_uninitialized_semaphore() {
        let sem = Semaphore::new();
        assert_eq!(sem.destroy(), Err(PrimitiveError::InitOnUse));
    }
}

#[cfg(all(test, feature = "hosted-mock"))]
mod hosted_tests {
    use super::*;
    use crate::table;
    use crate::thread;

    static SEM: Semaphore = Semaphore::new();
    static CONSUMED: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(0);

    unsafe extern "C" fn consumer(_arg: *mut u8) -> *mut u8 {
        let me = table::current().expect("a running thread always has a TMR");
        SEM.wait(me);
        CONSUMED.fetch_add(1, Ordering::AcqRel);
        core::ptr::null_mut()
    }

    #[test]
    fn five_signals_wake_five_waiting_consumers() {
        thread::test_init();
        SEM.init(0).unwrap();

        let tids: alloc::vec::Vec<_> = (0..5)
            .map(|_| thread::create(consumer, core::ptr::null_mut()).unwrap())
            .collect();

        std::thread::sleep(std::time::Duration::from_millis(50));
        for _ in 0..5 {
            SEM.signal();
        }

        for tid in tids {
            thread::join(tid).unwrap();
        }

        assert_eq!(CONSUMED.load(Ordering::Acquire), 5);
        SEM.destroy().unwrap();
    }
}
