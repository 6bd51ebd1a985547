//! The ticket-lock mutex described in the component design: a draw-a-ticket,
//! busy-wait-with-yield lock. Every other synchronization primitive in this
//! crate, and every process-wide table, is built directly on this type.
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::error::PrimitiveError;

pub struct Mutex {
    valid: AtomicBool,
    ticket: AtomicU32,
    turn: AtomicU32,
}

impl Mutex {
    /// An uninitialized mutex; `init` must be called before `lock`/`unlock`
    /// are meaningful.
    pub const fn new() -> Self {
        Mutex {
            valid: AtomicBool::new(false),
            ticket: AtomicU32::new(0),
            turn: AtomicU32::new(0),
        }
    }

    /// An already-valid mutex, for process-wide state that is live for the
    /// entire lifetime of the library and never goes through `init`.
    pub const fn new_valid() -> Self {
        Mutex {
            valid: AtomicBool::new(true),
            ticket: AtomicU32::new(0),
            turn: AtomicU32::new(0),
        }
    }

    pub fn init(&self) -> Result<(), PrimitiveError> {
        if self.valid.load(Ordering::Acquire) {
            return Err(PrimitiveError::DoubleInitialization);
        }

        self.ticket.store(0, Ordering::Relaxed);
        self.turn.store(0, Ordering::Relaxed);
        self.valid.store(true, Ordering::Release);
        Ok(())
    }

    /// Draws a ticket and busy-waits, yielding the processor each
    /// iteration, until it is this caller's turn.
    ///
    /// Locking an uninitialized mutex prints a diagnostic and returns
    /// without blocking, matching the weak contract this primitive is
    /// grounded on; callers must not depend on this being fatal.
    pub fn lock(&self) {
        if !self.valid.load(Ordering::Acquire) {
            sys::dprintln!("mutex_lock: called on an uninitialized mutex");
            return;
        }

        let my_ticket = self.ticket.fetch_add(1, Ordering::AcqRel);
        while self.turn.load(Ordering::Acquire) != my_ticket {
            let _ = sys::thread_yield(None);
        }
    }

    pub fn unlock(&self) {
        if !self.valid.load(Ordering::Acquire) {
            sys::dprintln!("mutex_unlock: called on an uninitialized mutex");
            return;
        }

        self.turn.fetch_add(1, Ordering::AcqRel);
    }

    /// Refuses to destroy a mutex that is currently held or has waiters.
    pub fn destroy(&self) -> Result<(), PrimitiveError> {
        if self.ticket.load(Ordering::Acquire) != self.turn.load(Ordering::Acquire) {
            return Err(PrimitiveError::InitOnUse);
        }

        self.valid.store(false, Ordering::Release);
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;

    #[test]
    fn lock_unlock_round_trip_is_idempotent() {
        let m = Mutex::new();
        m.init().unwrap();
        for _ in 0..100 {
            m.lock();
            m.unlock();
        }
        m.destroy().unwrap();
    }

    #[test]
    fn destroy_refuses_while_held() {
        let m = Mutex::new();
        m.init().unwrap();
        m.lock();
        assert_eq!(m.destroy(), Err(PrimitiveError::InitOnUse));
        m.unlock();
        assert!(m.destroy().is_ok());
    }

    #[test]
    fn double_init_is_rejected() {
        let m = Mutex::new();
        m.init().unwrap();
        assert_eq!(m.init(), Err(PrimitiveError::DoubleInitialization));
    }

    #[cfg(feature = "hosted-mock")]
    #[test]
    fn two_threads_hammer_a_counter() {
        let mutex = Arc::new(Mutex::new());
        mutex.init().unwrap();
        let counter = Arc::new(core::sync::atomic::AtomicU64::new(0));

        let handles: alloc::vec::Vec<_> = (0..2)
            .map(|_| {
                let mutex = mutex.clone();
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        mutex.lock();
                        counter.fetch_add(1, Ordering::Relaxed);
                        mutex.unlock();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), 20_000);
    }
}
