//! A user-space thread library layered directly on a minimal kernel: thread
//! creation/joining, a ticket mutex, condition variables, counting
//! semaphores, reader/writer locks, and an autostack/crash handler, all
//! built without any kernel-provided thread-local storage.
#![no_std]
#![feature(naked_functions)]

extern crate alloc;
// Only the hosted-mock test suite reaches for std directly (spawning real
// OS threads to drive the synchronization core); the bare-metal build never
// sees this.
#[cfg(all(test, feature = "hosted-mock"))]
extern crate std;

pub mod autostack;
pub mod cond;
pub mod error;
#[cfg(not(feature = "hosted-mock"))]
pub mod heap;
pub mod mutex;
pub mod rwlock;
pub mod sem;
mod stack;
mod table;
pub mod thread;
pub mod tmr;

pub use cond::CondVar;
pub use mutex::Mutex;
pub use rwlock::RwLock;
pub use sem::Semaphore;
pub use tmr::ThreadFunc;

pub use error::{InitError, JoinError, PrimitiveError, StackError, YieldError};

/// Prepares the library for use. Must be called exactly once, from the
/// process's original thread, before any other function in this crate.
///
/// `stack_size` is the usable (non-metadata) stack size every subsequently
/// created thread gets. `root_stack_high`/`root_stack_low` describe the
/// stack the calling thread is already running on.
pub fn thr_init(
    stack_size: usize,
    root_stack_high: usize,
    root_stack_low: usize,
) -> Result<(), InitError> {
    thread::init(stack_size, root_stack_high, root_stack_low)
}

/// Creates a new thread running `func(arg)`. Returns its tid.
pub fn thr_create(func: ThreadFunc, arg: *mut u8) -> Result<u64, StackError> {
    thread::create(func, arg)
}

/// Blocks until `tid` exits, returning the status it passed to `thr_exit`.
pub fn thr_join(tid: u64) -> Result<*mut u8, JoinError> {
    thread::join(tid)
}

/// Terminates the calling thread, recording `status` for a future
/// `thr_join`. Never returns.
pub fn thr_exit(status: *mut u8) -> ! {
    thread::exit(status)
}

/// Returns the calling thread's tid.
pub fn thr_getid() -> u64 {
    thread::getid()
}

/// Yields the processor to `tid`, or to any runnable thread if `tid` is
/// `None`.
pub fn thr_yield(tid: Option<u64>) -> Result<(), YieldError> {
    thread::yield_now(tid)
}
