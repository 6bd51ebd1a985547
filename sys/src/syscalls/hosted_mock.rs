//! Host-side simulation of the kernel primitives in this module, enabled by
//! the `hosted-mock` feature so the rest of the workspace can be exercised
//! with `#[cfg(test)]` on an ordinary machine.
//!
//! `thread_fork`'s two arguments are reinterpreted here as a trampoline
//! function pointer and its argument pointer rather than raw `(ebp, esp)`
//! register values: the host has no mechanism to resume execution at an
//! arbitrary stack pointer the way the real kernel can. The stack allocator
//! in `uthread` knows which convention to use for the backend it was built
//! against.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};

use crate::{KResult, SwexnHandler, SysErr};

struct Park {
    runnable: Mutex<bool>,
    cv: Condvar,
}

struct Registry {
    next_tid: AtomicU64,
    parks: Mutex<HashMap<u64, Arc<Park>>>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry {
        next_tid: AtomicU64::new(1),
        parks: Mutex::new(HashMap::new()),
    })
}

std::thread_local! {
    static THIS_TID: core::cell::Cell<u64> = const { core::cell::Cell::new(0) };
}

fn invalid() -> SysErr {
    SysErr::from_raw(-1).unwrap_err()
}

fn park_for(tid: u64) -> Option<Arc<Park>> {
    registry().parks.lock().unwrap().get(&tid).cloned()
}

/// Marker unwound through by `vanish` to end the current host thread from
/// whatever depth the library called it at.
struct Vanished;

fn install_quiet_panic_hook() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(std::boxed::Box::new(move |info| {
            if info.payload().downcast_ref::<Vanished>().is_some() {
                return;
            }
            default_hook(info);
        }));
    });
}

pub fn assign_tid() -> u64 {
    let existing = THIS_TID.with(|cell| cell.get());
    if existing != 0 {
        return existing;
    }

    let tid = registry().next_tid.fetch_add(1, Ordering::SeqCst);
    registry()
        .parks
        .lock()
        .unwrap()
        .insert(tid, Arc::new(Park { runnable: Mutex::new(true), cv: Condvar::new() }));
    THIS_TID.with(|cell| cell.set(tid));
    tid
}

pub fn gettid() -> u64 {
    assign_tid()
}

struct SendPtr(usize);
unsafe impl Send for SendPtr {}

pub unsafe fn thread_fork(trampoline: usize, arg: usize) -> KResult<u64> {
    install_quiet_panic_hook();

    let trampoline = SendPtr(trampoline);
    let arg = SendPtr(arg);
    let (tx, rx) = std::sync::mpsc::channel();

    let spawned = std::thread::Builder::new().spawn(move || {
        let tid = assign_tid();
        let _ = tx.send(tid);

        let f: extern "C" fn(*mut u8) -> ! = unsafe { core::mem::transmute(trampoline.0) };
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            f(arg.0 as *mut u8);
        }));
    });

    if spawned.is_err() {
        return Err(invalid());
    }

    rx.recv().map_err(|_| invalid())
}

pub fn thread_yield(tid: Option<u64>) -> KResult<()> {
    if let Some(t) = tid {
        if park_for(t).is_none() {
            return Err(invalid());
        }
    }
    std::thread::yield_now();
    Ok(())
}

pub unsafe fn deschedule(flag: *const i32) -> KResult<()> {
    if unsafe { core::ptr::read_volatile(flag) } != 0 {
        return Ok(());
    }

    let tid = assign_tid();
    let park = park_for(tid).expect("gettid always registers a park for the calling thread");

    let mut runnable = park.runnable.lock().unwrap();
    *runnable = false;
    while !*runnable {
        runnable = park.cv.wait(runnable).unwrap();
    }
    Ok(())
}

pub fn make_runnable(tid: u64) -> KResult<()> {
    let park = park_for(tid).ok_or_else(invalid)?;

    let mut runnable = park.runnable.lock().unwrap();
    if *runnable {
        return Err(invalid());
    }
    *runnable = true;
    park.cv.notify_all();
    Ok(())
}

pub unsafe fn new_pages(_addr: usize, len: usize) -> KResult<()> {
    let buf = std::vec![0u8; len].into_boxed_slice();
    std::boxed::Box::leak(buf);
    Ok(())
}

/// Test-only: allocates `len` bytes and returns their base address. Used by
/// the stack allocator in place of the break-pointer/new_pages dance, since
/// the mock can't honor a specific linear address the way the real kernel
/// can.
pub fn mock_alloc_region(len: usize) -> usize {
    let buf = std::vec![0u8; len].into_boxed_slice();
    let ptr = std::boxed::Box::leak(buf).as_mut_ptr();
    ptr as usize
}

pub unsafe fn swexn(
    _handler_stack: *mut u8,
    _handler: SwexnHandler,
    _arg: *mut u8,
) -> KResult<()> {
    // Real register-level exception delivery has no host equivalent; the
    // autostack/crash-handler logic is unit tested piecemeal instead.
    Ok(())
}

pub fn vanish() -> ! {
    std::panic::resume_unwind(std::boxed::Box::new(Vanished));
}
