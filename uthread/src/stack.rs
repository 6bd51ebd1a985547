//! Stack-region allocation: carves fixed-size, page-aligned regions off a
//! descending process-wide break, recycling freed regions through the
//! free-stack table before ever lowering the break again.
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::cond::CondVar;
use crate::error::StackError;
use crate::mutex::Mutex;
use crate::table;
use crate::tmr::{JoinFlag, RwRequest, ThreadFunc, ThreadState, Tmr, TmrPtr};

/// Set once by `thread::init`: the total size (usable stack plus the TMR
/// embedded at its high end) every thread's region is carved at.
static REGION_SIZE: AtomicUsize = AtomicUsize::new(0);

struct Brk {
    mutex: Mutex,
    value: core::cell::UnsafeCell<usize>,
}

unsafe impl Sync for Brk {}

static STACKS_BRK: Brk = Brk {
    mutex: Mutex::new_valid(),
    value: core::cell::UnsafeCell::new(0),
};

/// Called once by `thread::init` with the requested per-thread usable
/// stack size and the address the root thread's own stack starts at (the
/// break descends from there).
pub fn configure(usable_stack_size: usize, initial_brk: usize) {
    let region_size = bit_utils::align_up(
        usable_stack_size + core::mem::size_of::<Tmr>(),
        bit_utils::PAGE_SIZE,
    );
    REGION_SIZE.store(region_size, Ordering::Release);

    STACKS_BRK.mutex.lock();
    unsafe { *STACKS_BRK.value.get() = initial_brk };
    STACKS_BRK.mutex.unlock();
}

/// Builds a root TMR in place, for the thread `thr_init` runs on. Its
/// stack region is whatever the kernel already gave the process, not one
/// this allocator carved.
pub fn make_root(stack_high: usize, stack_low: usize, tid: u64) -> TmrPtr {
    let tmr = alloc::boxed::Box::new(Tmr {
        meta_mutex: Mutex::new_valid(),
        meta_cv: CondVar::new_valid(),
        state: ThreadState::Runnable,
        is_root: true,
        tid: Some(tid),
        func: None,
        arg: core::ptr::null_mut(),
        join_flag: JoinFlag::NotJoining,
        exit_status: core::ptr::null_mut(),
        rw_request: RwRequest::Invalid,
        stack_high,
        stack_low,
    });

    let tmr = TmrPtr::new(alloc::boxed::Box::leak(tmr) as *mut Tmr).unwrap();
    table::register(tmr, true);
    tmr
}

/// Allocates (or recycles) a stack region for a new thread and embeds a
/// freshly initialized TMR at its high end.
pub fn allocate(func: ThreadFunc, arg: *mut u8) -> Result<TmrPtr, StackError> {
    if let Some(mut tmr) = table::take_free_stack() {
        let (stack_high, stack_low) = {
            let tmr_ref = unsafe { tmr.as_ref() };
            (tmr_ref.stack_high, tmr_ref.stack_low)
        };
        unsafe { tmr.as_mut() }.reinit(func, arg, stack_high, stack_low);
        table::register(tmr, false);
        return Ok(tmr);
    }

    let region_size = REGION_SIZE.load(Ordering::Acquire);
    let base = carve_region(region_size)?;
    let stack_high = base + region_size;
    let stack_low = base;

    let tmr_ptr = (stack_high - core::mem::size_of::<Tmr>()) as *mut Tmr;
    unsafe {
        tmr_ptr.write(Tmr {
            meta_mutex: Mutex::new_valid(),
            meta_cv: CondVar::new_valid(),
            state: ThreadState::Unstarted,
            is_root: false,
            tid: None,
            func: Some(func),
            arg,
            join_flag: JoinFlag::NotJoining,
            exit_status: core::ptr::null_mut(),
            rw_request: RwRequest::Invalid,
            stack_high,
            stack_low,
        });
    }

    let tmr = TmrPtr::new(tmr_ptr).ok_or(StackError::InitStackMetaFailed)?;
    table::register(tmr, false);
    Ok(tmr)
}

/// Unregisters a thread's TMR and moves its stack region onto the free
/// list for reuse by the next `allocate`. A no-op for the root thread's
/// TMR, which never came from this allocator and outlives the library.
pub fn free(tmr: TmrPtr) {
    if unsafe { tmr.as_ref() }.is_root {
        return;
    }

    table::unregister(tmr);
    table::recycle_stack(tmr);
}

#[cfg(feature = "hosted-mock")]
fn carve_region(size: usize) -> Result<usize, StackError> {
    Ok(sys::mock_alloc_region(size))
}

#[cfg(not(feature = "hosted-mock"))]
fn carve_region(size: usize) -> Result<usize, StackError> {
    STACKS_BRK.mutex.lock();
    let brk = unsafe { &mut *STACKS_BRK.value.get() };
    *brk = bit_utils::align_down(*brk, bit_utils::PAGE_SIZE);
    *brk -= size;
    let addr = *brk;
    STACKS_BRK.mutex.unlock();

    match unsafe { sys::new_pages(addr, size) } {
        Ok(()) => Ok(addr),
        Err(_) => Err(StackError::ThrCreateFailed),
    }
}
