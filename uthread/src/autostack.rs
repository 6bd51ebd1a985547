//! Autostack growth and thread-crash handling, merged into a single
//! software-exception handler installed once per thread on its own
//! dedicated, heap-allocated stack.
//!
//! `swexn` clears the registration on every delivery, so growth and crash
//! handling both run from the same one-shot callback: a growable page
//! fault regrows the root stack and reinstalls the handler; anything else
//! falls through to the crash path, which never needs to reinstall since
//! the faulting thread is about to vanish.
use core::ptr::NonNull;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use sys::{
    Ureg, SWEXN_CAUSE_ALIGNFAULT, SWEXN_CAUSE_BOUNDCHECK, SWEXN_CAUSE_BREAKPOINT,
    SWEXN_CAUSE_DEBUG, SWEXN_CAUSE_DIVIDE, SWEXN_CAUSE_FPUFAULT, SWEXN_CAUSE_NOFPU,
    SWEXN_CAUSE_OPCODE, SWEXN_CAUSE_OVERFLOW, SWEXN_CAUSE_PAGEFAULT, SWEXN_CAUSE_PROTFAULT,
    SWEXN_CAUSE_SEGFAULT, SWEXN_CAUSE_SIMDFAULT, SWEXN_CAUSE_STACKFAULT,
};

use crate::table;
use crate::tmr::{JoinFlag, ThreadState, Tmr};

const HANDLER_STACK_SIZE: usize = bit_utils::PAGE_SIZE * 4;
const ESP_ALIGN: usize = 16;

/// Set once by `install_root`; read (unsynchronized, like the rest of the
/// autostack bookkeeping it guards) by the handler to decide whether a
/// faulting thread is the one allowed to grow.
static ROOT_TMR: AtomicPtr<Tmr> = AtomicPtr::new(core::ptr::null_mut());
static ROOT_GROW_SIZE: AtomicUsize = AtomicUsize::new(0);
static ROOT_HANDLER_ESP3: AtomicUsize = AtomicUsize::new(0);

/// Installs the combined handler for the calling thread. Every thread calls
/// this once, from `thr_init` (root) or the start trampoline (everyone
/// else); only the root thread additionally arms autostack growth.
pub fn install(is_root: bool, root_stack_high: usize, root_stack_low: usize) {
    let esp3 = alloc_handler_stack();

    if is_root {
        let grow_size = bit_utils::align_up(root_stack_high - root_stack_low, bit_utils::PAGE_SIZE);
        ROOT_GROW_SIZE.store(grow_size, Ordering::Relaxed);
        ROOT_HANDLER_ESP3.store(esp3, Ordering::Relaxed);
        if let Some(tmr) = table::find_by_frame_pointer(root_stack_high) {
            ROOT_TMR.store(tmr.as_ptr(), Ordering::Release);
        }
    }

    arm(esp3);
}

fn alloc_handler_stack() -> usize {
    let layout = core::alloc::Layout::from_size_align(HANDLER_STACK_SIZE, bit_utils::PAGE_SIZE)
        .expect("fixed handler stack size/align is always a valid layout");
    let base = unsafe { alloc::alloc::alloc(layout) };
    assert!(!base.is_null(), "autostack: could not allocate a handler stack");

    bit_utils::align_down(base as usize + HANDLER_STACK_SIZE, ESP_ALIGN)
}

fn arm(esp3: usize) {
    let result = unsafe { sys::swexn(esp3 as *mut u8, combined_handler, core::ptr::null_mut()) };
    assert!(result.is_ok(), "autostack: swexn registration failed");
}

extern "C" fn combined_handler(_arg: *mut u8, ureg: *mut Ureg) {
    let ureg = unsafe { &*ureg };

    if ureg.cause == SWEXN_CAUSE_PAGEFAULT && is_growable_root_fault(ureg) {
        grow_root_and_reinstall();
        return;
    }

    crash(ureg);
}

/// True when the fault is a page fault within a pointer-width of the
/// current frame on the root thread's own stack: the signature of the
/// root stack having simply run out of room, as opposed to a genuine wild
/// pointer dereference.
fn is_growable_root_fault(ureg: &Ureg) -> bool {
    let root = ROOT_TMR.load(Ordering::Acquire);
    if root.is_null() {
        return false;
    }

    let Some(faulting) = table::find_by_frame_pointer(ureg.ebp) else {
        return false;
    };
    if faulting.as_ptr() != root {
        return false;
    }

    ureg.cr2 <= ureg.ebp && ureg.cr2 + core::mem::size_of::<usize>() >= ureg.esp
}

fn grow_root_and_reinstall() {
    let grow_size = ROOT_GROW_SIZE.load(Ordering::Relaxed);
    let root = ROOT_TMR.load(Ordering::Acquire);
    let root = NonNull::new(root).expect("grow_root_and_reinstall is only reached once ROOT_TMR is set");

    let new_low = unsafe { (*root.as_ptr()).stack_low } - grow_size;
    match unsafe { sys::new_pages(new_low, grow_size) } {
        Ok(()) => unsafe { (*root.as_ptr()).stack_low = new_low },
        Err(_) => {
            sys::dprintln!("autostack: could not grow the root stack, leaving it as is");
            return;
        }
    }

    arm(ROOT_HANDLER_ESP3.load(Ordering::Relaxed));
}

fn crash(ureg: &Ureg) {
    print_cause(ureg);

    let Some(mut tmr) = table::find_by_frame_pointer(ureg.ebp) else {
        sys::dprintln!("autostack: crash handler could not locate the faulting thread's TMR");
        sys::vanish();
    };
    let tmr_ref = unsafe { tmr.as_mut() };

    tmr_ref.meta_mutex.lock();
    tmr_ref.exit_status = tmr_ref.arg;
    tmr_ref.state = ThreadState::Terminated;
    if tmr_ref.join_flag == JoinFlag::Joining {
        tmr_ref.meta_cv.signal();
    }
    tmr_ref.meta_mutex.unlock();

    sys::dprintln!("crashed thread: {:?}", tmr_ref.tid);
    sys::vanish();
}

fn print_cause(ureg: &Ureg) {
    match ureg.cause {
        SWEXN_CAUSE_DIVIDE => sys::dprintln!("swexn: divide error"),
        SWEXN_CAUSE_DEBUG => sys::dprintln!("swexn: debug exception"),
        SWEXN_CAUSE_BREAKPOINT => sys::dprintln!("swexn: breakpoint"),
        SWEXN_CAUSE_OVERFLOW => sys::dprintln!("swexn: overflow"),
        SWEXN_CAUSE_BOUNDCHECK => sys::dprintln!("swexn: BOUND range exceeded"),
        SWEXN_CAUSE_OPCODE => sys::dprintln!("swexn: invalid opcode"),
        SWEXN_CAUSE_NOFPU => sys::dprintln!("swexn: device not available"),
        SWEXN_CAUSE_SEGFAULT => sys::dprintln!("swexn: segment not present"),
        SWEXN_CAUSE_STACKFAULT => sys::dprintln!("swexn: stack fault"),
        SWEXN_CAUSE_PROTFAULT => sys::dprintln!("swexn: general protection fault"),
        SWEXN_CAUSE_PAGEFAULT => sys::dprintln!("swexn: page fault at {:#x}, eip {:#x}", ureg.cr2, ureg.eip),
        SWEXN_CAUSE_FPUFAULT => sys::dprintln!("swexn: x87 floating point error"),
        SWEXN_CAUSE_ALIGNFAULT => sys::dprintln!("swexn: alignment check"),
        SWEXN_CAUSE_SIMDFAULT => sys::dprintln!("swexn: SIMD floating point exception"),
        other => sys::dprintln!("swexn: unknown exception, cause {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cond::CondVar;
    use crate::mutex::Mutex;
    use crate::tmr::{JoinFlag, RwRequest, ThreadState};

    fn fake_ureg(cause: u32, cr2: usize, ebp: usize, esp: usize) -> Ureg {
        Ureg {
            padding_before: [0; 3],
            cr2,
            padding_mid: [0; 4],
            cause,
            padding_cause: 0,
            eip: 0,
            padding_after: [0; 2],
            ebp,
            esp,
        }
    }

    #[test]
    fn growable_fault_predicate_and_grow_size_bookkeeping() {
        let stack_high = 0x7000_0000usize;
        let stack_low = 0x6fff_f000usize;

        let grow_size = bit_utils::align_up(stack_high - stack_low, bit_utils::PAGE_SIZE);
        assert_eq!(grow_size, bit_utils::PAGE_SIZE);

        let tmr = alloc::boxed::Box::new(Tmr {
            meta_mutex: Mutex::new_valid(),
            meta_cv: CondVar::new_valid(),
            state: ThreadState::Runnable,
            is_root: true,
            tid: Some(0xaaaa_aaaa),
            func: None,
            arg: core::ptr::null_mut(),
            join_flag: JoinFlag::NotJoining,
            exit_status: core::ptr::null_mut(),
            rw_request: RwRequest::Invalid,
            stack_high,
            stack_low,
        });
        let tmr_ptr = crate::tmr::TmrPtr::new(alloc::boxed::Box::leak(tmr) as *mut Tmr).unwrap();
        table::register(tmr_ptr, false);
        ROOT_TMR.store(tmr_ptr.as_ptr(), Ordering::Release);

        // A page fault one pointer-width below the frame pointer, on the
        // root thread's own frame: the root stack simply ran out of room.
        let ureg = fake_ureg(SWEXN_CAUSE_PAGEFAULT, stack_low - 8, stack_high, stack_low);
        assert!(is_growable_root_fault(&ureg));

        // Same frame, but the faulting address is nowhere near the stack.
        let ureg = fake_ureg(SWEXN_CAUSE_PAGEFAULT, 0x1000, stack_high, stack_low);
        assert!(!is_growable_root_fault(&ureg));

        // A frame pointer no registered TMR's stack range contains never
        // matches the root, regardless of the faulting address.
        let ureg = fake_ureg(SWEXN_CAUSE_PAGEFAULT, stack_low - 8, 1, stack_low);
        assert!(!is_growable_root_fault(&ureg));

        table::unregister(tmr_ptr);
        ROOT_TMR.store(core::ptr::null_mut(), Ordering::Release);
    }
}
