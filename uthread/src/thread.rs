//! Thread lifecycle: `init`, `create`, `join`, `exit`, `getid`, `yield_now`.
use crate::autostack;
use crate::cond::CondVar;
#[cfg(not(feature = "hosted-mock"))]
use crate::heap;
use crate::error::{InitError, JoinError, StackError, YieldError};
use crate::stack;
use crate::table;
use crate::tmr::{JoinFlag, ThreadFunc, ThreadState, Tmr, TmrPtr};

/// Guards against calling `init` twice; every other piece of process-wide
/// state it gates (the stack break, the tables) has no independent
/// "already initialized" flag of its own.
static INITIALIZED: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);

/// Prepares the thread library for use: installs the root thread's TMR
/// and configures the stack allocator to carve `stack_size`-byte usable
/// regions (plus room for the embedded TMR) for every thread it creates.
///
/// `root_stack_high`/`root_stack_low` describe the stack the calling
/// thread is already running on; the allocator's break descends from
/// `root_stack_low`.
pub fn init(stack_size: usize, root_stack_high: usize, root_stack_low: usize) -> Result<(), InitError> {
    if INITIALIZED.swap(true, core::sync::atomic::Ordering::AcqRel) {
        return Err(InitError::DoubleInitialization);
    }

    stack::configure(stack_size, root_stack_low);
    stack::make_root(root_stack_high, root_stack_low, sys::gettid());
    autostack::install(true, root_stack_high, root_stack_low);
    #[cfg(not(feature = "hosted-mock"))]
    heap::enable_locking();
    Ok(())
}

/// Creates a new thread running `func(arg)`. Returns its tid.
pub fn create(func: ThreadFunc, arg: *mut u8) -> Result<u64, StackError> {
    let tmr = stack::allocate(func, arg)?;

    let tid = unsafe { fork_child(tmr) };
    let Some(tid) = tid else {
        stack::free(tmr);
        return Err(StackError::ThrCreateFailed);
    };

    let tmr_mut = unsafe { &mut *tmr.as_ptr() };
    tmr_mut.meta_mutex.lock();
    tmr_mut.tid = Some(tid);
    tmr_mut.state = ThreadState::Runnable;
    tmr_mut.meta_cv.signal();
    tmr_mut.meta_mutex.unlock();

    Ok(tid)
}

/// Blocks until `tid` exits, then returns the status it passed to
/// [`exit`]. A given tid can only be joined once.
pub fn join(tid: u64) -> Result<*mut u8, JoinError> {
    let mut tmr = table::lookup_by_tid(tid).ok_or(JoinError::InvalidTid)?;
    let tmr_ref = unsafe { tmr.as_mut() };

    tmr_ref.meta_mutex.lock();
    if tmr_ref.join_flag == JoinFlag::Joining || tmr_ref.tid != Some(tid) {
        tmr_ref.meta_mutex.unlock();
        return Err(JoinError::MultipleJoins);
    }
    tmr_ref.join_flag = JoinFlag::Joining;

    while tmr_ref.state != ThreadState::Terminated {
        tmr_ref.meta_cv.wait(&tmr_ref.meta_mutex, tmr);
    }

    let status = tmr_ref.exit_status;
    tmr_ref.meta_mutex.unlock();

    stack::free(tmr);
    Ok(status)
}

/// Terminates the calling thread, recording `status` for a future
/// [`join`]. Never returns.
pub fn exit(status: *mut u8) -> ! {
    let mut tmr = table::current().expect("a running thread always has a TMR");
    let tmr_ref = unsafe { tmr.as_mut() };

    tmr_ref.meta_mutex.lock();
    tmr_ref.exit_status = status;
    tmr_ref.state = ThreadState::Terminated;
    if tmr_ref.join_flag == JoinFlag::Joining {
        tmr_ref.meta_cv.signal();
    }
    tmr_ref.meta_mutex.unlock();

    sys::dprintln!("exit thread: {}", sys::gettid());
    sys::vanish();
}

/// Returns the calling thread's tid, falling back to the raw kernel tid
/// if, implausibly, this thread has no TMR (should never happen once
/// `init` has run).
pub fn getid() -> u64 {
    match table::current() {
        Some(tmr) => unsafe { tmr.as_ref() }.tid.unwrap_or_else(sys::gettid),
        None => sys::gettid(),
    }
}

/// Yields the processor to `tid`, or to any runnable thread if `tid` is
/// `None`.
pub fn yield_now(tid: Option<u64>) -> Result<(), YieldError> {
    if let Some(tid) = tid {
        if table::lookup_by_tid(tid).is_none() {
            return Err(YieldError::InvalidTid);
        }
    }

    sys::thread_yield(tid).map_err(|_| YieldError::InvalidTid)
}

#[cfg(not(feature = "hosted-mock"))]
unsafe fn fork_child(tmr: TmrPtr) -> Option<u64> {
    let tmr_ref = unsafe { tmr.as_ref() };
    let child_ebp = tmr.as_ptr() as usize;
    // The TMR sits at the high end of the region; the usable stack is
    // everything below it, growing down toward `stack_low`.
    let usable_top = tmr.as_ptr() as usize;
    let child_esp = bit_utils::align_down(usable_top - 16, 16);
    debug_assert!(child_esp >= tmr_ref.stack_low);

    match unsafe { sys::thread_fork(child_ebp, child_esp, thread_entry_asm) } {
        Ok(tid) => Some(tid),
        Err(_) => None,
    }
}

#[cfg(feature = "hosted-mock")]
unsafe fn fork_child(tmr: TmrPtr) -> Option<u64> {
    match unsafe { sys::thread_fork(host_thread_entry, tmr.as_ptr() as *mut u8) } {
        Ok(tid) => Some(tid),
        Err(_) => None,
    }
}

#[cfg(feature = "hosted-mock")]
extern "C" fn host_thread_entry(arg: *mut u8) -> ! {
    let tmr = TmrPtr::new(arg as *mut Tmr).expect("thread_fork always supplies a live TMR");
    run(tmr)
}

#[cfg(not(feature = "hosted-mock"))]
#[naked]
unsafe extern "C" fn thread_entry_asm() -> ! {
    unsafe {
        core::arch::asm!(
            "mov rdi, rbp",
            "call {entry}",
            "ud2",
            entry = sym bare_metal_thread_entry,
            options(noreturn),
        )
    }
}

#[cfg(not(feature = "hosted-mock"))]
unsafe extern "C" fn bare_metal_thread_entry(tmr: *mut Tmr) -> ! {
    let tmr = TmrPtr::new(tmr).expect("thread_fork always supplies a live TMR");
    run(tmr)
}

/// Common child-thread bootstrap for both backends: wait until the parent
/// has assigned our tid and marked us runnable, then run the thread's
/// function and fall through to `exit` if it doesn't call it itself.
fn run(mut tmr: TmrPtr) -> ! {
    autostack::install(false, 0, 0);

    let tmr_ref = unsafe { tmr.as_mut() };

    tmr_ref.meta_mutex.lock();
    while tmr_ref.state != ThreadState::Runnable {
        tmr_ref.meta_cv.wait(&tmr_ref.meta_mutex, tmr);
    }
    tmr_ref.meta_mutex.unlock();

    let func = tmr_ref.func.expect("a thread always has a start function");
    let arg = tmr_ref.arg;
    let status = unsafe { func(arg) };
    exit(status)
}

/// Brings the library up exactly once for the whole test binary; later
/// calls from other test functions just see `DoubleInitialization` and are
/// ignored; the root TMR a test happens to race to install first stands.
#[cfg(test)]
pub(crate) fn test_init() {
    let _ = init(4096, 0x10_0000, 0x1000);
}

#[cfg(all(test, feature = "hosted-mock"))]
mod tests {
    use super::*;
    use crate::sem::Semaphore;

    unsafe extern "C" fn returns_arg(arg: *mut u8) -> *mut u8 {
        arg
    }

    #[test]
    fn create_and_join_round_trip() {
        test_init();
        let tid = create(returns_arg, 0x2a as *mut u8).unwrap();
        let status = join(tid).unwrap();
        assert_eq!(status as usize, 0x2a);
    }

    #[test]
    fn join_on_unknown_tid_fails() {
        test_init();
        assert_eq!(join(0xffff_ffff), Err(JoinError::InvalidTid));
    }

    #[test]
    fn multiple_joins_on_same_tid_is_rejected() {
        test_init();

        static GATE: Semaphore = Semaphore::new();
        GATE.init(0).unwrap();

        unsafe extern "C" fn wait_for_gate(_arg: *mut u8) -> *mut u8 {
            let me = table::current().expect("a running thread always has a TMR");
            GATE.wait(me);
            core::ptr::null_mut()
        }

        let tid = create(wait_for_gate, core::ptr::null_mut()).unwrap();

        let joiner = std::thread::spawn(move || join(tid));
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(join(tid), Err(JoinError::MultipleJoins));

        GATE.signal();
        assert!(joiner.join().unwrap().is_ok());
        GATE.destroy().unwrap();
    }
}
