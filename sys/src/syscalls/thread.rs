use super::backend;
use crate::KResult;

/// Creates a new kernel-scheduled thread in the current task. The child
/// never returns from this call; instead it jumps straight to `entry`
/// with `rbp` already set to `child_ebp`, so `entry` is expected to pull
/// its argument out of `rbp` rather than off the stack or out of a
/// register argument.
///
/// Returns the new thread's tid to the caller, or an error if the kernel
/// could not create the thread.
///
/// # Safety
///
/// `child_ebp` is handed to the child verbatim as its `rbp`; `child_esp`
/// must address a stack region the child can safely run on. `entry` must
/// be safe to invoke with that register state.
#[cfg(not(feature = "hosted-mock"))]
pub unsafe fn thread_fork(
    child_ebp: usize,
    child_esp: usize,
    entry: unsafe extern "C" fn() -> !,
) -> KResult<u64> {
    unsafe { backend::thread_fork(child_ebp, child_esp, entry) }
}

/// Host-only form: spawns a real OS thread that calls `entry(arg)`. See
/// the `hosted-mock` backend module for why the calling convention differs
/// from the bare-metal version.
///
/// # Safety
///
/// `entry` must be safe to invoke with `arg`.
#[cfg(feature = "hosted-mock")]
pub unsafe fn thread_fork(entry: extern "C" fn(*mut u8) -> !, arg: *mut u8) -> KResult<u64> {
    unsafe { backend::thread_fork(entry as usize, arg as usize) }
}

/// Returns the kernel-assigned thread id of the calling thread.
pub fn gettid() -> u64 {
    backend::gettid()
}

/// Yields the processor. `tid = None` yields to any runnable thread;
/// `tid = Some(t)` yields specifically to `t`.
pub fn thread_yield(tid: Option<u64>) -> KResult<()> {
    backend::thread_yield(tid)
}

/// Blocks the caller if `*flag == 0` at the instant the kernel samples it.
/// Races against a concurrent `make_runnable` targeting this thread; the
/// kernel's deschedule/make-runnable pair is defined to be atomic with
/// respect to each other so this is safe to call even if a wakeup is
/// already in flight.
///
/// # Safety
///
/// `flag` must remain valid for the duration of the call.
pub unsafe fn deschedule(flag: *const i32) -> KResult<()> {
    unsafe { backend::deschedule(flag) }
}

/// Makes a previously descheduled thread runnable again. Fails if the
/// target is not currently descheduled (including the case where it was
/// never descheduled, or has already been woken by a racing caller).
pub fn make_runnable(tid: u64) -> KResult<()> {
    backend::make_runnable(tid)
}

/// Requests that the kernel map `len` bytes of fresh anonymous memory
/// starting at `addr`. `len` must be a multiple of the page size.
///
/// # Safety
///
/// The caller must not already have mappings overlapping `[addr, addr+len)`.
pub unsafe fn new_pages(addr: usize, len: usize) -> KResult<()> {
    unsafe { backend::new_pages(addr, len) }
}

/// Registers a one-shot software-exception handler for the calling thread.
/// `handler_stack` must point at the top (highest address) of a dedicated
/// stack the handler will run on; the kernel clears the registration before
/// invoking the handler, so a handler that wants to keep handling faults
/// must call `swexn` again from inside itself.
///
/// # Safety
///
/// `handler_stack` must be a valid, currently-unused stack region and
/// `handler` must be safe to invoke with `arg` and a `Ureg` pointer supplied
/// by the kernel.
pub unsafe fn swexn(
    handler_stack: *mut u8,
    handler: crate::SwexnHandler,
    arg: *mut u8,
) -> KResult<()> {
    unsafe { backend::swexn(handler_stack, handler, arg) }
}

/// Terminates the calling thread. Does not return.
pub fn vanish() -> ! {
    backend::vanish()
}
