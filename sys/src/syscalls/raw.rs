//! Bare-metal syscall backend: each wrapper traps into the kernel via the
//! `crate::syscall!` macro and folds the raw `isize` return into a `KResult`.

use core::arch::asm;

use crate::syscall_nums::*;
use crate::{KResult, SwexnHandler, SysErr};

pub unsafe fn thread_fork(
    child_ebp: usize,
    child_esp: usize,
    entry: unsafe extern "C" fn() -> !,
) -> KResult<u64> {
    let raw = unsafe { thread_fork_syscall(child_ebp, child_esp, entry as usize) };
    SysErr::from_raw(raw).map(|v| v as u64)
}

/// The one syscall wrapper that can't go through the generic `syscall!`
/// macro: the child doesn't return from the `syscall` instruction the way
/// every other trap does, it diverges straight into `entry`. `child_ebp`
/// moves into `rbx` the same way every other wrapper's first argument
/// does; `entry`'s address rides through in `rdx`, a register untouched
/// by both the macro's arg-shuffling and the `syscall` instruction
/// itself. This assumes the kernel otherwise preserves the calling
/// thread's registers into the child the way a classic `fork` does,
/// overriding only `rax`/`rbp`/`rsp`.
#[naked]
unsafe extern "C" fn thread_fork_syscall(
    child_ebp: usize,
    child_esp: usize,
    entry: usize,
) -> isize {
    unsafe {
        asm!(
            "push rbx",
            "mov rbx, rdi",
            "mov eax, {num}",
            "syscall",
            "test rax, rax",
            "jnz 2f",
            "jmp rdx",
            "2:",
            "pop rbx",
            "ret",
            num = const THREAD_FORK,
            options(noreturn),
        )
    }
}

pub fn gettid() -> u64 {
    let raw = unsafe { crate::syscall!(GETTID) };
    raw as u64
}

pub fn thread_yield(tid: Option<u64>) -> KResult<()> {
    let arg = tid.map(|t| t as isize).unwrap_or(-1);
    let raw = unsafe { crate::syscall!(YIELD, arg) };
    SysErr::from_raw(raw).map(|_| ())
}

pub unsafe fn deschedule(flag: *const i32) -> KResult<()> {
    let raw = unsafe { crate::syscall!(DESCHEDULE, flag as usize) };
    SysErr::from_raw(raw).map(|_| ())
}

pub fn make_runnable(tid: u64) -> KResult<()> {
    let raw = unsafe { crate::syscall!(MAKE_RUNNABLE, tid as usize) };
    SysErr::from_raw(raw).map(|_| ())
}

pub unsafe fn new_pages(addr: usize, len: usize) -> KResult<()> {
    let raw = unsafe { crate::syscall!(NEW_PAGES, addr, len) };
    SysErr::from_raw(raw).map(|_| ())
}

pub unsafe fn swexn(handler_stack: *mut u8, handler: SwexnHandler, arg: *mut u8) -> KResult<()> {
    let raw = unsafe {
        crate::syscall!(SWEXN, handler_stack as usize, handler as usize, arg as usize)
    };
    SysErr::from_raw(raw).map(|_| ())
}

pub fn vanish() -> ! {
    unsafe {
        crate::syscall!(VANISH);
    }
    unreachable!("vanish syscall returned")
}
