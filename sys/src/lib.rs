//! Low level interface to the kernel syscalls this thread library is built on.
//!
//! Every syscall here is named the way the kernel documents it: thread-fork,
//! gettid, yield, deschedule, make-runnable, new-pages, swexn, vanish, plus
//! a debug print used only for diagnostics.
#![no_std]

// Lets `#[cfg(test)]` code and the hosted-mock backend use std facilities
// while the crate itself stays no_std for the bare-metal build.
#[cfg(feature = "hosted-mock")]
extern crate std;

pub mod syscall_nums;

mod tid;
pub use tid::*;
mod syserr;
pub use syserr::*;
mod ureg;
pub use ureg::*;
mod syscalls;
pub use syscalls::*;
