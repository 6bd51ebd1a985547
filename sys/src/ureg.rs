//! The register snapshot the kernel hands to a registered software-exception
//! handler, and the fault-cause codes that appear in it.

/// Divide error.
pub const SWEXN_CAUSE_DIVIDE: u32 = 0;
/// Debug exception.
pub const SWEXN_CAUSE_DEBUG: u32 = 1;
/// Breakpoint.
pub const SWEXN_CAUSE_BREAKPOINT: u32 = 3;
/// Overflow.
pub const SWEXN_CAUSE_OVERFLOW: u32 = 4;
/// BOUND range exceeded.
pub const SWEXN_CAUSE_BOUNDCHECK: u32 = 5;
/// Invalid opcode.
pub const SWEXN_CAUSE_OPCODE: u32 = 6;
/// Device not available.
pub const SWEXN_CAUSE_NOFPU: u32 = 7;
/// Segment not present.
pub const SWEXN_CAUSE_SEGFAULT: u32 = 11;
/// Stack fault.
pub const SWEXN_CAUSE_STACKFAULT: u32 = 12;
/// General protection fault.
pub const SWEXN_CAUSE_PROTFAULT: u32 = 13;
/// Page fault.
pub const SWEXN_CAUSE_PAGEFAULT: u32 = 14;
/// x87 floating point error.
pub const SWEXN_CAUSE_FPUFAULT: u32 = 16;
/// Alignment check.
pub const SWEXN_CAUSE_ALIGNFAULT: u32 = 17;
/// SIMD floating point exception.
pub const SWEXN_CAUSE_SIMDFAULT: u32 = 19;

/// Saved register state delivered to a software-exception handler.
///
/// Field layout mirrors what the kernel writes onto the handler stack before
/// invoking the handler; only the fields this library actually inspects
/// (fault cause, faulting address, frame/stack pointer, instruction pointer)
/// are named, the rest is kept as padding so the struct's size still matches
/// what the kernel writes.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Ureg {
    pub padding_before: [usize; 3],
    /// Faulting linear address, valid for page faults only.
    pub cr2: usize,
    pub padding_mid: [usize; 4],
    /// Cause of the exception, one of the `SWEXN_CAUSE_*` constants.
    pub cause: u32,
    pub padding_cause: u32,
    /// Instruction pointer at the time of the fault.
    pub eip: usize,
    pub padding_after: [usize; 2],
    /// Frame pointer at the time of the fault.
    pub ebp: usize,
    /// Stack pointer at the time of the fault.
    pub esp: usize,
}

/// Handler signature accepted by `swexn`.
pub type SwexnHandler = extern "C" fn(arg: *mut u8, ureg: *mut Ureg);
