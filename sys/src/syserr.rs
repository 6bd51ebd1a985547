use core::fmt;

/// Result type returned by the raw syscall wrappers in this crate.
pub type KResult<T> = Result<T, SysErr>;

/// A raw negative return value from a syscall, wrapped so callers don't deal
/// in bare integers.
///
/// The kernel this crate targets reports failure as a negative `isize`
/// return value rather than a structured error enum, so this type stays a
/// thin wrapper around that value instead of inventing a richer taxonomy
/// the kernel doesn't actually provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SysErr(i32);

impl SysErr {
    /// Builds a `SysErr` from a raw syscall return value.
    ///
    /// Returns `Ok(value)` for non-negative returns, `Err(SysErr)` otherwise.
    pub fn from_raw(raw: isize) -> KResult<isize> {
        if raw < 0 {
            Err(SysErr(raw as i32))
        } else {
            Ok(raw)
        }
    }

    pub const fn code(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for SysErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syscall failed with code {}", self.0)
    }
}
