//! Error taxonomy for the thread library. Each family gets its own enum
//! rather than one flat code space; every variant still recovers the
//! historical negative integer code via [`code`](StackError::code) and
//! friends, for callers that only want the raw value.
use thiserror_no_std::Error;

/// Failures that can occur while allocating or initializing a thread's
/// stack region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("failed to create a new thread's stack")]
    ThrCreateFailed,
    #[error("allocated a stack slot but could not initialize its metadata")]
    InitStackMetaFailed,
    #[error("the underlying heap allocator could not satisfy the request")]
    MallocFailed,
}

impl StackError {
    pub const fn code(self) -> i32 {
        match self {
            Self::ThrCreateFailed => -2,
            Self::InitStackMetaFailed => -3,
            Self::MallocFailed => -10,
        }
    }
}

/// Failures from `thr_init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("thr_init was already called once")]
    DoubleInitialization,
    #[error("a sub-initializer inside thr_init failed")]
    ThrInitFailed,
}

impl InitError {
    pub const fn code(self) -> i32 {
        match self {
            Self::DoubleInitialization => -1,
            Self::ThrInitFailed => -4,
        }
    }
}

/// Precondition violations on mutex/condvar/semaphore/rwlock operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PrimitiveError {
    #[error("a required argument was null")]
    NullPointer,
    #[error("init called on a primitive that is already valid")]
    DoubleInitialization,
    #[error("init called on a primitive that is valid and currently in use")]
    InitOnUse,
    #[error("semaphore count was corrupted")]
    SemIllegalCount,
}

impl PrimitiveError {
    pub const fn code(self) -> i32 {
        match self {
            Self::NullPointer => -0x1000,
            Self::DoubleInitialization => -1,
            Self::InitOnUse => -5,
            Self::SemIllegalCount => -6,
        }
    }
}

/// Failures from `thr_join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("no thread with this tid is known to the library")]
    InvalidTid,
    #[error("a second join was attempted on the same tid")]
    MultipleJoins,
}

impl JoinError {
    pub const fn code(self) -> i32 {
        match self {
            Self::InvalidTid => -7,
            Self::MultipleJoins => -11,
        }
    }
}

/// Failures from `thr_yield`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum YieldError {
    #[error("no thread with this tid is known to the library")]
    InvalidTid,
    /// Defined for API completeness; the library follows the documented
    /// source behavior and never actually produces this variant (see
    /// DESIGN.md).
    #[error("target thread exists but is not runnable")]
    YieldSuspendedTid,
}

impl YieldError {
    pub const fn code(self) -> i32 {
        match self {
            Self::InvalidTid => -7,
            Self::YieldSuspendedTid => -8,
        }
    }
}
