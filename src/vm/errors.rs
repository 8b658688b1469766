//! VM errors
//!
//! 错误码与宿主程序的退出/报告约定保持一致：每个变体都有固定的数字编号，
//! `Display` 输出即报告中引号内的可读名称。

use thiserror::Error;

/// VM result
pub type VMResult<T> = Result<T, VmError>;

/// Engine-level error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum VmError {
    #[error("forced exit")]
    Exit,

    #[error("assertion failed")]
    Assert,

    #[error("stack/heap collision (insufficient stack size)")]
    StackError,

    #[error("array index out of bounds")]
    Bounds,

    #[error("invalid memory access")]
    MemoryAccess,

    #[error("invalid instruction")]
    InvalidInstruction,

    #[error("stack underflow")]
    StackLow,

    #[error("heap underflow")]
    HeapLow,

    #[error("no (valid) native function callback")]
    Callback,

    #[error("native function failed")]
    Native,

    #[error("divide by zero")]
    Divide,

    #[error("go into sleepmode - code can be restarted")]
    Sleep,

    #[error("invalid state for this access")]
    InvalidState,

    #[error("out of memory")]
    Memory,

    #[error("invalid/unsupported P-code file format")]
    Format,

    #[error("file is for a newer version of the engine")]
    Version,

    #[error("native/public function is not found")]
    NotFound,

    #[error("invalid index parameter (bad entry point)")]
    Index,

    #[error("debugger cannot run")]
    Debug,

    #[error("engine not initialized (or doubly initialized)")]
    Init,

    #[error("unable to set user data field (table full)")]
    UserData,

    #[error("parameter error")]
    Params,

    #[error("general error (unknown or unspecific error)")]
    General,
}

impl VmError {
    /// All error variants, in code order.
    pub const ALL: [VmError; 23] = [
        VmError::Exit,
        VmError::Assert,
        VmError::StackError,
        VmError::Bounds,
        VmError::MemoryAccess,
        VmError::InvalidInstruction,
        VmError::StackLow,
        VmError::HeapLow,
        VmError::Callback,
        VmError::Native,
        VmError::Divide,
        VmError::Sleep,
        VmError::InvalidState,
        VmError::Memory,
        VmError::Format,
        VmError::Version,
        VmError::NotFound,
        VmError::Index,
        VmError::Debug,
        VmError::Init,
        VmError::UserData,
        VmError::Params,
        VmError::General,
    ];

    /// Numeric error code as printed in run time error reports.
    pub fn code(&self) -> i32 {
        match self {
            VmError::Exit => 1,
            VmError::Assert => 2,
            VmError::StackError => 3,
            VmError::Bounds => 4,
            VmError::MemoryAccess => 5,
            VmError::InvalidInstruction => 6,
            VmError::StackLow => 7,
            VmError::HeapLow => 8,
            VmError::Callback => 9,
            VmError::Native => 10,
            VmError::Divide => 11,
            VmError::Sleep => 12,
            VmError::InvalidState => 13,
            VmError::Memory => 16,
            VmError::Format => 17,
            VmError::Version => 18,
            VmError::NotFound => 19,
            VmError::Index => 20,
            VmError::Debug => 21,
            VmError::Init => 22,
            VmError::UserData => 23,
            VmError::Params => 25,
            VmError::General => 27,
        }
    }

    /// Map a numeric code back to an error. Zero is "no error"; a code no
    /// error carries maps to [`VmError::General`].
    pub fn from_code(code: i32) -> Option<Self> {
        if code == 0 {
            return None;
        }
        Some(
            Self::ALL
                .into_iter()
                .find(|e| e.code() == code)
                .unwrap_or(VmError::General),
        )
    }

    /// Whether this error is a deliberate interruption rather than a fault.
    #[inline]
    pub fn is_abort(&self) -> bool {
        matches!(self, VmError::Exit)
    }
}
