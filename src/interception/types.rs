/*!
 * Interception Types
 * Registration records, techniques and error types for API interception
 */

use crate::core::data_structures::InlineString;
use crate::core::types::{Address, TechniqueCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;
use thiserror::Error;

/// Interception operation result
///
/// # Must Use
/// Interception setup can fail and must be handled before the target resumes
#[must_use = "interception operations can fail and must be handled"]
pub type InterceptionResult<T> = Result<T, InterceptionError>;

/// Buffer decoding result
#[must_use = "buffer validation can fail and must be handled"]
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors raised while registering or serializing interceptions
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum InterceptionError {
    #[error("Invalid interception for {module}!{function}: {reason}")]
    InvalidRecord {
        module: String,
        function: String,
        reason: String,
    },

    #[error("Module {module} is registered for unload and cannot also be patched")]
    UnloadConflict { module: String },

    #[error("Config buffer too small: expected {required} bytes, got {actual} bytes")]
    BufferTooSmall { required: usize, actual: usize },

    #[error("Failed to transfer config to target: {0}")]
    Transfer(String),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
}

/// Validation failures while walking a serialized interception buffer
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum BufferError {
    #[error("Truncated buffer: {needed} bytes needed at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Buffer of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("Record at offset {offset} is not aligned")]
    Misaligned { offset: usize },

    #[error("Record at offset {offset} declares invalid length {length}")]
    InvalidRecordLength { offset: usize, length: u64 },

    #[error("Offset {value} in record at {offset} is outside [{min}, {max}]")]
    OffsetOutOfBounds {
        offset: usize,
        value: u64,
        min: usize,
        max: usize,
    },

    #[error("Missing string terminator in record at offset {offset}")]
    MissingTerminator { offset: usize },

    #[error("Invalid string encoding in record at offset {offset}")]
    InvalidString { offset: usize },

    #[error("Unknown interception technique {code} at offset {offset}")]
    UnknownTechnique { offset: usize, code: TechniqueCode },

    #[error("Function record at offset {offset} has {reason}")]
    InvalidInterceptor { offset: usize, reason: String },

    #[error("Dll group at offset {offset} declares {declared} functions but holds {found}")]
    FunctionCountMismatch {
        offset: usize,
        declared: u32,
        found: u32,
    },

    #[error("Nonzero reserved field at offset {offset}")]
    ReservedNotZero { offset: usize },
}

/// How a function gets redirected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum InterceptionType {
    /// System service stub patched from the broker
    ServiceCall = 1,
    /// Export address table patch
    Eat = 2,
    /// Code redirection at the function entry
    Sidestep = 3,
    /// Code redirection that falls back when the entry is unsuitable
    SmartSidestep = 4,
    /// Unmap the module from the target before it runs
    UnloadModule = 5,
}

impl InterceptionType {
    #[inline]
    pub const fn code(self) -> TechniqueCode {
        self as TechniqueCode
    }

    pub const fn from_code(code: TechniqueCode) -> Option<Self> {
        match code {
            1 => Some(InterceptionType::ServiceCall),
            2 => Some(InterceptionType::Eat),
            3 => Some(InterceptionType::Sidestep),
            4 => Some(InterceptionType::SmartSidestep),
            5 => Some(InterceptionType::UnloadModule),
            _ => None,
        }
    }
}

/// Replacement entry point: a resolved address or a symbol exported by the
/// target's main module, never both
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interceptor {
    Address(NonZeroU64),
    Symbol(InlineString),
}

impl Interceptor {
    /// Address form; zero is the symbolic-form sentinel and is rejected
    pub fn address(address: Address) -> Option<Self> {
        NonZeroU64::new(address).map(Interceptor::Address)
    }

    /// Symbol form; empty names mean "use the address form" and are rejected,
    /// as are names with an embedded nul (the wire form is nul terminated)
    pub fn symbol(name: impl Into<InlineString>) -> Option<Self> {
        let name = name.into();
        (!name.is_empty() && !name.contains('\0')).then_some(Interceptor::Symbol(name))
    }

    /// Address written to the buffer (0 for symbols)
    pub fn wire_address(&self) -> Address {
        match self {
            Interceptor::Address(address) => address.get(),
            Interceptor::Symbol(_) => 0,
        }
    }

    /// Name written to the buffer (empty for addresses)
    pub fn wire_name(&self) -> &str {
        match self {
            Interceptor::Address(_) => "",
            Interceptor::Symbol(name) => name.as_str(),
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Interceptor::Symbol(_))
    }
}

impl fmt::Display for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interceptor::Address(address) => write!(f, "0x{:x}", address.get()),
            Interceptor::Symbol(name) => f.write_str(name),
        }
    }
}

/// One (module, function, technique, interceptor) registration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterceptionRecord {
    pub module: InlineString,
    pub function: InlineString,
    pub technique: InterceptionType,
    pub interceptor: Interceptor,
}

impl InterceptionRecord {
    pub fn new(
        module: impl Into<InlineString>,
        function: impl Into<InlineString>,
        technique: InterceptionType,
        interceptor: Interceptor,
    ) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            technique,
            interceptor,
        }
    }
}

impl fmt::Display for InterceptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}!{} ({:?} -> {})",
            self.module, self.function, self.technique, self.interceptor
        )
    }
}

/// Where an interception is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Applied by the broker, never serialized
    Cold,
    /// Serialized for the target to apply before it runs untrusted code
    Hot,
}

/// Outcome of pushing interceptions into a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterceptionSummary {
    pub dll_groups: usize,
    pub hot_functions: usize,
    pub cold_functions: usize,
    pub bytes_written: usize,
    /// Where the buffer landed in the target; `None` when nothing was hot
    pub remote_address: Option<Address>,
}
