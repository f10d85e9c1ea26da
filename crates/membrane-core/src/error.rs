//! Error types for the membrane bridge.
//!
//! Organised by where the failure is detected: host-side argument
//! validation, handle lifecycle, the engine, linear memory, and
//! configuration. [`BridgeError`] is the single error returned by public
//! operations; the others convert into it with `From`.

use std::error::Error;
use std::fmt;

use crate::address::Address;

/// Host-provided data has the wrong arity or shape.
///
/// Always detected before any scratch allocation or engine call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgumentError {
    /// A value count does not match what the object requires.
    Arity {
        /// What was being counted (e.g. "inputs", "input symbols").
        what: &'static str,
        /// Required count.
        expected: usize,
        /// Provided count.
        found: usize,
    },
    /// A nested sequence is not rectangular.
    Ragged {
        /// Index of the offending row.
        row: usize,
        /// Length of the first row.
        expected: usize,
        /// Length of the offending row.
        found: usize,
    },
    /// Two sequences that must describe the same points differ in length.
    PointCountMismatch {
        /// Points in the inputs.
        inputs: usize,
        /// Points in the labels.
        labels: usize,
    },
    /// A sequence that must be non-empty was empty.
    Empty {
        /// What was empty.
        what: &'static str,
    },
    /// A scalar parameter is out of its allowed range.
    OutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Description of the allowed range.
        reason: String,
    },
    /// A count does not fit the engine's 32-bit address space.
    TooLarge {
        /// What was being sized.
        what: &'static str,
        /// The offending size.
        len: usize,
    },
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arity {
                what,
                expected,
                found,
            } => write!(f, "expected {expected} {what}, found {found}"),
            Self::Ragged {
                row,
                expected,
                found,
            } => write!(
                f,
                "row {row} has {found} values but row 0 has {expected}; rows must be equal length"
            ),
            Self::PointCountMismatch { inputs, labels } => write!(
                f,
                "inputs describe {inputs} points but labels describe {labels}"
            ),
            Self::Empty { what } => write!(f, "{what} must not be empty"),
            Self::OutOfRange { name, reason } => write!(f, "{name} out of range: {reason}"),
            Self::TooLarge { what, len } => {
                write!(f, "{what} of length {len} exceeds the 32-bit address space")
            }
        }
    }
}

impl Error for ArgumentError {}

/// Failures of linear-memory access and the scratch allocator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryError {
    /// An access runs past the end of linear memory.
    OutOfBounds {
        /// First byte of the access.
        address: Address,
        /// Length of the access in bytes.
        len: usize,
        /// Current memory size in bytes.
        memory_size: usize,
    },
    /// An address is not a multiple of the element width.
    Misaligned {
        /// The offending address.
        address: Address,
        /// Required alignment in bytes.
        align: u32,
    },
    /// The scratch stack cannot satisfy an allocation.
    ScratchExhausted {
        /// Bytes requested, including alignment padding.
        requested: u64,
        /// Bytes still free in the scratch region.
        remaining: u32,
    },
    /// The memory refused to grow.
    GrowFailed {
        /// Pages requested.
        pages: u32,
        /// Backend-specific reason.
        reason: String,
    },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds {
                address,
                len,
                memory_size,
            } => write!(
                f,
                "access of {len} bytes at {address} exceeds memory size {memory_size}"
            ),
            Self::Misaligned { address, align } => {
                write!(f, "address {address} is not {align}-byte aligned")
            }
            Self::ScratchExhausted {
                requested,
                remaining,
            } => write!(
                f,
                "scratch exhausted: requested {requested} bytes, {remaining} bytes remaining"
            ),
            Self::GrowFailed { pages, reason } => {
                write!(f, "failed to grow memory by {pages} pages: {reason}")
            }
        }
    }
}

impl Error for MemoryError {}

/// The engine signalled a failure through its own conventions.
///
/// Surfaced to the caller unchanged and never retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// The engine trapped or aborted inside an entry point.
    Trap {
        /// Entry point that trapped.
        entry_point: &'static str,
        /// Backend-specific message.
        message: String,
    },
    /// A constructor returned the null handle.
    NullHandle {
        /// Entry point that failed.
        entry_point: &'static str,
    },
    /// An entry point that returns a buffer returned the null address.
    NullBuffer {
        /// Entry point that failed.
        entry_point: &'static str,
    },
    /// The engine rejected the call's arguments.
    Rejected {
        /// Entry point that rejected the call.
        entry_point: &'static str,
        /// Engine-provided reason.
        reason: String,
    },
    /// An entry point is missing from the engine or has the wrong type.
    Export {
        /// Export name.
        name: &'static str,
        /// Backend-specific reason.
        reason: String,
    },
    /// A string record returned by the engine is not valid.
    MalformedString {
        /// Index of the record within the buffer.
        index: usize,
        /// What was wrong with it.
        reason: String,
    },
    /// An engine-provided address could not be read or written.
    Memory(MemoryError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trap {
                entry_point,
                message,
            } => write!(f, "engine trapped in '{entry_point}': {message}"),
            Self::NullHandle { entry_point } => {
                write!(f, "'{entry_point}' returned a null handle")
            }
            Self::NullBuffer { entry_point } => {
                write!(f, "'{entry_point}' returned a null buffer")
            }
            Self::Rejected {
                entry_point,
                reason,
            } => write!(f, "'{entry_point}' rejected the call: {reason}"),
            Self::Export { name, reason } => write!(f, "engine export '{name}': {reason}"),
            Self::MalformedString { index, reason } => {
                write!(f, "malformed string record {index}: {reason}")
            }
            Self::Memory(e) => write!(f, "engine memory access failed: {e}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Memory(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors detected when validating a session configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Scratch alignment is zero, not a power of two, or too large.
    InvalidAlignment {
        /// The configured alignment.
        align: u32,
    },
    /// Scratch capacity is smaller than one alignment unit.
    ScratchTooSmall {
        /// The configured capacity in bytes.
        bytes: u32,
        /// The minimum accepted capacity.
        minimum: u32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAlignment { align } => write!(
                f,
                "scratch alignment {align} must be a power of two no larger than 4096"
            ),
            Self::ScratchTooSmall { bytes, minimum } => write!(
                f,
                "scratch capacity {bytes} bytes is below the minimum of {minimum}"
            ),
        }
    }
}

impl Error for ConfigError {}

/// Which kind of engine object a host handle refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// A kernel set.
    KernelSet,
    /// An expression.
    Expression,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KernelSet => write!(f, "kernel set"),
            Self::Expression => write!(f, "expression"),
        }
    }
}

/// Error returned by every public bridge operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeError {
    /// Host data has the wrong arity, type or shape.
    Argument(ArgumentError),
    /// The handle was destroyed (or never issued by this session).
    InvalidState {
        /// Kind of object the handle refers to.
        kind: HandleKind,
        /// The host handle value.
        handle: u64,
    },
    /// The engine signalled a failure.
    Engine(EngineError),
    /// The scratch stack ran out of space.
    ///
    /// This is a sizing error, not a transient condition: raise
    /// `SessionConfig::scratch_bytes` rather than retrying.
    ResourceExhausted {
        /// Bytes requested, including alignment padding.
        requested: u64,
        /// Bytes still free in the scratch region.
        remaining: u32,
    },
    /// The session configuration is invalid.
    Config(ConfigError),
}

impl BridgeError {
    /// The stable integer code for this error.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::from(self)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument(e) => write!(f, "invalid argument: {e}"),
            Self::InvalidState { kind, handle } => {
                write!(f, "{kind} handle {handle:#x} is destroyed or was never issued")
            }
            Self::Engine(e) => write!(f, "{e}"),
            Self::ResourceExhausted {
                requested,
                remaining,
            } => write!(
                f,
                "scratch stack exhausted: requested {requested} bytes, {remaining} remaining"
            ),
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
        }
    }
}

impl Error for BridgeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Argument(e) => Some(e),
            Self::Engine(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArgumentError> for BridgeError {
    fn from(e: ArgumentError) -> Self {
        Self::Argument(e)
    }
}

impl From<EngineError> for BridgeError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

impl From<ConfigError> for BridgeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<MemoryError> for BridgeError {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::ScratchExhausted {
                requested,
                remaining,
            } => Self::ResourceExhausted {
                requested,
                remaining,
            },
            other => Self::Engine(EngineError::Memory(other)),
        }
    }
}

impl From<MemoryError> for EngineError {
    fn from(e: MemoryError) -> Self {
        Self::Memory(e)
    }
}

/// Stable integer codes for [`BridgeError`] kinds.
///
/// `Ok` = 0, all errors are negative. Values never change between releases.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// Success.
    Ok = 0,
    /// Invalid host argument.
    Argument = -1,
    /// Handle destroyed or never issued.
    InvalidState = -2,
    /// Engine trap.
    EngineTrap = -3,
    /// Engine returned a null handle or buffer.
    EngineNull = -4,
    /// Engine rejected the call.
    EngineRejected = -5,
    /// Engine export missing or mistyped.
    EngineExport = -6,
    /// Engine returned a malformed string.
    EngineString = -7,
    /// Engine memory access failed.
    EngineMemory = -8,
    /// Scratch stack exhausted.
    ResourceExhausted = -9,
    /// Invalid configuration.
    Config = -10,
}

impl From<&BridgeError> for ErrorCode {
    fn from(e: &BridgeError) -> Self {
        match e {
            BridgeError::Argument(_) => ErrorCode::Argument,
            BridgeError::InvalidState { .. } => ErrorCode::InvalidState,
            BridgeError::Engine(engine) => match engine {
                EngineError::Trap { .. } => ErrorCode::EngineTrap,
                EngineError::NullHandle { .. } | EngineError::NullBuffer { .. } => {
                    ErrorCode::EngineNull
                }
                EngineError::Rejected { .. } => ErrorCode::EngineRejected,
                EngineError::Export { .. } => ErrorCode::EngineExport,
                EngineError::MalformedString { .. } => ErrorCode::EngineString,
                EngineError::Memory(_) => ErrorCode::EngineMemory,
            },
            BridgeError::ResourceExhausted { .. } => ErrorCode::ResourceExhausted,
            BridgeError::Config(_) => ErrorCode::Config,
        }
    }
}
