//! Host-side identifiers for engine objects.

use std::fmt;

/// Identifies a kernel set owned by a [`Session`](crate::Session).
///
/// Wraps a generation-checked key, so an ID outlives the object it names
/// without ever resolving to another object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KernelSetId(pub(crate) u64);

/// Identifies an expression owned by a [`Session`](crate::Session).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExpressionId(pub(crate) u64);

impl KernelSetId {
    /// The raw key, for logging and error reporting.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl ExpressionId {
    /// The raw key, for logging and error reporting.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for KernelSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kernels#{:x}", self.0)
    }
}

impl fmt::Display for ExpressionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expr#{:x}", self.0)
    }
}
