//! Linear-memory addresses and raw engine handles.

use std::fmt;

/// A byte offset into the engine's linear memory.
///
/// Address `0` is reserved as the null address: entry points that return
/// a buffer use it to signal "no buffer", and optional buffer arguments
/// (such as an empty constants array) are passed as null.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub u32);

impl Address {
    /// The null address.
    pub const NULL: Address = Address(0);

    /// Whether this is the null address.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The address as a `usize` index into a byte slice.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Offset this address by `bytes`, returning `None` on overflow.
    pub fn checked_add(self, bytes: u32) -> Option<Address> {
        self.0.checked_add(bytes).map(Address)
    }

    /// Whether this address is a multiple of `align`.
    ///
    /// `align` must be non-zero.
    pub fn is_aligned(self, align: u32) -> bool {
        self.0 % align == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<u32> for Address {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// The engine's own reference to an object it owns.
///
/// A raw handle is whatever integer the engine's constructor returned,
/// typically the object's address in linear memory. The host never
/// dereferences it; it only passes it back to entry points. Host code
/// should hold generation-checked IDs instead of raw handles so that a
/// destroyed object is detectably stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(pub u32);

impl RawHandle {
    /// Whether the engine returned its null handle (construction failed).
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_address() {
        assert!(Address::NULL.is_null());
        assert!(!Address(16).is_null());
    }

    #[test]
    fn checked_add_overflow() {
        assert_eq!(Address(8).checked_add(8), Some(Address(16)));
        assert_eq!(Address(u32::MAX).checked_add(1), None);
    }

    #[test]
    fn alignment() {
        assert!(Address(16).is_aligned(8));
        assert!(!Address(12).is_aligned(8));
        assert!(Address(12).is_aligned(4));
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(Address(255).to_string(), "0x000000ff");
        assert_eq!(RawHandle(16).to_string(), "0x00000010");
    }
}
