//! Scratch stack for transient call arguments and results.
//!
//! [`ScratchStack`] is a bump allocator over a sub-region of linear memory
//! that the engine reserved for the host. It only tracks the cursor; the
//! bytes themselves are written through typed views. Allocations are
//! released in LIFO order by restoring a [`Checkpoint`], never one by one.
//!
//! Public operations use [`ScratchStack::frame`], which saves on entry and
//! restores on drop, so scratch is reclaimed on every exit path including
//! early `?` returns.

use std::ops::{Deref, DerefMut};

use membrane_core::{Address, ConfigError, MemoryError};
use tracing::trace;

/// Largest accepted scratch alignment in bytes.
pub const MAX_ALIGN: u32 = 4096;

/// Opaque marker of the scratch cursor at a point in time.
///
/// Only useful for passing back to [`ScratchStack::restore`]. Two
/// checkpoints compare equal when they record the same cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub struct Checkpoint(u32);

/// Bump allocator over the engine's scratch region.
///
/// The region spans `[base, base + capacity)`. Every allocation starts at
/// a multiple of the configured alignment. Running out of space is a
/// sizing error reported as [`MemoryError::ScratchExhausted`].
///
/// The cursor is shared mutable state: save/alloc/restore sequences must
/// nest strictly. `&mut self` on every mutating method makes interleaving
/// from independent call sequences impossible without external locking.
#[derive(Debug)]
pub struct ScratchStack {
    base: u32,
    end: u32,
    align: u32,
    cursor: u32,
    high_water: u32,
}

impl ScratchStack {
    /// Create a stack over `capacity` bytes starting at `base`.
    ///
    /// `align` must be a power of two no larger than [`MAX_ALIGN`]. A
    /// region that would extend past the 32-bit address space is clamped.
    pub fn new(base: Address, capacity: u32, align: u32) -> Result<Self, ConfigError> {
        if !align.is_power_of_two() || align > MAX_ALIGN {
            return Err(ConfigError::InvalidAlignment { align });
        }
        Ok(Self {
            base: base.0,
            end: base.0.saturating_add(capacity),
            align,
            cursor: base.0,
            high_water: base.0,
        })
    }

    /// Record the current cursor.
    pub fn save(&self) -> Checkpoint {
        Checkpoint(self.cursor)
    }

    /// Allocate `size` bytes and return the starting address.
    ///
    /// The start is rounded up to the stack's alignment. The memory is not
    /// cleared; callers write every byte they pass to the engine.
    pub fn alloc(&mut self, size: u32) -> Result<Address, MemoryError> {
        let mask = u64::from(self.align) - 1;
        let start = (u64::from(self.cursor) + mask) & !mask;
        let new_cursor = start + u64::from(size);
        if new_cursor > u64::from(self.end) {
            return Err(MemoryError::ScratchExhausted {
                requested: new_cursor - u64::from(self.cursor),
                remaining: self.end - self.cursor,
            });
        }
        // Both values are bounded by `end`, which is a u32.
        self.cursor = new_cursor as u32;
        if self.cursor > self.high_water {
            self.high_water = self.cursor;
            trace!(used = self.used(), capacity = self.capacity(), "scratch high water");
        }
        Ok(Address(start as u32))
    }

    /// Reset the cursor to `checkpoint`.
    ///
    /// Every address allocated after the checkpoint becomes invalid.
    /// Restoring a checkpoint taken after the current cursor means frames
    /// were released out of order.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        debug_assert!(
            checkpoint.0 >= self.base && checkpoint.0 <= self.cursor,
            "scratch checkpoint {:#x} restored out of LIFO order (cursor {:#x})",
            checkpoint.0,
            self.cursor
        );
        self.cursor = checkpoint.0;
    }

    /// Open a frame that restores the current cursor when dropped.
    pub fn frame(&mut self) -> ScratchFrame<'_> {
        let checkpoint = self.save();
        ScratchFrame {
            stack: self,
            checkpoint,
        }
    }

    /// First address of the scratch region.
    pub fn base(&self) -> Address {
        Address(self.base)
    }

    /// Region size in bytes.
    pub fn capacity(&self) -> u32 {
        self.end - self.base
    }

    /// Bytes between the base and the cursor, including padding.
    pub fn used(&self) -> u32 {
        self.cursor - self.base
    }

    /// Bytes still available before alignment padding.
    pub fn remaining(&self) -> u32 {
        self.end - self.cursor
    }

    /// Largest `used()` observed since creation.
    pub fn high_water(&self) -> u32 {
        self.high_water - self.base
    }

    /// Allocation alignment in bytes.
    pub fn align(&self) -> u32 {
        self.align
    }
}

/// Scoped scratch allocation.
///
/// Dereferences to the underlying [`ScratchStack`]. Dropping the frame
/// restores the cursor saved when it was opened. Frames nest: opening a
/// frame on a frame borrows it mutably, so inner frames always close
/// first.
#[must_use]
pub struct ScratchFrame<'a> {
    stack: &'a mut ScratchStack,
    checkpoint: Checkpoint,
}

impl ScratchFrame<'_> {
    /// The checkpoint this frame restores on drop.
    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }
}

impl Deref for ScratchFrame<'_> {
    type Target = ScratchStack;

    fn deref(&self) -> &ScratchStack {
        self.stack
    }
}

impl DerefMut for ScratchFrame<'_> {
    fn deref_mut(&mut self) -> &mut ScratchStack {
        self.stack
    }
}

impl Drop for ScratchFrame<'_> {
    fn drop(&mut self) {
        self.stack.restore(self.checkpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(capacity: u32) -> ScratchStack {
        ScratchStack::new(Address(1024), capacity, 16).unwrap()
    }

    #[test]
    fn alloc_advances_cursor() {
        let mut s = stack(256);
        let a = s.alloc(8).unwrap();
        assert_eq!(a, Address(1024));
        assert_eq!(s.used(), 8);
        let b = s.alloc(8).unwrap();
        assert_eq!(b, Address(1040));
        assert_eq!(s.used(), 24);
    }

    #[test]
    fn allocations_are_aligned() {
        let mut s = stack(256);
        s.alloc(3).unwrap();
        for size in [1, 5, 17, 8] {
            let a = s.alloc(size).unwrap();
            assert!(a.is_aligned(16), "{a} not aligned");
        }
    }

    #[test]
    fn unaligned_base_is_rounded_up() {
        let mut s = ScratchStack::new(Address(1001), 256, 8).unwrap();
        assert_eq!(s.alloc(4).unwrap(), Address(1008));
    }

    #[test]
    fn restore_releases_everything_after_checkpoint() {
        let mut s = stack(256);
        s.alloc(16).unwrap();
        let c = s.save();
        s.alloc(64).unwrap();
        s.alloc(32).unwrap();
        s.restore(c);
        assert_eq!(s.used(), 16);
        assert_eq!(s.save(), c);
    }

    #[test]
    fn exhaustion_reports_request_and_remaining() {
        let mut s = stack(32);
        s.alloc(20).unwrap();
        let err = s.alloc(8).unwrap_err();
        // Padding from 20 to 32 counts towards the request.
        assert_eq!(
            err,
            MemoryError::ScratchExhausted {
                requested: 20,
                remaining: 12
            }
        );
        // A failed alloc leaves the cursor untouched.
        assert_eq!(s.used(), 20);
    }

    #[test]
    fn exact_fit_succeeds() {
        let mut s = stack(32);
        s.alloc(32).unwrap();
        assert_eq!(s.remaining(), 0);
        assert!(s.alloc(1).is_err());
    }

    #[test]
    fn huge_request_does_not_overflow() {
        let mut s = ScratchStack::new(Address(u32::MAX - 64), 64, 16).unwrap();
        assert!(s.alloc(u32::MAX).is_err());
    }

    #[test]
    fn frame_restores_on_drop() {
        let mut s = stack(256);
        let before = s.save();
        {
            let mut frame = s.frame();
            frame.alloc(100).unwrap();
            assert_eq!(frame.used(), 100);
        }
        assert_eq!(s.save(), before);
        assert_eq!(s.high_water(), 100);
    }

    #[test]
    fn frame_restores_on_early_return() {
        fn fails(stack: &mut ScratchStack) -> Result<(), MemoryError> {
            let mut frame = stack.frame();
            frame.alloc(64)?;
            frame.alloc(1024)?;
            Ok(())
        }
        let mut s = stack(128);
        assert!(fails(&mut s).is_err());
        assert_eq!(s.used(), 0);
    }

    #[test]
    fn nested_frames_restore_in_order() {
        let mut s = stack(256);
        let mut outer = s.frame();
        outer.alloc(16).unwrap();
        {
            let mut inner = outer.frame();
            inner.alloc(32).unwrap();
            assert_eq!(inner.used(), 48);
        }
        assert_eq!(outer.used(), 16);
        drop(outer);
        assert_eq!(s.used(), 0);
    }

    #[test]
    fn invalid_alignment_is_rejected() {
        for align in [0, 3, 24, MAX_ALIGN * 2] {
            assert_eq!(
                ScratchStack::new(Address(0), 64, align).unwrap_err(),
                ConfigError::InvalidAlignment { align }
            );
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn save_alloc_restore_is_idempotent(
                prefix in proptest::collection::vec(0u32..64, 0..8),
                sizes in proptest::collection::vec(0u32..128, 0..16),
            ) {
                let mut s = stack(4096);
                for size in prefix {
                    s.alloc(size).unwrap();
                }
                let first = s.save();
                for size in sizes {
                    s.alloc(size).unwrap();
                }
                s.restore(first);
                prop_assert_eq!(s.save(), first);
            }

            #[test]
            fn allocations_never_overlap(
                sizes in proptest::collection::vec(1u32..64, 1..32),
            ) {
                let mut s = stack(4096);
                let mut spans: Vec<(u32, u32)> = Vec::new();
                for size in sizes {
                    let a = s.alloc(size).unwrap();
                    for &(start, len) in &spans {
                        prop_assert!(a.0 >= start + len || a.0 + size <= start);
                    }
                    spans.push((a.0, size));
                }
            }
        }
    }
}
