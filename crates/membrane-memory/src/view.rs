//! Fixed-width element views over linear-memory bytes.
//!
//! A view is a borrow of the memory's byte slice tagged with an element
//! type. Callers pass byte addresses and element counts; the view checks
//! bounds and element alignment and converts little-endian bytes.

use std::marker::PhantomData;
use std::ops::Range;

use membrane_core::{Address, LinearMemory, MemoryError};

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u32 {}
    impl Sealed for f64 {}
}

/// An element type the engine stores in linear memory.
///
/// Implemented for the three widths the engine uses: `u8` for string
/// bytes, `u32` for unsigned-integer arrays, `f64` for floating-point
/// arrays.
pub trait Element: Copy + sealed::Sealed {
    /// Width in bytes.
    const WIDTH: u32;

    /// Decode from exactly `WIDTH` little-endian bytes.
    fn decode(bytes: &[u8]) -> Self;

    /// Encode into exactly `WIDTH` little-endian bytes.
    fn encode(self, out: &mut [u8]);
}

impl Element for u8 {
    const WIDTH: u32 = 1;

    fn decode(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn encode(self, out: &mut [u8]) {
        out[0] = self;
    }
}

impl Element for u32 {
    const WIDTH: u32 = 4;

    fn decode(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        u32::from_le_bytes(buf)
    }

    fn encode(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }
}

impl Element for f64 {
    const WIDTH: u32 = 8;

    fn decode(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        f64::from_le_bytes(buf)
    }

    fn encode(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }
}

/// Byte range of `count` elements of type `T` starting at `address`.
fn element_range<T: Element>(
    address: Address,
    count: usize,
    memory_size: usize,
) -> Result<Range<usize>, MemoryError> {
    if !address.is_aligned(T::WIDTH) {
        return Err(MemoryError::Misaligned {
            address,
            align: T::WIDTH,
        });
    }
    let out_of_bounds = |len: usize| MemoryError::OutOfBounds {
        address,
        len,
        memory_size,
    };
    let len = count
        .checked_mul(T::WIDTH as usize)
        .ok_or_else(|| out_of_bounds(usize::MAX))?;
    let start = address.as_usize();
    let end = start.checked_add(len).ok_or_else(|| out_of_bounds(len))?;
    if end > memory_size {
        return Err(out_of_bounds(len));
    }
    Ok(start..end)
}

/// Read-only view of linear memory as elements of type `T`.
pub struct TypedView<'m, T: Element> {
    bytes: &'m [u8],
    _element: PhantomData<T>,
}

impl<'m, T: Element> TypedView<'m, T> {
    /// View `bytes` as elements of type `T`.
    pub fn new(bytes: &'m [u8]) -> Self {
        Self {
            bytes,
            _element: PhantomData,
        }
    }

    /// Copy `count` elements starting at byte `address`.
    pub fn read(&self, address: Address, count: usize) -> Result<Vec<T>, MemoryError> {
        let range = element_range::<T>(address, count, self.bytes.len())?;
        Ok(self.bytes[range]
            .chunks_exact(T::WIDTH as usize)
            .map(T::decode)
            .collect())
    }

    /// Read the single element at byte `address`.
    pub fn get(&self, address: Address) -> Result<T, MemoryError> {
        let range = element_range::<T>(address, 1, self.bytes.len())?;
        Ok(T::decode(&self.bytes[range]))
    }

    /// Size of the viewed memory in bytes.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

/// Mutable view of linear memory as elements of type `T`.
pub struct TypedViewMut<'m, T: Element> {
    bytes: &'m mut [u8],
    _element: PhantomData<T>,
}

impl<'m, T: Element> TypedViewMut<'m, T> {
    /// View `bytes` mutably as elements of type `T`.
    pub fn new(bytes: &'m mut [u8]) -> Self {
        Self {
            bytes,
            _element: PhantomData,
        }
    }

    /// Write `values` contiguously starting at byte `address`.
    ///
    /// Nothing is written if any part of the range is invalid.
    pub fn write(&mut self, address: Address, values: &[T]) -> Result<(), MemoryError> {
        let range = element_range::<T>(address, values.len(), self.bytes.len())?;
        for (chunk, &value) in self.bytes[range]
            .chunks_exact_mut(T::WIDTH as usize)
            .zip(values)
        {
            value.encode(chunk);
        }
        Ok(())
    }

    /// Write a single element at byte `address`.
    pub fn set(&mut self, address: Address, value: T) -> Result<(), MemoryError> {
        self.write(address, std::slice::from_ref(&value))
    }

    /// Copy `count` elements starting at byte `address`.
    pub fn read(&self, address: Address, count: usize) -> Result<Vec<T>, MemoryError> {
        TypedView::<T>::new(&*self.bytes).read(address, count)
    }
}

/// Convenience constructors for views over any [`LinearMemory`].
///
/// Each call borrows the memory afresh, which is the only sanctioned way
/// to obtain a view: the borrow ends before the memory can grow.
pub trait MemoryExt: LinearMemory {
    /// A read-only view of the memory as `T` elements.
    fn view<T: Element>(&self) -> TypedView<'_, T> {
        TypedView::new(self.bytes())
    }

    /// A mutable view of the memory as `T` elements.
    fn view_mut<T: Element>(&mut self) -> TypedViewMut<'_, T> {
        TypedViewMut::new(self.bytes_mut())
    }
}

impl<M: LinearMemory + ?Sized> MemoryExt for M {}
