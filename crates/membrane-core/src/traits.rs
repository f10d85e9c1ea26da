//! The two seams between the host and the engine.
//!
//! [`LinearMemory`] exposes the engine's flat byte store. [`EngineBinding`]
//! is the fixed set of address-based entry points. Backends (a wasmtime
//! instance, the in-process mock used by tests) implement both.

use crate::address::{Address, RawHandle};
use crate::error::{EngineError, MemoryError};
use crate::params::{ExpressionParams, LossArgs};

/// Size of one linear-memory page in bytes.
pub const PAGE_SIZE: u32 = 65_536;

/// The engine's flat, byte-addressable store.
///
/// Byte slices returned here are only valid until the next `&mut`
/// operation on the memory or its owner; in particular [`grow`] may move
/// the backing allocation. Callers re-fetch the slice for every access.
///
/// [`grow`]: LinearMemory::grow
pub trait LinearMemory {
    /// The whole memory as bytes.
    fn bytes(&self) -> &[u8];

    /// The whole memory as mutable bytes.
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Grow the memory by `pages` pages of [`PAGE_SIZE`] bytes.
    ///
    /// Returns the previous size in pages.
    fn grow(&mut self, pages: u32) -> Result<u32, MemoryError>;

    /// Current size in bytes.
    fn size(&self) -> usize {
        self.bytes().len()
    }
}

/// Address-based entry points exposed by the engine.
///
/// Every buffer an entry point returns is engine-heap memory owned by the
/// caller until it is handed back to the matching `free_*` entry point.
/// Scratch addresses passed in remain owned by the caller; the engine
/// copies what it needs before returning.
pub trait EngineBinding: LinearMemory {
    /// Reserve `bytes` of engine memory for the host's scratch stack.
    ///
    /// Called once per session. The returned block is never freed while
    /// the session lives.
    fn reserve_scratch(&mut self, bytes: u32) -> Result<Address, EngineError>;

    /// Build a kernel set from `count` length-framed kernel names at `names`.
    fn kernel_set_construct(&mut self, names: Address, count: u32)
        -> Result<RawHandle, EngineError>;

    /// Destroy a kernel set.
    fn kernel_set_destroy(&mut self, kernels: RawHandle) -> Result<(), EngineError>;

    /// Build an expression over a kernel set.
    fn expression_construct(
        &mut self,
        params: &ExpressionParams,
        kernels: RawHandle,
    ) -> Result<RawHandle, EngineError>;

    /// Destroy an expression.
    fn expression_destroy(&mut self, expression: RawHandle) -> Result<(), EngineError>;

    /// Export the chromosome as an engine-heap `u32` array.
    ///
    /// The array length is written as a `u32` to `length_out`. The array
    /// must be released with [`free_u32_array`](Self::free_u32_array).
    fn expression_get_chromosome(
        &mut self,
        expression: RawHandle,
        length_out: Address,
    ) -> Result<Address, EngineError>;

    /// Replace the chromosome with `length` genes read from `genes`.
    fn expression_set_chromosome(
        &mut self,
        expression: RawHandle,
        genes: Address,
        length: u32,
    ) -> Result<(), EngineError>;

    /// Evaluate one point whose input values start at `inputs`.
    ///
    /// Returns an engine-heap `f64` array with one value per output, to be
    /// released with [`free_f64_array`](Self::free_f64_array).
    fn expression_evaluate(
        &mut self,
        expression: RawHandle,
        inputs: Address,
    ) -> Result<Address, EngineError>;

    /// Render one equation per output using the length-framed input
    /// symbols at `symbols`.
    ///
    /// Returns an engine-heap buffer of length-framed strings, to be
    /// released with [`free_string`](Self::free_string).
    fn expression_equations(
        &mut self,
        expression: RawHandle,
        symbols: Address,
    ) -> Result<Address, EngineError>;

    /// Mean squared error of the expression over a data set.
    fn expression_loss(&mut self, expression: RawHandle, args: LossArgs)
        -> Result<f64, EngineError>;

    /// Optimise the constants in place for at most `max_steps` steps.
    ///
    /// The constants buffer at `args.constants` is overwritten with the
    /// improved values. Returns the loss after optimisation.
    fn gradient_descent(
        &mut self,
        expression: RawHandle,
        max_steps: u32,
        args: LossArgs,
    ) -> Result<f64, EngineError>;

    /// Release an engine-heap `f64` array.
    fn free_f64_array(&mut self, array: Address) -> Result<(), EngineError>;

    /// Release an engine-heap `u32` array.
    fn free_u32_array(&mut self, array: Address) -> Result<(), EngineError>;

    /// Release an engine-heap string buffer.
    fn free_string(&mut self, string: Address) -> Result<(), EngineError>;
}

impl<T: LinearMemory + ?Sized> LinearMemory for &mut T {
    fn bytes(&self) -> &[u8] {
        (**self).bytes()
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        (**self).bytes_mut()
    }

    fn grow(&mut self, pages: u32) -> Result<u32, MemoryError> {
        (**self).grow(pages)
    }

    fn size(&self) -> usize {
        (**self).size()
    }
}

/// Lets a session borrow an engine instead of owning it.
impl<T: EngineBinding + ?Sized> EngineBinding for &mut T {
    fn reserve_scratch(&mut self, bytes: u32) -> Result<Address, EngineError> {
        (**self).reserve_scratch(bytes)
    }

    fn kernel_set_construct(
        &mut self,
        names: Address,
        count: u32,
    ) -> Result<RawHandle, EngineError> {
        (**self).kernel_set_construct(names, count)
    }

    fn kernel_set_destroy(&mut self, kernels: RawHandle) -> Result<(), EngineError> {
        (**self).kernel_set_destroy(kernels)
    }

    fn expression_construct(
        &mut self,
        params: &ExpressionParams,
        kernels: RawHandle,
    ) -> Result<RawHandle, EngineError> {
        (**self).expression_construct(params, kernels)
    }

    fn expression_destroy(&mut self, expression: RawHandle) -> Result<(), EngineError> {
        (**self).expression_destroy(expression)
    }

    fn expression_get_chromosome(
        &mut self,
        expression: RawHandle,
        length_out: Address,
    ) -> Result<Address, EngineError> {
        (**self).expression_get_chromosome(expression, length_out)
    }

    fn expression_set_chromosome(
        &mut self,
        expression: RawHandle,
        genes: Address,
        length: u32,
    ) -> Result<(), EngineError> {
        (**self).expression_set_chromosome(expression, genes, length)
    }

    fn expression_evaluate(
        &mut self,
        expression: RawHandle,
        inputs: Address,
    ) -> Result<Address, EngineError> {
        (**self).expression_evaluate(expression, inputs)
    }

    fn expression_equations(
        &mut self,
        expression: RawHandle,
        symbols: Address,
    ) -> Result<Address, EngineError> {
        (**self).expression_equations(expression, symbols)
    }

    fn expression_loss(&mut self, expression: RawHandle, args: LossArgs) -> Result<f64, EngineError> {
        (**self).expression_loss(expression, args)
    }

    fn gradient_descent(
        &mut self,
        expression: RawHandle,
        max_steps: u32,
        args: LossArgs,
    ) -> Result<f64, EngineError> {
        (**self).gradient_descent(expression, max_steps, args)
    }

    fn free_f64_array(&mut self, array: Address) -> Result<(), EngineError> {
        (**self).free_f64_array(array)
    }

    fn free_u32_array(&mut self, array: Address) -> Result<(), EngineError> {
        (**self).free_u32_array(array)
    }

    fn free_string(&mut self, string: Address) -> Result<(), EngineError> {
        (**self).free_string(string)
    }
}
