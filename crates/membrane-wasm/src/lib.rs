//! wasmtime backend for the membrane engine binding.
//!
//! [`WasmEngine`] instantiates a compiled engine module and maps every
//! [`EngineBinding`] entry point onto one of the module's exports. The
//! module must export its linear memory as `memory`; entry points are
//! looked up by name on each call, so a module that lacks one still
//! instantiates and only fails when that entry point is used.
//!
//! | entry point                 | export                       | wasm type                                   |
//! |-----------------------------|------------------------------|---------------------------------------------|
//! | `reserve_scratch`           | `malloc`                     | `(i32) -> i32`                              |
//! | `kernel_set_construct`      | `kernel_set_constructor`     | `(i32, i32) -> i32`                         |
//! | `kernel_set_destroy`        | `kernel_set_destroy`         | `(i32)`                                     |
//! | `expression_construct`      | `expression_constructor`     | `(i32 x 7, f64) -> i32`                     |
//! | `expression_destroy`        | `expression_destroy`         | `(i32)`                                     |
//! | `expression_get_chromosome` | `expression_get_chromosome`  | `(i32, i32) -> i32`                         |
//! | `expression_set_chromosome` | `expression_set_chromosome`  | `(i32, i32, i32)`                           |
//! | `expression_evaluate`       | `expression_evaluate`        | `(i32, i32) -> i32`                         |
//! | `expression_equations`      | `expression_equation`        | `(i32, i32) -> i32`                         |
//! | `expression_loss`           | `expression_loss`            | `(i32 x 6) -> f64`                          |
//! | `gradient_descent`          | `gradient_descent`           | `(i32 x 7) -> f64`                          |
//! | `free_f64_array`            | `delete_double_array`        | `(i32)`                                     |
//! | `free_u32_array`            | `delete_uint32_array`        | `(i32)`                                     |
//! | `free_string`               | `delete_string`              | `(i32)`                                     |
//!
//! `expression_constructor` takes, in order, inputs, outputs, rows,
//! columns, levels back, arity, the kernel set handle and the seed.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

use membrane_core::{
    Address, EngineBinding, EngineError, ExpressionParams, LinearMemory, LossArgs, MemoryError,
    RawHandle,
};
use tracing::{debug, trace};
use wasmtime::{Engine, Instance, Linker, Memory, Module, Store, WasmParams, WasmResults};

/// An instantiated engine module.
pub struct WasmEngine {
    store: Store<()>,
    instance: Instance,
    memory: Memory,
}

impl WasmEngine {
    /// Compile and instantiate a module from its binary or text form.
    ///
    /// The module may not import anything.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self, EngineError> {
        let engine = Engine::default();
        let module = Module::new(&engine, bytes).map_err(|e| EngineError::Rejected {
            entry_point: "compile",
            reason: e.to_string(),
        })?;
        Self::instantiate(&engine, &module, &Linker::new(&engine))
    }

    /// Instantiate an already compiled module, resolving its imports
    /// through `linker`.
    pub fn instantiate(
        engine: &Engine,
        module: &Module,
        linker: &Linker<()>,
    ) -> Result<Self, EngineError> {
        let mut store = Store::new(engine, ());
        let instance =
            linker
                .instantiate(&mut store, module)
                .map_err(|e| EngineError::Rejected {
                    entry_point: "instantiate",
                    reason: e.to_string(),
                })?;
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| EngineError::Export {
                name: "memory",
                reason: "module does not export a memory".to_owned(),
            })?;
        debug!(pages = memory.size(&store), "instantiated engine module");
        Ok(Self {
            store,
            instance,
            memory,
        })
    }

    /// Call any export of the module.
    ///
    /// Useful for engine-specific entry points outside [`EngineBinding`].
    pub fn invoke<P, R>(&mut self, export: &'static str, params: P) -> Result<R, EngineError>
    where
        P: WasmParams,
        R: WasmResults,
    {
        self.call(export, export, params)
    }

    fn call<P, R>(
        &mut self,
        entry_point: &'static str,
        export: &'static str,
        params: P,
    ) -> Result<R, EngineError>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let func = self
            .instance
            .get_typed_func::<P, R>(&mut self.store, export)
            .map_err(|e| EngineError::Export {
                name: export,
                reason: e.to_string(),
            })?;
        trace!(entry_point, export, "calling engine export");
        func.call(&mut self.store, params)
            .map_err(|e| EngineError::Trap {
                entry_point,
                message: e.to_string(),
            })
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("memory_bytes", &self.memory.data_size(&self.store))
            .finish_non_exhaustive()
    }
}

impl LinearMemory for WasmEngine {
    fn bytes(&self) -> &[u8] {
        self.memory.data(&self.store)
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self.memory.data_mut(&mut self.store)
    }

    fn grow(&mut self, pages: u32) -> Result<u32, MemoryError> {
        let previous = self
            .memory
            .grow(&mut self.store, u64::from(pages))
            .map_err(|e| MemoryError::GrowFailed {
                pages,
                reason: e.to_string(),
            })?;
        // 32-bit memories never exceed 65536 pages.
        u32::try_from(previous).map_err(|_| MemoryError::GrowFailed {
            pages,
            reason: format!("previous size of {previous} pages does not fit in 32 bits"),
        })
    }
}

impl EngineBinding for WasmEngine {
    fn reserve_scratch(&mut self, bytes: u32) -> Result<Address, EngineError> {
        let at: u32 = self.call("reserve_scratch", "malloc", bytes)?;
        if at == 0 {
            return Err(EngineError::NullBuffer {
                entry_point: "reserve_scratch",
            });
        }
        Ok(Address(at))
    }

    fn kernel_set_construct(
        &mut self,
        names: Address,
        count: u32,
    ) -> Result<RawHandle, EngineError> {
        let raw: u32 = self.call(
            "kernel_set_construct",
            "kernel_set_constructor",
            (names.0, count),
        )?;
        Ok(RawHandle(raw))
    }

    fn kernel_set_destroy(&mut self, kernels: RawHandle) -> Result<(), EngineError> {
        self.call("kernel_set_destroy", "kernel_set_destroy", kernels.0)
    }

    fn expression_construct(
        &mut self,
        params: &ExpressionParams,
        kernels: RawHandle,
    ) -> Result<RawHandle, EngineError> {
        let raw: u32 = self.call(
            "expression_construct",
            "expression_constructor",
            (
                params.inputs,
                params.outputs,
                params.rows,
                params.columns,
                params.levels_back,
                params.arity,
                kernels.0,
                f64::from(params.seed),
            ),
        )?;
        Ok(RawHandle(raw))
    }

    fn expression_destroy(&mut self, expression: RawHandle) -> Result<(), EngineError> {
        self.call("expression_destroy", "expression_destroy", expression.0)
    }

    fn expression_get_chromosome(
        &mut self,
        expression: RawHandle,
        length_out: Address,
    ) -> Result<Address, EngineError> {
        let at: u32 = self.call(
            "expression_get_chromosome",
            "expression_get_chromosome",
            (expression.0, length_out.0),
        )?;
        Ok(Address(at))
    }

    fn expression_set_chromosome(
        &mut self,
        expression: RawHandle,
        genes: Address,
        length: u32,
    ) -> Result<(), EngineError> {
        self.call(
            "expression_set_chromosome",
            "expression_set_chromosome",
            (expression.0, genes.0, length),
        )
    }

    fn expression_evaluate(
        &mut self,
        expression: RawHandle,
        inputs: Address,
    ) -> Result<Address, EngineError> {
        let at: u32 = self.call(
            "expression_evaluate",
            "expression_evaluate",
            (expression.0, inputs.0),
        )?;
        Ok(Address(at))
    }

    fn expression_equations(
        &mut self,
        expression: RawHandle,
        symbols: Address,
    ) -> Result<Address, EngineError> {
        let at: u32 = self.call(
            "expression_equations",
            "expression_equation",
            (expression.0, symbols.0),
        )?;
        Ok(Address(at))
    }

    fn expression_loss(
        &mut self,
        expression: RawHandle,
        args: LossArgs,
    ) -> Result<f64, EngineError> {
        self.call(
            "expression_loss",
            "expression_loss",
            (
                expression.0,
                args.inputs.0,
                args.labels.0,
                args.points,
                args.constants.0,
                args.constant_count,
            ),
        )
    }

    fn gradient_descent(
        &mut self,
        expression: RawHandle,
        max_steps: u32,
        args: LossArgs,
    ) -> Result<f64, EngineError> {
        self.call(
            "gradient_descent",
            "gradient_descent",
            (
                expression.0,
                max_steps,
                args.inputs.0,
                args.labels.0,
                args.points,
                args.constants.0,
                args.constant_count,
            ),
        )
    }

    fn free_f64_array(&mut self, array: Address) -> Result<(), EngineError> {
        self.call("free_f64_array", "delete_double_array", array.0)
    }

    fn free_u32_array(&mut self, array: Address) -> Result<(), EngineError> {
        self.call("free_u32_array", "delete_uint32_array", array.0)
    }

    fn free_string(&mut self, string: Address) -> Result<(), EngineError> {
        self.call("free_string", "delete_string", string.0)
    }
}
