//! In-process engine backed by a growable byte vector.
//!
//! The mock keeps its objects host-side and only uses linear memory for
//! what crosses the boundary: scratch, argument buffers and returned
//! result buffers. Its stand-in semantics are deliberately trivial:
//!
//! - evaluate: output `j` is the sum of the inputs plus `j`;
//! - equations: output `j` is `(a+b+...)` followed by `+j` when `j > 0`;
//! - loss: mean squared error of that model, with constants appended to
//!   the data inputs;
//! - gradient descent: plain steps on the constants, written back in place.
//!
//! The heap is a bump allocator that never reuses an address, so a double
//! free or a free of a foreign address is always detected.

use indexmap::IndexMap;
use membrane_core::{
    Address, EngineBinding, EngineError, ExpressionParams, LinearMemory, LossArgs, MemoryError,
    RawHandle, PAGE_SIZE,
};
use membrane_memory::MemoryExt;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::fixtures::KNOWN_KERNELS;

/// First heap address; everything below stays zero.
pub const HEAP_START: u32 = 16;

/// Default memory limit in pages (16 MiB).
pub const DEFAULT_MAX_PAGES: u32 = 256;

const HEAP_ALIGN: u32 = 16;

/// What a live heap block was allocated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    /// The host's scratch region.
    Scratch,
    /// A returned `f64` array.
    F64Array,
    /// A returned `u32` array.
    U32Array,
    /// A returned string buffer.
    String,
}

impl BlockKind {
    fn is_result(self) -> bool {
        !matches!(self, Self::Scratch)
    }
}

#[derive(Debug)]
struct Block {
    kind: BlockKind,
}

#[derive(Debug)]
enum Object {
    KernelSet {
        names: Vec<String>,
    },
    Expression {
        params: ExpressionParams,
        chromosome: Vec<u32>,
    },
}

/// Mock engine with allocation accounting and failure injection.
pub struct MockEngine {
    memory: Vec<u8>,
    max_pages: u32,
    heap_top: u32,
    blocks: IndexMap<u32, Block>,
    objects: IndexMap<u32, Object>,
    next_handle: u32,
    calls: IndexMap<&'static str, usize>,
    fail_after: IndexMap<&'static str, usize>,
    null_results: Vec<&'static str>,
    peak_live_buffers: usize,
}

impl MockEngine {
    /// One page of memory, growable to [`DEFAULT_MAX_PAGES`].
    pub fn new() -> Self {
        Self::with_max_pages(DEFAULT_MAX_PAGES)
    }

    /// One page of memory, growable to `max_pages`.
    pub fn with_max_pages(max_pages: u32) -> Self {
        Self {
            memory: vec![0; PAGE_SIZE as usize],
            max_pages,
            heap_top: HEAP_START,
            blocks: IndexMap::new(),
            objects: IndexMap::new(),
            next_handle: 1,
            calls: IndexMap::new(),
            fail_after: IndexMap::new(),
            null_results: Vec::new(),
            peak_live_buffers: 0,
        }
    }

    /// Let `entry_point` succeed `successes` more times, then trap on
    /// every later call.
    pub fn fail_after(&mut self, entry_point: &'static str, successes: usize) {
        self.fail_after.insert(entry_point, successes);
    }

    /// Trap on the next and every later call to `entry_point`.
    pub fn fail_next(&mut self, entry_point: &'static str) {
        self.fail_after(entry_point, 0);
    }

    /// Make `entry_point` return a null handle or buffer.
    pub fn return_null(&mut self, entry_point: &'static str) {
        self.null_results.push(entry_point);
    }

    /// Register an expression directly, bypassing kernel sets.
    pub fn insert_expression(&mut self, params: ExpressionParams) -> RawHandle {
        let chromosome = Self::random_chromosome(&params);
        self.insert_object(Object::Expression { params, chromosome })
    }

    /// How many times `entry_point` was called, including failed calls.
    pub fn calls(&self, entry_point: &str) -> usize {
        self.calls.get(entry_point).copied().unwrap_or(0)
    }

    /// Live heap blocks of every kind, scratch included.
    pub fn live_allocations(&self) -> usize {
        self.blocks.len()
    }

    /// Live result buffers returned by entry points and not yet freed.
    pub fn live_buffers(&self) -> usize {
        self.blocks.values().filter(|b| b.kind.is_result()).count()
    }

    /// Largest number of result buffers live at once.
    pub fn peak_live_buffers(&self) -> usize {
        self.peak_live_buffers
    }

    /// Live kernel sets and expressions.
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Whether `handle` names a live object.
    pub fn is_live(&self, handle: RawHandle) -> bool {
        self.objects.contains_key(&handle.0)
    }

    /// Kernel names of a live kernel set.
    pub fn kernel_names(&self, handle: RawHandle) -> Option<&[String]> {
        match self.objects.get(&handle.0) {
            Some(Object::KernelSet { names }) => Some(names.as_slice()),
            _ => None,
        }
    }

    /// Gene count of an expression with `params`.
    pub fn chromosome_length(params: &ExpressionParams) -> usize {
        let nodes = params.rows as usize * params.columns as usize;
        nodes * (params.arity as usize + 1) + params.outputs as usize
    }

    fn random_chromosome(params: &ExpressionParams) -> Vec<u32> {
        let mut rng = ChaCha8Rng::seed_from_u64(u64::from(params.seed));
        let bound = params.inputs.saturating_add(params.rows.saturating_mul(params.columns));
        (0..Self::chromosome_length(params))
            .map(|_| rng.next_u32() % bound.max(1))
            .collect()
    }

    fn insert_object(&mut self, object: Object) -> RawHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(handle, object);
        RawHandle(handle)
    }

    fn enter(&mut self, entry_point: &'static str) -> Result<(), EngineError> {
        *self.calls.entry(entry_point).or_insert(0) += 1;
        if let Some(remaining) = self.fail_after.get_mut(entry_point) {
            if *remaining == 0 {
                return Err(EngineError::Trap {
                    entry_point,
                    message: "injected failure".to_owned(),
                });
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn returns_null(&self, entry_point: &str) -> bool {
        self.null_results.contains(&entry_point)
    }

    fn malloc(&mut self, size: u32, kind: BlockKind) -> Result<Address, EngineError> {
        let span = self
            .heap_top
            .checked_add(HEAP_ALIGN - 1)
            .map(|top| top & !(HEAP_ALIGN - 1))
            .and_then(|start| Some((start, start.checked_add(size.max(1))?)));
        let Some((start, end)) = span else {
            return Err(MemoryError::GrowFailed {
                pages: u32::MAX,
                reason: "heap would pass the 32-bit address space".to_owned(),
            }
            .into());
        };
        let needed = end as usize;
        if needed > self.memory.len() {
            let pages = (needed - self.memory.len()).div_ceil(PAGE_SIZE as usize);
            self.grow(pages as u32)?;
        }
        self.heap_top = end;
        self.blocks.insert(start, Block { kind });
        if kind.is_result() {
            self.peak_live_buffers = self.peak_live_buffers.max(self.live_buffers());
        }
        Ok(Address(start))
    }

    fn free(
        &mut self,
        entry_point: &'static str,
        address: Address,
        kind: BlockKind,
    ) -> Result<(), EngineError> {
        self.enter(entry_point)?;
        match self.blocks.get(&address.0) {
            Some(block) if block.kind == kind => {
                self.blocks.shift_remove(&address.0);
                Ok(())
            }
            Some(block) => Err(EngineError::Rejected {
                entry_point,
                reason: format!("{address} holds a {:?} block", block.kind),
            }),
            None => Err(EngineError::Rejected {
                entry_point,
                reason: format!("{address} is not a live allocation"),
            }),
        }
    }

    fn expression(
        &self,
        entry_point: &'static str,
        handle: RawHandle,
    ) -> Result<(&ExpressionParams, &[u32]), EngineError> {
        match self.objects.get(&handle.0) {
            Some(Object::Expression { params, chromosome }) => Ok((params, chromosome.as_slice())),
            _ => Err(EngineError::Rejected {
                entry_point,
                reason: format!("{handle} is not a live expression"),
            }),
        }
    }

    /// Read length-framed records without going through the host codec.
    fn read_records(
        &self,
        entry_point: &'static str,
        at: Address,
        count: usize,
    ) -> Result<Vec<String>, EngineError> {
        let rejected = |reason: String| EngineError::Rejected {
            entry_point,
            reason,
        };
        let mut cursor = at.as_usize();
        let mut out = Vec::with_capacity(count.min(self.memory.len() / 4));
        for _ in 0..count {
            let prefix = self
                .memory
                .get(cursor..cursor + 4)
                .ok_or_else(|| rejected(format!("record prefix at {cursor} out of bounds")))?;
            let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
            let body = self
                .memory
                .get(cursor + 4..cursor + 4 + len)
                .ok_or_else(|| rejected(format!("record body at {cursor} out of bounds")))?;
            out.push(String::from_utf8(body.to_vec()).map_err(|e| rejected(e.to_string()))?);
            cursor += 4 + len;
        }
        Ok(out)
    }

    fn write_records(&mut self, strings: &[String]) -> Result<Address, EngineError> {
        let mut bytes = Vec::new();
        for s in strings {
            bytes.extend_from_slice(&(s.len() as u32).to_le_bytes());
            bytes.extend_from_slice(s.as_bytes());
        }
        let address = self.malloc(bytes.len() as u32, BlockKind::String)?;
        self.view_mut::<u8>().write(address, &bytes)?;
        Ok(address)
    }

    fn loss_data(
        &self,
        entry_point: &'static str,
        params: &ExpressionParams,
        args: &LossArgs,
    ) -> Result<LossData, EngineError> {
        let data_inputs = params
            .inputs
            .checked_sub(args.constant_count)
            .ok_or_else(|| EngineError::Rejected {
                entry_point,
                reason: "more constants than inputs".to_owned(),
            })?;
        let points = args.points as usize;
        let view = self.view::<f64>();
        let inputs = view.read(args.inputs, data_inputs as usize * points)?;
        let labels = view.read(args.labels, params.outputs as usize * points)?;
        let constants = if args.constant_count == 0 {
            Vec::new()
        } else {
            view.read(args.constants, args.constant_count as usize)?
        };
        Ok(LossData {
            points,
            outputs: params.outputs as usize,
            inputs,
            labels,
            constants,
        })
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Dimension-major data set plus constants, as passed to the loss.
struct LossData {
    points: usize,
    outputs: usize,
    inputs: Vec<f64>,
    labels: Vec<f64>,
    constants: Vec<f64>,
}

impl LossData {
    /// Per-point, per-output error of the stand-in model, output-major.
    fn errors(&self) -> Vec<f64> {
        let shift: f64 = self.constants.iter().sum();
        let dims = if self.points == 0 {
            0
        } else {
            self.inputs.len() / self.points
        };
        let mut errors = vec![0.0; self.outputs * self.points];
        for p in 0..self.points {
            let sum = shift + (0..dims).map(|d| self.inputs[d * self.points + p]).sum::<f64>();
            for j in 0..self.outputs {
                errors[j * self.points + p] = sum + j as f64 - self.labels[j * self.points + p];
            }
        }
        errors
    }

    /// Mean squared error; NaN for an empty data set.
    fn mse(&self) -> f64 {
        let errors = self.errors();
        errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64
    }
}

impl LinearMemory for MockEngine {
    fn bytes(&self) -> &[u8] {
        &self.memory
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    fn grow(&mut self, pages: u32) -> Result<u32, MemoryError> {
        let old = (self.memory.len() / PAGE_SIZE as usize) as u32;
        match old.checked_add(pages) {
            Some(new) if new <= self.max_pages => {
                self.memory.resize(new as usize * PAGE_SIZE as usize, 0);
                Ok(old)
            }
            _ => Err(MemoryError::GrowFailed {
                pages,
                reason: format!("limit is {} pages", self.max_pages),
            }),
        }
    }
}

impl EngineBinding for MockEngine {
    fn reserve_scratch(&mut self, bytes: u32) -> Result<Address, EngineError> {
        self.enter("reserve_scratch")?;
        self.malloc(bytes, BlockKind::Scratch)
    }

    fn kernel_set_construct(
        &mut self,
        names: Address,
        count: u32,
    ) -> Result<RawHandle, EngineError> {
        const ENTRY: &str = "kernel_set_construct";
        self.enter(ENTRY)?;
        let names = self.read_records(ENTRY, names, count as usize)?;
        if self.returns_null(ENTRY)
            || names.is_empty()
            || names.iter().any(|n| !KNOWN_KERNELS.contains(&n.as_str()))
        {
            return Ok(RawHandle(0));
        }
        Ok(self.insert_object(Object::KernelSet { names }))
    }

    fn kernel_set_destroy(&mut self, kernels: RawHandle) -> Result<(), EngineError> {
        const ENTRY: &str = "kernel_set_destroy";
        self.enter(ENTRY)?;
        match self.objects.get(&kernels.0) {
            Some(Object::KernelSet { .. }) => {
                self.objects.shift_remove(&kernels.0);
                Ok(())
            }
            _ => Err(EngineError::Rejected {
                entry_point: ENTRY,
                reason: format!("{kernels} is not a live kernel set"),
            }),
        }
    }

    fn expression_construct(
        &mut self,
        params: &ExpressionParams,
        kernels: RawHandle,
    ) -> Result<RawHandle, EngineError> {
        const ENTRY: &str = "expression_construct";
        self.enter(ENTRY)?;
        if let Some(name) = params.first_zero() {
            return Err(EngineError::Rejected {
                entry_point: ENTRY,
                reason: format!("{name} must be positive"),
            });
        }
        if self.returns_null(ENTRY) || self.kernel_names(kernels).is_none() {
            return Ok(RawHandle(0));
        }
        Ok(self.insert_expression(*params))
    }

    fn expression_destroy(&mut self, expression: RawHandle) -> Result<(), EngineError> {
        const ENTRY: &str = "expression_destroy";
        self.enter(ENTRY)?;
        self.expression(ENTRY, expression)?;
        self.objects.shift_remove(&expression.0);
        Ok(())
    }

    fn expression_get_chromosome(
        &mut self,
        expression: RawHandle,
        length_out: Address,
    ) -> Result<Address, EngineError> {
        const ENTRY: &str = "expression_get_chromosome";
        self.enter(ENTRY)?;
        let genes = self.expression(ENTRY, expression)?.1.to_vec();
        if self.returns_null(ENTRY) {
            return Ok(Address::NULL);
        }
        self.view_mut::<u32>().set(length_out, genes.len() as u32)?;
        let address = self.malloc(genes.len() as u32 * 4, BlockKind::U32Array)?;
        self.view_mut::<u32>().write(address, &genes)?;
        Ok(address)
    }

    fn expression_set_chromosome(
        &mut self,
        expression: RawHandle,
        genes: Address,
        length: u32,
    ) -> Result<(), EngineError> {
        const ENTRY: &str = "expression_set_chromosome";
        self.enter(ENTRY)?;
        let expected = Self::chromosome_length(self.expression(ENTRY, expression)?.0);
        if length as usize != expected {
            return Err(EngineError::Rejected {
                entry_point: ENTRY,
                reason: format!("chromosome needs {expected} genes, got {length}"),
            });
        }
        let new_genes = self.view::<u32>().read(genes, expected)?;
        if let Some(Object::Expression { chromosome, .. }) = self.objects.get_mut(&expression.0) {
            *chromosome = new_genes;
        }
        Ok(())
    }

    fn expression_evaluate(
        &mut self,
        expression: RawHandle,
        inputs: Address,
    ) -> Result<Address, EngineError> {
        const ENTRY: &str = "expression_evaluate";
        self.enter(ENTRY)?;
        let params = *self.expression(ENTRY, expression)?.0;
        let sum: f64 = self
            .view::<f64>()
            .read(inputs, params.inputs as usize)?
            .iter()
            .sum();
        if self.returns_null(ENTRY) {
            return Ok(Address::NULL);
        }
        let results: Vec<f64> = (0..params.outputs).map(|j| sum + f64::from(j)).collect();
        let address = self.malloc(params.outputs * 8, BlockKind::F64Array)?;
        self.view_mut::<f64>().write(address, &results)?;
        Ok(address)
    }

    fn expression_equations(
        &mut self,
        expression: RawHandle,
        symbols: Address,
    ) -> Result<Address, EngineError> {
        const ENTRY: &str = "expression_equations";
        self.enter(ENTRY)?;
        let params = *self.expression(ENTRY, expression)?.0;
        let symbols = self.read_records(ENTRY, symbols, params.inputs as usize)?;
        if self.returns_null(ENTRY) {
            return Ok(Address::NULL);
        }
        let base = format!("({})", symbols.join("+"));
        let equations: Vec<String> = (0..params.outputs)
            .map(|j| if j == 0 { base.clone() } else { format!("{base}+{j}") })
            .collect();
        self.write_records(&equations)
    }

    fn expression_loss(&mut self, expression: RawHandle, args: LossArgs) -> Result<f64, EngineError> {
        const ENTRY: &str = "expression_loss";
        self.enter(ENTRY)?;
        let params = *self.expression(ENTRY, expression)?.0;
        Ok(self.loss_data(ENTRY, &params, &args)?.mse())
    }

    fn gradient_descent(
        &mut self,
        expression: RawHandle,
        max_steps: u32,
        args: LossArgs,
    ) -> Result<f64, EngineError> {
        const ENTRY: &str = "gradient_descent";
        self.enter(ENTRY)?;
        let params = *self.expression(ENTRY, expression)?.0;
        let mut data = self.loss_data(ENTRY, &params, &args)?;
        if data.constants.is_empty() {
            return Ok(data.mse());
        }
        // Every constant shifts all predictions equally, so they share one
        // gradient; scaling by the count keeps the summed step stable.
        let rate = 0.25 / data.constants.len() as f64;
        for _ in 0..max_steps {
            let errors = data.errors();
            let gradient = 2.0 * errors.iter().sum::<f64>() / errors.len() as f64;
            for c in &mut data.constants {
                *c -= rate * gradient;
            }
        }
        self.view_mut::<f64>().write(args.constants, &data.constants)?;
        Ok(data.mse())
    }

    fn free_f64_array(&mut self, array: Address) -> Result<(), EngineError> {
        self.free("free_f64_array", array, BlockKind::F64Array)
    }

    fn free_u32_array(&mut self, array: Address) -> Result<(), EngineError> {
        self.free("free_u32_array", array, BlockKind::U32Array)
    }

    fn free_string(&mut self, string: Address) -> Result<(), EngineError> {
        self.free("free_string", string, BlockKind::String)
    }
}
