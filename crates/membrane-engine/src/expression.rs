//! Expression lifecycle, chromosome access, evaluation and equations.

use membrane_core::{
    ArgumentError, BridgeError, EngineBinding, EngineError, ExpressionParams, HandleKind,
};
use membrane_marshal::{
    calculate_evaluation, decode_strings, ensure_rectangular, put_array, put_strings, read_array,
    structure_evaluation_inputs, Evaluation, EvaluationInput,
};
use membrane_memory::MemoryExt;
use tracing::{debug, instrument};

use crate::id::{ExpressionId, KernelSetId};
use crate::session::{ExpressionRecord, Session};

impl<B: EngineBinding> Session<B> {
    /// Build an expression over a live kernel set.
    ///
    /// Every shape parameter must be positive.
    #[instrument(level = "trace", skip_all, fields(kernel_set = %kernels))]
    pub fn create_expression(
        &mut self,
        params: ExpressionParams,
        kernels: KernelSetId,
    ) -> Result<ExpressionId, BridgeError> {
        let kernels_raw = self.kernel_set(kernels)?.raw;
        if let Some(name) = params.first_zero() {
            return Err(ArgumentError::OutOfRange {
                name,
                reason: "must be positive".to_owned(),
            }
            .into());
        }
        let raw = self.engine.expression_construct(&params, kernels_raw)?;
        if raw.is_null() {
            return Err(EngineError::NullHandle {
                entry_point: "expression_construct",
            }
            .into());
        }
        let id = ExpressionId(self.expressions.insert(ExpressionRecord { raw, params }));
        debug!(
            expression = %id,
            raw = %raw,
            inputs = params.inputs,
            outputs = params.outputs,
            "created expression"
        );
        Ok(id)
    }

    /// Destroy an expression.
    ///
    /// Same contract as [`destroy_kernel_set`](Self::destroy_kernel_set):
    /// one engine call at most, and a repeat is rejected.
    #[instrument(level = "trace", skip_all, fields(expression = %id))]
    pub fn destroy_expression(&mut self, id: ExpressionId) -> Result<(), BridgeError> {
        let record = self.expressions.remove(id.0).ok_or(BridgeError::InvalidState {
            kind: HandleKind::Expression,
            handle: id.0,
        })?;
        self.engine.expression_destroy(record.raw)?;
        debug!(expression = %id, raw = %record.raw, "destroyed expression");
        Ok(())
    }

    /// The parameters the expression was built with.
    pub fn expression_params(&self, id: ExpressionId) -> Result<ExpressionParams, BridgeError> {
        Ok(self.expression(id)?.params)
    }

    /// Copy the expression's chromosome out of the engine.
    #[instrument(level = "trace", skip_all, fields(expression = %id))]
    pub fn chromosome(&mut self, id: ExpressionId) -> Result<Vec<u32>, BridgeError> {
        let raw = self.expression(id)?.raw;
        self.with_scratch(|scratch, engine| {
            let length_slot = scratch.alloc(4)?;
            let array = engine.expression_get_chromosome(raw, length_slot)?;
            if array.is_null() {
                return Err(EngineError::NullBuffer {
                    entry_point: "expression_get_chromosome",
                }
                .into());
            }
            let genes = engine
                .view::<u32>()
                .get(length_slot)
                .map_err(EngineError::from)
                .and_then(|len| read_array::<u32, _>(&*engine, array, len as usize));
            engine.free_u32_array(array)?;
            Ok(genes?)
        })
    }

    /// Replace the expression's chromosome.
    ///
    /// Gene values are unsigned by construction; the engine validates
    /// the length and the genes themselves.
    #[instrument(level = "trace", skip_all, fields(expression = %id, len = genes.len()))]
    pub fn set_chromosome(&mut self, id: ExpressionId, genes: &[u32]) -> Result<(), BridgeError> {
        let raw = self.expression(id)?.raw;
        if genes.is_empty() {
            return Err(ArgumentError::Empty { what: "chromosome" }.into());
        }
        let length = u32::try_from(genes.len()).map_err(|_| ArgumentError::TooLarge {
            what: "chromosome",
            len: genes.len(),
        })?;
        self.with_scratch(|scratch, engine| {
            let at = put_array(scratch, engine, genes)?;
            Ok(engine.expression_set_chromosome(raw, at, length)?)
        })
    }

    /// Evaluate the expression at one point or a batch of points.
    ///
    /// A point needs one value per input. A batch needs one row per input,
    /// all of the same length; the result has one row per output with one
    /// value per point.
    ///
    /// ```
    /// # use membrane_engine::{Session, SessionConfig};
    /// # use membrane_core::ExpressionParams;
    /// # use membrane_marshal::Evaluation;
    /// # use membrane_test_utils::MockEngine;
    /// let mut session = Session::new(MockEngine::new(), SessionConfig::default())?;
    /// let kernels = session.create_kernel_set(&["sum", "mul"])?;
    /// let expr = session.create_expression(ExpressionParams::new(2, 1), kernels)?;
    ///
    /// let point = session.evaluate(expr, &[1.0, 2.0])?;
    /// assert!(matches!(point, Evaluation::Point(ref v) if v.len() == 1));
    ///
    /// let batch = session.evaluate(expr, &[vec![1.0, 3.0], vec![2.0, 4.0]])?;
    /// assert!(matches!(batch, Evaluation::Batch(ref rows) if rows.len() == 1 && rows[0].len() == 2));
    /// # Ok::<(), membrane_core::BridgeError>(())
    /// ```
    #[instrument(level = "trace", skip_all, fields(expression = %id))]
    pub fn evaluate<'a>(
        &mut self,
        id: ExpressionId,
        input: impl Into<EvaluationInput<'a>>,
    ) -> Result<Evaluation, BridgeError> {
        let ExpressionRecord { raw, params } = *self.expression(id)?;
        let input = input.into();
        if input.arity() != params.inputs as usize {
            return Err(ArgumentError::Arity {
                what: "inputs",
                expected: params.inputs as usize,
                found: input.arity(),
            }
            .into());
        }
        if let EvaluationInput::Batch(rows) = input {
            ensure_rectangular(rows)?;
        }
        let flat = structure_evaluation_inputs(&input)?;
        self.with_scratch(|scratch, engine| {
            let base = put_array(scratch, engine, &flat)?;
            calculate_evaluation(engine, &input, base, params.outputs as usize, |e, at| {
                e.expression_evaluate(raw, at)
            })
        })
    }

    /// Render one equation per output, naming the inputs with `symbols`.
    #[instrument(level = "trace", skip_all, fields(expression = %id))]
    pub fn equations<S: AsRef<str>>(
        &mut self,
        id: ExpressionId,
        symbols: &[S],
    ) -> Result<Vec<String>, BridgeError> {
        let ExpressionRecord { raw, params } = *self.expression(id)?;
        if symbols.len() != params.inputs as usize {
            return Err(ArgumentError::Arity {
                what: "input symbols",
                expected: params.inputs as usize,
                found: symbols.len(),
            }
            .into());
        }
        self.with_scratch(|scratch, engine| {
            let at = put_strings(scratch, engine, symbols)?;
            let result = engine.expression_equations(raw, at)?;
            if result.is_null() {
                return Err(EngineError::NullBuffer {
                    entry_point: "expression_equations",
                }
                .into());
            }
            let equations = decode_strings(&*engine, result, params.outputs as usize);
            engine.free_string(result)?;
            Ok(equations?)
        })
    }
}
