//! Array and matrix layout across the boundary.
//!
//! Host data arrives as nested sequences; the engine wants one contiguous
//! buffer plus explicit counts. Two layouts matter:
//!
//! ```text
//! dimension-major (host):   [x0 x1 x2] [y0 y1 y2]      one row per input
//! point-major (engine):     x0 y0 | x1 y1 | x2 y2      stride = input count
//! ```
//!
//! [`structure_evaluation_inputs`] converts the first into the second, and
//! [`calculate_evaluation`] walks the engine through it one point at a time,
//! reshaping the per-point results back to one row per output.

use membrane_core::{Address, ArgumentError, BridgeError, EngineBinding, EngineError, LinearMemory};
use membrane_memory::{Element, MemoryExt, ScratchStack};
use tracing::trace;

/// Entry point name reported when an evaluation returns no buffer.
const EVALUATE: &str = "expression_evaluate";

/// Check that every row has the same length as the first.
///
/// Returns the column count (0 for no rows).
pub fn ensure_rectangular<T, R: AsRef<[T]>>(rows: &[R]) -> Result<usize, ArgumentError> {
    let Some(first) = rows.first() else {
        return Ok(0);
    };
    let expected = first.as_ref().len();
    for (row, r) in rows.iter().enumerate().skip(1) {
        let found = r.as_ref().len();
        if found != expected {
            return Err(ArgumentError::Ragged {
                row,
                expected,
                found,
            });
        }
    }
    Ok(expected)
}

/// Concatenate rows in row-major order.
///
/// A pointer plus the row and column counts is enough for the engine to
/// recover the shape.
pub fn flatten<T: Copy, R: AsRef<[T]>>(rows: &[R]) -> Vec<T> {
    let total = rows.iter().map(|r| r.as_ref().len()).sum();
    let mut flat = Vec::with_capacity(total);
    for row in rows {
        flat.extend_from_slice(row.as_ref());
    }
    flat
}

/// Swap rows and columns.
///
/// An empty matrix, or one whose rows are empty, transposes to an empty
/// matrix. Ragged input is rejected.
pub fn transpose<T: Copy, R: AsRef<[T]>>(rows: &[R]) -> Result<Vec<Vec<T>>, ArgumentError> {
    let columns = ensure_rectangular(rows)?;
    Ok((0..columns)
        .map(|c| rows.iter().map(|r| r.as_ref()[c]).collect())
        .collect())
}

/// Inputs to an evaluation: one point, or a batch of points.
///
/// A batch holds one row per input dimension; every row has one value
/// per point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EvaluationInput<'a> {
    /// One value per input.
    Point(&'a [f64]),
    /// One row per input, one column per point.
    Batch(&'a [Vec<f64>]),
}

impl EvaluationInput<'_> {
    /// Number of input dimensions.
    pub fn arity(&self) -> usize {
        match self {
            Self::Point(values) => values.len(),
            Self::Batch(rows) => rows.len(),
        }
    }

    /// Number of points (1 for a single point).
    ///
    /// For a batch this is the length of the first row; use
    /// [`ensure_rectangular`] to validate the rest.
    pub fn points(&self) -> usize {
        match self {
            Self::Point(_) => 1,
            Self::Batch(rows) => rows.first().map_or(0, Vec::len),
        }
    }
}

impl<'a> From<&'a [f64]> for EvaluationInput<'a> {
    fn from(values: &'a [f64]) -> Self {
        Self::Point(values)
    }
}

impl<'a, const N: usize> From<&'a [f64; N]> for EvaluationInput<'a> {
    fn from(values: &'a [f64; N]) -> Self {
        Self::Point(values)
    }
}

impl<'a> From<&'a Vec<f64>> for EvaluationInput<'a> {
    fn from(values: &'a Vec<f64>) -> Self {
        Self::Point(values)
    }
}

impl<'a> From<&'a [Vec<f64>]> for EvaluationInput<'a> {
    fn from(rows: &'a [Vec<f64>]) -> Self {
        Self::Batch(rows)
    }
}

impl<'a, const N: usize> From<&'a [Vec<f64>; N]> for EvaluationInput<'a> {
    fn from(rows: &'a [Vec<f64>; N]) -> Self {
        Self::Batch(rows)
    }
}

impl<'a> From<&'a Vec<Vec<f64>>> for EvaluationInput<'a> {
    fn from(rows: &'a Vec<Vec<f64>>) -> Self {
        Self::Batch(rows)
    }
}

/// Result of an evaluation, shaped like its input.
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluation {
    /// One value per output.
    Point(Vec<f64>),
    /// One row per output, one column per point.
    Batch(Vec<Vec<f64>>),
}

impl Evaluation {
    /// The single-point result, if this is one.
    pub fn into_point(self) -> Option<Vec<f64>> {
        match self {
            Self::Point(values) => Some(values),
            Self::Batch(_) => None,
        }
    }

    /// The batch result, if this is one.
    pub fn into_batch(self) -> Option<Vec<Vec<f64>>> {
        match self {
            Self::Batch(rows) => Some(rows),
            Self::Point(_) => None,
        }
    }
}

/// Lay out evaluation inputs the way the engine reads them.
///
/// A point is returned unchanged. A batch of `k` rows of `n` values becomes
/// `k * n` values ordered point-major: point 0's `k` values, then point
/// 1's, and so on.
pub fn structure_evaluation_inputs(input: &EvaluationInput<'_>) -> Result<Vec<f64>, ArgumentError> {
    match input {
        EvaluationInput::Point(values) => Ok(values.to_vec()),
        EvaluationInput::Batch(rows) => Ok(flatten(&transpose(rows)?)),
    }
}

/// Allocate scratch for `values` and write them through a fresh view.
pub fn put_array<T, M>(
    scratch: &mut ScratchStack,
    memory: &mut M,
    values: &[T],
) -> Result<Address, BridgeError>
where
    T: Element,
    M: LinearMemory + ?Sized,
{
    let bytes = values
        .len()
        .checked_mul(T::WIDTH as usize)
        .and_then(|b| u32::try_from(b).ok())
        .ok_or(ArgumentError::TooLarge {
            what: "array",
            len: values.len(),
        })?;
    let address = scratch.alloc(bytes)?;
    memory.view_mut::<T>().write(address, values)?;
    Ok(address)
}

/// Copy `count` elements out of engine memory.
pub fn read_array<T, M>(memory: &M, address: Address, count: usize) -> Result<Vec<T>, EngineError>
where
    T: Element,
    M: LinearMemory + ?Sized,
{
    Ok(memory.view::<T>().read(address, count)?)
}

/// Run one evaluation call and copy its `outputs` results into host memory.
///
/// The engine-heap result buffer is freed before returning, even when
/// copying it out fails.
fn evaluate_once<B, F>(
    engine: &mut B,
    inputs: Address,
    outputs: usize,
    evaluate: &mut F,
) -> Result<Vec<f64>, EngineError>
where
    B: EngineBinding + ?Sized,
    F: FnMut(&mut B, Address) -> Result<Address, EngineError>,
{
    let result = evaluate(engine, inputs)?;
    if result.is_null() {
        return Err(EngineError::NullBuffer {
            entry_point: EVALUATE,
        });
    }
    let copied = read_array::<f64, _>(&*engine, result, outputs);
    engine.free_f64_array(result)?;
    copied
}

/// `outputs` empty rows, for a batch with no points.
///
/// No engine call backs the count, so it is held to what a real result
/// could occupy: `outputs` values must fit in linear memory.
fn empty_rows<M>(memory: &M, outputs: usize) -> Result<Vec<Vec<f64>>, BridgeError>
where
    M: LinearMemory + ?Sized,
{
    let too_large = ArgumentError::TooLarge {
        what: "evaluation outputs",
        len: outputs,
    };
    let fits = outputs
        .checked_mul(f64::WIDTH as usize)
        .is_some_and(|bytes| bytes <= memory.size());
    if !fits {
        return Err(too_large.into());
    }
    let mut rows = Vec::new();
    rows.try_reserve_exact(outputs).map_err(|_| too_large)?;
    rows.resize_with(outputs, Vec::new);
    Ok(rows)
}

/// Drive the engine through structured evaluation inputs at `base`.
///
/// For a point, issues one call and returns its `outputs` values. For a
/// batch of `n` points and `k` inputs, issues `n` calls at
/// `base + i * k * 8`, freeing each result buffer before the next call,
/// then transposes the point-major results to one row per output. A batch
/// with zero points yields `outputs` empty rows.
///
/// `base` must hold the output of [`structure_evaluation_inputs`] for the
/// same `input`.
pub fn calculate_evaluation<B, F>(
    engine: &mut B,
    input: &EvaluationInput<'_>,
    base: Address,
    outputs: usize,
    mut evaluate: F,
) -> Result<Evaluation, BridgeError>
where
    B: EngineBinding + ?Sized,
    F: FnMut(&mut B, Address) -> Result<Address, EngineError>,
{
    match input {
        EvaluationInput::Point(_) => Ok(Evaluation::Point(evaluate_once(
            engine,
            base,
            outputs,
            &mut evaluate,
        )?)),
        EvaluationInput::Batch(rows) => {
            let points = input.points();
            if points == 0 {
                return empty_rows(&*engine, outputs).map(Evaluation::Batch);
            }
            trace!(points, inputs = rows.len(), outputs, "batch evaluation");
            let stride = rows.len() * f64::WIDTH as usize;
            let mut per_point = Vec::with_capacity(points);
            for i in 0..points {
                let offset = i
                    .checked_mul(stride)
                    .and_then(|o| u32::try_from(o).ok())
                    .and_then(|o| base.checked_add(o))
                    .ok_or(ArgumentError::TooLarge {
                        what: "evaluation batch",
                        len: points,
                    })?;
                per_point.push(evaluate_once(engine, offset, outputs, &mut evaluate)?);
            }
            Ok(Evaluation::Batch(transpose(&per_point)?))
        }
    }
}
