//! Argument bundles for entry points with many scalar parameters.

use crate::address::Address;

/// Shape and seed of an engine-resident expression.
///
/// Passed verbatim to the engine's expression constructor. The host keeps
/// a copy alongside the handle so arity checks never cross the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpressionParams {
    /// Number of inputs (variables plus ephemeral constants).
    pub inputs: u32,
    /// Number of outputs.
    pub outputs: u32,
    /// Rows of the node grid.
    pub rows: u32,
    /// Columns of the node grid.
    pub columns: u32,
    /// Maximum number of columns a connection may reach back.
    pub levels_back: u32,
    /// Incoming connections per node.
    pub arity: u32,
    /// Seed for the engine's pseudo-random initial chromosome.
    pub seed: u32,
}

impl ExpressionParams {
    /// Parameters with the given input/output counts and a single-row,
    /// ten-column grid of binary nodes.
    pub fn new(inputs: u32, outputs: u32) -> Self {
        Self {
            inputs,
            outputs,
            rows: 1,
            columns: 10,
            levels_back: 11,
            arity: 2,
            seed: 0,
        }
    }

    /// Replace the grid dimensions.
    pub fn with_grid(mut self, rows: u32, columns: u32, levels_back: u32) -> Self {
        self.rows = rows;
        self.columns = columns;
        self.levels_back = levels_back;
        self
    }

    /// Replace the node arity.
    pub fn with_arity(mut self, arity: u32) -> Self {
        self.arity = arity;
        self
    }

    /// Replace the seed.
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    /// Name of the first parameter that is zero, if any.
    ///
    /// Every shape parameter must be strictly positive.
    pub fn first_zero(&self) -> Option<&'static str> {
        [
            ("inputs", self.inputs),
            ("outputs", self.outputs),
            ("rows", self.rows),
            ("columns", self.columns),
            ("levels_back", self.levels_back),
            ("arity", self.arity),
        ]
        .into_iter()
        .find(|&(_, v)| v == 0)
        .map(|(name, _)| name)
    }
}

/// Scratch addresses and counts for the loss and optimiser entry points.
///
/// `inputs` holds `inputs.len()` rows of `points` values, flattened
/// dimension-major; `labels` holds one row of `points` values per output.
/// `constants` is null when `constant_count` is zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LossArgs {
    /// Flattened input matrix.
    pub inputs: Address,
    /// Flattened label matrix.
    pub labels: Address,
    /// Number of data points (columns of both matrices).
    pub points: u32,
    /// Ephemeral constants appended to every point's inputs.
    pub constants: Address,
    /// Number of constants.
    pub constant_count: u32,
}
