//! Shared kernel names, expression shapes and data sets.

use membrane_core::ExpressionParams;

/// Kernel names the mock engine accepts.
pub const KNOWN_KERNELS: &[&str] = &[
    "sum", "diff", "mul", "div", "pdiv", "sin", "cos", "log", "exp", "sqrt", "tanh", "sig",
    "ReLu", "ELU", "ISRU", "gaussian",
];

/// The arithmetic kernel set used by most tests.
pub const ARITHMETIC: &[&str] = &["sum", "diff", "mul", "div"];

/// A 2-input, 1-output expression on the default grid.
pub fn two_in_one_out() -> ExpressionParams {
    ExpressionParams::new(2, 1).with_seed(1)
}

/// A 5-input, 1-output expression on a 1x20 grid, four of whose inputs
/// are meant to be filled by constants.
pub fn constant_fitting() -> ExpressionParams {
    ExpressionParams::new(5, 1)
        .with_grid(1, 20, 4)
        .with_arity(2)
        .with_seed(1)
}

/// `points` samples of `y = 2x + 1` over `[0, 1)`, dimension-major.
pub fn linear_samples(points: usize) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let xs: Vec<f64> = (0..points).map(|i| i as f64 / points as f64).collect();
    let ys = xs.iter().map(|x| 2.0 * x + 1.0).collect();
    (vec![xs], vec![ys])
}
