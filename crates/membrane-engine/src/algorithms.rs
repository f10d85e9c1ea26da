//! Loss and constant optimisation over a labelled data set.
//!
//! Both operations take the data set dimension-major, one row per data
//! input and one row per output label, and pass it to the engine as
//! flattened rows with an explicit point count. Ephemeral constants fill
//! the remaining expression inputs, so `inputs.len() + constants.len()`
//! must equal the expression's input count.

use membrane_core::{Address, ArgumentError, BridgeError, EngineBinding, ExpressionParams, LossArgs};
use membrane_marshal::{ensure_rectangular, flatten, put_array, read_array};
use membrane_memory::ScratchStack;
use tracing::{debug, instrument};

use crate::id::ExpressionId;
use crate::session::{ExpressionRecord, Session};

/// Result of [`Session::gradient_descent`].
#[derive(Clone, Debug, PartialEq)]
pub struct GradientDescentOutcome {
    /// Loss with the optimised constants.
    pub loss: f64,
    /// The optimised constants, in input order.
    pub constants: Vec<f64>,
}

/// Check the data set's shape against the expression; returns the point count.
fn validate_data_set<I, L>(
    params: &ExpressionParams,
    inputs: &[I],
    labels: &[L],
    constants: &[f64],
) -> Result<u32, ArgumentError>
where
    I: AsRef<[f64]>,
    L: AsRef<[f64]>,
{
    let expected = params.inputs as usize;
    if inputs.len() + constants.len() != expected {
        return Err(ArgumentError::Arity {
            what: "inputs plus constants",
            expected,
            found: inputs.len() + constants.len(),
        });
    }
    if labels.len() != params.outputs as usize {
        return Err(ArgumentError::Arity {
            what: "label rows",
            expected: params.outputs as usize,
            found: labels.len(),
        });
    }
    let input_points = ensure_rectangular(inputs)?;
    let label_points = ensure_rectangular(labels)?;
    if !inputs.is_empty() && input_points != label_points {
        return Err(ArgumentError::PointCountMismatch {
            inputs: input_points,
            labels: label_points,
        });
    }
    u32::try_from(label_points).map_err(|_| ArgumentError::TooLarge {
        what: "data points",
        len: label_points,
    })
}

/// Write the data set into scratch and describe it for the engine.
///
/// With no constants the constants address is null.
fn put_data_set<B, I, L>(
    scratch: &mut ScratchStack,
    engine: &mut B,
    inputs: &[I],
    labels: &[L],
    constants: &[f64],
    points: u32,
) -> Result<LossArgs, BridgeError>
where
    B: EngineBinding + ?Sized,
    I: AsRef<[f64]>,
    L: AsRef<[f64]>,
{
    let inputs_at = put_array(scratch, engine, &flatten::<f64, I>(inputs))?;
    let labels_at = put_array(scratch, engine, &flatten::<f64, L>(labels))?;
    let constants_at = if constants.is_empty() {
        Address::NULL
    } else {
        put_array(scratch, engine, constants)?
    };
    Ok(LossArgs {
        inputs: inputs_at,
        labels: labels_at,
        points,
        constants: constants_at,
        constant_count: constants.len() as u32,
    })
}

impl<B: EngineBinding> Session<B> {
    /// Mean squared error of the expression over a labelled data set.
    ///
    /// `inputs` has one row per data input, `labels` one row per output,
    /// all with one value per point. A non-finite loss is returned as the
    /// engine computed it.
    #[instrument(level = "trace", skip_all, fields(expression = %id))]
    pub fn loss<I, L>(
        &mut self,
        id: ExpressionId,
        inputs: &[I],
        labels: &[L],
        constants: &[f64],
    ) -> Result<f64, BridgeError>
    where
        I: AsRef<[f64]>,
        L: AsRef<[f64]>,
    {
        let ExpressionRecord { raw, params } = *self.expression(id)?;
        let points = validate_data_set(&params, inputs, labels, constants)?;
        self.with_scratch(|scratch, engine| {
            let args = put_data_set(scratch, engine, inputs, labels, constants, points)?;
            Ok(engine.expression_loss(raw, args)?)
        })
    }

    /// Optimise `constants` by gradient descent for at most `max_steps`
    /// steps.
    ///
    /// Takes the same data set as [`loss`](Self::loss). The engine updates
    /// the constants in its copy of the buffer; they are read back before
    /// the scratch frame is released.
    #[instrument(level = "trace", skip_all, fields(expression = %id, max_steps = max_steps))]
    pub fn gradient_descent<I, L>(
        &mut self,
        id: ExpressionId,
        max_steps: u32,
        inputs: &[I],
        labels: &[L],
        constants: &[f64],
    ) -> Result<GradientDescentOutcome, BridgeError>
    where
        I: AsRef<[f64]>,
        L: AsRef<[f64]>,
    {
        let ExpressionRecord { raw, params } = *self.expression(id)?;
        let points = validate_data_set(&params, inputs, labels, constants)?;
        let outcome = self.with_scratch(|scratch, engine| {
            let args = put_data_set(scratch, engine, inputs, labels, constants, points)?;
            let loss = engine.gradient_descent(raw, max_steps, args)?;
            let constants = if constants.is_empty() {
                Vec::new()
            } else {
                read_array::<f64, _>(&*engine, args.constants, constants.len())?
            };
            Ok(GradientDescentOutcome { loss, constants })
        })?;
        debug!(expression = %id, loss = outcome.loss, "gradient descent finished");
        Ok(outcome)
    }
}
