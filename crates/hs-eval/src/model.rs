//! Trainable models and the factories that build them from assignments.

use hs_types::{Assignment, EvalError};
use ndarray::Array1;

use crate::dataset::Dataset;

/// A supervised model that can be fitted once and then predict.
pub trait Model: Send {
    fn fit(&mut self, data: &Dataset) -> Result<(), EvalError>;

    /// One prediction per row of `data`, in row order.
    fn predict(&self, data: &Dataset) -> Result<Array1<f64>, EvalError>;
}

/// Builds a fresh, unfitted model for one assignment.
///
/// Rejecting a parameter or value should be an
/// [`EvalError::EvaluationFailure`], so only that trial fails.
pub trait ModelFactory: Send + Sync {
    fn build(&self, assignment: &Assignment) -> Result<Box<dyn Model>, EvalError>;
}

impl<F> ModelFactory for F
where
    F: Fn(&Assignment) -> Result<Box<dyn Model>, EvalError> + Send + Sync,
{
    fn build(&self, assignment: &Assignment) -> Result<Box<dyn Model>, EvalError> {
        self(assignment)
    }
}
