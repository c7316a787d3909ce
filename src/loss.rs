//! Loss registry: named losses plus caller-supplied loss objects.
//!
//! Each loss produces a per-sample value and a sub-gradient with respect to
//! the predicted vector; the objective builder averages both over the batch
//! and chains the gradient through the oracle Jacobian.

use std::fmt;
use std::str::FromStr;

use ndarray::Array1;

use crate::error::{Error, Result};

/// Floor applied to probabilities inside the cross-entropy terms.
const PROB_FLOOR: f64 = 1e-12;

/// A per-sample loss with a sub-gradient w.r.t. the prediction.
pub trait LossFunction {
    /// Registry name; also the identifier written into a persistence
    /// envelope, so custom losses without a registry name cannot persist.
    fn name(&self) -> &str;

    fn evaluate(&self, predicted: &Array1<f64>, target: &Array1<f64>) -> Result<f64>;

    fn gradient(&self, predicted: &Array1<f64>, target: &Array1<f64>) -> Result<Array1<f64>>;

    /// True when the loss only makes sense on multi-column distribution
    /// targets (so scalar binary targets are a configuration error).
    fn requires_distribution(&self) -> bool {
        false
    }
}

/// Resolved loss: one of the registry entries or a custom object.
pub enum Loss {
    SquaredError,
    AbsoluteError,
    CrossEntropy,
    Custom(Box<dyn LossFunction>),
}

impl Default for Loss {
    fn default() -> Self {
        Loss::SquaredError
    }
}

impl fmt::Debug for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loss({})", self.name())
    }
}

impl FromStr for Loss {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "squared_error" => Ok(Loss::SquaredError),
            "absolute_error" => Ok(Loss::AbsoluteError),
            "cross_entropy" => Ok(Loss::CrossEntropy),
            _ => Err(Error::Config(format!("unknown loss name: {:?}", s))),
        }
    }
}

impl Loss {
    pub fn name(&self) -> &str {
        match self {
            Loss::SquaredError => "squared_error",
            Loss::AbsoluteError => "absolute_error",
            Loss::CrossEntropy => "cross_entropy",
            Loss::Custom(inner) => inner.name(),
        }
    }

    /// True for losses that need distribution-shaped targets.
    pub fn requires_distribution(&self) -> bool {
        match self {
            Loss::CrossEntropy => true,
            Loss::Custom(inner) => inner.requires_distribution(),
            _ => false,
        }
    }

    /// Per-sample loss value.
    pub fn evaluate(&self, predicted: &Array1<f64>, target: &Array1<f64>) -> Result<f64> {
        check_lengths(predicted, target)?;
        match self {
            Loss::SquaredError => Ok(predicted
                .iter()
                .zip(target.iter())
                .map(|(p, t)| (p - t) * (p - t))
                .sum()),
            Loss::AbsoluteError => Ok(predicted
                .iter()
                .zip(target.iter())
                .map(|(p, t)| (p - t).abs())
                .sum()),
            Loss::CrossEntropy => Ok(predicted
                .iter()
                .zip(target.iter())
                .map(|(p, t)| -t * p.max(PROB_FLOOR).ln())
                .sum()),
            Loss::Custom(inner) => inner.evaluate(predicted, target),
        }
    }

    /// Sub-gradient of the per-sample loss w.r.t. `predicted`.
    pub fn gradient(&self, predicted: &Array1<f64>, target: &Array1<f64>) -> Result<Array1<f64>> {
        check_lengths(predicted, target)?;
        match self {
            Loss::SquaredError => Ok(predicted
                .iter()
                .zip(target.iter())
                .map(|(p, t)| 2.0 * (p - t))
                .collect()),
            Loss::AbsoluteError => Ok(predicted
                .iter()
                .zip(target.iter())
                .map(|(p, t)| (p - t).signum())
                .collect()),
            Loss::CrossEntropy => Ok(predicted
                .iter()
                .zip(target.iter())
                .map(|(p, t)| -t / p.max(PROB_FLOOR))
                .collect()),
            Loss::Custom(inner) => inner.gradient(predicted, target),
        }
    }
}

fn check_lengths(predicted: &Array1<f64>, target: &Array1<f64>) -> Result<()> {
    if predicted.len() != target.len() {
        return Err(Error::Validation(format!(
            "prediction has {} entries but target has {}",
            predicted.len(),
            target.len()
        )));
    }
    Ok(())
}
