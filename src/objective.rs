//! Builds the scalar objective and its gradient over the weight vector.
//!
//! `J(w)` is the mean per-sample loss of the oracle's forward pass against
//! the encoded targets; the gradient chains the loss sub-gradient through
//! the oracle's output/weight Jacobian. Dense and sparse feature storage go
//! through the same per-row path, so the numbers are identical.

use ndarray::{Array1, Array2};

use crate::data::Features;
use crate::error::{Error, Result};
use crate::loss::Loss;
use crate::oracle::ModelOracle;

pub struct Objective<'a, O: ModelOracle + ?Sized> {
    oracle: &'a O,
    features: &'a Features,
    targets: &'a Array2<f64>,
    loss: &'a Loss,
}

impl<'a, O: ModelOracle + ?Sized> Objective<'a, O> {
    /// Bind an oracle, a feature batch, encoded targets and a loss.
    ///
    /// `targets` must have one row per feature row and
    /// `oracle.output_dim()` columns.
    pub fn new(
        oracle: &'a O,
        features: &'a Features,
        targets: &'a Array2<f64>,
        loss: &'a Loss,
    ) -> Result<Self> {
        if features.nrows() != targets.nrows() {
            return Err(Error::Validation(format!(
                "{} feature rows but {} target rows",
                features.nrows(),
                targets.nrows()
            )));
        }
        if targets.ncols() != oracle.output_dim() {
            return Err(Error::Validation(format!(
                "targets have {} columns but the oracle outputs {} value(s)",
                targets.ncols(),
                oracle.output_dim()
            )));
        }
        Ok(Objective {
            oracle,
            features,
            targets,
            loss,
        })
    }

    /// `J(w)`: mean per-sample loss at `weights`.
    pub fn value(&self, weights: &Array1<f64>) -> Result<f64> {
        let n = self.features.nrows();
        let mut total = 0.0;
        for i in 0..n {
            let input = self.features.row(i);
            let predicted = self.oracle.forward(&input, weights)?;
            total += self.loss.evaluate(&predicted, &self.targets.row(i).to_owned())?;
        }
        let value = total / n as f64;
        log::trace!("objective value {value}");
        Ok(value)
    }

    /// `∇J(w)`: mean of the per-sample loss gradients chained through the
    /// oracle Jacobian.
    pub fn gradient(&self, weights: &Array1<f64>) -> Result<Array1<f64>> {
        let n = self.features.nrows();
        let mut total = Array1::zeros(weights.len());
        for i in 0..n {
            let input = self.features.row(i);
            let predicted = self.oracle.forward(&input, weights)?;
            let d_loss = self
                .loss
                .gradient(&predicted, &self.targets.row(i).to_owned())?;
            let jacobian = self.oracle.backward(&input, weights)?;
            if jacobian.dim() != (self.oracle.output_dim(), weights.len()) {
                return Err(Error::Validation(format!(
                    "oracle Jacobian has shape {:?}, expected ({}, {})",
                    jacobian.dim(),
                    self.oracle.output_dim(),
                    weights.len()
                )));
            }
            total = total + jacobian.t().dot(&d_loss);
        }
        Ok(total / n as f64)
    }
}
