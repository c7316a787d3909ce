//! The model-oracle contract and a linear reference oracle.
//!
//! The classifier never looks inside an oracle: it only calls `forward` and
//! `backward` and reads the declared shapes. Anything differentiable can sit
//! behind the trait. `LinearOracle` is the concrete implementation shipped
//! with the crate so it trains and tests standalone.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A parameterized, differentiable function of `(input, weights)`.
///
/// Implementations must be stateless across calls: the same input and weight
/// vectors always produce the same output and Jacobian.
pub trait ModelOracle {
    /// Length of the input vector.
    fn num_inputs(&self) -> usize;

    /// Length of the weight vector.
    fn num_weights(&self) -> usize;

    /// Length of the output vector.
    fn output_dim(&self) -> usize;

    /// Evaluate the oracle at one sample.
    fn forward(&self, input: &Array1<f64>, weights: &Array1<f64>) -> Result<Array1<f64>>;

    /// Jacobian of the output with respect to the weights, shape
    /// `(output_dim, num_weights)`.
    fn backward(&self, input: &Array1<f64>, weights: &Array1<f64>) -> Result<Array2<f64>>;
}

/// Output head of a [`LinearOracle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Head {
    /// Element-wise tanh; the usual choice for a scalar expectation-style
    /// output in `[-1, 1]`.
    Tanh,
    /// Softmax over the outputs; yields a probability distribution.
    Softmax,
}

/// Affine map plus a nonlinear head, with an analytic Jacobian.
///
/// Weight layout: the `(num_outputs, num_inputs)` matrix row-major, followed
/// by `num_outputs` bias entries when the bias is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearOracle {
    num_inputs: usize,
    num_outputs: usize,
    head: Head,
    bias: bool,
}

impl LinearOracle {
    /// Scalar tanh oracle with output in `[-1, 1]`.
    pub fn expectation(num_inputs: usize) -> Self {
        LinearOracle {
            num_inputs,
            num_outputs: 1,
            head: Head::Tanh,
            bias: true,
        }
    }

    /// Softmax oracle producing a `num_outputs`-class distribution.
    pub fn distribution(num_inputs: usize, num_outputs: usize) -> Self {
        LinearOracle {
            num_inputs,
            num_outputs,
            head: Head::Softmax,
            bias: true,
        }
    }

    /// Drop the bias entries from the weight layout.
    pub fn without_bias(mut self) -> Self {
        self.bias = false;
        self
    }

    fn check_shapes(&self, input: &Array1<f64>, weights: &Array1<f64>) -> Result<()> {
        if input.len() != self.num_inputs {
            return Err(Error::Validation(format!(
                "oracle expects {} inputs, got {}",
                self.num_inputs,
                input.len()
            )));
        }
        if weights.len() != self.num_weights() {
            return Err(Error::Validation(format!(
                "oracle expects {} weights, got {}",
                self.num_weights(),
                weights.len()
            )));
        }
        Ok(())
    }

    /// Pre-activation `z = W x (+ b)`.
    fn affine(&self, input: &Array1<f64>, weights: &Array1<f64>) -> Array1<f64> {
        let mut z = Array1::zeros(self.num_outputs);
        for k in 0..self.num_outputs {
            let mut acc = 0.0;
            for j in 0..self.num_inputs {
                acc += weights[k * self.num_inputs + j] * input[j];
            }
            if self.bias {
                acc += weights[self.num_outputs * self.num_inputs + k];
            }
            z[k] = acc;
        }
        z
    }
}

fn softmax(z: &Array1<f64>) -> Array1<f64> {
    let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut out = z.mapv(|v| (v - max).exp());
    let sum = out.sum();
    out.mapv_inplace(|v| v / sum);
    out
}

impl ModelOracle for LinearOracle {
    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn num_weights(&self) -> usize {
        self.num_outputs * self.num_inputs + if self.bias { self.num_outputs } else { 0 }
    }

    fn output_dim(&self) -> usize {
        self.num_outputs
    }

    fn forward(&self, input: &Array1<f64>, weights: &Array1<f64>) -> Result<Array1<f64>> {
        self.check_shapes(input, weights)?;
        let z = self.affine(input, weights);
        Ok(match self.head {
            Head::Tanh => z.mapv(f64::tanh),
            Head::Softmax => softmax(&z),
        })
    }

    fn backward(&self, input: &Array1<f64>, weights: &Array1<f64>) -> Result<Array2<f64>> {
        self.check_shapes(input, weights)?;
        let z = self.affine(input, weights);
        let y = match self.head {
            Head::Tanh => z.mapv(f64::tanh),
            Head::Softmax => softmax(&z),
        };

        // dz_k/dW[k,j] = x[j], dz_k/db[k] = 1; the head contributes dy_i/dz_k.
        let mut jac = Array2::zeros((self.num_outputs, self.num_weights()));
        for i in 0..self.num_outputs {
            for k in 0..self.num_outputs {
                let dy_dz = match self.head {
                    Head::Tanh => {
                        if i == k {
                            1.0 - y[i] * y[i]
                        } else {
                            0.0
                        }
                    }
                    Head::Softmax => {
                        let delta = if i == k { 1.0 } else { 0.0 };
                        y[i] * (delta - y[k])
                    }
                };
                if dy_dz == 0.0 {
                    continue;
                }
                for j in 0..self.num_inputs {
                    jac[(i, k * self.num_inputs + j)] = dy_dz * input[j];
                }
                if self.bias {
                    jac[(i, self.num_outputs * self.num_inputs + k)] = dy_dz;
                }
            }
        }
        Ok(jac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn numeric_jacobian(
        oracle: &LinearOracle,
        input: &Array1<f64>,
        weights: &Array1<f64>,
    ) -> Array2<f64> {
        let eps = 1e-6;
        let mut jac = Array2::zeros((oracle.output_dim(), oracle.num_weights()));
        for m in 0..oracle.num_weights() {
            let mut plus = weights.clone();
            plus[m] += eps;
            let mut minus = weights.clone();
            minus[m] -= eps;
            let yp = oracle.forward(input, &plus).unwrap();
            let ym = oracle.forward(input, &minus).unwrap();
            for i in 0..oracle.output_dim() {
                jac[(i, m)] = (yp[i] - ym[i]) / (2.0 * eps);
            }
        }
        jac
    }

    #[test]
    fn softmax_output_is_a_distribution() {
        let oracle = LinearOracle::distribution(2, 3);
        let y = oracle
            .forward(&array![0.3, -0.7], &Array1::linspace(-1.0, 1.0, 9))
            .unwrap();
        assert!((y.sum() - 1.0).abs() < 1e-12);
        assert!(y.iter().all(|&p| p > 0.0));
    }

    #[test]
    fn tanh_jacobian_matches_finite_differences() {
        let oracle = LinearOracle::expectation(3);
        let input = array![0.2, -0.4, 0.9];
        let weights = array![0.1, -0.3, 0.5, 0.2];
        let jac = oracle.backward(&input, &weights).unwrap();
        let num = numeric_jacobian(&oracle, &input, &weights);
        for (a, b) in jac.iter().zip(num.iter()) {
            assert!((a - b).abs() < 1e-6, "analytic {a} vs numeric {b}");
        }
    }

    #[test]
    fn softmax_jacobian_matches_finite_differences() {
        let oracle = LinearOracle::distribution(2, 2).without_bias();
        assert_eq!(oracle.num_weights(), 4);
        let input = array![0.8, 0.1];
        let weights = array![0.4, -0.2, 0.0, 0.6];
        let jac = oracle.backward(&input, &weights).unwrap();
        let num = numeric_jacobian(&oracle, &input, &weights);
        for (a, b) in jac.iter().zip(num.iter()) {
            assert!((a - b).abs() < 1e-6, "analytic {a} vs numeric {b}");
        }
    }

    #[test]
    fn shape_mismatch_is_a_validation_error() {
        let oracle = LinearOracle::expectation(2);
        let err = oracle.forward(&array![1.0], &array![0.0, 0.0, 0.0]);
        assert!(matches!(err, Err(crate::error::Error::Validation(_))));
    }
}
