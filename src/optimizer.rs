//! Optimizer driver: one protocol over heterogeneous minimizer backends.
//!
//! Three shapes are supported interchangeably and all normalize to a
//! [`FitResult`]: a gradient-free simplex search, plain gradient descent,
//! and an arbitrary caller-supplied minimizer used unmodified. The driver
//! never retries a failed backend.

use std::fmt;

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Scalar objective handed to minimizer backends.
pub type ValueFn<'a> = &'a mut dyn FnMut(&Array1<f64>) -> Result<f64>;

/// Objective gradient handed to gradient-based backends.
pub type GradientFn<'a> = &'a mut dyn FnMut(&Array1<f64>) -> Result<Array1<f64>>;

/// Per-accepted-step notification: `(nfev, current_weights, current_loss)`.
///
/// `nfev` is monotonically increasing across calls; probe evaluations a
/// backend rejects never produce a call. The crate stores no history.
pub type StepCallback<'a> = &'a mut dyn FnMut(usize, &Array1<f64>, f64);

/// A caller-supplied external minimizer: `(objective, initial_point)` to a
/// result carrying the optimal point and final value.
pub type CustomMinimizer = Box<dyn Fn(ValueFn<'_>, &Array1<f64>) -> Result<FitResult>>;

/// Normalized optimizer outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Optimal weight vector.
    pub x: Array1<f64>,
    /// Final objective value.
    pub fun: f64,
    /// Objective evaluation count.
    pub nfev: usize,
    /// Iteration count of the backend, when it has a notion of one.
    pub nit: usize,
}

/// Starting point policy for a fit. Never a process-wide random singleton:
/// the same policy and oracle always produce the same point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InitialPoint {
    /// All weights at the 0.5 midpoint.
    Default,
    /// Uniform in `[-1, 1]` from an explicitly seeded generator.
    Seeded(u64),
    /// Caller-supplied vector; its length must match the oracle.
    Custom(Array1<f64>),
}

impl Default for InitialPoint {
    fn default() -> Self {
        InitialPoint::Default
    }
}

impl InitialPoint {
    /// Materialize a weight vector of length `num_weights`.
    pub fn resolve(&self, num_weights: usize) -> Result<Array1<f64>> {
        match self {
            InitialPoint::Default => Ok(Array1::from_elem(num_weights, 0.5)),
            InitialPoint::Seeded(seed) => {
                let mut rng = StdRng::seed_from_u64(*seed);
                Ok(Array1::from_shape_fn(num_weights, |_| {
                    rng.gen_range(-1.0..=1.0)
                }))
            }
            InitialPoint::Custom(point) => {
                if point.len() != num_weights {
                    return Err(Error::Validation(format!(
                        "initial point has {} entries but the oracle has {} weights",
                        point.len(),
                        num_weights
                    )));
                }
                Ok(point.clone())
            }
        }
    }
}

/// Minimizer backend selection.
pub enum Optimizer {
    /// Gradient-free Nelder-Mead simplex search with a deterministic
    /// initial simplex.
    NelderMead { maxiter: usize },
    /// Fixed-step gradient descent; stops early when the gradient norm
    /// drops below `tol`.
    GradientDescent {
        maxiter: usize,
        learning_rate: f64,
        tol: f64,
    },
    /// Arbitrary external minimizer, used unmodified.
    Custom(CustomMinimizer),
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::NelderMead { maxiter: 100 }
    }
}

impl fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Optimizer::NelderMead { maxiter } => {
                f.debug_struct("NelderMead").field("maxiter", maxiter).finish()
            }
            Optimizer::GradientDescent {
                maxiter,
                learning_rate,
                tol,
            } => f
                .debug_struct("GradientDescent")
                .field("maxiter", maxiter)
                .field("learning_rate", learning_rate)
                .field("tol", tol)
                .finish(),
            Optimizer::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Optimizer {
    /// Run the backend from `initial_point` and normalize its outcome.
    ///
    /// `callback` fires once per accepted step. Backend failures propagate
    /// unmodified as [`Error::Optimizer`].
    pub fn minimize(
        &self,
        value: ValueFn<'_>,
        gradient: GradientFn<'_>,
        initial_point: &Array1<f64>,
        callback: Option<StepCallback<'_>>,
    ) -> Result<FitResult> {
        match self {
            Optimizer::NelderMead { maxiter } => {
                nelder_mead(value, initial_point, *maxiter, callback)
            }
            Optimizer::GradientDescent {
                maxiter,
                learning_rate,
                tol,
            } => gradient_descent(value, gradient, initial_point, *maxiter, *learning_rate, *tol, callback),
            Optimizer::Custom(minimize) => minimize(value, initial_point),
        }
    }
}

fn check_finite(value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::Optimizer(format!(
            "objective returned a non-finite value: {value}"
        )))
    }
}

/// Standard Nelder-Mead with reflection/expansion/contraction/shrink.
///
/// The initial simplex perturbs each coordinate of the starting point by a
/// fixed relative step, so runs are reproducible.
fn nelder_mead(
    value: ValueFn<'_>,
    x0: &Array1<f64>,
    maxiter: usize,
    mut callback: Option<StepCallback<'_>>,
) -> Result<FitResult> {
    const ALPHA: f64 = 1.0; // reflection
    const GAMMA: f64 = 2.0; // expansion
    const RHO: f64 = 0.5; // contraction
    const SIGMA: f64 = 0.5; // shrink
    const FTOL: f64 = 1e-10;

    let n = x0.len();
    let mut nfev = 0usize;
    let mut eval = |x: &Array1<f64>, nfev: &mut usize| -> Result<f64> {
        *nfev += 1;
        check_finite(value(x)?)
    };

    let mut simplex: Vec<Array1<f64>> = Vec::with_capacity(n + 1);
    simplex.push(x0.clone());
    for i in 0..n {
        let mut vertex = x0.clone();
        vertex[i] += if vertex[i] != 0.0 {
            0.05 * vertex[i]
        } else {
            0.1
        };
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = Vec::with_capacity(n + 1);
    for vertex in &simplex {
        values.push(eval(vertex, &mut nfev)?);
    }

    let mut notified_best = f64::INFINITY;
    let mut nit = 0;
    for _ in 0..maxiter {
        nit += 1;

        // Order vertices by objective value.
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());
        let reordered: Vec<Array1<f64>> = order.iter().map(|&i| simplex[i].clone()).collect();
        let revalued: Vec<f64> = order.iter().map(|&i| values[i]).collect();
        simplex = reordered;
        values = revalued;

        if values[0] < notified_best {
            notified_best = values[0];
            if let Some(cb) = callback.as_mut() {
                cb(nfev, &simplex[0], values[0]);
            }
        }
        if (values[n] - values[0]).abs() < FTOL {
            break;
        }

        // Centroid of all but the worst vertex.
        let mut centroid = Array1::zeros(n);
        for vertex in simplex.iter().take(n) {
            centroid = centroid + vertex;
        }
        centroid.mapv_inplace(|v| v / n as f64);

        let worst = simplex[n].clone();
        let reflected = &centroid + &((&centroid - &worst) * ALPHA);
        let f_reflected = eval(&reflected, &mut nfev)?;

        if f_reflected < values[0] {
            let expanded = &centroid + &((&reflected - &centroid) * GAMMA);
            let f_expanded = eval(&expanded, &mut nfev)?;
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
        } else if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
        } else {
            let contracted = &centroid + &((&worst - &centroid) * RHO);
            let f_contracted = eval(&contracted, &mut nfev)?;
            if f_contracted < values[n] {
                simplex[n] = contracted;
                values[n] = f_contracted;
            } else {
                // Shrink everything toward the best vertex.
                let best = simplex[0].clone();
                for i in 1..=n {
                    simplex[i] = &best + &((&simplex[i] - &best) * SIGMA);
                    values[i] = eval(&simplex[i].clone(), &mut nfev)?;
                }
            }
        }
    }

    let mut best = 0;
    for i in 1..=n {
        if values[i] < values[best] {
            best = i;
        }
    }
    log::debug!(
        "nelder-mead finished: {} iterations, {} evaluations, f = {}",
        nit,
        nfev,
        values[best]
    );
    Ok(FitResult {
        x: simplex[best].clone(),
        fun: values[best],
        nfev,
        nit,
    })
}

fn gradient_descent(
    value: ValueFn<'_>,
    gradient: GradientFn<'_>,
    x0: &Array1<f64>,
    maxiter: usize,
    learning_rate: f64,
    tol: f64,
    mut callback: Option<StepCallback<'_>>,
) -> Result<FitResult> {
    let mut x = x0.clone();
    let mut nfev = 1usize;
    let mut fx = check_finite(value(&x)?)?;
    let mut nit = 0;

    for _ in 0..maxiter {
        let grad = gradient(&x)?;
        let norm = grad.dot(&grad).sqrt();
        if norm < tol {
            break;
        }
        nit += 1;
        x = &x - &(grad * learning_rate);
        nfev += 1;
        fx = check_finite(value(&x)?)?;
        if let Some(cb) = callback.as_mut() {
            cb(nfev, &x, fx);
        }
    }

    log::debug!(
        "gradient descent finished: {} iterations, {} evaluations, f = {}",
        nit,
        nfev,
        fx
    );
    Ok(FitResult {
        x,
        fun: fx,
        nfev,
        nit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// f(x) = |x - (1, -2)|^2, minimum at (1, -2).
    fn quadratic(x: &Array1<f64>) -> Result<f64> {
        Ok((x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2))
    }

    fn quadratic_grad(x: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(array![2.0 * (x[0] - 1.0), 2.0 * (x[1] + 2.0)])
    }

    #[test]
    fn nelder_mead_finds_the_quadratic_minimum() {
        let opt = Optimizer::NelderMead { maxiter: 200 };
        let result = opt
            .minimize(
                &mut quadratic,
                &mut quadratic_grad,
                &array![0.0, 0.0],
                None,
            )
            .unwrap();
        assert!((result.x[0] - 1.0).abs() < 1e-3);
        assert!((result.x[1] + 2.0).abs() < 1e-3);
        assert!(result.fun < 1e-6);
        assert!(result.nfev > 0);
    }

    #[test]
    fn gradient_descent_finds_the_quadratic_minimum() {
        let opt = Optimizer::GradientDescent {
            maxiter: 500,
            learning_rate: 0.1,
            tol: 1e-9,
        };
        let result = opt
            .minimize(
                &mut quadratic,
                &mut quadratic_grad,
                &array![0.0, 0.0],
                None,
            )
            .unwrap();
        assert!((result.x[0] - 1.0).abs() < 1e-4);
        assert!((result.x[1] + 2.0).abs() < 1e-4);
    }

    #[test]
    fn callback_sees_monotonic_evaluation_counts_and_improving_loss() {
        let opt = Optimizer::default();
        let mut seen: Vec<(usize, f64)> = Vec::new();
        let mut cb = |nfev: usize, _x: &Array1<f64>, f: f64| seen.push((nfev, f));
        opt.minimize(
            &mut quadratic,
            &mut quadratic_grad,
            &array![3.0, 3.0],
            Some(&mut cb),
        )
        .unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(seen.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn custom_minimizer_is_used_unmodified() {
        let opt = Optimizer::Custom(Box::new(|value, x0| {
            let fun = value(x0)?;
            Ok(FitResult {
                x: x0.clone(),
                fun,
                nfev: 1,
                nit: 0,
            })
        }));
        let result = opt
            .minimize(
                &mut quadratic,
                &mut quadratic_grad,
                &array![1.0, -2.0],
                None,
            )
            .unwrap();
        assert_eq!(result.fun, 0.0);
        assert_eq!(result.nfev, 1);
    }

    #[test]
    fn custom_minimizer_failure_propagates() {
        let opt = Optimizer::Custom(Box::new(|_value, _x0| {
            Err(Error::Optimizer("backend blew up".to_string()))
        }));
        let err = opt.minimize(
            &mut quadratic,
            &mut quadratic_grad,
            &array![0.0, 0.0],
            None,
        );
        assert!(matches!(err, Err(Error::Optimizer(_))));
    }

    #[test]
    fn non_finite_objective_is_an_optimizer_failure() {
        let opt = Optimizer::default();
        let mut bad = |_x: &Array1<f64>| Ok(f64::NAN);
        let err = opt.minimize(&mut bad, &mut quadratic_grad, &array![0.0, 0.0], None);
        assert!(matches!(err, Err(Error::Optimizer(_))));
    }

    #[test]
    fn initial_point_policies_are_deterministic() {
        let a = InitialPoint::Seeded(7).resolve(4).unwrap();
        let b = InitialPoint::Seeded(7).resolve(4).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            InitialPoint::Default.resolve(3).unwrap(),
            array![0.5, 0.5, 0.5]
        );
        let err = InitialPoint::Custom(array![1.0]).resolve(2);
        assert!(matches!(err, Err(Error::Validation(_))));
    }
}
