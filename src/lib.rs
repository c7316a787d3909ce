//! oracle-classifiers: a trainable classifier over differentiable model oracles.
//!
//! The crate wraps any parameterized, differentiable function (a "model
//! oracle" behind the [`oracle::ModelOracle`] trait) and drives it through an
//! optimization loop to fit labeled data, then classifies new inputs with the
//! fitted weights. The machinery around the oracle is the point: fit-time
//! label-encoding policy selection, loss dispatch with shape validation, a
//! uniform driver over gradient-free, gradient-based and caller-supplied
//! minimizers, per-step callbacks, the unfitted/fitted state machine, and a
//! versioned persistence envelope for the complete fitted model.
//!
//! Training is single-threaded and synchronous: `fit` blocks until the
//! optimizer converges or exhausts its budget.
pub mod classifier;
pub mod data;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod loss;
pub mod objective;
pub mod optimizer;
pub mod oracle;
