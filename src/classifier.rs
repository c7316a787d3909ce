//! The classifier itself: configuration, fit/predict lifecycle, scoring.

use ndarray::{Array1, Array2};

use crate::data::{Features, Labels};
use crate::encoding::{LabelEncoding, Prediction};
use crate::error::{Error, Result};
use crate::loss::Loss;
use crate::objective::Objective;
use crate::optimizer::{FitResult, InitialPoint, Optimizer};
use crate::oracle::ModelOracle;

/// Caller-owned step notification, see [`crate::optimizer::StepCallback`].
pub type Callback = Box<dyn FnMut(usize, &Array1<f64>, f64)>;

/// State populated by a successful `fit` or an envelope load.
pub(crate) struct FittedState {
    pub(crate) encoding: LabelEncoding,
    pub(crate) weights: Array1<f64>,
    /// Present only when the weights came from an optimization run in this
    /// process; a model restored from an envelope has none.
    pub(crate) result: Option<FitResult>,
}

/// A trainable classifier over a differentiable model oracle.
///
/// Created unfitted; transitions to fitted only when `fit` completes. All
/// fitted-only surface (`weights`, `fit_result`, `num_classes`, `predict`,
/// `predict_proba`) errors while unfitted rather than inventing defaults.
pub struct OracleClassifier<O: ModelOracle> {
    oracle: O,
    optimizer: Optimizer,
    loss: Loss,
    one_hot: bool,
    initial_point: InitialPoint,
    callback: Option<Callback>,
    fitted: Option<FittedState>,
}

impl<O: ModelOracle> OracleClassifier<O> {
    /// New unfitted classifier with the default optimizer, squared-error
    /// loss, index label encoding and the deterministic initial point.
    pub fn new(oracle: O) -> Self {
        OracleClassifier {
            oracle,
            optimizer: Optimizer::default(),
            loss: Loss::default(),
            one_hot: false,
            initial_point: InitialPoint::default(),
            callback: None,
            fitted: None,
        }
    }

    pub fn with_optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    /// Require labels to be (and predictions to stay) one-hot encoded.
    pub fn with_one_hot(mut self, one_hot: bool) -> Self {
        self.one_hot = one_hot;
        self
    }

    pub fn with_initial_point(mut self, initial_point: InitialPoint) -> Self {
        self.initial_point = initial_point;
        self
    }

    /// Install a per-accepted-step callback. Any history accumulation is
    /// the caller's concern.
    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Fit the oracle's weights to labeled data.
    ///
    /// Blocks until the optimizer converges or exhausts its budget. Any
    /// validation or optimizer failure propagates and leaves the previous
    /// state (fitted or not) untouched.
    pub fn fit(&mut self, features: &Features, labels: &Labels) -> Result<()> {
        if features.nrows() == 0 {
            return Err(Error::Validation("no training samples".to_string()));
        }
        if features.nrows() != labels.len() {
            return Err(Error::Validation(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        if features.ncols() != self.oracle.num_inputs() {
            return Err(Error::Validation(format!(
                "features have {} columns but the oracle expects {} inputs",
                features.ncols(),
                self.oracle.num_inputs()
            )));
        }

        let encoding =
            LabelEncoding::from_labels(labels, self.oracle.output_dim(), self.one_hot)?;
        if self.loss.requires_distribution() && encoding.target_width() == 1 {
            return Err(Error::Config(format!(
                "loss {:?} requires one-hot targets but the encoding produces scalars",
                self.loss.name()
            )));
        }
        let targets = encoding.encode(labels)?;
        let initial = self.initial_point.resolve(self.oracle.num_weights())?;

        log::info!(
            "fitting {} samples, {} classes, loss {}, optimizer {:?}",
            features.nrows(),
            encoding.num_classes(),
            self.loss.name(),
            self.optimizer
        );

        let objective = Objective::new(&self.oracle, features, &targets, &self.loss)?;
        let mut value = |w: &Array1<f64>| objective.value(w);
        let mut gradient = |w: &Array1<f64>| objective.gradient(w);
        let callback = self
            .callback
            .as_mut()
            .map(|cb| cb.as_mut() as &mut dyn FnMut(usize, &Array1<f64>, f64));
        let result = self
            .optimizer
            .minimize(&mut value, &mut gradient, &initial, callback)?;

        log::info!(
            "fit complete: final loss {}, {} evaluations",
            result.fun,
            result.nfev
        );
        self.fitted = Some(FittedState {
            encoding,
            weights: result.x.clone(),
            result: Some(result),
        });
        Ok(())
    }

    fn fitted(&self) -> Result<&FittedState> {
        self.fitted
            .as_ref()
            .ok_or_else(|| Error::State("classifier has not been fitted".to_string()))
    }

    /// Fitted weight vector.
    pub fn weights(&self) -> Result<&Array1<f64>> {
        Ok(&self.fitted()?.weights)
    }

    /// Result of the optimization run that produced the current weights.
    pub fn fit_result(&self) -> Result<&FitResult> {
        self.fitted()?.result.as_ref().ok_or_else(|| {
            Error::State(
                "no fit result: this model was restored from an envelope".to_string(),
            )
        })
    }

    /// Class count fixed when the model was fitted.
    pub fn num_classes(&self) -> Result<usize> {
        Ok(self.fitted()?.encoding.num_classes())
    }

    /// Raw oracle outputs for every sample, shape `(n, output_dim)`.
    fn forward_all(&self, features: &Features) -> Result<Array2<f64>> {
        let fitted = self.fitted()?;
        if features.ncols() != self.oracle.num_inputs() {
            return Err(Error::Validation(format!(
                "features have {} columns but the oracle expects {} inputs",
                features.ncols(),
                self.oracle.num_inputs()
            )));
        }
        let n = features.nrows();
        let mut outputs = Array2::zeros((n, self.oracle.output_dim()));
        for i in 0..n {
            let row = self.oracle.forward(&features.row(i), &fitted.weights)?;
            outputs.row_mut(i).assign(&row);
        }
        Ok(outputs)
    }

    /// Predict labels in the representation the model was trained on.
    pub fn predict(&self, features: &Features) -> Result<Prediction> {
        let outputs = self.forward_all(features)?;
        Ok(self.fitted()?.encoding.decode(&outputs))
    }

    /// Per-class probabilities, one row per sample, each summing to 1.
    pub fn predict_proba(&self, features: &Features) -> Result<Array2<f64>> {
        let outputs = self.forward_all(features)?;
        Ok(self.fitted()?.encoding.probabilities(&outputs))
    }

    /// Exact-match accuracy against ground truth, both sides run through
    /// the fit-time label mapping. Read-only: repeated calls with the same
    /// inputs return the same value.
    pub fn score(&self, features: &Features, labels: &Labels) -> Result<f64> {
        if features.nrows() == 0 {
            return Err(Error::Validation("no samples to score".to_string()));
        }
        if features.nrows() != labels.len() {
            return Err(Error::Validation(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        let fitted = self.fitted()?;
        let outputs = self.forward_all(features)?;
        let predicted = fitted.encoding.output_indices(&outputs);
        let truth = fitted.encoding.class_indices(labels)?;
        let hits = predicted
            .iter()
            .zip(truth.iter())
            .filter(|(p, t)| p == t)
            .count();
        Ok(hits as f64 / predicted.len() as f64)
    }

    pub(crate) fn encoding_for_envelope(&self) -> Result<LabelEncoding> {
        Ok(self.fitted()?.encoding.clone())
    }

    pub(crate) fn loss_name_for_envelope(&self) -> Result<String> {
        match &self.loss {
            Loss::Custom(_) => Err(Error::Config(
                "a custom loss has no registry identifier and cannot be persisted".to_string(),
            )),
            named => Ok(named.name().to_string()),
        }
    }

    pub(crate) fn from_restored(oracle: O, loss: Loss, state: FittedState) -> Self {
        OracleClassifier {
            oracle,
            optimizer: Optimizer::default(),
            loss,
            one_hot: false,
            initial_point: InitialPoint::default(),
            callback: None,
            fitted: Some(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::LinearOracle;
    use ndarray::array;

    fn binary_fixture() -> (Features, Labels) {
        let x = array![
            [0.1, 0.2],
            [0.2, 0.1],
            [0.3, 0.3],
            [0.9, 0.8],
            [0.8, 0.9],
            [0.7, 0.9],
        ];
        // sum <= 1 gets class 1, otherwise class 0
        let y = vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        (Features::from(x), Labels::from(y))
    }

    #[test]
    fn unfitted_accessors_are_state_errors() {
        let clf = OracleClassifier::new(LinearOracle::distribution(2, 2));
        assert!(matches!(clf.weights(), Err(Error::State(_))));
        assert!(matches!(clf.fit_result(), Err(Error::State(_))));
        assert!(matches!(clf.num_classes(), Err(Error::State(_))));
        let x = Features::from(array![[0.0, 0.0]]);
        assert!(matches!(clf.predict(&x), Err(Error::State(_))));
        assert!(matches!(clf.predict_proba(&x), Err(Error::State(_))));
    }

    #[test]
    fn row_count_mismatch_leaves_classifier_unfitted() {
        let mut clf = OracleClassifier::new(LinearOracle::distribution(2, 2));
        let x = Features::from(array![[0.0, 0.0], [1.0, 1.0]]);
        let y = Labels::from(vec![0.0]);
        assert!(matches!(clf.fit(&x, &y), Err(Error::Validation(_))));
        assert!(matches!(clf.weights(), Err(Error::State(_))));
    }

    #[test]
    fn scoring_zero_samples_is_rejected() {
        let mut clf = OracleClassifier::new(LinearOracle::distribution(2, 2));
        let (x, y) = binary_fixture();
        clf.fit(&x, &y).unwrap();
        let empty_x = Features::from(Array2::<f64>::zeros((0, 2)));
        let empty_y = Labels::from(Vec::<f64>::new());
        assert!(matches!(
            clf.score(&empty_x, &empty_y),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn cross_entropy_against_scalar_targets_is_a_config_error() {
        let mut clf = OracleClassifier::new(LinearOracle::expectation(2))
            .with_loss(Loss::CrossEntropy);
        let (x, y) = binary_fixture();
        let y = match y {
            Labels::Numeric(v) => Labels::Numeric(v.mapv(|t| 2.0 * t - 1.0)),
            other => other,
        };
        assert!(matches!(clf.fit(&x, &y), Err(Error::Config(_))));
    }

    #[test]
    fn fit_then_predict_binary() {
        let mut clf = OracleClassifier::new(LinearOracle::distribution(2, 2))
            .with_optimizer(Optimizer::GradientDescent {
                maxiter: 300,
                learning_rate: 0.5,
                tol: 1e-8,
            });
        let (x, y) = binary_fixture();
        clf.fit(&x, &y).unwrap();
        assert_eq!(clf.num_classes().unwrap(), 2);
        assert!(clf.score(&x, &y).unwrap() >= 0.5);
        match clf.predict(&x).unwrap() {
            Prediction::Numeric(values) => {
                assert!(values.iter().all(|v| *v == 0.0 || *v == 1.0))
            }
            other => panic!("expected numeric predictions, got {other:?}"),
        }
    }

    #[test]
    fn refit_overwrites_the_previous_result() {
        let mut clf = OracleClassifier::new(LinearOracle::distribution(2, 2));
        let (x, y) = binary_fixture();
        clf.fit(&x, &y).unwrap();
        let first = clf.fit_result().unwrap().fun;
        let mut clf = clf.with_optimizer(Optimizer::NelderMead { maxiter: 1 });
        clf.fit(&x, &y).unwrap();
        // A one-iteration budget cannot reproduce the converged loss.
        assert!(clf.fit_result().unwrap().fun >= first);
    }
}
