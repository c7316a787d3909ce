//! Label encoding policy: decided once per `fit`, immutable afterwards.
//!
//! The encoder inspects the raw label container and the oracle's output
//! dimensionality, picks one of the policy variants, and from then on owns
//! both directions: raw labels -> oracle targets for training/scoring, and
//! oracle outputs -> labels in the original representation for prediction.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::data::Labels;
use crate::error::{Error, Result};

/// Row sums and indicator entries are accepted within this tolerance.
const ONE_HOT_TOL: f64 = 1e-6;

/// Target representation handed to the objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Scheme {
    /// Scalar targets for an output-dim-1 oracle; class 0 trains toward
    /// `lo`, class 1 toward `hi`.
    BinaryScalar { lo: f64, hi: f64 },
    /// Indicator-row targets of width `num_classes`.
    OneHot { num_classes: usize },
}

/// Inverse mapping from class index back to the training representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Classes {
    /// Sorted distinct numeric label values; index = class index.
    Numeric(Vec<f64>),
    /// Lexicographically sorted distinct string labels.
    Text(Vec<String>),
    /// Labels arrived pre-encoded as one-hot rows of this width; predictions
    /// are returned in the same form.
    Indicator(usize),
}

/// Predictions in the representation the classifier was trained on.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Numeric(Array1<f64>),
    Text(Vec<String>),
    OneHot(Array2<f64>),
}

/// The fitted encoding policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEncoding {
    scheme: Scheme,
    classes: Classes,
}

impl LabelEncoding {
    /// Inspect `labels` and fix the policy for this fit.
    ///
    /// `output_dim` is the oracle's declared output dimensionality and
    /// `one_hot` is the caller flag forcing one-hot label handling.
    pub fn from_labels(labels: &Labels, output_dim: usize, one_hot: bool) -> Result<Self> {
        match labels {
            Labels::OneHot(_) | Labels::SparseOneHot(_) => {
                let rows = dense_rows(labels);
                Self::from_indicator_rows(&rows, output_dim, one_hot)
            }
            Labels::Numeric(values) => {
                if one_hot {
                    return Err(Error::Validation(
                        "one-hot encoding requested but labels are rank-1 scalars".to_string(),
                    ));
                }
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(Error::Validation(
                        "labels contain non-finite values".to_string(),
                    ));
                }
                let mut distinct: Vec<f64> = values.to_vec();
                distinct.sort_by(|a, b| a.total_cmp(b));
                distinct.dedup();
                Self::from_classes(Classes::Numeric(distinct), output_dim, false)
            }
            // Categorical data honors the flag: one_hot forces indicator
            // targets even for two classes.
            Labels::Text(values) => {
                let mut distinct: Vec<String> = values.clone();
                distinct.sort();
                distinct.dedup();
                Self::from_classes(Classes::Text(distinct), output_dim, one_hot)
            }
        }
    }

    fn from_indicator_rows(rows: &Array2<f64>, output_dim: usize, strict: bool) -> Result<Self> {
        let num_classes = rows.ncols();
        if num_classes < 2 {
            return Err(Error::Validation(format!(
                "a classifier needs at least 2 classes, got {} label column(s)",
                num_classes
            )));
        }
        for (i, row) in rows.rows().into_iter().enumerate() {
            if row.iter().any(|v| !v.is_finite()) {
                return Err(Error::Validation(format!(
                    "label row {} contains non-finite values",
                    i
                )));
            }
            // A NaN sum would sail through the tolerance compare below.
            let sum: f64 = row.sum();
            if (sum - 1.0).abs() > ONE_HOT_TOL {
                return Err(Error::Validation(format!(
                    "label row {} sums to {}, expected 1 for one-hot data",
                    i, sum
                )));
            }
            if strict
                && row
                    .iter()
                    .any(|&v| v.abs() > ONE_HOT_TOL && (v - 1.0).abs() > ONE_HOT_TOL)
            {
                return Err(Error::Validation(format!(
                    "label row {} contains entries outside {{0, 1}}",
                    i
                )));
            }
        }
        if output_dim != num_classes {
            return Err(Error::Validation(format!(
                "labels are one-hot with {} classes but the oracle outputs {} value(s)",
                num_classes, output_dim
            )));
        }
        Ok(LabelEncoding {
            scheme: Scheme::OneHot { num_classes },
            classes: Classes::Indicator(num_classes),
        })
    }

    /// Categorical-index path: classes are already sorted-unique, pick the
    /// scalar or indicator scheme from the class count and oracle shape.
    /// `force_one_hot` demands indicator targets even for two classes.
    fn from_classes(classes: Classes, output_dim: usize, force_one_hot: bool) -> Result<Self> {
        let k = match &classes {
            Classes::Numeric(v) => v.len(),
            Classes::Text(v) => v.len(),
            Classes::Indicator(n) => *n,
        };
        if k < 2 {
            return Err(Error::Validation(format!(
                "a classifier needs at least 2 distinct label values, got {}",
                k
            )));
        }
        if force_one_hot && output_dim != k {
            return Err(Error::Validation(format!(
                "one-hot encoding of {} classes requires oracle output dim {}, got {}",
                k, k, output_dim
            )));
        }
        let scheme = if !force_one_hot && k == 2 && output_dim == 1 {
            let (lo, hi) = match &classes {
                // Numeric binary data trains toward its own two values, so
                // e.g. {-1, +1} labels stay {-1, +1} targets.
                Classes::Numeric(v) => (v[0], v[1]),
                _ => (0.0, 1.0),
            };
            Scheme::BinaryScalar { lo, hi }
        } else if output_dim == k {
            Scheme::OneHot { num_classes: k }
        } else if output_dim == 1 {
            return Err(Error::Validation(format!(
                "{} classes cannot be trained against a binary-only oracle (output dim 1)",
                k
            )));
        } else {
            return Err(Error::Validation(format!(
                "{} classes incompatible with oracle output dim {}",
                k, output_dim
            )));
        };
        Ok(LabelEncoding { scheme, classes })
    }

    /// Number of classes fixed at fit time.
    pub fn num_classes(&self) -> usize {
        match &self.scheme {
            Scheme::BinaryScalar { .. } => 2,
            Scheme::OneHot { num_classes } => *num_classes,
        }
    }

    /// Width of the target rows handed to the objective.
    pub fn target_width(&self) -> usize {
        match &self.scheme {
            Scheme::BinaryScalar { .. } => 1,
            Scheme::OneHot { num_classes } => *num_classes,
        }
    }

    /// Map every raw label to its class index.
    ///
    /// Used for training encode and for scoring ground truth through the
    /// same mapping. A value never seen at fit time is a validation error.
    pub fn class_indices(&self, labels: &Labels) -> Result<Vec<usize>> {
        match labels {
            Labels::Numeric(values) => values
                .iter()
                .map(|&v| self.numeric_index(v))
                .collect(),
            Labels::Text(values) => values
                .iter()
                .map(|v| self.text_index(v))
                .collect(),
            Labels::OneHot(_) | Labels::SparseOneHot(_) => {
                let rows = dense_rows(labels);
                if rows.ncols() != self.num_classes() {
                    return Err(Error::Validation(format!(
                        "one-hot labels have {} columns, expected {}",
                        rows.ncols(),
                        self.num_classes()
                    )));
                }
                Ok(rows.rows().into_iter().map(|row| argmax(&row.to_owned())).collect())
            }
        }
    }

    fn numeric_index(&self, value: f64) -> Result<usize> {
        match &self.classes {
            Classes::Numeric(v) => v
                .iter()
                .position(|&c| c == value)
                .ok_or_else(|| {
                    Error::Validation(format!("label value {} was not seen at fit time", value))
                }),
            _ => Err(Error::Validation(
                "numeric labels given to a classifier fitted on non-numeric labels".to_string(),
            )),
        }
    }

    fn text_index(&self, value: &str) -> Result<usize> {
        match &self.classes {
            Classes::Text(v) => v
                .iter()
                .position(|c| c == value)
                .ok_or_else(|| {
                    Error::Validation(format!("label {:?} was not seen at fit time", value))
                }),
            _ => Err(Error::Validation(
                "string labels given to a classifier fitted on non-string labels".to_string(),
            )),
        }
    }

    /// Encode raw labels to the target matrix the objective trains against,
    /// shape `(n_samples, target_width)`.
    pub fn encode(&self, labels: &Labels) -> Result<Array2<f64>> {
        let indices = self.class_indices(labels)?;
        let mut targets = Array2::zeros((indices.len(), self.target_width()));
        match &self.scheme {
            Scheme::BinaryScalar { lo, hi } => {
                for (r, &idx) in indices.iter().enumerate() {
                    targets[(r, 0)] = if idx == 0 { *lo } else { *hi };
                }
            }
            Scheme::OneHot { .. } => {
                for (r, &idx) in indices.iter().enumerate() {
                    targets[(r, idx)] = 1.0;
                }
            }
        }
        Ok(targets)
    }

    /// Class index of each predicted output row.
    pub fn output_indices(&self, outputs: &Array2<f64>) -> Vec<usize> {
        match &self.scheme {
            Scheme::BinaryScalar { lo, hi } => outputs
                .rows()
                .into_iter()
                .map(|row| {
                    let s = row[0];
                    // Nearer of the two mapped targets.
                    if (s - lo).abs() <= (s - hi).abs() {
                        0
                    } else {
                        1
                    }
                })
                .collect(),
            Scheme::OneHot { .. } => outputs
                .rows()
                .into_iter()
                .map(|row| argmax(&row.to_owned()))
                .collect(),
        }
    }

    /// Decode oracle outputs back into the training representation.
    pub fn decode(&self, outputs: &Array2<f64>) -> Prediction {
        let indices = self.output_indices(outputs);
        match &self.classes {
            Classes::Numeric(v) => {
                Prediction::Numeric(indices.iter().map(|&i| v[i]).collect())
            }
            Classes::Text(v) => Prediction::Text(indices.iter().map(|&i| v[i].clone()).collect()),
            Classes::Indicator(n) => {
                let mut rows = Array2::zeros((indices.len(), *n));
                for (r, &i) in indices.iter().enumerate() {
                    rows[(r, i)] = 1.0;
                }
                Prediction::OneHot(rows)
            }
        }
    }

    /// Per-class probability rows, each summing to 1.
    pub fn probabilities(&self, outputs: &Array2<f64>) -> Array2<f64> {
        match &self.scheme {
            Scheme::BinaryScalar { lo, hi } => {
                let mut probs = Array2::zeros((outputs.nrows(), 2));
                for (r, row) in outputs.rows().into_iter().enumerate() {
                    let p = ((row[0] - lo) / (hi - lo)).clamp(0.0, 1.0);
                    probs[(r, 0)] = 1.0 - p;
                    probs[(r, 1)] = p;
                }
                probs
            }
            Scheme::OneHot { num_classes } => {
                let mut probs = Array2::zeros((outputs.nrows(), *num_classes));
                for (r, row) in outputs.rows().into_iter().enumerate() {
                    let clipped: Vec<f64> = row.iter().map(|&v| v.max(0.0)).collect();
                    let sum: f64 = clipped.iter().sum();
                    if sum > 0.0 {
                        for (c, v) in clipped.iter().enumerate() {
                            probs[(r, c)] = v / sum;
                        }
                    } else {
                        // Degenerate all-zero output row: fall back to uniform.
                        for c in 0..*num_classes {
                            probs[(r, c)] = 1.0 / *num_classes as f64;
                        }
                    }
                }
                probs
            }
        }
    }
}

fn dense_rows(labels: &Labels) -> Array2<f64> {
    match labels {
        Labels::OneHot(rows) => rows.clone(),
        Labels::SparseOneHot(rows) => rows.to_dense(),
        _ => unreachable!("dense_rows is only called for rank-2 label variants"),
    }
}

fn argmax(row: &Array1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}
