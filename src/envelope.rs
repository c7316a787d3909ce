//! Versioned persistence envelope for fitted models.
//!
//! Exactly four things cross the process boundary: the encoding policy, the
//! fitted weights, the oracle (through its own serde implementation) and the
//! loss identifier, wrapped with a format version and a model-kind tag so a
//! foreign or corrupt artifact is rejected instead of half-loaded.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use ndarray::Array1;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::classifier::{FittedState, OracleClassifier};
use crate::encoding::LabelEncoding;
use crate::error::{Error, Result};
use crate::loss::Loss;
use crate::oracle::ModelOracle;

/// Bumped whenever the serialized layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// Kind tag written by [`OracleClassifier::to_envelope`].
pub const CLASSIFIER_KIND: &str = "oracle-classifier";

/// The on-disk artifact. Opaque to callers; bincode on the wire.
#[derive(Serialize, Deserialize)]
pub struct ModelEnvelope<O> {
    version: u32,
    kind: String,
    encoding: LabelEncoding,
    weights: Vec<f64>,
    oracle: O,
    loss: String,
}

impl<O> ModelEnvelope<O> {
    pub(crate) fn new(
        kind: &str,
        oracle: O,
        encoding: LabelEncoding,
        weights: Vec<f64>,
        loss: String,
    ) -> Self {
        ModelEnvelope {
            version: FORMAT_VERSION,
            kind: kind.to_string(),
            encoding,
            weights,
            oracle,
            loss,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn loss_name(&self) -> &str {
        &self.loss
    }

    /// Serialize to the wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>>
    where
        O: Serialize,
    {
        bincode::serialize(self)
            .map_err(|e| Error::Config(format!("failed to serialize model envelope: {e}")))
    }

    /// Decode an envelope, checking the format version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self>
    where
        O: DeserializeOwned,
    {
        let envelope: ModelEnvelope<O> = bincode::deserialize(bytes)
            .map_err(|e| Error::Config(format!("failed to decode model envelope: {e}")))?;
        if envelope.version != FORMAT_VERSION {
            return Err(Error::Config(format!(
                "unsupported envelope format version {} (this build reads {})",
                envelope.version, FORMAT_VERSION
            )));
        }
        Ok(envelope)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()>
    where
        O: Serialize,
    {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self>
    where
        O: DeserializeOwned,
    {
        Self::from_bytes(&fs::read(path)?)
    }
}

impl<O: ModelOracle> OracleClassifier<O> {
    /// Flatten the fitted model into a portable envelope.
    ///
    /// Requires a fitted classifier and a registry loss: a custom loss has
    /// no identifier that a loader could resolve.
    pub fn to_envelope(&self) -> Result<ModelEnvelope<O>>
    where
        O: Clone,
    {
        let weights = self.weights()?.to_vec();
        let encoding = self.encoding_for_envelope()?;
        let loss_name = self.loss_name_for_envelope()?;
        Ok(ModelEnvelope::new(
            CLASSIFIER_KIND,
            self.oracle().clone(),
            encoding,
            weights,
            loss_name,
        ))
    }

    /// Reconstruct a fitted classifier from an envelope, without
    /// re-running optimization.
    ///
    /// An envelope written by a different model kind is a configuration
    /// error, never a silent no-op.
    pub fn from_envelope(envelope: ModelEnvelope<O>) -> Result<Self> {
        if envelope.kind != CLASSIFIER_KIND {
            return Err(Error::Config(format!(
                "envelope holds a {:?} model, not a {:?}",
                envelope.kind, CLASSIFIER_KIND
            )));
        }
        let loss = Loss::from_str(&envelope.loss)?;
        let state = FittedState {
            encoding: envelope.encoding,
            weights: Array1::from_vec(envelope.weights),
            result: None,
        };
        Ok(OracleClassifier::from_restored(envelope.oracle, loss, state))
    }
}
