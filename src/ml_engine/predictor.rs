//! Risk estimator - wraps the trained sequence model

use ndarray::Array2;
use std::path::Path;
use tracing::info;

use crate::error::{ModelLoadError, PredictionError};
use crate::ml_engine::models::{LstmNetwork, ModelWeights, SequenceModel};
use crate::types::{NormalizedFeatureRecord, NUM_FEATURES};

/// Turns a full temporal buffer into a risk score in [0, 1]
pub struct RiskEstimator {
    model: Box<dyn SequenceModel>,
    sequence_length: usize,
}

impl RiskEstimator {
    /// Load the LSTM weights file. Fails if the file is unreadable, malformed,
    /// or was trained for a different sequence length.
    pub fn load(path: &Path, sequence_length: usize) -> Result<Self, ModelLoadError> {
        info!(path = %path.display(), "Loading model");
        let network = LstmNetwork::load(path)?;

        if let Some(model_len) = network.sequence_length() {
            if model_len != sequence_length {
                return Err(ModelLoadError::SequenceLength {
                    model: model_len,
                    configured: sequence_length,
                });
            }
        }

        info!(
            layers = network.num_layers(),
            input_shape = ?(1, sequence_length, NUM_FEATURES),
            "Model loaded successfully"
        );
        Ok(Self::new(network, sequence_length))
    }

    pub fn new(model: impl SequenceModel + 'static, sequence_length: usize) -> Self {
        Self {
            model: Box::new(model),
            sequence_length,
        }
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn weights(&self) -> Option<&ModelWeights> {
        self.model.weights()
    }

    /// Predict on exactly `sequence_length` records, oldest first.
    ///
    /// Columns are laid out in [`crate::types::FEATURE_ORDER`]. The output is
    /// clamped to [0, 1] even though the head is a sigmoid.
    pub fn predict(&self, sequence: &[NormalizedFeatureRecord]) -> Result<f64, PredictionError> {
        if sequence.len() != self.sequence_length {
            return Err(PredictionError::SequenceLength {
                expected: self.sequence_length,
                actual: sequence.len(),
            });
        }

        let flat: Vec<f32> = sequence.iter().flat_map(|r| r.to_f32_array()).collect();
        let input = Array2::from_shape_vec((sequence.len(), NUM_FEATURES), flat).map_err(|_| {
            PredictionError::FeatureCount {
                expected: NUM_FEATURES,
                actual: self.model.input_features(),
            }
        })?;

        let raw = self.model.forward(input.view())? as f64;
        if !raw.is_finite() {
            return Err(PredictionError::NonFinite(raw));
        }
        Ok(raw.clamp(0.0, 1.0))
    }
}

impl std::fmt::Debug for RiskEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskEstimator")
            .field("sequence_length", &self.sequence_length)
            .field("input_features", &self.model.input_features())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml_engine::models::fixtures::constant_weights;
    use ndarray::ArrayView2;

    /// Returns a fixed raw value so clamping can be observed
    struct Fixed(f32);

    impl SequenceModel for Fixed {
        fn input_features(&self) -> usize {
            NUM_FEATURES
        }

        fn forward(&self, _sequence: ArrayView2<f32>) -> Result<f32, PredictionError> {
            Ok(self.0)
        }
    }

    /// Echoes the column it is told to read at the last step
    struct Column(usize);

    impl SequenceModel for Column {
        fn input_features(&self) -> usize {
            NUM_FEATURES
        }

        fn forward(&self, sequence: ArrayView2<f32>) -> Result<f32, PredictionError> {
            Ok(sequence[[sequence.nrows() - 1, self.0]])
        }
    }

    fn rec(blr: f64, buy: f64, sell: f64, mid: f64) -> NormalizedFeatureRecord {
        NormalizedFeatureRecord {
            blr,
            buy_volume: buy,
            sell_volume: sell,
            mid_price: mid,
        }
    }

    #[test]
    fn test_rejects_short_sequence() {
        let est = RiskEstimator::new(Fixed(0.5), 60);
        let seq = vec![rec(0.5, 0.5, 0.5, 0.5); 59];
        assert_eq!(
            est.predict(&seq),
            Err(PredictionError::SequenceLength {
                expected: 60,
                actual: 59
            })
        );
    }

    #[test]
    fn test_clamps_out_of_range_output() {
        let seq = vec![rec(0.5, 0.5, 0.5, 0.5); 3];
        assert_eq!(RiskEstimator::new(Fixed(1.7), 3).predict(&seq), Ok(1.0));
        assert_eq!(RiskEstimator::new(Fixed(-0.2), 3).predict(&seq), Ok(0.0));
    }

    #[test]
    fn test_non_finite_output_is_an_error() {
        let seq = vec![rec(0.5, 0.5, 0.5, 0.5); 3];
        let est = RiskEstimator::new(Fixed(f32::NAN), 3);
        assert!(matches!(est.predict(&seq), Err(PredictionError::NonFinite(_))));
    }

    #[test]
    fn test_feature_columns_follow_training_order() {
        let seq = vec![rec(0.1, 0.2, 0.3, 0.4); 2];
        for (col, expected) in [(0, 0.1), (1, 0.2), (2, 0.3), (3, 0.4)] {
            let got = RiskEstimator::new(Column(col), 2).predict(&seq).unwrap();
            assert!((got - expected).abs() < 1e-6, "column {}", col);
        }
    }

    #[test]
    fn test_load_checks_declared_sequence_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut w = constant_weights(0.0);
        w.sequence_length = Some(30);
        std::fs::write(&path, serde_json::to_string(&w).unwrap()).unwrap();

        let err = RiskEstimator::load(&path, 60).unwrap_err();
        assert!(matches!(
            err,
            ModelLoadError::SequenceLength {
                model: 30,
                configured: 60
            }
        ));
        assert!(RiskEstimator::load(&path, 30).is_ok());
    }

    #[test]
    fn test_loaded_model_exposes_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, serde_json::to_string(&constant_weights(0.0)).unwrap()).unwrap();

        let est = RiskEstimator::load(&path, 60).unwrap();
        assert!(est.weights().is_some());
        assert!(RiskEstimator::new(Fixed(0.1), 60).weights().is_none());
    }
}
