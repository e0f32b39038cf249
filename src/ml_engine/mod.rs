//! ML Engine - crash-risk inference
//!
//! - Stacked LSTM network loaded from exported Keras weights
//! - Risk estimator enforcing input shape and output range

pub mod models;
pub mod predictor;

pub use models::{Activation, LayerWeights, LstmNetwork, ModelWeights, SequenceModel};
pub use predictor::RiskEstimator;
