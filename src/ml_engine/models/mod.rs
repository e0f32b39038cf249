//! Sequence models - stacked LSTM network evaluated on ndarray
//!
//! The trained Keras network is exported as a JSON weights file:
//!
//! ```json
//! {
//!   "features": ["blr", "buy_volume", "sell_volume", "mid_price"],
//!   "sequence_length": 60,
//!   "layers": [
//!     { "type": "lstm", "kernel": [[...]], "recurrent_kernel": [[...]], "bias": [...] },
//!     { "type": "dense", "kernel": [[...]], "bias": [...], "activation": "relu" },
//!     { "type": "dense", "kernel": [[...]], "bias": [...], "activation": "sigmoid" }
//!   ]
//! }
//! ```
//!
//! Matrices use the Keras layout: LSTM kernel `[input][4 * units]`, recurrent
//! kernel `[units][4 * units]`, gates ordered input, forget, cell, output.
//! Dense kernel `[input][output]`. Dropout layers are not exported.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ModelLoadError, PredictionError};
use crate::types::{FEATURE_ORDER, NUM_FEATURES};

/// Anything that maps a `[steps, features]` sequence to one score
pub trait SequenceModel: Send + Sync {
    /// Features expected per timestep
    fn input_features(&self) -> usize;

    /// Raw model output (not yet clamped)
    fn forward(&self, sequence: ArrayView2<f32>) -> Result<f32, PredictionError>;

    /// Weights for export to the zkVM backend, if the model has any
    fn weights(&self) -> Option<&ModelWeights> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    fn apply(&self, x: f32) -> f32 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
        }
    }
}

/// Serialized layer as stored in the weights file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerWeights {
    Lstm {
        kernel: Vec<Vec<f32>>,
        recurrent_kernel: Vec<Vec<f32>>,
        bias: Vec<f32>,
    },
    Dense {
        kernel: Vec<Vec<f32>>,
        bias: Vec<f32>,
        #[serde(default)]
        activation: Activation,
    },
}

/// Contents of the weights file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_length: Option<usize>,
    pub layers: Vec<LayerWeights>,
}

impl ModelWeights {
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let json = std::fs::read_to_string(path).map_err(|e| ModelLoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ModelLoadError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[derive(Debug, Clone)]
struct LstmLayer {
    units: usize,
    kernel: Array2<f32>,
    recurrent: Array2<f32>,
    bias: Array1<f32>,
}

impl LstmLayer {
    /// Full output sequence `[steps, units]`
    fn forward(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let u = self.units;
        let steps = inputs.nrows();
        let mut h = Array1::<f32>::zeros(u);
        let mut c = Array1::<f32>::zeros(u);
        let mut out = Array2::<f32>::zeros((steps, u));

        for (t, x_t) in inputs.axis_iter(Axis(0)).enumerate() {
            let z = x_t.dot(&self.kernel) + h.dot(&self.recurrent) + &self.bias;

            let i = z.slice(s![0..u]).mapv(sigmoid);
            let f = z.slice(s![u..2 * u]).mapv(sigmoid);
            let g = z.slice(s![2 * u..3 * u]).mapv(f32::tanh);
            let o = z.slice(s![3 * u..4 * u]).mapv(sigmoid);

            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f32::tanh);
            out.row_mut(t).assign(&h);
        }

        out
    }
}

#[derive(Debug, Clone)]
struct DenseLayer {
    kernel: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

impl DenseLayer {
    fn forward(&self, input: ArrayView1<f32>) -> Array1<f32> {
        let act = self.activation;
        (input.dot(&self.kernel) + &self.bias).mapv(|x| act.apply(x))
    }
}

#[derive(Debug, Clone)]
enum Layer {
    Lstm(LstmLayer),
    Dense(DenseLayer),
}

/// Stacked LSTM layers followed by dense layers.
///
/// Every LSTM returns its full sequence; the first dense layer reads the last
/// timestep.
#[derive(Debug, Clone)]
pub struct LstmNetwork {
    layers: Vec<Layer>,
    input_features: usize,
    sequence_length: Option<usize>,
    weights: ModelWeights,
}

impl LstmNetwork {
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        Self::from_weights(ModelWeights::load(path)?)
    }

    /// Validate shapes and build the network
    pub fn from_weights(weights: ModelWeights) -> Result<Self, ModelLoadError> {
        if weights.features.iter().map(String::as_str).ne(FEATURE_ORDER.iter().copied()) {
            return Err(ModelLoadError::FeatureOrder {
                expected: FEATURE_ORDER.iter().map(|s| s.to_string()).collect(),
                found: weights.features.clone(),
            });
        }
        if weights.layers.is_empty() {
            return Err(ModelLoadError::Empty);
        }

        let mut layers = Vec::with_capacity(weights.layers.len());
        let mut width = NUM_FEATURES;
        let mut seen_dense = false;

        for (idx, lw) in weights.layers.iter().enumerate() {
            match lw {
                LayerWeights::Lstm {
                    kernel,
                    recurrent_kernel,
                    bias,
                } => {
                    if seen_dense {
                        return Err(shape_err(idx, "LSTM layer after a dense layer"));
                    }
                    let kernel = to_array2(idx, "kernel", kernel)?;
                    let recurrent = to_array2(idx, "recurrent_kernel", recurrent_kernel)?;
                    let gates = kernel.ncols();
                    if gates == 0 || gates % 4 != 0 {
                        return Err(shape_err(idx, format!("kernel has {gates} columns, expected 4 * units")));
                    }
                    let units = gates / 4;
                    if kernel.nrows() != width {
                        return Err(shape_err(idx, format!("kernel has {} rows, expected {width}", kernel.nrows())));
                    }
                    if recurrent.dim() != (units, gates) {
                        return Err(shape_err(idx, format!("recurrent_kernel is {:?}, expected ({units}, {gates})", recurrent.dim())));
                    }
                    if bias.len() != gates {
                        return Err(shape_err(idx, format!("bias has {} entries, expected {gates}", bias.len())));
                    }
                    layers.push(Layer::Lstm(LstmLayer {
                        units,
                        kernel,
                        recurrent,
                        bias: Array1::from(bias.clone()),
                    }));
                    width = units;
                }
                LayerWeights::Dense {
                    kernel,
                    bias,
                    activation,
                } => {
                    let kernel = to_array2(idx, "kernel", kernel)?;
                    if kernel.nrows() != width {
                        return Err(shape_err(idx, format!("kernel has {} rows, expected {width}", kernel.nrows())));
                    }
                    if bias.len() != kernel.ncols() {
                        return Err(shape_err(idx, format!("bias has {} entries, expected {}", bias.len(), kernel.ncols())));
                    }
                    width = kernel.ncols();
                    layers.push(Layer::Dense(DenseLayer {
                        kernel,
                        bias: Array1::from(bias.clone()),
                        activation: *activation,
                    }));
                    seen_dense = true;
                }
            }
        }

        if !seen_dense || width != 1 {
            return Err(shape_err(
                weights.layers.len() - 1,
                format!("network must end in a dense layer with one output, got width {width}"),
            ));
        }

        Ok(Self {
            layers,
            input_features: NUM_FEATURES,
            sequence_length: weights.sequence_length,
            weights,
        })
    }

    /// Sequence length declared by the weights file, if any
    pub fn sequence_length(&self) -> Option<usize> {
        self.sequence_length
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl SequenceModel for LstmNetwork {
    fn input_features(&self) -> usize {
        self.input_features
    }

    fn forward(&self, sequence: ArrayView2<f32>) -> Result<f32, PredictionError> {
        if sequence.ncols() != self.input_features {
            return Err(PredictionError::FeatureCount {
                expected: self.input_features,
                actual: sequence.ncols(),
            });
        }
        if sequence.nrows() == 0 {
            return Err(PredictionError::SequenceLength {
                expected: self.sequence_length.unwrap_or(1),
                actual: 0,
            });
        }

        let mut seq: Option<Array2<f32>> = None;
        let mut vec: Option<Array1<f32>> = None;

        for layer in &self.layers {
            match layer {
                Layer::Lstm(lstm) => {
                    let next = match &seq {
                        Some(prev) => lstm.forward(prev.view()),
                        None => lstm.forward(sequence.view()),
                    };
                    seq = Some(next);
                }
                Layer::Dense(dense) => {
                    let out = match (&vec, &seq) {
                        (Some(v), _) => dense.forward(v.view()),
                        (None, Some(s)) => dense.forward(s.row(s.nrows() - 1)),
                        (None, None) => dense.forward(sequence.row(sequence.nrows() - 1)),
                    };
                    vec = Some(out);
                }
            }
        }

        let out = vec.ok_or(PredictionError::OutputShape(0))?;
        if out.len() != 1 {
            return Err(PredictionError::OutputShape(out.len()));
        }
        Ok(out[0])
    }

    fn weights(&self) -> Option<&ModelWeights> {
        Some(&self.weights)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn shape_err(layer: usize, reason: impl Into<String>) -> ModelLoadError {
    ModelLoadError::Shape {
        layer,
        reason: reason.into(),
    }
}

fn to_array2(layer: usize, name: &str, rows: &[Vec<f32>]) -> Result<Array2<f32>, ModelLoadError> {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, Vec::len);
    if nrows == 0 || ncols == 0 {
        return Err(shape_err(layer, format!("{name} is empty")));
    }
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(shape_err(layer, format!("{name} has ragged rows")));
    }
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((nrows, ncols), flat)
        .map_err(|e| shape_err(layer, format!("{name}: {e}")))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn features() -> Vec<String> {
        FEATURE_ORDER.iter().map(|s| s.to_string()).collect()
    }

    /// One-unit LSTM with zero weights feeding a sigmoid dense layer:
    /// output is `sigmoid(bias)` regardless of input.
    pub fn constant_weights(bias: f32) -> ModelWeights {
        ModelWeights {
            features: features(),
            sequence_length: None,
            layers: vec![
                LayerWeights::Lstm {
                    kernel: vec![vec![0.0; 4]; NUM_FEATURES],
                    recurrent_kernel: vec![vec![0.0; 4]],
                    bias: vec![0.0; 4],
                },
                LayerWeights::Dense {
                    kernel: vec![vec![1.0]],
                    bias: vec![bias],
                    activation: Activation::Sigmoid,
                },
            ],
        }
    }
}
