//! Activation functions for neural networks
//!
//! `Activation` names the functions a layer can be configured with. It is a
//! plain enum rather than a function pointer so it can be compared, printed and
//! read from an architecture file.

use serde::Deserialize;
use std::fmt;

use crate::error::TensorError;
use crate::tensor::Tensor;

const LEAKY_RELU_ALPHA: f32 = 0.01;
const ELU_ALPHA: f32 = 1.0;

/// The activation functions a layer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    Sigmoid,
    Tanh,
    #[serde(rename = "relu")]
    ReLU,
    #[serde(rename = "gelu")]
    GeLU,
    #[serde(rename = "leaky_relu")]
    LeakyReLU,
    #[serde(rename = "elu")]
    ELU,
    Cube,
    #[serde(rename = "softmax")]
    SoftMax,
}

impl Activation {
    /// Apply the activation to every element (row-wise for softmax).
    pub fn apply(self, x: &Tensor) -> Result<Tensor, TensorError> {
        let out = match self {
            Activation::Identity => x.clone(),
            Activation::Sigmoid => x.map(sigmoid),
            Activation::Tanh => x.map(f32::tanh),
            Activation::ReLU => x.map(|v| v.max(0.0)),
            Activation::GeLU => x.map(gelu),
            Activation::LeakyReLU => x.map(|v| if v > 0.0 { v } else { LEAKY_RELU_ALPHA * v }),
            Activation::ELU => x.map(|v| if v > 0.0 { v } else { ELU_ALPHA * (v.exp() - 1.0) }),
            Activation::Cube => x.map(|v| v * v * v),
            Activation::SoftMax => {
                let cols = x.shape().last().copied().unwrap_or(1);
                let rows = if cols == 0 { 0 } else { x.len() / cols };
                let mut data = x.data().to_vec();
                softmax_rows(&mut data, rows, cols);
                Tensor::new(x.shape().to_vec(), data)?
            }
        };
        Ok(out)
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::Identity => "identity",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::ReLU => "relu",
            Activation::GeLU => "gelu",
            Activation::LeakyReLU => "leaky_relu",
            Activation::ELU => "elu",
            Activation::Cube => "cube",
            Activation::SoftMax => "softmax",
        };
        f.write_str(name)
    }
}

/// Returns the sigmoid of the input: 1 / (1 + exp(-x))
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// GELU, tanh approximation: 0.5x(1 + tanh(sqrt(2/π)(x + 0.044715x³))).
pub fn gelu(x: f32) -> f32 {
    let k = (2.0f32 / std::f32::consts::PI).sqrt();
    0.5 * x * (1.0 + (k * (x + 0.044715 * x * x * x)).tanh())
}

/// Softmax applied row-wise, in place.
///
/// Uses the max-subtraction trick for numerical stability.
pub fn softmax_rows(outputs: &mut [f32], rows: usize, cols: usize) {
    if cols == 0 {
        return;
    }

    for row in outputs.chunks_exact_mut(cols).take(rows) {
        let max_value = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        let mut sum = 0.0f32;
        for value in row.iter_mut() {
            *value = (*value - max_value).exp();
            sum += *value;
        }

        let inv_sum = 1.0f32 / sum;
        for value in row.iter_mut() {
            *value *= inv_sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON_F32: f32 = 1e-6;

    #[test]
    fn test_sigmoid_zero() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
    }

    #[test]
    fn test_sigmoid_tensor() {
        let x = Tensor::vector(vec![1.0, 2.0]);
        let y = Activation::Sigmoid.apply(&x).unwrap();
        assert_relative_eq!(y.data()[0], 0.731_058_6, epsilon = 1e-6);
        assert_relative_eq!(y.data()[1], 0.880_797_1, epsilon = 1e-6);
    }

    #[test]
    fn test_relu_mixed() {
        let x = Tensor::vector(vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        let y = Activation::ReLU.apply(&x).unwrap();
        assert_eq!(y.data(), &[0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_leaky_relu_and_elu() {
        let x = Tensor::vector(vec![-1.0, 2.0]);
        let leaky = Activation::LeakyReLU.apply(&x).unwrap();
        assert_relative_eq!(leaky.data()[0], -0.01);
        let elu = Activation::ELU.apply(&x).unwrap();
        assert_relative_eq!(elu.data()[0], (-1.0f32).exp() - 1.0);
        assert_relative_eq!(elu.data()[1], 2.0);
    }

    #[test]
    fn test_gelu_known_values() {
        assert_relative_eq!(gelu(0.0), 0.0);
        assert_relative_eq!(gelu(1.0), 0.841_192, epsilon = 1e-4);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let x = Tensor::matrix(2, 3, vec![1.0, 2.0, 3.0, 1000.0, 1001.0, 1002.0]).unwrap();
        let y = Activation::SoftMax.apply(&x).unwrap();
        for row in y.data().chunks(3) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < EPSILON_F32);
        }
        assert!(!y.data().iter().any(|v| v.is_nan()));
    }

    #[test]
    fn test_deserialize_names() {
        let act: Activation = serde_json::from_str("\"leaky_relu\"").unwrap();
        assert_eq!(act, Activation::LeakyReLU);
        let act: Activation = serde_json::from_str("\"relu\"").unwrap();
        assert_eq!(act, Activation::ReLU);
        assert!(serde_json::from_str::<Activation>("\"swish\"").is_err());
        assert_eq!(Activation::SoftMax.to_string(), "softmax");
    }
}
