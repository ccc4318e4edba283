//! Cost functions
//!
//! Costs reduce a prediction and its target to a single scalar tensor.

use crate::error::{LayerError, Result, TensorError};
use crate::tensor::{ops, Tensor};

/// Mean of the squared differences, `mean((ŷ - y)²)`.
///
/// `y` must have the shape of `y_hat` or be a scalar. Each failing step is
/// reported with the expression it was computing.
///
/// ```
/// use rust_neural_compose::tensor::Tensor;
/// use rust_neural_compose::utils::cost::rms;
///
/// let y_hat = Tensor::vector(vec![1.0, 2.0]);
/// let y = Tensor::vector(vec![0.0, 0.0]);
/// assert_eq!(rms(&y_hat, &y).unwrap().data(), &[2.5]);
/// ```
pub fn rms(y_hat: &Tensor, y: &Tensor) -> Result<Tensor> {
    if y_hat.is_empty() {
        return Err(LayerError::from(TensorError::InvalidArgument {
            op: "rms",
            reason: "prediction is empty".to_string(),
        }));
    }
    let diff = ops::sub(y_hat, y).map_err(|e| LayerError::from(e).context("(ŷ-y)"))?;
    let sq = ops::square(&diff);
    let flat = sq
        .reshape(vec![1, sq.len()])
        .map_err(|e| LayerError::from(e).context("(ŷ-y)²"))?;
    let mean = ops::mean_keepdims(&flat, 1)
        .and_then(|m| m.reshape(Vec::new()))
        .map_err(|e| LayerError::from(e).context("mean((ŷ-y)²)"))?;
    Ok(mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rms_value() {
        let y_hat = Tensor::matrix(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = Tensor::matrix(2, 2, vec![1.0, 0.0, 0.0, 4.0]).unwrap();
        let cost = rms(&y_hat, &y).unwrap();
        assert!(cost.is_scalar());
        // (0 + 4 + 9 + 0) / 4
        assert_relative_eq!(cost.data()[0], 3.25);
    }

    #[test]
    fn test_rms_of_equal_tensors_is_zero() {
        let y = Tensor::vector(vec![0.5, -0.5, 2.0]);
        assert_eq!(rms(&y, &y).unwrap().data(), &[0.0]);
    }

    #[test]
    fn test_rms_against_scalar_target() {
        let y_hat = Tensor::vector(vec![1.0, 3.0]);
        let cost = rms(&y_hat, &Tensor::scalar(2.0)).unwrap();
        assert_relative_eq!(cost.data()[0], 1.0);
    }

    #[test]
    fn test_rms_shape_mismatch_names_step() {
        let y_hat = Tensor::zeros(vec![2, 2]);
        let y = Tensor::zeros(vec![1, 2]);
        let err = rms(&y_hat, &y).unwrap_err();
        assert!(err.to_string().starts_with("(ŷ-y): "));
        assert!(matches!(
            err.root_cause(),
            LayerError::Tensor(TensorError::ShapeMismatch { op: "sub", .. })
        ));
    }

    #[test]
    fn test_rms_empty_prediction() {
        let err = rms(&Tensor::vector(Vec::new()), &Tensor::vector(Vec::new())).unwrap_err();
        assert!(matches!(
            err,
            LayerError::Tensor(TensorError::InvalidArgument { op: "rms", .. })
        ));
    }
}
