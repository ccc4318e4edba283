//! Dense f32 tensors and the eager operations the layers are built from
//!
//! Tensors are stored row-major in a flat `Vec<f32>`. Every operation returns a
//! new tensor; nothing is computed lazily and no gradients are tracked.

pub mod graph;
pub mod ops;

use crate::error::TensorError;

pub use graph::{Graph, Init, Param};

/// A row-major dense tensor of `f32` values.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor from a shape and its flat row-major data.
    ///
    /// Fails if `data.len()` does not match the product of the shape.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<f32>) -> Result<Self, TensorError> {
        let shape = shape.into();
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(TensorError::DataLength {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn full(shape: impl Into<Vec<usize>>, value: f32) -> Self {
        let shape = shape.into();
        let len = shape.iter().product::<usize>();
        Self {
            shape,
            data: vec![value; len],
        }
    }

    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        Self::full(shape, 0.0)
    }

    pub fn ones(shape: impl Into<Vec<usize>>) -> Self {
        Self::full(shape, 1.0)
    }

    /// A rank-0 tensor holding a single value.
    pub fn scalar(value: f32) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn vector(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn matrix(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, TensorError> {
        Self::new(vec![rows, cols], data)
    }

    /// The `n × n` identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut data = vec![0.0f32; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self {
            shape: vec![n, n],
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dims(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    pub fn is_vector(&self) -> bool {
        self.shape.len() == 1
    }

    pub fn is_matrix(&self) -> bool {
        self.shape.len() == 2
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Value at a multi-dimensional index, or `None` when out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        for (&i, &d) in index.iter().zip(&self.shape) {
            if i >= d {
                return None;
            }
            offset = offset * d + i;
        }
        self.data.get(offset).copied()
    }

    /// Same data viewed under a new shape with the same element count.
    pub fn reshape(&self, shape: impl Into<Vec<usize>>) -> Result<Self, TensorError> {
        let shape = shape.into();
        if shape.iter().product::<usize>() != self.data.len() {
            return Err(TensorError::Reshape {
                from: self.shape.clone(),
                to: shape,
            });
        }
        Ok(Self {
            shape,
            data: self.data.clone(),
        })
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Row-major strides for the current shape.
    pub(crate) fn strides(&self) -> Vec<usize> {
        strides_of(&self.shape)
    }
}

pub(crate) fn strides_of(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_length() {
        assert!(Tensor::new(vec![2, 3], vec![0.0; 6]).is_ok());
        let err = Tensor::new(vec![2, 3], vec![0.0; 5]).unwrap_err();
        assert_eq!(
            err,
            TensorError::DataLength {
                shape: vec![2, 3],
                expected: 6,
                actual: 5
            }
        );
    }

    #[test]
    fn test_identity() {
        let eye = Tensor::identity(3);
        assert_eq!(eye.shape(), &[3, 3]);
        assert_eq!(eye.get(&[1, 1]), Some(1.0));
        assert_eq!(eye.get(&[1, 2]), Some(0.0));
        assert_eq!(eye.get(&[3, 0]), None);
    }

    #[test]
    fn test_reshape() {
        let t = Tensor::vector(vec![1.0, 2.0, 3.0, 4.0]);
        let m = t.reshape(vec![2, 2]).unwrap();
        assert_eq!(m.get(&[1, 0]), Some(3.0));
        assert!(t.reshape(vec![3]).is_err());
    }

    #[test]
    fn test_strides() {
        assert_eq!(strides_of(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(strides_of(&[]), Vec::<usize>::new());
    }
}
