//! Values flowing through a network
//!
//! A `Value` is both what a layer consumes and what it produces. Most layers
//! deal in a single tensor; recurrent cells thread a 3-tuple of
//! `(input, hidden, cell)` so the state can be fed back on the next step.

use crate::error::{LayerError, Result};
use crate::tensor::Tensor;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Tensor(Tensor),
    Tuple(Vec<Tensor>),
}

impl Value {
    /// The single tensor this value holds, if it is not a tuple.
    pub fn value(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(t) => Some(t),
            Value::Tuple(_) => None,
        }
    }

    /// Every tensor in the value, in order.
    pub fn values(&self) -> &[Tensor] {
        match self {
            Value::Tensor(t) => std::slice::from_ref(t),
            Value::Tuple(ts) => ts,
        }
    }

    /// Fails if the value carries nothing usable.
    pub fn check(&self) -> Result<()> {
        if self.values().is_empty() {
            return Err(LayerError::EmptyValue);
        }
        Ok(())
    }

    /// The single tensor, or an input error naming `layer`.
    pub fn tensor(&self, layer: &str) -> Result<&Tensor> {
        self.check()?;
        self.value().ok_or_else(|| {
            LayerError::input(
                layer,
                format!("expected a single tensor, got a tuple of {}", self.values().len()),
            )
        })
    }

    /// Shape of the single tensor, if there is one.
    pub fn shape(&self) -> Option<&[usize]> {
        self.value().map(Tensor::shape)
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Value::Tensor(t)
    }
}

impl From<Vec<Tensor>> for Value {
    fn from(ts: Vec<Tensor>) -> Self {
        Value::Tuple(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value() {
        let v = Value::from(Tensor::zeros(vec![2, 3]));
        assert_eq!(v.shape(), Some(&[2usize, 3][..]));
        assert_eq!(v.values().len(), 1);
        assert!(v.tensor("fc").is_ok());
    }

    #[test]
    fn test_tuple_value() {
        let v = Value::from(vec![Tensor::zeros(vec![1]), Tensor::zeros(vec![2])]);
        assert!(v.value().is_none());
        assert_eq!(v.values().len(), 2);
        assert!(matches!(v.tensor("fc"), Err(LayerError::InputShape { .. })));
    }

    #[test]
    fn test_empty_tuple_is_an_error() {
        let v = Value::Tuple(Vec::new());
        assert_eq!(v.check(), Err(LayerError::EmptyValue));
    }
}
