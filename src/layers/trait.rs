//! Layer trait definition for neural network layers
//!
//! This module defines the core Layer trait that every concrete layer
//! implements: it owns its parameters, runs a forward step and answers
//! introspection queries. Configuration goes through `apply_opt`, which is the
//! single dispatch point for construction options.

use std::any::Any;

use crate::consopt::ConsOpt;
use crate::error::Result;
use crate::tensor::Param;
use crate::value::Value;

/// Core trait for neural network layers.
///
/// # Example
///
/// ```
/// use rust_neural_compose::layers::{FullyConnected, Layer};
/// use rust_neural_compose::tensor::Tensor;
/// use rust_neural_compose::value::Value;
///
/// let fc = FullyConnected::from_parts(Tensor::identity(2), None, None, "fc", false).unwrap();
/// let out = fc.fwd(&Value::from(Tensor::vector(vec![1.0, 2.0]))).unwrap();
/// assert_eq!(out.value().unwrap().data(), &[1.0, 2.0]);
/// ```
pub trait Layer {
    /// The parameters this layer owns, as shared handles.
    fn model(&self) -> Vec<Param>;

    /// Forward application of the layer to a value.
    fn fwd(&self, x: &Value) -> Result<Value>;

    /// The name given with `with_name`; empty for unnamed layers.
    fn name(&self) -> &str;

    /// The layer variant, e.g. `"FullyConnected"`. Used in dispatch errors.
    fn kind(&self) -> &'static str;

    /// Shape of the layer's output parameters, once known.
    fn shape(&self) -> Option<Vec<usize>> {
        None
    }

    /// Type signature of the layer as a function.
    fn type_signature(&self) -> String {
        "a → b".to_string()
    }

    /// Apply a construction option to this layer.
    ///
    /// The default rejects every option; layers override it for the options
    /// they understand.
    fn apply_opt(&mut self, opt: &ConsOpt) -> Result<()> {
        Err(opt.unsupported(self.kind()))
    }

    /// True only for the identity layer, which application short-circuits.
    fn is_identity(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}
