//! Error types for layer construction and evaluation
//!
//! Two layers of errors exist: `TensorError` for failures raised by the numeric
//! engine (shape and broadcast mismatches), and `LayerError` for everything the
//! composition engine itself reports (option dispatch, application, arity).
//! Errors are wrapped with context on the way up but never change kind.

use thiserror::Error;

/// Numeric and graph errors raised by tensor operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TensorError {
    #[error("{op}: shape mismatch between {left:?} and {right:?}")]
    ShapeMismatch {
        op: &'static str,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    #[error("{op}: expected rank {expected}, got shape {actual:?}")]
    Rank {
        op: &'static str,
        expected: usize,
        actual: Vec<usize>,
    },

    #[error("cannot reshape {from:?} into {to:?}")]
    Reshape { from: Vec<usize>, to: Vec<usize> },

    #[error("shape {shape:?} needs {expected} elements, got {actual}")]
    DataLength {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("axis {axis} out of range for shape {shape:?}")]
    Axis { axis: usize, shape: Vec<usize> },

    #[error("{op}: class {class} out of range for {classes} classes")]
    ClassOutOfRange {
        op: &'static str,
        class: usize,
        classes: usize,
    },

    #[error("{op}: invalid argument: {reason}")]
    InvalidArgument { op: &'static str, reason: String },
}

/// Errors produced while building or evaluating a composition of layers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayerError {
    /// An option was applied to a layer variant that does not understand it.
    #[error("{option} does not support layer type {layer}")]
    UnsupportedOption {
        option: &'static str,
        layer: &'static str,
    },

    /// A set-once field was set a second time.
    #[error("clashing {field}: already set to {existing}, refusing to set {attempted}")]
    Clash {
        field: &'static str,
        existing: String,
        attempted: String,
    },

    #[error("invalid input for {layer}: {reason}")]
    InputShape { layer: String, reason: String },

    #[error("applying a non-constructed term as an argument is unsupported")]
    UnresolvedArgument,

    #[error("{0} cannot be applied to a value")]
    NotAFunction(String),

    #[error("expected at least 2 terms to compose, got {0}")]
    Arity(usize),

    #[error("no term with id {0}")]
    UnknownTerm(usize),

    #[error("value does not contain any tensors")]
    EmptyValue,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<LayerError>,
    },
}

impl LayerError {
    /// Wrap the error with the name of the component and the operation that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        LayerError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with every context wrapper removed.
    pub fn root_cause(&self) -> &LayerError {
        let mut err = self;
        while let LayerError::Context { source, .. } = err {
            err = source;
        }
        err
    }

    pub(crate) fn input(layer: impl Into<String>, reason: impl Into<String>) -> Self {
        LayerError::InputShape {
            layer: layer.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_root_cause() {
        let err = LayerError::Arity(1)
            .context("inner")
            .context("outer");

        assert_eq!(err.root_cause(), &LayerError::Arity(1));
        assert_eq!(
            err.to_string(),
            "outer: inner: expected at least 2 terms to compose, got 1"
        );
    }

    #[test]
    fn test_tensor_error_converts() {
        let err: LayerError = TensorError::Axis {
            axis: 3,
            shape: vec![2, 2],
        }
        .into();
        assert!(matches!(err, LayerError::Tensor(TensorError::Axis { axis: 3, .. })));
    }
}
