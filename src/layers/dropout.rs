//! Dropout layer implementation for regularization
//!
//! This module provides a `Dropout` layer that randomly drops (sets to zero) a
//! fraction of input units during training. During inference, all units are
//! kept and outputs are passed through unchanged.

use std::any::Any;
use std::cell::RefCell;

use super::Layer;
use crate::consopt::ConsOpt;
use crate::error::{LayerError, Result};
use crate::tensor::{ops, Graph, Param};
use crate::utils::rng::SimpleRng;
use crate::value::Value;

/// Dropout layer for regularization.
///
/// During training, sets each input unit to zero with probability `prob` and
/// scales the remaining units by `1/(1-prob)` to maintain expected values.
/// During inference, passes inputs through unchanged.
///
/// # Example
///
/// ```
/// use rust_neural_compose::consopt::with_probability;
/// use rust_neural_compose::layers::Dropout;
/// use rust_neural_compose::utils::SimpleRng;
///
/// let mut layer = Dropout::new(&[with_probability(0.5)], SimpleRng::new(42)).unwrap();
/// assert_eq!(layer.probability(), 0.5);
/// assert!(layer.is_training());
/// layer.set_training(false);
/// assert!(!layer.is_training());
/// ```
#[derive(Debug)]
pub struct Dropout {
    prob: f64,
    training: bool,
    rng: RefCell<SimpleRng>,
}

impl Dropout {
    /// Creates a dropout layer in training mode. Without a probability option
    /// the layer keeps every unit.
    pub fn new(opts: &[ConsOpt], rng: SimpleRng) -> Result<Self> {
        let mut l = Self {
            prob: 0.0,
            training: true,
            rng: RefCell::new(rng),
        };
        for opt in opts {
            l.apply_opt(opt)?;
        }
        Ok(l)
    }

    /// Set whether the layer is in training mode.
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// The probability that each unit is dropped during training.
    pub fn probability(&self) -> f64 {
        self.prob
    }
}

pub(crate) fn check_probability(prob: f64) -> Result<f64> {
    if !(0.0..1.0).contains(&prob) {
        return Err(LayerError::Config(format!(
            "probability {} must be in range [0.0, 1.0)",
            prob
        )));
    }
    Ok(prob)
}

impl Layer for Dropout {
    fn model(&self) -> Vec<Param> {
        Vec::new()
    }

    fn fwd(&self, x: &Value) -> Result<Value> {
        let t = x.tensor("Dropout").map_err(|e| e.context("fwd of Dropout"))?;
        if !self.training || self.prob == 0.0 {
            return Ok(Value::from(t.clone()));
        }
        let out = ops::dropout(t, self.prob, &mut self.rng.borrow_mut())
            .map_err(|e| LayerError::from(e).context("fwd of Dropout"))?;
        Ok(Value::from(out))
    }

    fn name(&self) -> &str {
        ""
    }

    fn kind(&self) -> &'static str {
        "Dropout"
    }

    fn type_signature(&self) -> String {
        "a → a".to_string()
    }

    fn apply_opt(&mut self, opt: &ConsOpt) -> Result<()> {
        match opt {
            ConsOpt::Probability(p) => {
                self.prob = check_probability(*p)?;
                Ok(())
            }
            ConsOpt::Name(_) | ConsOpt::Bias(_) => Ok(()),
            _ => Err(opt.unsupported(self.kind())),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Construct a dropout layer. The input is only checked for being a single tensor.
pub fn cons_dropout(graph: &mut Graph, x: &Value, opts: &[ConsOpt]) -> Result<Box<dyn Layer>> {
    x.tensor("Dropout")?;
    Ok(Box::new(Dropout::new(opts, graph.fork_rng())?))
}
