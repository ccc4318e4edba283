//! Layer normalization
//!
//! Normalizes each row of the input to zero mean and unit variance over the
//! last axis, then applies a fully connected transform whose weights start at
//! ones and whose bias starts at zero (see https://arxiv.org/abs/1607.06450).

use std::any::Any;
use std::cell::RefCell;

use log::warn;

use super::{FullyConnected, Layer};
use crate::consopt::{self, ConsOpt};
use crate::error::{LayerError, Result};
use crate::tensor::{ops, Graph, Init, Param, Tensor};
use crate::value::Value;

const DEFAULT_EPS: f64 = 1e-5;

pub struct LayerNorm {
    fc: RefCell<FullyConnected>,
    name: String,
    eps: f64,
}

impl LayerNorm {
    /// Create an uninitialized layer norm. Parameters are created on the first
    /// forward pass or by `init`.
    pub fn new(opts: &[ConsOpt]) -> Result<Self> {
        let mut l = Self {
            fc: RefCell::new(FullyConnected::default()),
            name: String::new(),
            eps: DEFAULT_EPS,
        };
        consopt::redefine(&mut l, opts)?;

        // the inner transform is always a batched affine map with a bias
        let fc = l.fc.get_mut();
        fc.set_batched(true);
        fc.clear_activation();
        fc.force_bias();
        Ok(l)
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    pub fn is_initialized(&self) -> bool {
        self.fc.borrow().is_initialized()
    }

    fn columns(&self, x: &Tensor) -> Result<usize> {
        match x.shape() {
            [n] | [_, n] => Ok(*n),
            other => Err(LayerError::input(
                self.kind(),
                format!("expected a vector or a matrix, got shape {:?}", other),
            )),
        }
    }

    /// Create the parameters for input `x` on `graph`.
    pub fn init(&mut self, graph: &mut Graph, x: &Tensor) -> Result<()> {
        let cols = self.columns(x)?;
        let fc = self.fc.get_mut();
        if fc.is_initialized() {
            return Ok(());
        }
        let size = fc.size();
        if size == 0 {
            return Err(LayerError::Config(format!(
                "LayerNorm {:?} needs a size",
                self.name
            )));
        }
        let w = graph.new_param(format!("{}_W", fc.name()), &[cols, size], Init::Ones);
        let b = graph.new_param(format!("{}_B", fc.name()), &[1, size], Init::Zeroes);
        fc.install(w, b);
        Ok(())
    }

    fn lazy_init(&self, x: &Tensor) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let cols = self.columns(x)?;
        let mut fc = self.fc.borrow_mut();
        let size = fc.size();
        if size == 0 {
            return Err(LayerError::Config(format!(
                "LayerNorm {:?} needs a size",
                fc.name()
            )));
        }
        warn!("LayerNorm {:?} initialized lazily during fwd", fc.name());
        let w = Param::new(format!("{}_W", fc.name()), Tensor::ones(vec![cols, size]));
        let b = Param::new(format!("{}_B", fc.name()), Tensor::zeros(vec![1, size]));
        fc.install(w, b);
        Ok(())
    }

    fn normalize(&self, x: &Tensor) -> Result<Tensor> {
        let x = if x.is_vector() {
            x.reshape(vec![1, x.len()])?
        } else {
            x.clone()
        };
        let last = x.dims() - 1;

        let mu = ops::mean_keepdims(&x, last)?;
        let centered = ops::broadcast_sub(&x, &mu, &[], &[last])?;
        let variance = ops::mean_keepdims(&ops::square(&centered), last)?;
        let sd = ops::sqrt(&ops::add_scalar(&variance, self.eps as f32));
        Ok(ops::broadcast_hadamard_div(&centered, &sd, &[], &[last])?)
    }
}

impl Layer for LayerNorm {
    fn model(&self) -> Vec<Param> {
        self.fc.borrow().model()
    }

    fn fwd(&self, x: &Value) -> Result<Value> {
        let ctx = || format!("fwd of LayerNorm {:?}", self.name);
        let t = x.tensor("LayerNorm").map_err(|e| e.context(ctx()))?;
        self.lazy_init(t).map_err(|e| e.context(ctx()))?;
        let normalized = self.normalize(t).map_err(|e| e.context(ctx()))?;
        let out = self
            .fc
            .borrow()
            .forward_tensor(&normalized)
            .map_err(|e| e.context(ctx()))?;
        Ok(Value::from(out))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "LayerNorm"
    }

    fn shape(&self) -> Option<Vec<usize>> {
        self.fc.borrow().shape()
    }

    fn apply_opt(&mut self, opt: &ConsOpt) -> Result<()> {
        let fc = self.fc.get_mut();
        match opt {
            ConsOpt::Name(name) => {
                consopt::set_name(&mut self.name, name)?;
                *fc.name_mut() = name.clone();
                Ok(())
            }
            ConsOpt::Size(sizes) => consopt::set_size(fc.size_mut(), sizes),
            ConsOpt::Eps(eps) => {
                if *eps <= 0.0 {
                    return Err(LayerError::Config(format!("eps must be positive, got {}", eps)));
                }
                self.eps = *eps;
                Ok(())
            }
            // the bias is always present
            ConsOpt::Bias(_) => Ok(()),
            _ => Err(opt.unsupported("LayerNorm")),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Construct a layer norm sized for input `x`.
pub fn cons_layer_norm(graph: &mut Graph, x: &Value, opts: &[ConsOpt]) -> Result<Box<dyn Layer>> {
    let t = x.tensor("LayerNorm")?;
    let mut l = LayerNorm::new(opts)?;
    l.init(graph, t)?;
    Ok(Box::new(l))
}
