//! Max pooling layer

use std::any::Any;
use std::cell::RefCell;

use super::dropout::check_probability;
use super::Layer;
use crate::consopt::{self, ConsOpt};
use crate::error::{LayerError, Result};
use crate::tensor::{ops, Graph, Param, Tensor};
use crate::utils::SimpleRng;
use crate::value::Value;

/// 2D max pooling over NCHW inputs, with an optional dropout afterwards.
///
/// Defaults: 2×2 window, no padding, stride 2. The layer has no parameters;
/// its size is recorded for introspection only.
#[derive(Debug)]
pub struct MaxPool {
    name: String,
    size: usize,

    kernel_shape: Vec<usize>,
    pad: Vec<usize>,
    stride: Vec<usize>,

    dropout: Option<f64>,
    rng: RefCell<SimpleRng>,
}

impl MaxPool {
    pub fn new(opts: &[ConsOpt], rng: SimpleRng) -> Result<Self> {
        let mut l = Self {
            name: String::new(),
            size: 0,
            kernel_shape: vec![2, 2],
            pad: vec![0, 0],
            stride: vec![2, 2],
            dropout: None,
            rng: RefCell::new(rng),
        };
        consopt::redefine(&mut l, opts)?;
        Ok(l)
    }

    pub fn kernel_shape(&self) -> &[usize] {
        &self.kernel_shape
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dropout(&self) -> Option<f64> {
        self.dropout
    }

    fn forward_tensor(&self, x: &Tensor) -> Result<Tensor> {
        let mut out = ops::max_pool2d(x, &self.kernel_shape, &self.pad, &self.stride)?;
        if let Some(p) = self.dropout {
            out = ops::dropout(&out, p, &mut self.rng.borrow_mut())?;
        }
        Ok(out)
    }
}

impl Layer for MaxPool {
    fn model(&self) -> Vec<Param> {
        Vec::new()
    }

    fn fwd(&self, x: &Value) -> Result<Value> {
        let ctx = || format!("fwd of MaxPool {:?}", self.name);
        let t = x.tensor("MaxPool").map_err(|e| e.context(ctx()))?;
        self.forward_tensor(t)
            .map(Value::from)
            .map_err(|e| e.context(ctx()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "MaxPool"
    }

    fn apply_opt(&mut self, opt: &ConsOpt) -> Result<()> {
        match opt {
            ConsOpt::Name(name) => consopt::set_name(&mut self.name, name),
            ConsOpt::Size(sizes) => consopt::set_size(&mut self.size, sizes),
            ConsOpt::Probability(p) => {
                self.dropout = Some(check_probability(*p)?);
                Ok(())
            }
            ConsOpt::KernelShape(shape) => {
                self.kernel_shape = shape.clone();
                Ok(())
            }
            ConsOpt::Bias(_) => Ok(()),
            _ => Err(opt.unsupported(self.kind())),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Construct a max pool for an NCHW input `x`.
pub fn cons_max_pool(graph: &mut Graph, x: &Value, opts: &[ConsOpt]) -> Result<Box<dyn Layer>> {
    let t = x.tensor("MaxPool")?;
    if t.dims() != 4 {
        return Err(LayerError::input(
            "MaxPool",
            format!("expected an NCHW tensor, got shape {:?}", t.shape()),
        ));
    }
    Ok(Box::new(MaxPool::new(opts, graph.fork_rng())?))
}
