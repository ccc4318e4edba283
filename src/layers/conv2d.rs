//! 2D Convolutional layer implementation
//!
//! This module provides a `Conv` layer that performs 2D convolution over NCHW
//! inputs, followed by an activation and an optional dropout.

use std::any::Any;
use std::cell::RefCell;

use log::debug;

use super::dropout::check_probability;
use super::Layer;
use crate::consopt::{self, ConsOpt};
use crate::error::{LayerError, Result};
use crate::tensor::{ops, Graph, Init, Param, Tensor};
use crate::utils::{Activation, SimpleRng};
use crate::value::Value;

/// 2D convolutional layer with learnable filters.
///
/// The kernel is a `(out_channels, in_channels, kh, kw)` tensor initialized
/// with Glorot normal. Defaults: 5×5 kernel, padding 1, stride 1, dilation 1,
/// ReLU activation, no dropout.
///
/// # Example
///
/// ```
/// use rust_neural_compose::consopt::{with_kernel_shape, with_sizes};
/// use rust_neural_compose::layers::{cons_conv, Layer};
/// use rust_neural_compose::tensor::{Graph, Tensor};
/// use rust_neural_compose::value::Value;
///
/// let mut graph = Graph::new(42);
/// let x = Value::from(Tensor::zeros(vec![1, 1, 28, 28]));
/// // 1 input channel (grayscale), 8 output channels, 3x3 kernel, padding 1
/// let conv = cons_conv(&mut graph, &x, &[with_sizes(vec![8, 1]), with_kernel_shape(vec![3, 3])]).unwrap();
/// assert_eq!(conv.shape(), Some(vec![8, 1, 3, 3]));
/// assert_eq!(conv.fwd(&x).unwrap().shape(), Some(&[1usize, 8, 28, 28][..]));
/// ```
#[derive(Debug)]
pub struct Conv {
    w: Option<Param>,

    name: String,
    size: Vec<usize>,

    kernel_shape: Vec<usize>,
    pad: Vec<usize>,
    stride: Vec<usize>,
    dilation: Vec<usize>,

    act: Activation,
    dropout: Option<f64>,
    rng: RefCell<SimpleRng>,
}

impl Conv {
    /// Create an uninitialized convolution with the default geometry.
    pub fn new(opts: &[ConsOpt], rng: SimpleRng) -> Result<Self> {
        let mut l = Self {
            w: None,
            name: String::new(),
            size: Vec::new(),
            kernel_shape: vec![5, 5],
            pad: vec![1, 1],
            stride: vec![1, 1],
            dilation: vec![1, 1],
            act: Activation::ReLU,
            dropout: None,
            rng: RefCell::new(rng),
        };
        consopt::redefine(&mut l, opts)?;
        Ok(l)
    }

    /// Create the kernel for input `x`, which must be NCHW.
    ///
    /// With a single size the input channel count is taken from `x`.
    pub fn init(&mut self, graph: &mut Graph, x: &Tensor) -> Result<()> {
        if self.w.is_some() {
            return Ok(());
        }
        let channels = match x.shape() {
            [_, c, _, _] => *c,
            other => {
                return Err(LayerError::input(
                    self.kind(),
                    format!("expected an NCHW tensor, got shape {:?}", other),
                ))
            }
        };
        let (out_ch, in_ch) = match self.size.as_slice() {
            [o] => (*o, channels),
            [o, i] => (*o, *i),
            other => {
                return Err(LayerError::Config(format!(
                    "Conv {:?} needs sizes [out, in], got {:?}",
                    self.name, other
                )))
            }
        };
        if in_ch != channels {
            return Err(LayerError::input(
                self.kind(),
                format!("kernel expects {} input channels, input has {}", in_ch, channels),
            ));
        }
        let (kh, kw) = match self.kernel_shape.as_slice() {
            [kh, kw] => (*kh, *kw),
            other => {
                return Err(LayerError::Config(format!(
                    "kernel shape must have 2 entries, got {:?}",
                    other
                )))
            }
        };
        self.w = Some(graph.new_param(
            format!("{}_w", self.name),
            &[out_ch, in_ch, kh, kw],
            Init::GlorotNormal(1.0),
        ));
        debug!(
            "initialized Conv {:?}: kernel {:?} pad {:?} stride {:?}",
            self.name,
            [out_ch, in_ch, kh, kw],
            self.pad,
            self.stride
        );
        Ok(())
    }

    pub fn kernel_shape(&self) -> &[usize] {
        &self.kernel_shape
    }

    pub fn padding(&self) -> &[usize] {
        &self.pad
    }

    pub fn stride(&self) -> &[usize] {
        &self.stride
    }

    pub fn dilation(&self) -> &[usize] {
        &self.dilation
    }

    pub fn activation(&self) -> Activation {
        self.act
    }

    pub fn dropout(&self) -> Option<f64> {
        self.dropout
    }

    fn forward_tensor(&self, x: &Tensor) -> Result<Tensor> {
        let w = self.w.as_ref().ok_or_else(|| {
            LayerError::input(self.kind(), format!("{:?} has not been initialized", self.name))
        })?;
        let c = ops::conv2d(x, &w.value(), &self.pad, &self.stride, &self.dilation)?;
        let mut out = self.act.apply(&c)?;
        if let Some(p) = self.dropout {
            out = ops::dropout(&out, p, &mut self.rng.borrow_mut())?;
        }
        Ok(out)
    }
}

impl Layer for Conv {
    fn model(&self) -> Vec<Param> {
        self.w.iter().cloned().collect()
    }

    fn fwd(&self, x: &Value) -> Result<Value> {
        let ctx = || format!("fwd of Conv {:?}", self.name);
        let t = x.tensor("Conv").map_err(|e| e.context(ctx()))?;
        self.forward_tensor(t)
            .map(Value::from)
            .map_err(|e| e.context(ctx()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Conv"
    }

    fn shape(&self) -> Option<Vec<usize>> {
        self.w.as_ref().map(Param::shape)
    }

    fn apply_opt(&mut self, opt: &ConsOpt) -> Result<()> {
        match opt {
            ConsOpt::Name(name) => consopt::set_name(&mut self.name, name),
            ConsOpt::Size(sizes) => {
                consopt::first_size(sizes)?;
                if !self.size.is_empty() {
                    return Err(LayerError::Clash {
                        field: "size",
                        existing: format!("{:?}", self.size),
                        attempted: format!("{:?}", sizes),
                    });
                }
                self.size = sizes.clone();
                Ok(())
            }
            // the default activation may be replaced
            ConsOpt::Activation(act) => {
                self.act = *act;
                Ok(())
            }
            ConsOpt::Probability(p) => {
                self.dropout = Some(check_probability(*p)?);
                Ok(())
            }
            ConsOpt::KernelShape(shape) => {
                self.kernel_shape = shape.clone();
                Ok(())
            }
            ConsOpt::Pad(pad) => {
                self.pad = pad.clone();
                Ok(())
            }
            ConsOpt::Stride(stride) => {
                self.stride = stride.clone();
                Ok(())
            }
            ConsOpt::Dilation(dilation) => {
                self.dilation = dilation.clone();
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

/// Construct a convolution for an NCHW input `x`.
pub fn cons_conv(graph: &mut Graph, x: &Value, opts: &[ConsOpt]) -> Result<Box<dyn Layer>> {
    let t = x.tensor("Conv")?;
    if t.dims() != 4 {
        return Err(LayerError::input(
            "Conv",
            format!("expected an NCHW tensor, got shape {:?}", t.shape()),
        ));
    }
    let rng = graph.fork_rng();
    let mut l = Conv::new(opts, rng)?;
    l.init(graph, t)?;
    Ok(Box::new(l))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consopt::{
        as_batched, with_activation, with_kernel_shape, with_name, with_pad, with_probability,
        with_size, with_sizes, with_weights,
    };

    fn graph() -> Graph {
        Graph::new(42)
    }

    #[test]
    fn test_defaults() {
        let l = Conv::new(&[], SimpleRng::new(1)).unwrap();
        assert_eq!(l.kernel_shape(), &[5, 5]);
        assert_eq!(l.padding(), &[1, 1]);
        assert_eq!(l.stride(), &[1, 1]);
        assert_eq!(l.dilation(), &[1, 1]);
        assert_eq!(l.activation(), Activation::ReLU);
        assert_eq!(l.dropout(), None);
    }

    #[test]
    fn test_output_dimensions_no_padding() {
        let mut g = graph();
        let x = Value::from(Tensor::ones(vec![2, 3, 8, 8]));
        let l = cons_conv(
            &mut g,
            &x,
            &[with_size(4), with_kernel_shape(vec![3, 3]), with_pad(vec![0, 0])],
        )
        .unwrap();
        assert_eq!(l.shape(), Some(vec![4, 3, 3, 3]));
        assert_eq!(l.fwd(&x).unwrap().shape(), Some(&[2usize, 4, 6, 6][..]));
    }

    #[test]
    fn test_relu_output_is_non_negative() {
        let mut g = graph();
        let x = Value::from(Tensor::full(vec![1, 1, 6, 6], -1.0));
        let l = cons_conv(&mut g, &x, &[with_sizes(vec![2, 1]), with_kernel_shape(vec![3, 3])])
            .unwrap();
        let y = l.fwd(&x).unwrap();
        assert!(y.value().unwrap().data().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_identity_activation_matches_kernel_sum() {
        let mut g = graph();
        let x = Value::from(Tensor::ones(vec![1, 1, 3, 3]));
        let l = cons_conv(
            &mut g,
            &x,
            &[
                with_sizes(vec![1, 1]),
                with_kernel_shape(vec![3, 3]),
                with_pad(vec![0, 0]),
                with_activation(Activation::Identity),
            ],
        )
        .unwrap();
        let w_sum: f32 = l.model()[0].value().data().iter().sum();
        let y = l.fwd(&x).unwrap();
        approx::assert_relative_eq!(y.value().unwrap().data()[0], w_sum, epsilon = 1e-5);
    }

    #[test]
    fn test_rejects_non_nchw_input() {
        let mut g = graph();
        let x = Value::from(Tensor::zeros(vec![4, 4]));
        assert!(matches!(
            cons_conv(&mut g, &x, &[with_size(2)]),
            Err(LayerError::InputShape { .. })
        ));
    }

    #[test]
    fn test_channel_mismatch() {
        let mut g = graph();
        let x = Value::from(Tensor::zeros(vec![1, 3, 8, 8]));
        assert!(cons_conv(&mut g, &x, &[with_sizes(vec![2, 1])]).is_err());
    }

    #[test]
    fn test_options() {
        let l = Conv::new(&[with_name("c1"), with_probability(0.2)], SimpleRng::new(1)).unwrap();
        assert_eq!(l.name(), "c1");
        assert_eq!(l.dropout(), Some(0.2));
        assert_eq!(
            Conv::new(&[as_batched(true)], SimpleRng::new(1)).err(),
            Some(LayerError::UnsupportedOption {
                option: "AsBatched",
                layer: "Conv"
            })
        );
        assert!(matches!(
            Conv::new(&[with_weights(Tensor::zeros(vec![1]))], SimpleRng::new(1)),
            Err(LayerError::UnsupportedOption { option: "WithWeights", .. })
        ));
        assert!(matches!(
            Conv::new(&[with_size(2), with_size(3)], SimpleRng::new(1)),
            Err(LayerError::Clash { field: "size", .. })
        ));
    }
}
