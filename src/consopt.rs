//! Construction options
//!
//! A `ConsOpt` configures a layer under construction. Options are plain data;
//! each layer decides in `Layer::apply_opt` which options it understands. A
//! layer that does not understand an option reports
//! `LayerError::UnsupportedOption` naming both the option and itself, except
//! for configuration-transparent layers (identity) which accept everything as
//! a no-op.
//!
//! Set-once fields (name, size, activation) refuse a second assignment with
//! `LayerError::Clash` and are left untouched.
//!
//! ```
//! use rust_neural_compose::consopt::{extract_metadata, with_eps, with_name, with_size};
//!
//! let (meta, unused) = extract_metadata(&[with_name("l0"), with_size(10), with_eps(0.1)]).unwrap();
//! assert_eq!(meta.name, "l0");
//! assert_eq!(meta.size, 10);
//! assert_eq!(unused, vec![with_eps(0.1)]);
//! ```

use crate::error::{LayerError, Result};
use crate::layers::Layer;
use crate::tensor::Tensor;
use crate::utils::Activation;

/// A construction option for layers.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsOpt {
    Name(String),
    Batched(bool),
    Bias(bool),
    Size(Vec<usize>),
    BatchSize(usize),
    Activation(Activation),
    Shape(Vec<usize>),
    Probability(f64),
    Eps(f64),
    Weights(Tensor),
    WeightsAndBias(Tensor, Option<Tensor>),
    KernelShape(Vec<usize>),
    Pad(Vec<usize>),
    Stride(Vec<usize>),
    Dilation(Vec<usize>),
    Classes(usize),
}

impl ConsOpt {
    /// The option's display name, used in dispatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            ConsOpt::Name(_) => "WithName",
            ConsOpt::Batched(_) => "AsBatched",
            ConsOpt::Bias(_) => "WithBias",
            ConsOpt::Size(_) => "WithSize",
            ConsOpt::BatchSize(_) => "WithBatchSize",
            ConsOpt::Activation(_) => "WithActivation",
            ConsOpt::Shape(_) => "ToShape",
            ConsOpt::Probability(_) => "WithProbability",
            ConsOpt::Eps(_) => "WithEps",
            ConsOpt::Weights(_) => "WithWeights",
            ConsOpt::WeightsAndBias(..) => "WithWB",
            ConsOpt::KernelShape(_) => "WithKernelShape",
            ConsOpt::Pad(_) => "WithPad",
            ConsOpt::Stride(_) => "WithStride",
            ConsOpt::Dilation(_) => "WithDilation",
            ConsOpt::Classes(_) => "WithClasses",
        }
    }

    /// The dispatch error for a layer that does not handle this option.
    pub fn unsupported(&self, layer: &'static str) -> LayerError {
        LayerError::UnsupportedOption {
            option: self.kind(),
            layer,
        }
    }
}

/// Names a layer. Trivial layers (reshape, dropout, identity) ignore it.
pub fn with_name(name: impl Into<String>) -> ConsOpt {
    ConsOpt::Name(name.into())
}

/// Whether the first dimension of the input is the batch dimension.
pub fn as_batched(batched: bool) -> ConsOpt {
    ConsOpt::Batched(batched)
}

/// With or without a bias. Only fully connected layers have one to drop.
pub fn with_bias(bias: bool) -> ConsOpt {
    ConsOpt::Bias(bias)
}

/// Output size of the layer.
pub fn with_size(size: usize) -> ConsOpt {
    ConsOpt::Size(vec![size])
}

/// Several sizes at once, e.g. `[out_channels, in_channels]` for a convolution.
pub fn with_sizes(sizes: impl Into<Vec<usize>>) -> ConsOpt {
    ConsOpt::Size(sizes.into())
}

pub fn with_batch_size(bs: usize) -> ConsOpt {
    ConsOpt::BatchSize(bs)
}

pub fn with_activation(act: Activation) -> ConsOpt {
    ConsOpt::Activation(act)
}

/// Target shape, for reshape layers only.
pub fn to_shape(shape: impl Into<Vec<usize>>) -> ConsOpt {
    ConsOpt::Shape(shape.into())
}

/// Dropout probability.
pub fn with_probability(prob: f64) -> ConsOpt {
    ConsOpt::Probability(prob)
}

/// Variance epsilon, for layer norms only.
pub fn with_eps(eps: f64) -> ConsOpt {
    ConsOpt::Eps(eps)
}

/// Construct the layer around the given weights instead of initializing new ones.
pub fn with_weights(w: Tensor) -> ConsOpt {
    ConsOpt::Weights(w)
}

/// Weights and optional bias for a fully connected layer.
pub fn with_wb(w: Tensor, b: Option<Tensor>) -> ConsOpt {
    ConsOpt::WeightsAndBias(w, b)
}

pub fn with_kernel_shape(shape: impl Into<Vec<usize>>) -> ConsOpt {
    ConsOpt::KernelShape(shape.into())
}

pub fn with_pad(pad: impl Into<Vec<usize>>) -> ConsOpt {
    ConsOpt::Pad(pad.into())
}

pub fn with_stride(stride: impl Into<Vec<usize>>) -> ConsOpt {
    ConsOpt::Stride(stride.into())
}

pub fn with_dilation(dilation: impl Into<Vec<usize>>) -> ConsOpt {
    ConsOpt::Dilation(dilation.into())
}

/// Number of classes of an embedding.
pub fn with_classes(classes: usize) -> ConsOpt {
    ConsOpt::Classes(classes)
}

pub(crate) fn set_name(slot: &mut String, name: &str) -> Result<()> {
    if !slot.is_empty() {
        return Err(LayerError::Clash {
            field: "name",
            existing: slot.clone(),
            attempted: name.to_string(),
        });
    }
    *slot = name.to_string();
    Ok(())
}

pub(crate) fn set_size(slot: &mut usize, sizes: &[usize]) -> Result<()> {
    let size = first_size(sizes)?;
    if *slot != 0 {
        return Err(LayerError::Clash {
            field: "size",
            existing: slot.to_string(),
            attempted: size.to_string(),
        });
    }
    *slot = size;
    Ok(())
}

pub(crate) fn set_activation(slot: &mut Option<Activation>, act: Activation) -> Result<()> {
    if let Some(existing) = slot {
        return Err(LayerError::Clash {
            field: "activation",
            existing: existing.to_string(),
            attempted: act.to_string(),
        });
    }
    *slot = Some(act);
    Ok(())
}

pub(crate) fn first_size(sizes: &[usize]) -> Result<usize> {
    match sizes.first() {
        Some(&s) if s > 0 => Ok(s),
        _ => Err(LayerError::Config(format!(
            "size must be a positive number, got {:?}",
            sizes
        ))),
    }
}

/// Apply options to a layer in order, stopping at the first failure.
///
/// Useful for reconfiguring a built layer; set-once fields still clash.
pub fn redefine(layer: &mut dyn Layer, opts: &[ConsOpt]) -> Result<()> {
    for opt in opts {
        layer.apply_opt(opt)?;
    }
    Ok(())
}

/// Generic fields harvested from a list of options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub name: String,
    pub size: usize,
    pub shape: Vec<usize>,
    pub activation: Option<Activation>,

    updates: usize,
}

impl Metadata {
    /// Record the option if it sets one of the generic fields.
    ///
    /// Options that set nothing are ignored; a field set twice is a clash.
    pub fn apply(&mut self, opt: &ConsOpt) -> Result<()> {
        match opt {
            ConsOpt::Name(name) => set_name(&mut self.name, name)?,
            ConsOpt::Size(sizes) => set_size(&mut self.size, sizes)?,
            ConsOpt::Shape(shape) => {
                if !self.shape.is_empty() {
                    return Err(LayerError::Clash {
                        field: "shape",
                        existing: format!("{:?}", self.shape),
                        attempted: format!("{:?}", shape),
                    });
                }
                self.shape = shape.clone();
            }
            ConsOpt::Activation(act) => set_activation(&mut self.activation, *act)?,
            _ => return Ok(()),
        }
        self.updates += 1;
        Ok(())
    }

    /// How many fields have been set.
    pub fn updates(&self) -> usize {
        self.updates
    }
}

/// Harvest name, size, shape and activation from `opts`.
///
/// Returns the metadata and the options that set none of those fields, in the
/// order given, for replay against the real layer. The first failing
/// option aborts the extraction.
pub fn extract_metadata(opts: &[ConsOpt]) -> Result<(Metadata, Vec<ConsOpt>)> {
    let mut meta = Metadata::default();
    let mut unused = Vec::new();
    for opt in opts {
        let before = meta.updates();
        meta.apply(opt)?;
        if meta.updates() == before {
            unused.push(opt.clone());
        }
    }
    Ok((meta, unused))
}
