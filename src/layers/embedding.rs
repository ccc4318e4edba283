//! Embedding layer
//!
//! An embedding is a `(classes, dims)` matrix. Selecting the vector of class
//! `i` is the same as multiplying a one-hot row for `i` by the matrix, which is
//! what `fwd` does: it takes a tensor of class ids, expands it into one-hot
//! rows and multiplies. The one-hot matrix is rebuilt on every call, so no
//! state has to be refreshed between forward passes.

use std::any::Any;

use log::debug;

use super::Layer;
use crate::consopt::{self, ConsOpt};
use crate::error::{LayerError, Result};
use crate::tensor::{ops, Graph, Init, Param, Tensor};
use crate::value::Value;

/// Embedding lookup table.
///
/// Input is a vector of `bs` class ids, giving `(bs, dims)`, or a `(bs, k)`
/// matrix of ids, giving `(bs, k * dims)` (the `k` embeddings of a row laid
/// end to end).
///
/// # Example
///
/// ```
/// use rust_neural_compose::consopt::{with_classes, with_size};
/// use rust_neural_compose::layers::{cons_embedding, Layer};
/// use rust_neural_compose::tensor::{Graph, Tensor};
/// use rust_neural_compose::value::Value;
///
/// let mut graph = Graph::new(42);
/// let ids = Value::from(Tensor::vector(vec![4.0, 0.0, 2.0]));
/// let emb = cons_embedding(&mut graph, &ids, &[with_classes(10), with_size(50)]).unwrap();
/// assert_eq!(emb.shape(), Some(vec![10, 50]));
/// assert_eq!(emb.fwd(&ids).unwrap().shape(), Some(&[3usize, 50][..]));
/// ```
#[derive(Debug, Default)]
pub struct Embedding {
    w: Option<Param>,

    name: String,
    bs: usize,
    dims: usize,
    classes: usize,
}

impl Embedding {
    pub fn new(opts: &[ConsOpt]) -> Result<Self> {
        let mut l = Self::default();
        consopt::redefine(&mut l, opts)?;
        Ok(l)
    }

    /// Create the embedding matrix. Weights given as an option are kept.
    pub fn init(&mut self, graph: &mut Graph) -> Result<()> {
        if self.w.is_some() {
            return Ok(());
        }
        if self.classes == 0 || self.dims == 0 {
            return Err(LayerError::Config(format!(
                "Embedding {:?} needs classes and a size, got {} and {}",
                self.name, self.classes, self.dims
            )));
        }
        self.w = Some(graph.new_param(
            self.name.clone(),
            &[self.classes, self.dims],
            Init::GlorotNormal(1.0),
        ));
        debug!(
            "initialized Embedding {:?}: {} classes x {} dims",
            self.name, self.classes, self.dims
        );
        Ok(())
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn batch_size(&self) -> usize {
        self.bs
    }

    fn set_weights(&mut self, w: &Tensor) -> Result<()> {
        match w.shape() {
            [classes, dims] => {
                if self.dims != 0 && self.dims != *dims {
                    return Err(LayerError::Clash {
                        field: "size",
                        existing: self.dims.to_string(),
                        attempted: dims.to_string(),
                    });
                }
                self.classes = *classes;
                self.dims = *dims;
            }
            other => {
                return Err(LayerError::input(
                    self.kind(),
                    format!("weights must be a (classes, dims) matrix, got {:?}", other),
                ))
            }
        }
        self.w = Some(Param::new(self.name.clone(), w.clone()));
        Ok(())
    }

    fn forward_tensor(&self, ids: &Tensor) -> Result<Tensor> {
        let w = self.w.as_ref().ok_or_else(|| {
            LayerError::input(self.kind(), format!("{:?} has not been initialized", self.name))
        })?;
        let (bs, k) = match ids.shape() {
            [bs] => (*bs, 1),
            [bs, k] => (*bs, *k),
            other => {
                return Err(LayerError::input(
                    self.kind(),
                    format!("cannot accept input of shape {:?}", other),
                ))
            }
        };
        if self.bs != 0 && bs != self.bs {
            return Err(LayerError::input(
                self.kind(),
                format!("expected a batch size of {}, got {}", self.bs, bs),
            ));
        }
        let oh = ops::one_hot(ids, self.classes)?;
        let out = ops::matmul(&oh, &w.value())?;
        if k == 1 {
            Ok(out)
        } else {
            Ok(out.reshape(vec![bs, k * self.dims])?)
        }
    }
}

impl Layer for Embedding {
    fn model(&self) -> Vec<Param> {
        self.w.iter().cloned().collect()
    }

    fn fwd(&self, x: &Value) -> Result<Value> {
        let ctx = || format!("fwd of Embedding {:?}", self.name);
        let t = x.tensor("Embedding").map_err(|e| e.context(ctx()))?;
        self.forward_tensor(t)
            .map(Value::from)
            .map_err(|e| e.context(ctx()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Embedding"
    }

    fn shape(&self) -> Option<Vec<usize>> {
        self.w.as_ref().map(Param::shape)
    }

    fn type_signature(&self) -> String {
        "class → a".to_string()
    }

    fn apply_opt(&mut self, opt: &ConsOpt) -> Result<()> {
        match opt {
            ConsOpt::Name(name) => {
                consopt::set_name(&mut self.name, name)?;
                if let Some(w) = self.w.take() {
                    self.w = Some(w.renamed(self.name.clone()));
                }
                Ok(())
            }
            ConsOpt::Size(sizes) => consopt::set_size(&mut self.dims, sizes),
            ConsOpt::BatchSize(bs) => {
                self.bs = *bs;
                Ok(())
            }
            ConsOpt::Classes(classes) => {
                self.classes = *classes;
                Ok(())
            }
            ConsOpt::Weights(w) => self.set_weights(w),
            ConsOpt::Bias(_) => Ok(()),
            _ => Err(opt.unsupported(self.kind())),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Construct an embedding for a tensor of class ids.
///
/// Name and size are harvested first; the remaining options are replayed on
/// the layer.
pub fn cons_embedding(graph: &mut Graph, x: &Value, opts: &[ConsOpt]) -> Result<Box<dyn Layer>> {
    x.tensor("Embedding")
        .map_err(|e| e.context("cons of an embedding layer"))?;
    let (meta, unused) = consopt::extract_metadata(opts)?;
    if meta.activation.is_some() {
        return Err(LayerError::UnsupportedOption {
            option: "WithActivation",
            layer: "Embedding",
        });
    }
    if !meta.shape.is_empty() {
        return Err(LayerError::UnsupportedOption {
            option: "ToShape",
            layer: "Embedding",
        });
    }

    let mut l = Embedding {
        name: meta.name,
        dims: meta.size,
        ..Embedding::default()
    };
    consopt::redefine(&mut l, &unused)?;
    l.init(graph)?;
    Ok(Box::new(l))
}
