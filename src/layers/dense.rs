//! Fully connected layer implementation
//!
//! This module provides `FullyConnected` (also known as Linear or Dense) that
//! performs the transformation: output = act(input × weights + bias)

use std::any::Any;

use log::debug;

use super::Layer;
use crate::consopt::{self, ConsOpt};
use crate::error::{LayerError, Result};
use crate::tensor::{ops, Graph, Init, Param, Tensor};
use crate::utils::Activation;
use crate::value::Value;

/// Fully connected layer with weights, an optional bias and an optional activation.
///
/// Performs `y = act(xW + b)` where x is the input (rows × in), W is the
/// weight matrix (in × size) and b is the bias. When `batched` is set the
/// first dimension of the input is the batch dimension and the bias is a
/// single `(1, size)` row broadcast along it; otherwise the bias has one row
/// per input row. A vector input is treated as a single row.
///
/// # Example
///
/// ```
/// use rust_neural_compose::consopt::{as_batched, with_name, with_size};
/// use rust_neural_compose::layers::{cons_fc, Layer};
/// use rust_neural_compose::tensor::{Graph, Tensor};
/// use rust_neural_compose::value::Value;
///
/// let mut graph = Graph::new(42);
/// let x = Value::from(Tensor::zeros(vec![4, 3]));
/// let fc = cons_fc(&mut graph, &x, &[with_size(5), with_name("l0"), as_batched(true)]).unwrap();
/// assert_eq!(fc.name(), "l0");
/// assert_eq!(fc.fwd(&x).unwrap().shape(), Some(&[4usize, 5][..]));
/// ```
#[derive(Debug, Default)]
pub struct FullyConnected {
    w: Option<Param>,
    b: Option<Param>,
    act: Option<Activation>,

    name: String,

    // config
    size: usize,
    batched: bool,
    nobias: bool,
    initialized: bool,
}

impl FullyConnected {
    /// Create an uninitialized layer from options.
    ///
    /// Parameters are created by `init` once an input shape is known, unless
    /// the options supplied weights.
    pub fn new(opts: &[ConsOpt]) -> Result<Self> {
        let mut fc = Self::default();
        consopt::redefine(&mut fc, opts)?;
        Ok(fc)
    }

    /// Create an initialized layer from existing weights and bias.
    pub fn from_parts(
        w: Tensor,
        b: Option<Tensor>,
        act: Option<Activation>,
        name: &str,
        batched: bool,
    ) -> Result<Self> {
        let mut fc = Self {
            act,
            name: name.to_string(),
            batched,
            ..Self::default()
        };
        fc.set_weights(w, b)?;
        Ok(fc)
    }

    fn set_weights(&mut self, w: Tensor, b: Option<Tensor>) -> Result<()> {
        if !w.is_matrix() {
            return Err(LayerError::input(
                self.kind(),
                format!("weights must be a matrix, got shape {:?}", w.shape()),
            ));
        }
        let size = w.shape()[1];
        if self.size != 0 && self.size != size {
            return Err(LayerError::Clash {
                field: "size",
                existing: self.size.to_string(),
                attempted: size.to_string(),
            });
        }
        self.size = size;
        self.w = Some(Param::new(format!("{}_W", self.name), w));
        if let Some(b) = b {
            self.b = Some(Param::new(format!("{}_B", self.name), b));
            self.nobias = false;
        }
        self.initialized = true;
        Ok(())
    }

    /// Create the weight and bias parameters for input `x`.
    pub fn init(&mut self, graph: &mut Graph, x: &Tensor) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let (rows, cols) = match x.shape() {
            [n] => (1, *n),
            [r, c] => (*r, *c),
            other => {
                return Err(LayerError::input(
                    self.kind(),
                    format!("expected a vector or a matrix, got shape {:?}", other),
                ))
            }
        };
        if self.size == 0 {
            return Err(LayerError::Config(format!(
                "FullyConnected {:?} needs a size",
                self.name
            )));
        }

        self.w = Some(graph.new_param(
            format!("{}_W", self.name),
            &[cols, self.size],
            Init::GlorotUniform(1.0),
        ));
        if !self.nobias {
            let bias_rows = if self.batched { 1 } else { rows };
            self.b = Some(graph.new_param(
                format!("{}_B", self.name),
                &[bias_rows, self.size],
                Init::Zeroes,
            ));
        }
        self.initialized = true;
        debug!(
            "initialized FullyConnected {:?}: {}x{} batched={} bias={}",
            self.name, cols, self.size, self.batched, !self.nobias
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Parameter names follow the layer name.
    fn rename_params(&mut self) {
        if let Some(w) = self.w.take() {
            self.w = Some(w.renamed(format!("{}_W", self.name)));
        }
        if let Some(b) = self.b.take() {
            self.b = Some(b.renamed(format!("{}_B", self.name)));
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_batched(&self) -> bool {
        self.batched
    }

    pub fn has_bias(&self) -> bool {
        !self.nobias
    }

    pub fn activation(&self) -> Option<Activation> {
        self.act
    }

    pub fn weights(&self) -> Option<&Param> {
        self.w.as_ref()
    }

    pub fn bias(&self) -> Option<&Param> {
        self.b.as_ref()
    }

    pub(crate) fn set_batched(&mut self, batched: bool) {
        self.batched = batched;
    }

    pub(crate) fn clear_activation(&mut self) {
        self.act = None;
    }

    pub(crate) fn force_bias(&mut self) {
        self.nobias = false;
    }

    pub(crate) fn name_mut(&mut self) -> &mut String {
        &mut self.name
    }

    pub(crate) fn size_mut(&mut self) -> &mut usize {
        &mut self.size
    }

    pub(crate) fn install(&mut self, w: Param, b: Param) {
        self.w = Some(w);
        self.b = Some(b);
        self.initialized = true;
    }

    /// The forward computation on a bare tensor.
    pub(crate) fn forward_tensor(&self, x: &Tensor) -> Result<Tensor> {
        let w = match &self.w {
            Some(w) if self.initialized => w,
            _ => {
                return Err(LayerError::input(
                    self.kind(),
                    format!("{:?} has not been initialized", self.name),
                ))
            }
        };
        let x = if x.is_vector() {
            x.reshape(vec![1, x.len()])?
        } else {
            x.clone()
        };

        let xw = ops::matmul(&x, &w.value())?;
        let xwb = match &self.b {
            None => xw,
            Some(b) => {
                let b = b.value();
                if self.batched && b.shape() != xw.shape() {
                    ops::broadcast_add(&xw, &b, &[], &[0])?
                } else {
                    ops::add(&xw, &b)?
                }
            }
        };

        match self.act {
            None => Ok(xwb),
            Some(act) => Ok(act.apply(&xwb)?),
        }
    }
}

impl Layer for FullyConnected {
    fn model(&self) -> Vec<Param> {
        self.w.iter().chain(self.b.iter()).cloned().collect()
    }

    fn fwd(&self, x: &Value) -> Result<Value> {
        let t = x
            .tensor(&self.name)
            .map_err(|e| e.context(format!("fwd of FullyConnected {:?}", self.name)))?;
        self.forward_tensor(t)
            .map(Value::from)
            .map_err(|e| e.context(format!("fwd of FullyConnected {:?}", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "FullyConnected"
    }

    fn shape(&self) -> Option<Vec<usize>> {
        self.b.as_ref().or(self.w.as_ref()).map(Param::shape)
    }

    fn apply_opt(&mut self, opt: &ConsOpt) -> Result<()> {
        match opt {
            ConsOpt::Name(name) => {
                consopt::set_name(&mut self.name, name)?;
                self.rename_params();
                Ok(())
            }
            ConsOpt::Size(sizes) => consopt::set_size(&mut self.size, sizes),
            ConsOpt::Activation(act) => consopt::set_activation(&mut self.act, *act),
            ConsOpt::Batched(batched) => {
                self.batched = *batched;
                Ok(())
            }
            ConsOpt::Bias(bias) => {
                self.nobias = !*bias;
                Ok(())
            }
            ConsOpt::Weights(w) => self.set_weights(w.clone(), None),
            ConsOpt::WeightsAndBias(w, b) => self.set_weights(w.clone(), b.clone()),
            _ => Err(opt.unsupported(self.kind())),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Construct a fully connected layer sized for input `x`.
///
/// The input must be a vector or a matrix.
pub fn cons_fc(graph: &mut Graph, x: &Value, opts: &[ConsOpt]) -> Result<Box<dyn Layer>> {
    let t = x.tensor("FullyConnected")?;
    if t.dims() == 0 || t.dims() > 2 {
        return Err(LayerError::input(
            "FullyConnected",
            format!("expected a vector or a matrix, got shape {:?}", t.shape()),
        ));
    }
    let mut fc = FullyConnected::new(opts)?;
    fc.init(graph, t)?;
    Ok(Box::new(fc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consopt::{
        as_batched, with_activation, with_bias, with_name, with_size, with_wb, with_weights,
    };
    use approx::assert_relative_eq;

    #[test]
    fn test_cons_fc_shapes() {
        let mut graph = Graph::new(42);
        let x = Value::from(Tensor::zeros(vec![8, 10]));
        let layer = cons_fc(&mut graph, &x, &[with_size(5), as_batched(true)]).unwrap();
        let params = layer.model();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].shape(), vec![10, 5]);
        assert_eq!(params[1].shape(), vec![1, 5]);
    }

    #[test]
    fn test_unbatched_bias_has_one_row_per_input_row() {
        let mut graph = Graph::new(42);
        let x = Value::from(Tensor::zeros(vec![3, 4]));
        let layer = cons_fc(&mut graph, &x, &[with_size(2)]).unwrap();
        assert_eq!(layer.shape(), Some(vec![3, 2]));
    }

    #[test]
    fn test_without_bias() {
        let mut graph = Graph::new(42);
        let x = Value::from(Tensor::zeros(vec![3, 4]));
        let layer = cons_fc(&mut graph, &x, &[with_size(2), with_bias(false)]).unwrap();
        assert_eq!(layer.model().len(), 1);
    }

    #[test]
    fn test_rejects_rank_three_input() {
        let mut graph = Graph::new(42);
        let x = Value::from(Tensor::zeros(vec![2, 3, 4]));
        let err = cons_fc(&mut graph, &x, &[with_size(2)]).err().unwrap();
        assert!(matches!(err, LayerError::InputShape { .. }));
    }

    #[test]
    fn test_missing_size() {
        let mut graph = Graph::new(42);
        let x = Value::from(Tensor::zeros(vec![2, 3]));
        assert!(matches!(
            cons_fc(&mut graph, &x, &[with_name("l0")]).err().unwrap(),
            LayerError::Config(_)
        ));
    }

    #[test]
    fn test_forward_with_known_weights() {
        let w = Tensor::matrix(2, 2, vec![1.0, 0.0, 0.0, 2.0]).unwrap();
        let b = Tensor::matrix(1, 2, vec![0.5, -0.5]).unwrap();
        let fc = FullyConnected::from_parts(w, Some(b), None, "fc", true).unwrap();
        let x = Value::from(Tensor::matrix(2, 2, vec![1.0, 1.0, 2.0, 3.0]).unwrap());
        let y = fc.fwd(&x).unwrap();
        assert_eq!(y.value().unwrap().data(), &[1.5, 1.5, 2.5, 5.5]);
    }

    #[test]
    fn test_forward_applies_activation() {
        let mut fc = FullyConnected::from_parts(Tensor::identity(2), None, None, "fc", true).unwrap();
        fc.apply_opt(&with_activation(Activation::Sigmoid)).unwrap();
        let y = fc.fwd(&Value::from(Tensor::vector(vec![0.0, 0.0]))).unwrap();
        assert_eq!(y.shape(), Some(&[1usize, 2][..]));
        assert_relative_eq!(y.value().unwrap().data()[0], 0.5);
    }

    #[test]
    fn test_uninitialized_forward_fails() {
        let fc = FullyConnected::new(&[with_size(3)]).unwrap();
        assert!(!fc.is_initialized());
        assert!(fc.fwd(&Value::from(Tensor::zeros(vec![1, 2]))).is_err());
    }

    #[test]
    fn test_name_clash_leaves_name() {
        let mut fc = FullyConnected::new(&[with_name("a")]).unwrap();
        let err = fc.apply_opt(&with_name("b")).unwrap_err();
        assert!(matches!(err, LayerError::Clash { field: "name", .. }));
        assert_eq!(fc.name(), "a");
    }

    #[test]
    fn test_weights_clash_with_earlier_size() {
        let mut fc = FullyConnected::new(&[with_size(5)]).unwrap();
        let err = fc.apply_opt(&with_weights(Tensor::zeros(vec![3, 2]))).unwrap_err();
        assert!(matches!(err, LayerError::Clash { field: "size", .. }));
        assert_eq!(fc.size(), 5);
        assert!(!fc.is_initialized());
        assert!(fc.weights().is_none());
    }

    #[test]
    fn test_weights_agreeing_with_size() {
        let fc = FullyConnected::new(&[with_size(2), with_weights(Tensor::zeros(vec![3, 2]))]).unwrap();
        assert_eq!(fc.size(), 2);
        assert!(fc.is_initialized());
    }

    #[test]
    fn test_late_name_renames_params() {
        let fc = FullyConnected::new(&[
            with_wb(Tensor::zeros(vec![3, 2]), Some(Tensor::zeros(vec![1, 2]))),
            with_name("late"),
        ])
        .unwrap();
        let names: Vec<String> = fc.model().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["late_W", "late_B"]);
    }
}
