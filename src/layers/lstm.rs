//! LSTM cell
//!
//! A cell owns four gates (input, forget, output and the cell candidate). Each
//! gate computes `act(x·Wx + h·Wh + b)`; the cell then combines them as
//!
//! ```text
//! cell'   = forget ⊙ cell + input ⊙ candidate
//! hidden' = output ⊙ tanh(cell')
//! ```
//!
//! The cell consumes either a single input tensor (the previous state is taken
//! to be zero) or an `(input, hidden, cell)` tuple, and always produces an
//! `(input, hidden', cell')` tuple so that the state can be fed back in.

use std::any::Any;

use log::trace;

use super::Layer;
use crate::consopt::{self, ConsOpt};
use crate::error::{LayerError, Result};
use crate::tensor::{ops, Graph, Init, Param, Tensor};
use crate::utils::Activation;
use crate::value::Value;

/// Weights of one gate: input-to-gate, hidden-to-gate and bias.
#[derive(Debug, Clone)]
pub struct Gate {
    wx: Param,
    wh: Param,
    b: Param,
}

impl Gate {
    /// Create a gate mapping `input` features to `size` units.
    pub fn new(graph: &mut Graph, name: &str, input: usize, size: usize) -> Self {
        Self {
            wx: graph.new_param(format!("{}_wx", name), &[input, size], Init::GlorotNormal(1.0)),
            wh: graph.new_param(format!("{}_wh", name), &[size, size], Init::GlorotNormal(1.0)),
            b: graph.new_param(format!("{}_b", name), &[1, size], Init::Zeroes),
        }
    }

    pub fn from_parts(wx: Tensor, wh: Tensor, b: Tensor) -> Result<Self> {
        let (input, size) = match wx.shape() {
            [i, s] => (*i, *s),
            other => {
                return Err(LayerError::input(
                    "Gate",
                    format!("Wx must be a matrix, got shape {:?}", other),
                ))
            }
        };
        if wh.shape() != [size, size] || b.shape() != [1, size] {
            return Err(LayerError::input(
                "Gate",
                format!(
                    "for Wx {:?} expected Wh [{s}, {s}] and b [1, {s}], got {:?} and {:?}",
                    [input, size],
                    wh.shape(),
                    b.shape(),
                    s = size
                ),
            ));
        }
        Ok(Self {
            wx: Param::new("wx", wx),
            wh: Param::new("wh", wh),
            b: Param::new("b", b),
        })
    }

    /// `act(x·Wx + h·Wh + b)`, broadcasting `h` and `b` along the batch axis.
    ///
    /// Vectors are treated as single rows.
    pub fn activate(&self, x: &Tensor, prev_hidden: &Tensor, act: Activation) -> Result<Tensor> {
        let h0 = ops::matmul(&row(x)?, &self.wx.value())?;
        let h1 = ops::matmul(&row(prev_hidden)?, &self.wh.value())?;
        let gate = ops::broadcast_add(&h0, &h1, &[], &[0])?;
        let gate = ops::broadcast_add(&gate, &self.b.value(), &[], &[0])?;
        Ok(act.apply(&gate)?)
    }

    pub fn params(&self) -> [Param; 3] {
        [self.wx.clone(), self.wh.clone(), self.b.clone()]
    }

    /// Shape of the bias, `(1, size)`.
    pub fn shape(&self) -> Vec<usize> {
        self.b.shape()
    }
}

fn row(t: &Tensor) -> Result<Tensor> {
    if t.is_vector() {
        Ok(t.reshape(vec![1, t.len()])?)
    } else {
        Ok(t.clone())
    }
}

#[derive(Debug, Clone)]
struct Gates {
    input: Gate,
    forget: Gate,
    output: Gate,
    cell: Gate,
}

/// A long short-term memory cell.
#[derive(Debug, Default)]
pub struct Lstm {
    gates: Option<Gates>,
    name: String,
    size: usize,
}

impl Lstm {
    pub fn new(opts: &[ConsOpt]) -> Result<Self> {
        let mut l = Self::default();
        consopt::redefine(&mut l, opts)?;
        Ok(l)
    }

    /// Build a cell from explicit gates, in the order input, forget, output, cell.
    pub fn from_gates(name: &str, input: Gate, forget: Gate, output: Gate, cell: Gate) -> Self {
        let size = input.shape()[1];
        Self {
            gates: Some(Gates {
                input,
                forget,
                output,
                cell,
            }),
            name: name.to_string(),
            size,
        }
    }

    /// Create the four gates for inputs with `input` features.
    pub fn init(&mut self, graph: &mut Graph, input: usize) -> Result<()> {
        if self.gates.is_some() {
            return Ok(());
        }
        if self.size == 0 {
            return Err(LayerError::Config(format!("LSTM {:?} needs a size", self.name)));
        }
        let gate = |graph: &mut Graph, which: &str| {
            Gate::new(graph, &format!("{}_{}", self.name, which), input, self.size)
        };
        self.gates = Some(Gates {
            input: gate(graph, "input"),
            forget: gate(graph, "forget"),
            output: gate(graph, "output"),
            cell: gate(graph, "cell"),
        });
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn as_rows(&self, t: &Tensor) -> Result<Tensor> {
        match t.shape() {
            [n] => Ok(t.reshape(vec![1, *n])?),
            [_, _] => Ok(t.clone()),
            other => Err(LayerError::input(
                self.kind(),
                format!("expected a vector or a matrix, got shape {:?}", other),
            )),
        }
    }

    fn step(&self, x: &Value) -> Result<Value> {
        let gates = self.gates.as_ref().ok_or_else(|| {
            LayerError::input(self.kind(), format!("{:?} has not been initialized", self.name))
        })?;
        x.check()?;
        let (input, prev_hidden, prev_cell) = match x.values() {
            [x] => (
                x,
                Tensor::zeros(vec![1, self.size]),
                Tensor::zeros(vec![1, self.size]),
            ),
            [x, h, c] => (x, self.as_rows(h)?, self.as_rows(c)?),
            other => {
                return Err(LayerError::input(
                    self.kind(),
                    format!("expected 1 or 3 tensors, got {}", other.len()),
                ))
            }
        };
        let rows = self.as_rows(input)?;

        let i = gates.input.activate(&rows, &prev_hidden, Activation::Sigmoid)?;
        let f = gates.forget.activate(&rows, &prev_hidden, Activation::Sigmoid)?;
        let o = gates.output.activate(&rows, &prev_hidden, Activation::Sigmoid)?;
        let candidate = gates.cell.activate(&rows, &prev_hidden, Activation::Tanh)?;

        let retain = ops::broadcast_hadamard_prod(&f, &prev_cell, &[], &[0])?;
        let write = ops::hadamard_prod(&i, &candidate)?;
        let cell = ops::add(&retain, &write)?;
        let hidden = ops::hadamard_prod(&o, &Activation::Tanh.apply(&cell)?)?;
        trace!("LSTM {:?} hidden shape {:?}", self.name, hidden.shape());

        Ok(Value::Tuple(vec![input.clone(), hidden, cell]))
    }
}

impl Layer for Lstm {
    fn model(&self) -> Vec<Param> {
        match &self.gates {
            None => Vec::new(),
            Some(g) => [&g.input, &g.forget, &g.output, &g.cell]
                .iter()
                .flat_map(|gate| gate.params())
                .collect(),
        }
    }

    fn fwd(&self, x: &Value) -> Result<Value> {
        self.step(x)
            .map_err(|e| e.context(format!("fwd of LSTM {:?}", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "LSTM"
    }

    fn shape(&self) -> Option<Vec<usize>> {
        self.gates.as_ref().map(|g| g.input.shape())
    }

    fn type_signature(&self) -> String {
        "(a, h, c) → (a, h, c)".to_string()
    }

    fn apply_opt(&mut self, opt: &ConsOpt) -> Result<()> {
        match opt {
            ConsOpt::Name(name) => consopt::set_name(&mut self.name, name),
            ConsOpt::Size(sizes) => consopt::set_size(&mut self.size, sizes),
            ConsOpt::Bias(_) => Ok(()),
            _ => Err(opt.unsupported(self.kind())),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Construct an LSTM cell sized for input `x`, a tensor or an
/// `(input, hidden, cell)` tuple.
pub fn cons_lstm(graph: &mut Graph, x: &Value, opts: &[ConsOpt]) -> Result<Box<dyn Layer>> {
    x.check()?;
    let input = match x.values() {
        [t] | [t, _, _] => t,
        other => {
            return Err(LayerError::input(
                "LSTM",
                format!("expected 1 or 3 tensors, got {}", other.len()),
            ))
        }
    };
    let features = match input.shape() {
        [n] | [_, n] => *n,
        other => {
            return Err(LayerError::input(
                "LSTM",
                format!("expected a vector or a matrix, got shape {:?}", other),
            ))
        }
    };

    let (meta, unused) = consopt::extract_metadata(opts)?;
    if meta.activation.is_some() {
        return Err(LayerError::UnsupportedOption {
            option: "WithActivation",
            layer: "LSTM",
        });
    }
    if !meta.shape.is_empty() {
        return Err(LayerError::UnsupportedOption {
            option: "ToShape",
            layer: "LSTM",
        });
    }
    let mut l = Lstm {
        name: meta.name,
        size: meta.size,
        gates: None,
    };
    consopt::redefine(&mut l, &unused)?;
    l.init(graph, features)?;
    Ok(Box::new(l))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consopt::{as_batched, with_name, with_size};
    use approx::assert_relative_eq;

    fn fixed_gate() -> Gate {
        Gate::from_parts(
            Tensor::identity(2),
            Tensor::zeros(vec![2, 2]),
            Tensor::zeros(vec![1, 2]),
        )
        .unwrap()
    }

    #[test]
    fn test_gate_with_identity_weights() {
        let gate = fixed_gate();
        let x = Tensor::matrix(1, 2, vec![1.0, 2.0]).unwrap();
        let h = Tensor::zeros(vec![1, 2]);
        let out = gate.activate(&x, &h, Activation::Sigmoid).unwrap();
        assert_relative_eq!(out.data()[0], 0.731, epsilon = 1e-3);
        assert_relative_eq!(out.data()[1], 0.881, epsilon = 1e-3);
    }

    #[test]
    fn test_gate_accepts_vectors() {
        let gate = fixed_gate();
        let x = Tensor::vector(vec![1.0, 2.0]);
        let h = Tensor::vector(vec![0.0, 0.0]);
        let out = gate.activate(&x, &h, Activation::Sigmoid).unwrap();
        assert_eq!(out.shape(), &[1, 2]);
        assert_relative_eq!(out.data()[0], 0.731, epsilon = 1e-3);
        assert_relative_eq!(out.data()[1], 0.881, epsilon = 1e-3);
    }

    #[test]
    fn test_gate_broadcasts_hidden_over_batch() {
        let gate = fixed_gate();
        let x = Tensor::matrix(3, 2, vec![0.0; 6]).unwrap();
        let h = Tensor::zeros(vec![1, 2]);
        let out = gate.activate(&x, &h, Activation::Identity).unwrap();
        assert_eq!(out.shape(), &[3, 2]);
    }

    #[test]
    fn test_gate_shape_checks() {
        assert!(Gate::from_parts(
            Tensor::identity(2),
            Tensor::zeros(vec![3, 3]),
            Tensor::zeros(vec![1, 2])
        )
        .is_err());
    }

    #[test]
    fn test_cell_update() {
        let cell = Lstm::from_gates("c", fixed_gate(), fixed_gate(), fixed_gate(), fixed_gate());
        let x = Tensor::vector(vec![1.0, 2.0]);
        let out = cell.fwd(&Value::from(x.clone())).unwrap();
        let vs = out.values();
        assert_eq!(vs.len(), 3);
        assert_eq!(vs[0], x);

        let s = |v: f32| 1.0 / (1.0 + (-v).exp());
        for (k, v) in [1.0f32, 2.0].iter().enumerate() {
            let c = s(*v) * v.tanh();
            assert_relative_eq!(vs[2].data()[k], c, epsilon = 1e-5);
            assert_relative_eq!(vs[1].data()[k], s(*v) * c.tanh(), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_state_is_threaded() {
        let mut g = Graph::new(3);
        let x = Value::from(Tensor::zeros(vec![2, 4]));
        let cell = cons_lstm(&mut g, &x, &[with_size(3), with_name("rnn")]).unwrap();
        assert_eq!(cell.model().len(), 12);
        assert_eq!(cell.shape(), Some(vec![1, 3]));

        let first = cell.fwd(&x).unwrap();
        assert_eq!(first.values()[1].shape(), &[2, 3]);
        let second = cell.fwd(&first).unwrap();
        assert_eq!(second.values()[2].shape(), &[2, 3]);
    }

    #[test]
    fn test_two_tuple_is_rejected() {
        let cell = Lstm::from_gates("c", fixed_gate(), fixed_gate(), fixed_gate(), fixed_gate());
        let x = Value::from(vec![Tensor::zeros(vec![1, 2]), Tensor::zeros(vec![1, 2])]);
        assert!(matches!(
            cell.fwd(&x).unwrap_err().root_cause(),
            LayerError::InputShape { .. }
        ));
    }

    #[test]
    fn test_options() {
        let mut g = Graph::new(3);
        let x = Value::from(Tensor::zeros(vec![1, 4]));
        assert!(matches!(
            cons_lstm(&mut g, &x, &[with_size(3), as_batched(true)]),
            Err(LayerError::UnsupportedOption {
                option: "AsBatched",
                layer: "LSTM"
            })
        ));
        assert!(matches!(
            cons_lstm(&mut g, &x, &[with_name("a")]),
            Err(LayerError::Config(_))
        ));
    }
}
