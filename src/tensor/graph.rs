//! Parameter bookkeeping
//!
//! A `Graph` is the context layers are constructed against: it hands out named
//! parameters of a given shape, filled by an initializer drawn from its seeded
//! RNG. The graph does not keep the parameters alive; each layer owns the
//! parameters it creates and aggregators only clone the shared handle.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use super::Tensor;
use crate::error::TensorError;
use crate::utils::rng::SimpleRng;

/// Named initializers for new parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    Zeroes,
    Ones,
    Constant(f32),
    /// Uniform in `[-limit, limit]`, `limit = gain * sqrt(6 / (fan_in + fan_out))`.
    GlorotUniform(f32),
    /// Normal with `std = gain * sqrt(2 / (fan_in + fan_out))`.
    GlorotNormal(f32),
}

/// Fan-in and fan-out for a weight shape.
///
/// Matrices are `(in, out)`; 4-D kernels are `(out, in, kh, kw)`.
fn fans(shape: &[usize]) -> (f32, f32) {
    match shape {
        [] => (1.0, 1.0),
        [n] => (*n as f32, *n as f32),
        [i, o] => (*i as f32, *o as f32),
        [o, i, rest @ ..] => {
            let receptive: usize = rest.iter().product();
            ((i * receptive) as f32, (o * receptive) as f32)
        }
    }
}

struct ParamData {
    name: String,
    value: RefCell<Tensor>,
}

/// A shared handle to a trainable tensor.
///
/// Cloning a `Param` clones the handle, not the tensor.
#[derive(Clone)]
pub struct Param(Rc<ParamData>);

impl Param {
    pub fn new(name: impl Into<String>, value: Tensor) -> Self {
        Param(Rc::new(ParamData {
            name: name.into(),
            value: RefCell::new(value),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn value(&self) -> Ref<'_, Tensor> {
        self.0.value.borrow()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.0.value.borrow().shape().to_vec()
    }

    /// Overwrite the parameter's value. The shape must not change.
    pub fn set(&self, value: Tensor) -> Result<(), TensorError> {
        let mut slot = self.0.value.borrow_mut();
        if slot.shape() != value.shape() {
            return Err(TensorError::ShapeMismatch {
                op: "set_param",
                left: slot.shape().to_vec(),
                right: value.shape().to_vec(),
            });
        }
        *slot = value;
        Ok(())
    }

    /// A new parameter holding a copy of this value under `name`.
    pub(crate) fn renamed(&self, name: impl Into<String>) -> Param {
        Param::new(name, self.value().clone())
    }

    /// Whether both handles point at the same parameter.
    pub fn ptr_eq(&self, other: &Param) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("name", &self.0.name)
            .field("shape", &self.shape())
            .finish()
    }
}

/// Construction context: a seeded RNG and a counter of parameters created.
#[derive(Debug, Clone)]
pub struct Graph {
    rng: SimpleRng,
    created: usize,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(42)
    }
}

impl Graph {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SimpleRng::new(seed),
            created: 0,
        }
    }

    /// Create a new parameter of the given shape.
    pub fn new_param(&mut self, name: impl Into<String>, shape: &[usize], init: Init) -> Param {
        let len = shape.iter().product::<usize>();
        let data = match init {
            Init::Zeroes => vec![0.0; len],
            Init::Ones => vec![1.0; len],
            Init::Constant(c) => vec![c; len],
            Init::GlorotUniform(gain) => {
                let (fan_in, fan_out) = fans(shape);
                let limit = gain * (6.0f32 / (fan_in + fan_out)).sqrt();
                (0..len)
                    .map(|_| self.rng.gen_range_f32(-limit, limit))
                    .collect()
            }
            Init::GlorotNormal(gain) => {
                let (fan_in, fan_out) = fans(shape);
                let std = gain * (2.0f32 / (fan_in + fan_out)).sqrt();
                (0..len).map(|_| self.rng.next_gaussian() * std).collect()
            }
        };
        self.created += 1;
        // the product of `shape` is `len`, so this cannot fail
        let tensor = Tensor {
            shape: shape.to_vec(),
            data,
        };
        Param::new(name, tensor)
    }

    /// Number of parameters created so far.
    pub fn params_created(&self) -> usize {
        self.created
    }

    /// A fresh RNG for layers that need their own randomness (dropout).
    pub fn fork_rng(&mut self) -> SimpleRng {
        SimpleRng::new(self.rng.next_u64())
    }
}
