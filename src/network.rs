//! The arena that owns a composition tree
//!
//! Every term lives in a slot of a `Network` and nodes refer to their children
//! by `TermId`. When a thunk is applied for the first time its constructor
//! runs against the real input and the built layer is written into the
//! thunk's slot; this write is the last step of a successful application, so a
//! failed construction leaves the tree untouched.
//!
//! A node memoizes its first result and returns it for every later call. A
//! network describes one dataflow: build a fresh one for a different input.
//!
//! ```
//! use rust_neural_compose::consopt::{as_batched, with_name, with_size};
//! use rust_neural_compose::layers::cons_fc;
//! use rust_neural_compose::network::Network;
//! use rust_neural_compose::tensor::Tensor;
//! use rust_neural_compose::value::Value;
//!
//! let mut net = Network::with_seed(7);
//! let x = Value::from(Tensor::zeros(vec![4, 3]));
//! let input = net.value(x.clone());
//! let l0 = net.l(cons_fc, vec![with_size(5), with_name("l0"), as_batched(true)]);
//! let l1 = net.l(cons_fc, vec![with_size(2), with_name("l1"), as_batched(true)]);
//! let pipeline = net.compose_seq(&[input, l0, l1]).unwrap();
//!
//! let y = net.fwd(pipeline, &x).unwrap();
//! assert_eq!(y.shape(), Some(&[4usize, 2][..]));
//! assert_eq!(net.name(pipeline), "l1 ∘ l0 ∘ I");
//! assert_eq!(net.model(pipeline).len(), 4);
//! ```

use log::{debug, trace};

use crate::consopt::{self, ConsOpt};
use crate::error::{LayerError, Result};
use crate::layers::{Identity, Layer};
use crate::tensor::{ops, Graph, Param};
use crate::term::{Applied, JoinOp, Node, Term, TermId, Thunk};
use crate::value::Value;

/// Arena of terms plus the graph that parameters are created on.
#[derive(Debug, Default)]
pub struct Network {
    graph: Graph,
    slots: Vec<Term>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// A network whose parameters are initialized from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            graph: Graph::new(seed),
            slots: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: TermId) -> Option<&Term> {
        self.slots.get(id.0)
    }

    fn slot(&self, id: TermId) -> Result<&Term> {
        self.slots.get(id.0).ok_or(LayerError::UnknownTerm(id.0))
    }

    pub fn insert(&mut self, term: impl Into<Term>) -> TermId {
        self.slots.push(term.into());
        TermId(self.slots.len() - 1)
    }

    pub fn value(&mut self, v: impl Into<Value>) -> TermId {
        self.insert(Term::Value(v.into()))
    }

    pub fn layer_slot(&mut self, layer: impl Layer + 'static) -> TermId {
        self.insert(Term::layer(layer))
    }

    /// Add a thunk for `cons` with `opts`.
    pub fn l<F>(&mut self, cons: F, opts: Vec<ConsOpt>) -> TermId
    where
        F: Fn(&mut Graph, &Value, &[ConsOpt]) -> Result<Box<dyn Layer>> + 'static,
    {
        self.insert(Term::Thunk(Thunk::new(cons, opts)))
    }

    fn join(&mut self, a: TermId, b: TermId, op: JoinOp) -> Result<TermId> {
        self.slot(a)?;
        self.slot(b)?;
        Ok(self.insert(Term::Node(Node {
            a,
            b,
            op,
            memo: None,
        })))
    }

    /// `b ∘ a`: apply `a`, then `b`.
    ///
    /// A value in the `a` position is the nominal input of the pipeline rather
    /// than a function, so it is replaced by a fresh identity slot.
    pub fn compose(&mut self, a: TermId, b: TermId) -> Result<TermId> {
        let a = if self.slot(a)?.is_value() {
            self.layer_slot(Identity)
        } else {
            a
        };
        self.join(a, b, JoinOp::Compose)
    }

    /// Compose terms written in pipeline order: `[x, f, g]` is `g ∘ f ∘ x`.
    ///
    /// Folds from the left, so the tree is `compose(compose(x, f), g)`.
    pub fn compose_seq(&mut self, terms: &[TermId]) -> Result<TermId> {
        match terms {
            [] | [_] => Err(LayerError::Arity(terms.len())),
            [first, rest @ ..] => rest
                .iter()
                .try_fold(*first, |acc, &next| self.compose(acc, next)),
        }
    }

    /// `a(x) + b(x)`
    pub fn add(&mut self, a: TermId, b: TermId) -> Result<TermId> {
        self.join(a, b, JoinOp::Add)
    }

    /// `a(x) ⊙ b(x)`
    pub fn hadamard_prod(&mut self, a: TermId, b: TermId) -> Result<TermId> {
        self.join(a, b, JoinOp::HadamardProd)
    }

    /// Apply slot `a` to the value held in slot `b`.
    ///
    /// The argument must already be a value. A `Tagged` result leaves the
    /// thunk in `a` untouched; pass it to [`Network::commit`] to install the
    /// built layer.
    pub fn apply(&mut self, a: TermId, b: TermId) -> Result<Applied> {
        let x = match self.slot(b)? {
            Term::Value(v) => v.clone(),
            _ => return Err(LayerError::UnresolvedArgument),
        };
        if self.slot(a)?.is_value() {
            // the argument slot is reused as the input of the stuck term
            return Ok(Applied::Stuck(self.join(b, a, JoinOp::Compose)?));
        }
        self.apply_value(a, &x)
    }

    fn apply_value(&mut self, a: TermId, x: &Value) -> Result<Applied> {
        match &self.slots[a.0] {
            Term::Layer(layer) if layer.is_identity() => Ok(Applied::Value(x.clone())),
            Term::Layer(layer) => {
                trace!("fwd {} {:?}", layer.kind(), layer.name());
                Ok(Applied::Value(layer.fwd(x)?))
            }
            Term::Thunk(thunk) => {
                let ctx = || format!("applying {}", thunk.name());
                let layer = thunk
                    .build(&mut self.graph, x)
                    .map_err(|e| e.context(ctx()))?;
                debug!(
                    "materialized {} into {} {:?} at {}",
                    thunk.name(),
                    layer.kind(),
                    layer.name(),
                    a
                );
                let y = layer.fwd(x).map_err(|e| e.context(ctx()))?;
                Ok(Applied::Tagged(layer, y))
            }
            Term::Node(_) => Ok(Applied::Value(self.fwd_node(a, x)?)),
            Term::Value(_) => Err(LayerError::NotAFunction(self.name(a))),
        }
    }

    /// Settle the result of applying slot `id`: a built layer is written into
    /// the slot and its value returned.
    pub fn commit(&mut self, id: TermId, applied: Applied) -> Result<Value> {
        match applied {
            Applied::Value(v) => Ok(v),
            Applied::Tagged(layer, v) => {
                let slot = self
                    .slots
                    .get_mut(id.0)
                    .ok_or(LayerError::UnknownTerm(id.0))?;
                *slot = Term::Layer(layer);
                Ok(v)
            }
            Applied::Stuck(_) => Err(LayerError::NotAFunction(self.name(id))),
        }
    }

    fn apply_commit(&mut self, id: TermId, x: &Value) -> Result<Value> {
        let applied = self.apply_value(id, x)?;
        self.commit(id, applied)
    }

    /// Run the term in slot `id` forward on `x`.
    pub fn fwd(&mut self, id: TermId, x: &Value) -> Result<Value> {
        self.slot(id)?;
        x.check()
            .map_err(|e| e.context(format!("fwd of {}", self.name(id))))?;
        self.apply_commit(id, x)
    }

    fn fwd_node(&mut self, id: TermId, x: &Value) -> Result<Value> {
        let (a, b, op) = match &self.slots[id.0] {
            Term::Node(Node { memo: Some(v), .. }) => {
                trace!("{} returns its memoized result", id);
                return Ok(v.clone());
            }
            Term::Node(n) => (n.a, n.b, n.op),
            _ => return Err(LayerError::NotAFunction(self.name(id))),
        };
        x.check()
            .map_err(|e| e.context(format!("fwd of {}", self.name(id))))?;

        let side = |net: &Network, which: &str| format!("fwd of {} ({})", net.name(id), which);
        let y = match op {
            JoinOp::Compose => {
                let xa = self
                    .apply_commit(a, x)
                    .map_err(|e| e.context(side(self, "a")))?;
                self.apply_commit(b, &xa)
                    .map_err(|e| e.context(side(self, "b")))?
            }
            JoinOp::Add | JoinOp::HadamardProd => {
                let ya = self
                    .apply_commit(a, x)
                    .map_err(|e| e.context(side(self, "a")))?;
                let yb = self
                    .apply_commit(b, x)
                    .map_err(|e| e.context(side(self, "b")))?;
                combine(op, &ya, &yb).map_err(|e| e.context(side(self, "join")))?
            }
        };

        if let Term::Node(n) = &mut self.slots[id.0] {
            n.memo = Some(y.clone());
        }
        debug!("memoized result of {} at {}", self.name(id), id);
        Ok(y)
    }

    /// Parameters of every built layer under `id`, left side first.
    pub fn model(&self, id: TermId) -> Vec<Param> {
        match self.get(id) {
            Some(Term::Layer(layer)) => layer.model(),
            Some(Term::Node(n)) => {
                let mut params = self.model(n.a);
                params.extend(self.model(n.b));
                params
            }
            _ => Vec::new(),
        }
    }

    /// Display name of the term. Compositions render in function order, `b ∘ a`.
    pub fn name(&self, id: TermId) -> String {
        match self.get(id) {
            None => format!("<unknown {}>", id),
            Some(Term::Value(v)) => match v.shape() {
                Some(shape) => format!("{:?}", shape),
                None => format!("tuple of {}", v.values().len()),
            },
            Some(Term::Layer(layer)) if layer.name().is_empty() => layer.kind().to_string(),
            Some(Term::Layer(layer)) => layer.name().to_string(),
            Some(Term::Thunk(t)) => t.name().to_string(),
            Some(Term::Node(n)) => match n.op {
                JoinOp::Compose => format!("{} ∘ {}", self.name(n.b), self.name(n.a)),
                JoinOp::Add => format!("({} + {})", self.name(n.a), self.name(n.b)),
                JoinOp::HadamardProd => format!("({} ⊙ {})", self.name(n.a), self.name(n.b)),
            },
        }
    }

    /// Shape of the term's output, where known.
    pub fn shape(&self, id: TermId) -> Option<Vec<usize>> {
        match self.get(id)? {
            Term::Value(v) => v.shape().map(<[usize]>::to_vec),
            Term::Layer(layer) => layer.shape(),
            Term::Thunk(_) => None,
            Term::Node(n) => match &n.memo {
                Some(v) => v.shape().map(<[usize]>::to_vec),
                None => self.shape(n.b),
            },
        }
    }

    pub fn type_signature(&self, id: TermId) -> String {
        match self.get(id) {
            Some(Term::Layer(layer)) => layer.type_signature(),
            Some(Term::Value(_)) => "a".to_string(),
            _ => "a → b".to_string(),
        }
    }

    /// Find a layer by name under `root`, depth first, left side first.
    ///
    /// Thunks match on the name they will give their layer.
    pub fn by_name(&self, root: TermId, name: &str) -> Option<TermId> {
        match self.get(root)? {
            Term::Layer(layer) if layer.name() == name => Some(root),
            Term::Thunk(t)
                if t.opts()
                    .iter()
                    .any(|o| matches!(o, ConsOpt::Name(n) if n == name)) =>
            {
                Some(root)
            }
            Term::Node(n) => {
                let (a, b) = (n.a, n.b);
                self.by_name(a, name).or_else(|| self.by_name(b, name))
            }
            _ => None,
        }
    }

    /// The built layer in slot `id`, if any.
    pub fn layer(&self, id: TermId) -> Option<&dyn Layer> {
        match self.get(id)? {
            Term::Layer(layer) => Some(layer.as_ref()),
            _ => None,
        }
    }

    /// Whether every thunk under `id` has been materialized.
    pub fn is_built(&self, id: TermId) -> bool {
        match self.get(id) {
            Some(Term::Value(_)) | Some(Term::Layer(_)) => true,
            Some(Term::Node(n)) => self.is_built(n.a) && self.is_built(n.b),
            _ => false,
        }
    }

    /// Apply more options to the term in slot `id`.
    ///
    /// Built layers are reconfigured in place; thunks queue the options for
    /// construction.
    pub fn redefine(&mut self, id: TermId, opts: &[ConsOpt]) -> Result<()> {
        let name = self.name(id);
        match self
            .slots
            .get_mut(id.0)
            .ok_or(LayerError::UnknownTerm(id.0))?
        {
            Term::Layer(layer) => consopt::redefine(layer.as_mut(), opts),
            Term::Thunk(t) => {
                t.push_opts(opts);
                Ok(())
            }
            _ => Err(LayerError::NotAFunction(name)),
        }
    }
}

fn combine(op: JoinOp, a: &Value, b: &Value) -> Result<Value> {
    let (x, y) = (a.tensor("join")?, b.tensor("join")?);
    let out = match op {
        JoinOp::Add => ops::add(x, y)?,
        JoinOp::HadamardProd => ops::hadamard_prod(x, y)?,
        JoinOp::Compose => {
            return Err(LayerError::Config(
                "composition does not combine values".to_string(),
            ))
        }
    };
    Ok(Value::from(out))
}
