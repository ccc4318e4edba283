//! Terms of the composition algebra
//!
//! A `Term` is anything that can sit in a slot of a [`Network`](crate::network::Network):
//! a concrete value, a built layer, a deferred layer constructor (a thunk) or a
//! node joining two other slots. Applying a thunk builds its layer; the result
//! of that application is an [`Applied::Tagged`] which carries the new layer
//! back to the owner of the slot so it can be written in place of the thunk.

use std::fmt;

use crate::consopt::ConsOpt;
use crate::error::Result;
use crate::layers::Layer;
use crate::tensor::Graph;
use crate::value::Value;

/// A layer constructor: builds a layer sized for a concrete input.
pub type LayerCons = Box<dyn Fn(&mut Graph, &Value, &[ConsOpt]) -> Result<Box<dyn Layer>>>;

/// Index of a slot in a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(pub(crate) usize);

impl TermId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A layer constructor paired with the options it will be called with.
pub struct Thunk {
    cons: LayerCons,
    opts: Vec<ConsOpt>,
    name: String,
}

impl Thunk {
    /// Wrap a constructor function. The thunk is named after the function.
    pub fn new<F>(cons: F, opts: Vec<ConsOpt>) -> Self
    where
        F: Fn(&mut Graph, &Value, &[ConsOpt]) -> Result<Box<dyn Layer>> + 'static,
    {
        let full = std::any::type_name::<F>();
        let name = full.rsplit("::").next().unwrap_or(full).to_string();
        Self::named(name, cons, opts)
    }

    pub fn named<F>(name: impl Into<String>, cons: F, opts: Vec<ConsOpt>) -> Self
    where
        F: Fn(&mut Graph, &Value, &[ConsOpt]) -> Result<Box<dyn Layer>> + 'static,
    {
        Self {
            cons: Box::new(cons),
            opts,
            name: name.into(),
        }
    }

    /// The constructor's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pending options.
    pub fn opts(&self) -> &[ConsOpt] {
        &self.opts
    }

    pub(crate) fn push_opts(&mut self, opts: &[ConsOpt]) {
        self.opts.extend_from_slice(opts);
    }

    /// Run the constructor against `x`.
    pub fn build(&self, graph: &mut Graph, x: &Value) -> Result<Box<dyn Layer>> {
        (self.cons)(graph, x, &self.opts)
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk")
            .field("name", &self.name)
            .field("opts", &self.opts)
            .finish()
    }
}

/// Build a thunk: a layer constructor waiting for its first input.
///
/// ```
/// use rust_neural_compose::consopt::with_size;
/// use rust_neural_compose::layers::cons_fc;
/// use rust_neural_compose::term::{l, Term};
///
/// match l(cons_fc, vec![with_size(3)]) {
///     Term::Thunk(t) => assert_eq!(t.name(), "cons_fc"),
///     _ => unreachable!(),
/// }
/// ```
pub fn l<F>(cons: F, opts: Vec<ConsOpt>) -> Term
where
    F: Fn(&mut Graph, &Value, &[ConsOpt]) -> Result<Box<dyn Layer>> + 'static,
{
    Term::Thunk(Thunk::new(cons, opts))
}

/// How a node combines its two slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOp {
    /// `b(a(x))`
    Compose,
    /// `a(x) + b(x)`
    Add,
    /// `a(x) ⊙ b(x)`
    HadamardProd,
}

/// A composition or join of two slots, with its memoized result.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) a: TermId,
    pub(crate) b: TermId,
    pub(crate) op: JoinOp,
    pub(crate) memo: Option<Value>,
}

impl Node {
    pub fn a(&self) -> TermId {
        self.a
    }

    pub fn b(&self) -> TermId {
        self.b
    }

    pub fn op(&self) -> JoinOp {
        self.op
    }

    pub fn is_memoized(&self) -> bool {
        self.memo.is_some()
    }
}

/// Contents of a network slot.
pub enum Term {
    Value(Value),
    Layer(Box<dyn Layer>),
    Thunk(Thunk),
    Node(Node),
}

impl Term {
    pub fn layer(layer: impl Layer + 'static) -> Self {
        Term::Layer(Box::new(layer))
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Term::Value(_))
    }
}

impl From<Value> for Term {
    fn from(v: Value) -> Self {
        Term::Value(v)
    }
}

impl From<Thunk> for Term {
    fn from(t: Thunk) -> Self {
        Term::Thunk(t)
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Term::Layer(l) => write!(f, "Layer({} {:?})", l.kind(), l.name()),
            Term::Thunk(t) => t.fmt(f),
            Term::Node(n) => n.fmt(f),
        }
    }
}

/// Outcome of applying one slot to a value.
pub enum Applied {
    /// The slot already held something that could run.
    Value(Value),
    /// A thunk was built: the layer must replace the thunk in its slot.
    Tagged(Box<dyn Layer>, Value),
    /// The slot could not be applied; a deferred composition was created.
    Stuck(TermId),
}

impl fmt::Debug for Applied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Applied::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Applied::Tagged(l, v) => write!(f, "Tagged({} {:?}, {:?})", l.kind(), l.name(), v),
            Applied::Stuck(id) => write!(f, "Stuck({})", id),
        }
    }
}
