//! Parameterless layers: identity and reshape

use std::any::Any;

use super::Layer;
use crate::consopt::ConsOpt;
use crate::error::{LayerError, Result};
use crate::tensor::{Graph, Param};
use crate::value::Value;

/// The identity function. Application short-circuits on it, and it accepts
/// every construction option without effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Layer for Identity {
    fn model(&self) -> Vec<Param> {
        Vec::new()
    }

    fn fwd(&self, x: &Value) -> Result<Value> {
        Ok(x.clone())
    }

    fn name(&self) -> &str {
        "I"
    }

    fn kind(&self) -> &'static str {
        "Identity"
    }

    fn type_signature(&self) -> String {
        "a → a".to_string()
    }

    fn apply_opt(&mut self, _opt: &ConsOpt) -> Result<()> {
        Ok(())
    }

    fn is_identity(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn cons_identity(_graph: &mut Graph, _x: &Value, opts: &[ConsOpt]) -> Result<Box<dyn Layer>> {
    let mut l = Identity;
    for opt in opts {
        l.apply_opt(opt)?;
    }
    Ok(Box::new(l))
}

/// Reshapes a single tensor to a fixed target shape.
#[derive(Debug, Clone, Default)]
pub struct Reshape {
    to: Vec<usize>,
}

impl Reshape {
    pub fn new(opts: &[ConsOpt]) -> Result<Self> {
        let mut l = Self::default();
        for opt in opts {
            l.apply_opt(opt)?;
        }
        if l.to.is_empty() {
            return Err(LayerError::Config("Reshape needs a target shape".to_string()));
        }
        Ok(l)
    }

    pub fn target(&self) -> &[usize] {
        &self.to
    }
}

impl Layer for Reshape {
    fn model(&self) -> Vec<Param> {
        Vec::new()
    }

    fn fwd(&self, x: &Value) -> Result<Value> {
        let ctx = || format!("fwd of Reshape to {:?}", self.to);
        let t = x.tensor("Reshape").map_err(|e| e.context(ctx()))?;
        let out = t
            .reshape(self.to.clone())
            .map_err(|e| LayerError::from(e).context(ctx()))?;
        Ok(Value::from(out))
    }

    fn name(&self) -> &str {
        ""
    }

    fn kind(&self) -> &'static str {
        "Reshape"
    }

    fn shape(&self) -> Option<Vec<usize>> {
        Some(self.to.clone())
    }

    fn type_signature(&self) -> String {
        format!("a → {:?}", self.to)
    }

    fn apply_opt(&mut self, opt: &ConsOpt) -> Result<()> {
        match opt {
            ConsOpt::Shape(shape) => {
                self.to = shape.clone();
                Ok(())
            }
            ConsOpt::Name(_) | ConsOpt::Batched(_) | ConsOpt::Activation(_) | ConsOpt::Bias(_) => {
                Ok(())
            }
            _ => Err(opt.unsupported(self.kind())),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Construct a reshape. The input must have as many elements as the target shape.
pub fn cons_reshape(_graph: &mut Graph, x: &Value, opts: &[ConsOpt]) -> Result<Box<dyn Layer>> {
    let t = x.tensor("Reshape")?;
    let l = Reshape::new(opts)?;
    let want: usize = l.to.iter().product();
    if want != t.len() {
        return Err(LayerError::input(
            "Reshape",
            format!("cannot reshape {:?} into {:?}", t.shape(), l.to),
        ));
    }
    Ok(Box::new(l))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consopt::{as_batched, to_shape, with_eps, with_kernel_shape, with_name, with_size};
    use crate::tensor::Tensor;

    #[test]
    fn test_identity_accepts_everything() {
        let mut graph = Graph::default();
        let x = Value::from(Tensor::vector(vec![1.0, 2.0]));
        let id = cons_identity(
            &mut graph,
            &x,
            &[with_name("x"), with_size(3), with_eps(0.1), with_kernel_shape(vec![3, 3])],
        )
        .unwrap();
        assert!(id.is_identity());
        assert_eq!(id.name(), "I");
        assert_eq!(id.fwd(&x).unwrap(), x);
    }

    #[test]
    fn test_reshape() {
        let mut graph = Graph::default();
        let x = Value::from(Tensor::vector(vec![1.0, 2.0, 3.0, 4.0]));
        let r = cons_reshape(&mut graph, &x, &[to_shape(vec![2, 2]), as_batched(true)]).unwrap();
        let y = r.fwd(&x).unwrap();
        assert_eq!(y.shape(), Some(&[2usize, 2][..]));
        assert_eq!(y.value().unwrap().data(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(r.shape(), Some(vec![2, 2]));
    }

    #[test]
    fn test_reshape_errors() {
        let mut graph = Graph::default();
        let x = Value::from(Tensor::vector(vec![1.0, 2.0, 3.0]));
        assert!(matches!(
            cons_reshape(&mut graph, &x, &[to_shape(vec![2, 2])]),
            Err(LayerError::InputShape { .. })
        ));
        assert!(matches!(Reshape::new(&[]), Err(LayerError::Config(_))));
        assert_eq!(
            Reshape::new(&[with_size(2)]).err(),
            Some(LayerError::UnsupportedOption {
                option: "WithSize",
                layer: "Reshape"
            })
        );
    }
}
