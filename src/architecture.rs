//! Architecture configuration structures
//!
//! This module lets a pipeline be described in a JSON file instead of code.
//! Each layer entry names a constructor and the construction options to call
//! it with; `build_pipeline` turns the list into thunks composed in order, so
//! nothing is sized until the first forward pass.

use serde::Deserialize;
use std::error::Error;
use std::fs;

use crate::consopt::{self, ConsOpt};
use crate::layers::{
    cons_conv, cons_dropout, cons_embedding, cons_fc, cons_identity, cons_layer_norm, cons_lstm,
    cons_max_pool, cons_reshape, Layer,
};
use crate::network::Network;
use crate::tensor::Graph;
use crate::term::{TermId, Thunk};
use crate::utils::Activation;
use crate::value::Value;

/// A plain layer constructor.
pub type ConsFn = fn(&mut Graph, &Value, &[ConsOpt]) -> crate::error::Result<Box<dyn Layer>>;

/// Configuration for a single layer.
///
/// `layer_type` is one of "fc" (or "dense"), "layer_norm", "conv", "max_pool",
/// "embedding", "lstm", "reshape", "dropout" or "identity". Every other field
/// is optional and maps to the construction option of the same name; which
/// ones a layer accepts is decided by the layer itself.
///
/// # Examples
///
/// ```json
/// {
///   "layer_type": "fc",
///   "name": "hidden",
///   "size": 256,
///   "activation": "relu",
///   "batched": true
/// }
/// ```
///
/// ```json
/// {
///   "layer_type": "conv",
///   "sizes": [8, 1],
///   "kernel_shape": [3, 3],
///   "pad": [1, 1]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub layer_type: String,

    pub name: Option<String>,
    /// Output size (dims for an embedding)
    pub size: Option<usize>,
    /// Several sizes, `[out, in]` for a convolution
    pub sizes: Option<Vec<usize>>,
    pub activation: Option<Activation>,
    pub batched: Option<bool>,
    pub bias: Option<bool>,
    pub batch_size: Option<usize>,
    /// Target shape of a reshape
    pub shape: Option<Vec<usize>>,
    /// Dropout probability, in [0.0, 1.0)
    pub probability: Option<f64>,
    /// Layer norm epsilon
    pub eps: Option<f64>,
    pub kernel_shape: Option<Vec<usize>>,
    pub pad: Option<Vec<usize>>,
    pub stride: Option<Vec<usize>>,
    pub dilation: Option<Vec<usize>>,
    pub classes: Option<usize>,
}

/// Configuration for a whole pipeline.
///
/// # Example
///
/// ```json
/// {
///   "seed": 7,
///   "layers": [
///     { "layer_type": "fc", "size": 64, "activation": "relu", "batched": true },
///     { "layer_type": "dropout", "probability": 0.2 },
///     { "layer_type": "fc", "size": 10, "activation": "softmax", "batched": true }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchitectureConfig {
    /// Seed for parameter initialization; 42 when absent
    #[serde(default)]
    pub seed: Option<u64>,
    /// Layers in the order they are applied
    pub layers: Vec<LayerConfig>,
}

fn invalid(msg: String) -> Box<dyn Error> {
    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg))
}

fn lookup(layer_type: &str) -> Option<(&'static str, ConsFn)> {
    let found = match layer_type.to_lowercase().as_str() {
        "fc" | "dense" => ("cons_fc", cons_fc as ConsFn),
        "layer_norm" | "layernorm" => ("cons_layer_norm", cons_layer_norm as ConsFn),
        "conv" | "conv2d" => ("cons_conv", cons_conv as ConsFn),
        "max_pool" | "maxpool" => ("cons_max_pool", cons_max_pool as ConsFn),
        "embedding" => ("cons_embedding", cons_embedding as ConsFn),
        "lstm" => ("cons_lstm", cons_lstm as ConsFn),
        "reshape" => ("cons_reshape", cons_reshape as ConsFn),
        "dropout" => ("cons_dropout", cons_dropout as ConsFn),
        "identity" => ("cons_identity", cons_identity as ConsFn),
        _ => return None,
    };
    Some(found)
}

impl LayerConfig {
    /// The constructor for this layer type, if the type is known.
    pub fn constructor(&self) -> Option<ConsFn> {
        lookup(&self.layer_type).map(|(_, cons)| cons)
    }

    /// The construction options described by this entry, in field order.
    pub fn options(&self) -> Vec<ConsOpt> {
        let mut opts = Vec::new();
        if let Some(name) = &self.name {
            opts.push(consopt::with_name(name.clone()));
        }
        if let Some(size) = self.size {
            opts.push(consopt::with_size(size));
        }
        if let Some(sizes) = &self.sizes {
            opts.push(consopt::with_sizes(sizes.clone()));
        }
        if let Some(act) = self.activation {
            opts.push(consopt::with_activation(act));
        }
        if let Some(batched) = self.batched {
            opts.push(consopt::as_batched(batched));
        }
        if let Some(bias) = self.bias {
            opts.push(consopt::with_bias(bias));
        }
        if let Some(bs) = self.batch_size {
            opts.push(consopt::with_batch_size(bs));
        }
        if let Some(shape) = &self.shape {
            opts.push(consopt::to_shape(shape.clone()));
        }
        if let Some(p) = self.probability {
            opts.push(consopt::with_probability(p));
        }
        if let Some(eps) = self.eps {
            opts.push(consopt::with_eps(eps));
        }
        if let Some(k) = &self.kernel_shape {
            opts.push(consopt::with_kernel_shape(k.clone()));
        }
        if let Some(pad) = &self.pad {
            opts.push(consopt::with_pad(pad.clone()));
        }
        if let Some(stride) = &self.stride {
            opts.push(consopt::with_stride(stride.clone()));
        }
        if let Some(dilation) = &self.dilation {
            opts.push(consopt::with_dilation(dilation.clone()));
        }
        if let Some(classes) = self.classes {
            opts.push(consopt::with_classes(classes));
        }
        opts
    }

    /// A thunk for this entry, named after its constructor.
    pub fn thunk(&self) -> Result<Thunk, Box<dyn Error>> {
        let (name, cons) = lookup(&self.layer_type)
            .ok_or_else(|| invalid(format!("Unknown layer type: {}", self.layer_type)))?;
        Ok(Thunk::named(name, cons, self.options()))
    }
}

/// Loads an architecture configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use rust_neural_compose::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/mlp.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: &str) -> Result<ArchitectureConfig, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    parse_architecture(&contents)
}

/// Parses and validates an architecture configuration from a JSON string.
pub fn parse_architecture(json: &str) -> Result<ArchitectureConfig, Box<dyn Error>> {
    let config: ArchitectureConfig = serde_json::from_str(json)?;
    validate_architecture(&config)?;
    Ok(config)
}

/// Validates an architecture configuration.
///
/// Layer sizes are not checked against each other: they are only known once
/// the pipeline sees its first input.
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<(), Box<dyn Error>> {
    if config.layers.is_empty() {
        return Err(invalid(
            "Architecture must have at least one layer".to_string(),
        ));
    }
    for (i, layer) in config.layers.iter().enumerate() {
        validate_layer(layer, i)?;
    }
    Ok(())
}

/// Checks that a layer has the fields its type requires and that values are in range.
fn validate_layer(layer: &LayerConfig, index: usize) -> Result<(), Box<dyn Error>> {
    let (cons_name, _) = lookup(&layer.layer_type).ok_or_else(|| {
        invalid(format!(
            "Layer {}: Unknown layer type: {}",
            index, layer.layer_type
        ))
    })?;

    if layer.size == Some(0) {
        return Err(invalid(format!("Layer {}: 'size' must be positive", index)));
    }
    if let Some(sizes) = &layer.sizes {
        if sizes.is_empty() || sizes.contains(&0) {
            return Err(invalid(format!(
                "Layer {}: 'sizes' must be positive, got {:?}",
                index, sizes
            )));
        }
    }
    if let Some(p) = layer.probability {
        if !(0.0..1.0).contains(&p) {
            return Err(invalid(format!(
                "Layer {}: 'probability' must be in range [0.0, 1.0), got {}",
                index, p
            )));
        }
    }
    if let Some(eps) = layer.eps {
        if eps <= 0.0 {
            return Err(invalid(format!(
                "Layer {}: 'eps' must be positive, got {}",
                index, eps
            )));
        }
    }

    let require = |present: bool, field: &str| {
        if present {
            Ok(())
        } else {
            Err(invalid(format!(
                "Layer {}: {} layer requires '{}'",
                index, layer.layer_type, field
            )))
        }
    };
    match cons_name {
        "cons_fc" | "cons_layer_norm" | "cons_lstm" => require(layer.size.is_some(), "size"),
        "cons_conv" => require(layer.size.is_some() || layer.sizes.is_some(), "size"),
        "cons_embedding" => {
            require(layer.size.is_some(), "size")?;
            require(layer.classes.is_some(), "classes")
        }
        "cons_reshape" => require(layer.shape.is_some(), "shape"),
        _ => Ok(()),
    }
}

/// Composes the configured layers after `input`, in order.
///
/// Returns the slot of the whole pipeline. Layers are built on the first
/// forward pass.
pub fn build_pipeline(
    net: &mut Network,
    input: TermId,
    config: &ArchitectureConfig,
) -> Result<TermId, Box<dyn Error>> {
    validate_architecture(config)?;
    let mut terms = vec![input];
    for layer in &config.layers {
        terms.push(net.insert(layer.thunk()?));
    }
    Ok(net.compose_seq(&terms)?)
}

/// Creates a network seeded from the configuration, with `x` as its input.
pub fn build_network(
    config: &ArchitectureConfig,
    x: Value,
) -> Result<(Network, TermId), Box<dyn Error>> {
    let mut net = Network::with_seed(config.seed.unwrap_or(42));
    let input = net.value(x);
    let pipeline = build_pipeline(&mut net, input, config)?;
    Ok((net, pipeline))
}
