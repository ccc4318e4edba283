//! Layer abstractions for neural networks
//!
//! This module provides the Layer trait and the concrete layers a network is
//! composed from, each with a `cons_*` constructor usable with `l`.

mod r#trait;
pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod embedding;
pub mod lstm;
pub mod norm;
pub mod pooling;
pub mod trivial;

// Re-export the Layer trait for convenience
pub use r#trait::Layer;

pub use conv2d::{cons_conv, Conv};
pub use dense::{cons_fc, FullyConnected};
pub use dropout::{cons_dropout, Dropout};
pub use embedding::{cons_embedding, Embedding};
pub use lstm::{cons_lstm, Gate, Lstm};
pub use norm::{cons_layer_norm, LayerNorm};
pub use pooling::{cons_max_pool, MaxPool};
pub use trivial::{cons_identity, cons_reshape, Identity, Reshape};
