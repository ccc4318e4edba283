//! Rust Neural Compose Library
//!
//! Build neural networks by composing configurable layers into a single
//! callable pipeline, without fixing the network's shapes until the first real
//! input arrives. Layers are given as thunks (a constructor plus its options);
//! the first forward pass builds each one against the value that reaches it
//! and writes the built layer back into the tree.
//!
//! # Modules
//!
//! - `tensor`: eager f32 tensors, tensor ops and parameter bookkeeping
//! - `value`: the values flowing between layers
//! - `consopt`: construction options and metadata extraction
//! - `layers`: Layer trait and implementations (FC, Conv, LSTM, etc.)
//! - `term` / `network`: the composition algebra and the arena that evaluates it
//! - `architecture`: JSON pipeline descriptions
//! - `utils`: RNG, activation functions and the RMS cost
//!
//! # Example
//!
//! ```
//! use rust_neural_compose::consopt::{as_batched, with_activation, with_size};
//! use rust_neural_compose::layers::{cons_dropout, cons_fc};
//! use rust_neural_compose::network::Network;
//! use rust_neural_compose::tensor::Tensor;
//! use rust_neural_compose::utils::Activation;
//! use rust_neural_compose::value::Value;
//!
//! let x = Value::from(Tensor::ones(vec![2, 8]));
//! let mut net = Network::with_seed(1);
//! let input = net.value(x.clone());
//! let hidden = net.l(cons_fc, vec![with_size(4), as_batched(true), with_activation(Activation::ReLU)]);
//! let drop = net.l(cons_dropout, vec![]);
//! let out = net.l(cons_fc, vec![with_size(3), as_batched(true), with_activation(Activation::SoftMax)]);
//! let pipeline = net.compose_seq(&[input, hidden, drop, out]).unwrap();
//!
//! let y = net.fwd(pipeline, &x).unwrap();
//! assert_eq!(y.shape(), Some(&[2usize, 3][..]));
//! ```

pub mod architecture;
pub mod consopt;
pub mod error;
pub mod layers;
pub mod network;
pub mod tensor;
pub mod term;
pub mod utils;
pub mod value;

pub use error::{LayerError, Result, TensorError};
pub use network::Network;
pub use term::{l, Applied, JoinOp, Term, TermId};
