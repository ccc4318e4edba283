//! Shared utilities: the seeded RNG, activation functions and cost functions.

pub mod activations;
pub mod cost;
pub mod rng;

pub use activations::Activation;
pub use cost::rms;
pub use rng::SimpleRng;
