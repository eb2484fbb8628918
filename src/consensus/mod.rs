// Consensus and validation logic

pub mod pow;
pub mod validation;

pub use pow::{Miner, MiningResult};
pub use validation::{BlockValidator, ValidationError};
