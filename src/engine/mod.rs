//! Arbitrage engine

pub mod arbitrage;
pub mod id_gen;

pub use arbitrage::*;
pub use id_gen::*;
