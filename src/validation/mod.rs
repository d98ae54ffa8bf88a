//! Opportunity validation

pub mod opportunity;

pub use opportunity::*;
