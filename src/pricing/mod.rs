//! Pricing models for synthetic instruments

pub mod basket;
pub mod black_scholes;
pub mod confidence;
pub mod cross_currency;
pub mod futures;
pub mod model;
pub mod options;
pub mod perpetual;
pub mod statistical;
pub mod vol_surface;

pub use basket::*;
pub use black_scholes::{BsInputs, Greeks};
pub use confidence::*;
pub use cross_currency::*;
pub use futures::*;
pub use model::*;
pub use options::*;
pub use perpetual::*;
pub use statistical::*;
pub use vol_surface::*;
