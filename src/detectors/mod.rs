//! Mispricing detectors

pub mod basis;
pub mod composite;
pub mod cross_exchange;
pub mod detector;
pub mod spot_derivative;
pub mod statistical;
pub mod triangular;
pub mod volatility;

pub use basis::*;
pub use composite::*;
pub use cross_exchange::*;
pub use detector::*;
pub use spot_derivative::*;
pub use statistical::*;
pub use triangular::*;
pub use volatility::*;
