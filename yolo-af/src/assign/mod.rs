//! Ground truth to dense grid target assignment.

mod assigner;
mod grid;
mod ground_truth;
mod targets;

pub use assigner::*;
pub use grid::*;
pub use ground_truth::*;
pub use targets::*;
