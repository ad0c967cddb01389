//! Label assignment and multi-task loss for anchor-free grid detectors.

mod common;
pub mod assign;
pub mod dist;
pub mod error;
pub mod loss;
pub mod profiling;

pub use assign::*;
pub use dist::*;
pub use error::*;
pub use loss::*;
