//! Cross-process agreement on the loss divisor and logged values.

mod collective;
mod local_group;
mod normalizer;

pub use collective::*;
pub use local_group::*;
pub use normalizer::*;
