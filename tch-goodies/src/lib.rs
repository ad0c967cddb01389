//! Tensor toolkit shared by the loss crates.

mod common;
pub mod compound_tensor;
pub mod tensor;

pub use compound_tensor::*;
pub use tensor::*;
