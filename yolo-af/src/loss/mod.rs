//! Multi-task detection loss over dense grid predictions.

mod bce_with_logit_loss;
mod breakdown;
mod config;
mod loss;
mod misc;
mod output;

pub use bce_with_logit_loss::*;
pub use breakdown::*;
pub use config::*;
pub use loss::*;
pub use misc::*;
pub use output::*;
