//! Error types of the assignment, loss and collective layers.

use crate::loss::{BoxMetric, LossBreakdown};
use thiserror::Error;

/// Rejected configuration values, detected before any training step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("the number of classes must be positive")]
    ZeroClasses,
    #[error("the stride must be positive")]
    ZeroStride,
    #[error("the box metric {0:?} is not supported, use GIoU instead")]
    UnsupportedBoxMetric(BoxMetric),
    #[error("the weight '{name}' must be finite and non-negative, but get {value}")]
    InvalidWeight { name: &'static str, value: f64 },
    #[error("the minimum box size must be finite and non-negative, but get {0}")]
    InvalidMinBoxSize(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignError {
    #[error("the class id {class} of ground truth {index} is out of range, the number of classes is {num_classes}")]
    ClassOutOfRange {
        index: usize,
        class: usize,
        num_classes: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LossError {
    #[error("non-finite loss detected, the breakdown is {breakdown}")]
    NonFinite { breakdown: LossBreakdown },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectiveError {
    #[error("rank {rank} expects step {expected} but rank {peer} sends step {found}")]
    Desync {
        rank: usize,
        peer: usize,
        expected: u64,
        found: u64,
    },
    #[error("rank {rank} expects {expected} values but rank {peer} sends {found}")]
    LengthMismatch {
        rank: usize,
        peer: usize,
        expected: usize,
        found: usize,
    },
    #[error("rank {rank} lost connection to its peers")]
    Disconnected { rank: usize },
}
