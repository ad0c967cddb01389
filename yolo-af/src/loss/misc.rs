use crate::common::*;

/// The overlap measure of the box regression loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoxMetric {
    IoU,
    GIoU,
}

impl Default for BoxMetric {
    fn default() -> Self {
        Self::GIoU
    }
}
