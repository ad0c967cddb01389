use super::{BoxMetric, YoloLossInit};
use crate::{assign::TieBreak, common::*};

/// The loss function configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossConfig {
    /// The number of object classes.
    pub num_classes: usize,
    /// The stride of the prediction grid in pixels.
    pub stride: usize,
    /// The choice of bounding box metric.
    #[serde(default)]
    pub box_metric: BoxMetric,
    /// The rule to pick one box when several boxes share a cell.
    #[serde(default)]
    pub tie_break: TieBreak,
    /// Boxes narrower or shorter than this size in pixels are ignored.
    pub min_box_size: Option<R64>,
    /// The weight factor of positive objectness entries.
    pub objectness_positive_weight: Option<R64>,
    /// The weight factor of objectness loss.
    pub objectness_loss_weight: Option<R64>,
    /// The weight factor of classification loss.
    pub classification_loss_weight: Option<R64>,
    /// The weight factor of box loss.
    pub box_loss_weight: Option<R64>,
}

impl LossConfig {
    pub fn yolo_loss_init(&self) -> YoloLossInit {
        let Self {
            num_classes,
            stride,
            box_metric,
            tie_break,
            min_box_size,
            objectness_positive_weight,
            objectness_loss_weight,
            classification_loss_weight,
            box_loss_weight,
        } = *self;

        YoloLossInit {
            box_metric: Some(box_metric),
            tie_break: Some(tie_break),
            min_box_size: min_box_size.map(R64::raw),
            objectness_pos_weight: objectness_positive_weight.map(R64::raw),
            objectness_loss_weight: objectness_loss_weight.map(R64::raw),
            classification_loss_weight: classification_loss_weight.map(R64::raw),
            box_loss_weight: box_loss_weight.map(R64::raw),
            ..YoloLossInit::new(num_classes, stride)
        }
    }
}
