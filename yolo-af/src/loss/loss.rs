//! Defines the loss for training.

use super::{
    bce_with_logit_loss::{BceWithLogitsLoss, BceWithLogitsLossInit},
    breakdown::LossBreakdown,
    misc::BoxMetric,
    output::DenseOutput,
};
use crate::{
    assign::{Assigner, AssignerInit, BatchTargets, GroundTruth, TieBreak},
    common::*,
    dist::{Collective, Normalizer},
    error::ConfigError,
    profiling::Timing,
};

pub use yolo_loss::*;
pub use yolo_loss_output::*;

/// Added to union and closure areas in GIoU.
const GIOU_EPSILON: f64 = 1e-7;

mod yolo_loss {
    use super::*;

    #[derive(Debug, Clone)]
    pub struct YoloLossInit {
        pub num_classes: usize,
        pub stride: usize,
        pub box_metric: Option<BoxMetric>,
        pub tie_break: Option<TieBreak>,
        pub min_box_size: Option<f64>,
        pub objectness_pos_weight: Option<f64>,
        pub objectness_loss_weight: Option<f64>,
        pub classification_loss_weight: Option<f64>,
        pub box_loss_weight: Option<f64>,
    }

    impl YoloLossInit {
        pub fn new(num_classes: usize, stride: usize) -> Self {
            Self {
                num_classes,
                stride,
                box_metric: None,
                tie_break: None,
                min_box_size: None,
                objectness_pos_weight: None,
                objectness_loss_weight: None,
                classification_loss_weight: None,
                box_loss_weight: None,
            }
        }

        pub fn build(self) -> Result<YoloLoss, ConfigError> {
            let Self {
                num_classes,
                stride,
                box_metric,
                tie_break,
                min_box_size,
                objectness_pos_weight,
                objectness_loss_weight,
                classification_loss_weight,
                box_loss_weight,
            } = self;

            // the box loss is always GIoU, other metrics are rejected here
            match box_metric.unwrap_or_default() {
                BoxMetric::GIoU => {}
                box_metric => return Err(ConfigError::UnsupportedBoxMetric(box_metric)),
            }
            let objectness_loss_weight = objectness_loss_weight.unwrap_or(1.0);
            let classification_loss_weight = classification_loss_weight.unwrap_or(1.0);
            let box_loss_weight = box_loss_weight.unwrap_or(5.0);

            let check_weight = |name: &'static str, value: f64| {
                if value.is_finite() && value >= 0.0 {
                    Ok(value)
                } else {
                    Err(ConfigError::InvalidWeight { name, value })
                }
            };
            check_weight("objectness_loss_weight", objectness_loss_weight)?;
            check_weight("classification_loss_weight", classification_loss_weight)?;
            check_weight("box_loss_weight", box_loss_weight)?;
            if let Some(pos_weight) = objectness_pos_weight {
                check_weight("objectness_pos_weight", pos_weight)?;
            }

            let assigner = AssignerInit {
                tie_break: tie_break.unwrap_or_default(),
                min_box_size: min_box_size.unwrap_or(1.0),
                ..AssignerInit::new(num_classes, stride)
            }
            .build()?;

            let bce_objectness = BceWithLogitsLossInit {
                pos_weight: objectness_pos_weight
                    .map(|weight| Tensor::of_slice(&[weight as f32])),
                ..BceWithLogitsLossInit::default(Reduction::Sum)
            }
            .build();
            let bce_class = BceWithLogitsLossInit::default(Reduction::Sum).build();

            Ok(YoloLoss {
                assigner,
                bce_objectness,
                bce_class,
                objectness_loss_weight,
                classification_loss_weight,
                box_loss_weight,
            })
        }
    }

    #[derive(Debug, CopyGetters)]
    pub struct YoloLoss {
        assigner: Assigner,
        bce_objectness: BceWithLogitsLoss,
        bce_class: BceWithLogitsLoss,
        #[get_copy = "pub"]
        objectness_loss_weight: f64,
        #[get_copy = "pub"]
        classification_loss_weight: f64,
        #[get_copy = "pub"]
        box_loss_weight: f64,
    }

    impl YoloLoss {
        pub fn assigner(&self) -> &Assigner {
            &self.assigner
        }

        /// Compute the loss of one step.
        ///
        /// Every process of the collective must call this method once per
        /// step. The returned breakdown is averaged across processes and
        /// checked for finiteness, so a divergence fails on all processes
        /// together.
        pub fn forward<G, C>(
            &self,
            prediction: &DenseOutput,
            ground_truth: &[G],
            normalizer: &Normalizer<C>,
        ) -> Result<(YoloLossOutput, YoloLossAuxiliary)>
        where
            G: Borrow<[GroundTruth]>,
            C: Collective,
        {
            let mut timing = Timing::new("yolo loss");

            let device = prediction.device();
            let kind = prediction.kind();
            let grid = prediction.grid();
            let num_classes = self.assigner.num_classes() as i64;

            ensure!(
                prediction.batch_size() == ground_truth.len(),
                "the batch size of prediction is {}, but get {} ground truth lists",
                prediction.batch_size(),
                ground_truth.len()
            );
            ensure!(
                prediction.num_classes() == self.assigner.num_classes(),
                "expect {} classes in prediction, but get {}",
                self.assigner.num_classes(),
                prediction.num_classes()
            );

            // build dense targets
            let targets = self.assigner.assign_batch(grid, ground_truth)?;
            let (target_objectness, target_class, target_bbox) = tch::no_grad(|| {
                let to = |tensor: &Tensor| tensor.to_device(device).to_kind(kind);
                (
                    to(targets.objectness()).reshape(&[-1]),
                    to(targets.class()).reshape(&[-1, num_classes]),
                    to(targets.bbox()).reshape(&[-1, 4]),
                )
            });
            timing.add_event("assign targets");

            // agree on the divisor among processes
            let num_positives = targets.total_positives();
            let num_foregrounds = normalizer.num_foregrounds(num_positives)?;
            timing.add_event("reduce foreground count");

            // flatten [batch, cell, ..] axes and select positives
            let pred_objectness = prediction.obj_logit().reshape(&[-1]);
            let pred_class = prediction.class_logit().reshape(&[-1, num_classes]);
            let pred_bbox = prediction.bbox().reshape(&[-1, 4]);
            let pos_indexes = target_objectness.gt(0.5).f_mask_to_indexes()?;
            debug_assert!({
                let flat: Vec<_> = targets
                    .positive_indexes()
                    .iter()
                    .map(|index| index.to_flat(&grid) as i64)
                    .collect();
                flat.len() == num_positives
                    && Vec::<i64>::from(&pos_indexes.to_device(Device::Cpu)) == flat
            });

            let objectness_loss = self
                .bce_objectness
                .forward(&pred_objectness, &target_objectness)?
                / num_foregrounds;
            timing.add_event("objectness loss");

            let classification_loss = self.bce_class.forward(
                &pred_class.index_select(0, &pos_indexes),
                &target_class.index_select(0, &pos_indexes),
            )? / num_foregrounds;
            timing.add_event("classification loss");

            let box_loss = self.box_loss(
                &pred_bbox.index_select(0, &pos_indexes),
                &target_bbox.index_select(0, &pos_indexes),
            )? / num_foregrounds;
            timing.add_event("box loss");

            let total_loss = self.objectness_loss_weight * &objectness_loss
                + self.classification_loss_weight * &classification_loss
                + self.box_loss_weight * &box_loss;

            let output = YoloLossOutput {
                total_loss,
                objectness_loss,
                classification_loss,
                box_loss,
            };

            // reduce the detached values for logging and check divergence
            let breakdown = normalizer
                .reduce_breakdown(&output.breakdown())?
                .ensure_finite()?;
            timing.add_event("reduce breakdown");
            timing.report();

            Ok((
                output,
                YoloLossAuxiliary {
                    targets,
                    num_positives,
                    num_foregrounds,
                    breakdown,
                },
            ))
        }

        /// Sum of `1 - GIoU` over co-indexed box pairs in shape `[n, 4]`.
        ///
        /// Predicted boxes with reversed corners are compared with their
        /// corners swapped.
        fn box_loss(&self, pred: &Tensor, target: &Tensor) -> Result<Tensor> {
            let pred = XyxyTensor::from_tensor(pred)?;
            let target = XyxyTensor::from_tensor(target)?;

            let score = pred.giou_with(&target, GIOU_EPSILON);
            let kind = score.kind();
            let loss = (1.0 - score).sum(kind);
            Ok(loss)
        }
    }

    #[derive(Debug)]
    pub struct YoloLossAuxiliary {
        /// The dense targets of the local batch.
        pub targets: BatchTargets,
        /// The number of local positive cells.
        pub num_positives: usize,
        /// The divisor of the task losses.
        pub num_foregrounds: f64,
        /// Task loss values averaged across processes.
        pub breakdown: LossBreakdown,
    }
}

mod yolo_loss_output {
    use super::*;

    /// Normalized task losses and their weighted total, all scalars.
    #[derive(Debug, TensorLike)]
    pub struct YoloLossOutput {
        pub total_loss: Tensor,
        pub objectness_loss: Tensor,
        pub classification_loss: Tensor,
        pub box_loss: Tensor,
    }

    impl YoloLossOutput {
        /// Detached values of this process.
        pub fn breakdown(&self) -> LossBreakdown {
            tch::no_grad(|| LossBreakdown {
                objectness: f64::from(&self.objectness_loss),
                classification: f64::from(&self.classification_loss),
                bbox: f64::from(&self.box_loss),
                total: f64::from(&self.total_loss),
            })
        }

        /// Combine outputs of several minibatches weighted by their sizes.
        pub fn weighted_mean<L>(iter: impl IntoIterator<Item = (L, f64)>) -> Result<Self>
        where
            L: Borrow<YoloLossOutput>,
        {
            let (
                total_loss_vec,
                objectness_loss_vec,
                classification_loss_vec,
                box_loss_vec,
                weight_vec,
            ) = iter
                .into_iter()
                .map(|(loss, weight)| {
                    let YoloLossOutput {
                        total_loss,
                        objectness_loss,
                        classification_loss,
                        box_loss,
                    } = loss.borrow().shallow_clone();

                    (
                        total_loss,
                        objectness_loss,
                        classification_loss,
                        box_loss,
                        weight,
                    )
                })
                .unzip_n_vec();

            let weight_iter = weight_vec.iter().cloned();

            let total_loss = Tensor::f_weighted_mean_tensors(
                total_loss_vec.into_iter().zip(weight_iter.clone()),
            )?;
            let objectness_loss = Tensor::f_weighted_mean_tensors(
                objectness_loss_vec.into_iter().zip(weight_iter.clone()),
            )?;
            let classification_loss = Tensor::f_weighted_mean_tensors(
                classification_loss_vec.into_iter().zip(weight_iter.clone()),
            )?;
            let box_loss =
                Tensor::f_weighted_mean_tensors(box_loss_vec.into_iter().zip(weight_iter))?;

            Ok(YoloLossOutput {
                total_loss,
                objectness_loss,
                classification_loss,
                box_loss,
            })
        }
    }
}
