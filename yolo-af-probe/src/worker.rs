//! The per-rank probe loop.

use crate::{common::*, config::Config, labels::LabelsFile};
use yolo_af::{
    Collective, DenseOutput, DenseOutputUnchecked, GridSize, GroundTruth, LocalGroup,
    LossBreakdown, Normalizer,
};

/// The reduced loss values of one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: usize,
    pub num_foregrounds: f64,
    pub breakdown: LossBreakdown,
}

/// Run every step on one rank and return the reports.
pub fn run_rank(
    config: &Config,
    labels: &LabelsFile,
    member: LocalGroup,
) -> Result<Vec<StepReport>> {
    let rank = member.rank();
    let world_size = member.world_size();
    let batch_size = config.input.batch_size.get();
    let logit_scale = config.input.logit_scale.raw();

    let loss_fn = config.loss.yolo_loss_init().build()?;
    let grid = labels.grid(loss_fn.assigner().stride())?;
    let num_classes = loss_fn.assigner().num_classes();
    let shard = labels.shard(rank, world_size);
    if shard.is_empty() {
        warn!("rank {} has no images and contributes empty batches", rank);
    }
    let normalizer = Normalizer::new(member);

    (0..config.input.steps.get())
        .map(|step| {
            let ground_truth: Vec<Vec<GroundTruth>> = (0..batch_size)
                .map(|index| {
                    if shard.is_empty() {
                        vec![]
                    } else {
                        shard[(step * batch_size + index) % shard.len()]
                            .ground_truth
                            .clone()
                    }
                })
                .collect();

            let mut rng = StdRng::seed_from_u64(
                config.input.seed ^ ((rank as u64) << 32) ^ step as u64,
            );
            let output = random_output(
                &mut rng,
                batch_size,
                grid,
                num_classes,
                logit_scale,
                loss_fn.assigner().stride(),
            )?;

            let (loss, aux) = loss_fn
                .forward(&output, &ground_truth, &normalizer)
                .with_context(|| format!("rank {} failed at step {}", rank, step))?;
            loss.total_loss.backward();

            let grads_finite = [output.obj_logit(), output.class_logit(), output.bbox()]
                .iter()
                .all(|tensor| tensor.grad().all_finite());
            ensure!(
                grads_finite,
                "rank {} obtains non-finite gradients at step {}",
                rank,
                step
            );

            if rank == 0 {
                info!(
                    "step {}\tforegrounds {:.2}\t{}",
                    step, aux.num_foregrounds, aux.breakdown
                );
            }

            Ok(StepReport {
                step,
                num_foregrounds: aux.num_foregrounds,
                breakdown: aux.breakdown,
            })
        })
        .try_collect()
}

/// Generate dense predictions with uniform logits and boxes scattered
/// around their cells.
fn random_output(
    rng: &mut StdRng,
    batch_size: usize,
    grid: GridSize,
    num_classes: usize,
    logit_scale: f64,
    stride: usize,
) -> Result<DenseOutput> {
    let num_cells = grid.num_cells();
    let stride = stride as f32;
    let logit_scale = logit_scale as f32;
    let mut logit = || {
        if logit_scale > 0.0 {
            rng.gen_range(-logit_scale..logit_scale)
        } else {
            0.0
        }
    };

    let obj: Vec<f32> = (0..(batch_size * num_cells)).map(|_| logit()).collect();
    let class: Vec<f32> = (0..(batch_size * num_cells * num_classes))
        .map(|_| logit())
        .collect();
    let bbox: Vec<f32> = (0..batch_size)
        .cartesian_product(0..num_cells)
        .flat_map(|(_, cell_index)| {
            let cell = grid.cell_at(cell_index);
            let cx = (cell.col as f32 + rng.gen_range(0.0..1.0)) * stride;
            let cy = (cell.row as f32 + rng.gen_range(0.0..1.0)) * stride;
            let w = rng.gen_range(0.25..4.0) * stride;
            let h = rng.gen_range(0.25..4.0) * stride;
            [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
        })
        .collect();

    let batch_size = batch_size as i64;
    let num_cells = num_cells as i64;
    let output = DenseOutputUnchecked {
        obj_logit: Tensor::of_slice(&obj)
            .view([batch_size, num_cells])
            .set_requires_grad(true),
        class_logit: Tensor::of_slice(&class)
            .view([batch_size, num_cells, num_classes as i64])
            .set_requires_grad(true),
        bbox: Tensor::of_slice(&bbox)
            .view([batch_size, num_cells, 4])
            .set_requires_grad(true),
        grid,
    }
    .try_into()?;
    Ok(output)
}
