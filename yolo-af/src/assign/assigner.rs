use super::{BatchTargets, DenseTargets, GridCell, GridSize, GroundTruth};
use crate::{common::*, error::AssignError, error::ConfigError};

/// The rule to pick one ground truth when several fall into the same cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TieBreak {
    /// Keep the box with the smallest area. Among equal areas the box that
    /// comes first in input order is kept.
    SmallestArea,
    /// Keep the box that comes last in input order.
    LastInOrder,
}

impl Default for TieBreak {
    fn default() -> Self {
        Self::SmallestArea
    }
}

impl TieBreak {
    /// Decide between the current owner of a cell and a challenger that
    /// comes later in input order. Returns the index of the winner.
    fn resolve(&self, ground_truth: &[GroundTruth], owner: usize, challenger: usize) -> usize {
        debug_assert!(owner < challenger);

        match self {
            Self::SmallestArea => {
                let owner_area = ground_truth[owner].bbox.area();
                let challenger_area = ground_truth[challenger].bbox.area();
                if challenger_area < owner_area {
                    challenger
                } else {
                    owner
                }
            }
            Self::LastInOrder => challenger,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssignerInit {
    pub num_classes: usize,
    pub stride: usize,
    pub tie_break: TieBreak,
    /// Boxes narrower or shorter than this many pixels are dropped.
    pub min_box_size: f64,
}

impl AssignerInit {
    pub fn new(num_classes: usize, stride: usize) -> Self {
        Self {
            num_classes,
            stride,
            tie_break: TieBreak::default(),
            min_box_size: 1.0,
        }
    }

    pub fn build(self) -> Result<Assigner, ConfigError> {
        let Self {
            num_classes,
            stride,
            tie_break,
            min_box_size,
        } = self;

        if num_classes == 0 {
            return Err(ConfigError::ZeroClasses);
        }
        if stride == 0 {
            return Err(ConfigError::ZeroStride);
        }
        if !(min_box_size.is_finite() && min_box_size >= 0.0) {
            return Err(ConfigError::InvalidMinBoxSize(min_box_size));
        }

        Ok(Assigner {
            num_classes,
            stride,
            tie_break,
            min_box_size,
        })
    }
}

/// Assigns every ground truth box to the single grid cell containing its
/// center.
#[derive(Debug, Clone, CopyGetters)]
pub struct Assigner {
    #[get_copy = "pub"]
    num_classes: usize,
    #[get_copy = "pub"]
    stride: usize,
    #[get_copy = "pub"]
    tie_break: TieBreak,
    #[get_copy = "pub"]
    min_box_size: f64,
}

impl Assigner {
    /// The cell responsible for a box, the floor of its center over the
    /// stride clipped into the grid.
    pub fn responsible_cell(&self, grid: &GridSize, bbox: &Xyxy<f64>) -> GridCell {
        let stride = self.stride as f64;
        let clip = |pos: f64, len: usize| -> usize {
            let index = (pos / stride).floor();
            index.max(0.0).min(len.saturating_sub(1) as f64) as usize
        };

        GridCell {
            row: clip(bbox.cy(), grid.h()),
            col: clip(bbox.cx(), grid.w()),
        }
    }

    /// Build dense targets for one image.
    ///
    /// The output is deterministic for the same input. Cells without a box
    /// keep zero objectness and zero class and box targets.
    pub fn assign(
        &self,
        grid: GridSize,
        ground_truth: &[GroundTruth],
    ) -> Result<DenseTargets, AssignError> {
        let num_cells = grid.num_cells();
        let num_classes = self.num_classes;

        // find the owner ground truth of each cell
        let mut owners: Vec<Option<usize>> = vec![None; num_cells];

        for (index, gt) in ground_truth.iter().enumerate() {
            let GroundTruth { ref bbox, class } = *gt;

            if class >= num_classes {
                return Err(AssignError::ClassOutOfRange {
                    index,
                    class,
                    num_classes,
                });
            }
            if bbox.w() < self.min_box_size || bbox.h() < self.min_box_size {
                warn!(
                    "ground truth {} {:?} is smaller than {} pixels and is ignored",
                    index, bbox, self.min_box_size
                );
                continue;
            }

            let cell_index = grid.cell_index(self.responsible_cell(&grid, bbox));
            let owner = &mut owners[cell_index];
            *owner = Some(match *owner {
                Some(prev) => self.tie_break.resolve(ground_truth, prev, index),
                None => index,
            });
        }

        // fill dense buffers
        let mut objectness = vec![0f32; num_cells];
        let mut class = vec![0f32; num_cells * num_classes];
        let mut bbox = vec![0f32; num_cells * 4];
        let mut num_positives = 0;

        owners
            .iter()
            .enumerate()
            .filter_map(|(cell_index, owner)| Some((cell_index, (*owner)?)))
            .for_each(|(cell_index, gt_index)| {
                let gt = &ground_truth[gt_index];
                let [x1, y1, x2, y2] = gt.bbox.xyxy();

                objectness[cell_index] = 1.0;
                class[cell_index * num_classes + gt.class] = 1.0;
                bbox[(cell_index * 4)..(cell_index * 4 + 4)]
                    .copy_from_slice(&[x1 as f32, y1 as f32, x2 as f32, y2 as f32]);
                num_positives += 1;
            });

        debug_assert!(num_positives <= ground_truth.len());

        let targets = tch::no_grad(|| DenseTargets {
            objectness: Tensor::of_slice(&objectness),
            class: Tensor::of_slice(&class).view([num_cells as i64, num_classes as i64]),
            bbox: Tensor::of_slice(&bbox).view([num_cells as i64, 4]),
            grid,
            num_positives,
        });

        Ok(targets)
    }

    /// Build dense targets for each image and stack them.
    pub fn assign_batch<G>(&self, grid: GridSize, ground_truth: &[G]) -> Result<BatchTargets>
    where
        G: Borrow<[GroundTruth]>,
    {
        let targets: Vec<_> = ground_truth
            .iter()
            .enumerate()
            .map(|(batch_index, gt)| {
                self.assign(grid, gt.borrow())
                    .with_context(|| format!("failed to assign targets of image {}", batch_index))
            })
            .try_collect()?;
        BatchTargets::stack(targets)
    }
}
