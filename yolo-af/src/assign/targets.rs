use super::{FlatIndex, GridSize};
use crate::common::*;

/// Dense supervision targets of one image.
///
/// Tensors are indexed by cell first, `cell = row * w + col`.
#[derive(Debug, TensorLike, Getters, CopyGetters)]
pub struct DenseTargets {
    /// Objectness in shape `[cell]`, either 0 or 1.
    #[get = "pub"]
    pub(crate) objectness: Tensor,
    /// Multi-hot class target in shape `[cell, class]`.
    #[get = "pub"]
    pub(crate) class: Tensor,
    /// Box target in shape `[cell, 4]` with coordinates `x1, y1, x2, y2` in
    /// pixels. Only meaningful on positive cells.
    #[get = "pub"]
    pub(crate) bbox: Tensor,
    #[get_copy = "pub"]
    #[tensor_like(copy)]
    pub(crate) grid: GridSize,
    #[get_copy = "pub"]
    #[tensor_like(copy)]
    pub(crate) num_positives: usize,
}

impl DenseTargets {
    pub fn num_classes(&self) -> usize {
        self.class.size()[1] as usize
    }

    /// Return the positive cell indexes in ascending order.
    pub fn positive_cells(&self) -> Vec<usize> {
        let indexes = self.objectness.gt(0.5).mask_to_indexes();
        Vec::<i64>::from(&indexes)
            .into_iter()
            .map(|index| index as usize)
            .collect()
    }
}

/// Dense supervision targets of a batch of images sharing the same grid.
///
/// Tensors have a leading batch axis, `[batch, cell, ..]`.
#[derive(Debug, TensorLike, Getters, CopyGetters)]
pub struct BatchTargets {
    /// Objectness in shape `[batch, cell]`.
    #[get = "pub"]
    pub(crate) objectness: Tensor,
    /// Class target in shape `[batch, cell, class]`.
    #[get = "pub"]
    pub(crate) class: Tensor,
    /// Box target in shape `[batch, cell, 4]`.
    #[get = "pub"]
    pub(crate) bbox: Tensor,
    #[get_copy = "pub"]
    #[tensor_like(copy)]
    pub(crate) grid: GridSize,
    /// The number of positive cells of each image.
    #[get = "pub"]
    #[tensor_like(clone)]
    pub(crate) num_positives: Vec<usize>,
}

impl BatchTargets {
    /// Stack per-image targets along a new batch axis.
    pub fn stack(targets: impl IntoIterator<Item = impl Borrow<DenseTargets>>) -> Result<Self> {
        let (objectness_vec, class_vec, bbox_vec, grid_set, num_positives): (
            Vec<_>,
            Vec<_>,
            Vec<_>,
            HashSet<_>,
            Vec<_>,
        ) = targets
            .into_iter()
            .map(|targets| {
                let targets = targets.borrow();
                (
                    targets.objectness.shallow_clone(),
                    targets.class.shallow_clone(),
                    targets.bbox.shallow_clone(),
                    targets.grid,
                    targets.num_positives,
                )
            })
            .unzip_n();

        ensure!(!objectness_vec.is_empty(), "cannot stack an empty batch");
        let grid = grid_set
            .into_iter()
            .exactly_one()
            .map_err(|_| format_err!("grid size mismatch among images"))?;
        let class_sizes: HashSet<_> = class_vec.iter().map(|class| class.size()).collect();
        ensure!(class_sizes.len() == 1, "class size mismatch among images");

        Ok(Self {
            objectness: Tensor::stack(&objectness_vec, 0),
            class: Tensor::stack(&class_vec, 0),
            bbox: Tensor::stack(&bbox_vec, 0),
            grid,
            num_positives,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.num_positives.len()
    }

    pub fn total_positives(&self) -> usize {
        self.num_positives.iter().sum()
    }

    /// Return the positive locations in ascending flat order, the order in
    /// which the loss selects positives from flattened tensors.
    pub fn positive_indexes(&self) -> Vec<FlatIndex> {
        let indexes = self.objectness.reshape(&[-1]).gt(0.5).mask_to_indexes();
        Vec::<i64>::from(&indexes)
            .into_iter()
            .map(|flat| FlatIndex::from_flat(&self.grid, flat as usize))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::{AssignerInit, GridCell, GroundTruth};

    #[test]
    fn stack_and_locate_positives() -> Result<()> {
        let grid = GridSize::new(4, 4)?;
        let assigner = AssignerInit::new(2, 16).build()?;
        let first = assigner.assign(grid, &[GroundTruth::new([40.0, 0.0, 56.0, 14.0], 1)?])?;
        let second = assigner.assign(grid, &[])?;
        let third = assigner.assign(grid, &[GroundTruth::new([0.0, 40.0, 20.0, 60.0], 0)?])?;

        let targets = BatchTargets::stack([&first, &second, &third])?;
        assert_eq!(targets.batch_size(), 3);
        assert_eq!(targets.total_positives(), 2);

        let cell = |row, col| grid.cell_index(GridCell { row, col });
        assert_eq!(
            targets.positive_indexes(),
            vec![
                FlatIndex {
                    batch_index: 0,
                    cell_index: cell(0, 3),
                },
                FlatIndex {
                    batch_index: 2,
                    cell_index: cell(3, 0),
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn stack_rejects_mismatched_grids() -> Result<()> {
        let assigner = AssignerInit::new(2, 16).build()?;
        let lhs = assigner.assign(GridSize::new(4, 4)?, &[])?;
        let rhs = assigner.assign(GridSize::new(2, 8)?, &[])?;
        assert!(BatchTargets::stack([&lhs, &rhs]).is_err());
        assert!(BatchTargets::stack(Vec::<DenseTargets>::new()).is_err());
        Ok(())
    }
}
