use crate::{assign::GridSize, common::*};

/// Unchecked dense predictions of a batch of images.
#[derive(Debug, TensorLike)]
pub struct DenseOutputUnchecked {
    /// Objectness logits in shape `[batch, cell]`.
    pub obj_logit: Tensor,
    /// Class logits in shape `[batch, cell, class]`.
    pub class_logit: Tensor,
    /// Predicted boxes in shape `[batch, cell, 4]`, absolute pixel
    /// coordinates `x1, y1, x2, y2`.
    pub bbox: Tensor,
    #[tensor_like(copy)]
    pub grid: GridSize,
}

/// Checked dense predictions of a batch of images.
///
/// The cell axis follows `cell = row * w + col` of [grid](Self::grid).
#[derive(Debug, TensorLike, Getters, CopyGetters)]
pub struct DenseOutput {
    #[get = "pub"]
    obj_logit: Tensor,
    #[get = "pub"]
    class_logit: Tensor,
    #[get = "pub"]
    bbox: Tensor,
    #[get_copy = "pub"]
    #[tensor_like(copy)]
    grid: GridSize,
}

impl DenseOutput {
    pub fn batch_size(&self) -> usize {
        self.obj_logit.size()[0] as usize
    }

    pub fn num_classes(&self) -> usize {
        self.class_logit.size()[2] as usize
    }

    pub fn device(&self) -> Device {
        self.obj_logit.device()
    }

    pub fn kind(&self) -> Kind {
        self.obj_logit.kind()
    }
}

impl TryFrom<DenseOutputUnchecked> for DenseOutput {
    type Error = Error;

    fn try_from(from: DenseOutputUnchecked) -> Result<Self, Self::Error> {
        let DenseOutputUnchecked {
            obj_logit,
            class_logit,
            bbox,
            grid,
        } = from;

        let (obj_batch, obj_cells) = obj_logit.size2()?;
        let (class_batch, class_cells, num_classes) = class_logit.size3()?;
        let (bbox_batch, bbox_cells, num_coords) = bbox.size3()?;
        let num_cells = grid.num_cells() as i64;

        ensure!(num_cells > 0, "the grid must have at least one cell");
        ensure!(
            obj_batch == class_batch && obj_batch == bbox_batch,
            "batch size mismatch"
        );
        ensure!(
            obj_cells == num_cells && class_cells == num_cells && bbox_cells == num_cells,
            "expect {} cells for a {}x{} grid",
            num_cells,
            grid.h(),
            grid.w()
        );
        ensure!(num_classes > 0, "the number of classes must be positive");
        ensure!(num_coords == 4, "expect 4 box coordinates, but get {}", num_coords);

        let device = obj_logit.device();
        ensure!(
            class_logit.device() == device && bbox.device() == device,
            "device mismatch"
        );
        let kind = obj_logit.kind();
        ensure!(
            matches!(kind, Kind::Half | Kind::Float | Kind::Double)
                && class_logit.kind() == kind
                && bbox.kind() == kind,
            "expect tensors of the same floating point kind"
        );

        Ok(Self {
            obj_logit,
            class_logit,
            bbox,
            grid,
        })
    }
}

impl From<DenseOutput> for DenseOutputUnchecked {
    fn from(from: DenseOutput) -> Self {
        let DenseOutput {
            obj_logit,
            class_logit,
            bbox,
            grid,
        } = from;
        Self {
            obj_logit,
            class_logit,
            bbox,
            grid,
        }
    }
}
