use crate::common::*;
use bbox::{prelude::*, Xyxy};

/// Checked tensor of batched box parameters in corner format.
#[derive(Debug, TensorLike, Getters)]
pub struct XyxyTensor {
    /// The left edge in shape `[batch, 1]`.
    #[get = "pub"]
    pub(crate) x1: Tensor,
    /// The top edge in shape `[batch, 1]`.
    #[get = "pub"]
    pub(crate) y1: Tensor,
    /// The right edge in shape `[batch, 1]`.
    #[get = "pub"]
    pub(crate) x2: Tensor,
    /// The bottom edge in shape `[batch, 1]`.
    #[get = "pub"]
    pub(crate) y2: Tensor,
}

/// Unchecked tensor of batched box parameters in corner format.
#[derive(Debug, TensorLike)]
pub struct XyxyTensorUnchecked {
    /// The left edge in shape `[batch, 1]`.
    pub x1: Tensor,
    /// The top edge in shape `[batch, 1]`.
    pub y1: Tensor,
    /// The right edge in shape `[batch, 1]`.
    pub x2: Tensor,
    /// The bottom edge in shape `[batch, 1]`.
    pub y2: Tensor,
}

impl XyxyTensor {
    /// Split a `[batch, 4]` tensor with columns `x1, y1, x2, y2`.
    ///
    /// The columns are views, gradients flow back to the input.
    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        let (_, num_coords) = tensor.size2()?;
        ensure!(
            num_coords == 4,
            "expect a [batch, 4] tensor, but get {:?}",
            tensor.size()
        );

        XyxyTensorUnchecked {
            x1: tensor.narrow(1, 0, 1),
            y1: tensor.narrow(1, 1, 1),
            x2: tensor.narrow(1, 2, 1),
            y2: tensor.narrow(1, 3, 1),
        }
        .try_into()
    }

    /// Concatenate the parameters into a `[batch, 4]` tensor.
    pub fn to_tensor(&self) -> Tensor {
        let Self { x1, y1, x2, y2 } = self;
        Tensor::cat(&[x1, y1, x2, y2], 1)
    }

    pub fn num_samples(&self) -> i64 {
        self.x1.size()[0]
    }

    pub fn device(&self) -> Device {
        self.x1.device()
    }

    /// Swap reversed corners so that `x1 <= x2` and `y1 <= y2` on every row.
    ///
    /// Gradients flow to whichever input corner is selected.
    pub fn ordered(&self) -> Self {
        let Self { x1, y1, x2, y2 } = self;
        Self {
            x1: x1.minimum(x2),
            y1: y1.minimum(y2),
            x2: x1.maximum(x2),
            y2: y1.maximum(y2),
        }
    }

    /// Compute the box area in shape `[batch, 1]`.
    pub fn area(&self) -> Tensor {
        let Self { x1, y1, x2, y2 } = self;
        (x2 - x1) * (y2 - y1)
    }

    /// Compute the intersection area with the other box tensor.
    pub fn intersect_area_with(&self, other: &Self) -> Tensor {
        let Self {
            x1: lhs_x1,
            y1: lhs_y1,
            x2: lhs_x2,
            y2: lhs_y2,
        } = self;
        let Self {
            x1: rhs_x1,
            y1: rhs_y1,
            x2: rhs_x2,
            y2: rhs_y2,
        } = other;

        let max_x1 = lhs_x1.maximum(rhs_x1);
        let max_y1 = lhs_y1.maximum(rhs_y1);
        let min_x2 = lhs_x2.minimum(rhs_x2);
        let min_y2 = lhs_y2.minimum(rhs_y2);

        let inner_w = (min_x2 - max_x1).clamp_min(0.0);
        let inner_h = (min_y2 - max_y1).clamp_min(0.0);

        inner_w * inner_h
    }

    /// Compute the smallest enclosing box with the other box tensor.
    pub fn closure_with(&self, other: &Self) -> Self {
        let Self {
            x1: lhs_x1,
            y1: lhs_y1,
            x2: lhs_x2,
            y2: lhs_y2,
        } = self;
        let Self {
            x1: rhs_x1,
            y1: rhs_y1,
            x2: rhs_x2,
            y2: rhs_y2,
        } = other;

        Self {
            x1: lhs_x1.minimum(rhs_x1),
            y1: lhs_y1.minimum(rhs_y1),
            x2: lhs_x2.maximum(rhs_x2),
            y2: lhs_y2.maximum(rhs_y2),
        }
    }

    /// Compute the element-wise IoU in shape `[batch, 1]`.
    ///
    /// Reversed corners are swapped before the areas are taken.
    pub fn iou_with(&self, other: &Self, epsilon: f64) -> Tensor {
        let (this, other) = (self.ordered(), other.ordered());
        let inter_area = this.intersect_area_with(&other);
        let union_area = this.area() + other.area() - &inter_area + epsilon;
        inter_area / union_area
    }

    /// Compute the element-wise generalized IoU in shape `[batch, 1]`.
    ///
    /// Unlike IoU, the value keeps a gradient for disjoint boxes. It lies in
    /// `(-1, 1]` when `epsilon` is positive, also for boxes with reversed
    /// corners.
    pub fn giou_with(&self, other: &Self, epsilon: f64) -> Tensor {
        let (this, other) = (self.ordered(), other.ordered());
        let inter_area = this.intersect_area_with(&other);
        let union_area = this.area() + other.area() - &inter_area + epsilon;
        let closure_area = this.closure_with(&other).area() + epsilon;
        let iou = &inter_area / &union_area;
        iou - (&closure_area - &union_area) / &closure_area
    }
}

impl TryFrom<XyxyTensorUnchecked> for XyxyTensor {
    type Error = Error;

    fn try_from(from: XyxyTensorUnchecked) -> Result<Self, Self::Error> {
        let XyxyTensorUnchecked { x1, y1, x2, y2 } = from;
        match (x1.size2()?, y1.size2()?, x2.size2()?, y2.size2()?) {
            ((x1_len, 1), (y1_len, 1), (x2_len, 1), (y2_len, 1)) => ensure!(
                x1_len == y1_len && x1_len == x2_len && x1_len == y2_len,
                "size mismatch"
            ),
            _ => bail!("size mismatch"),
        };
        let device = x1.device();
        ensure!(
            [&y1, &x2, &y2]
                .iter()
                .all(|tensor| tensor.device() == device),
            "device mismatch"
        );
        Ok(Self { x1, y1, x2, y2 })
    }
}

impl From<XyxyTensor> for XyxyTensorUnchecked {
    fn from(from: XyxyTensor) -> Self {
        let XyxyTensor { x1, y1, x2, y2 } = from;
        Self { x1, y1, x2, y2 }
    }
}

impl From<&[Xyxy<f32>]> for XyxyTensor {
    fn from(from: &[Xyxy<f32>]) -> Self {
        let (x1_vec, y1_vec, x2_vec, y2_vec) = from
            .iter()
            .map(|bbox| {
                let [x1, y1, x2, y2] = bbox.xyxy();
                (x1, y1, x2, y2)
            })
            .unzip_n_vec();

        Self {
            x1: Tensor::of_slice(&x1_vec).view([-1, 1]),
            y1: Tensor::of_slice(&y1_vec).view([-1, 1]),
            x2: Tensor::of_slice(&x2_vec).view([-1, 1]),
            y2: Tensor::of_slice(&y2_vec).view([-1, 1]),
        }
    }
}

impl From<&Vec<Xyxy<f32>>> for XyxyTensor {
    fn from(from: &Vec<Xyxy<f32>>) -> Self {
        from.as_slice().into()
    }
}

impl TryFrom<&XyxyTensor> for Vec<Xyxy<f32>> {
    type Error = Error;

    fn try_from(from: &XyxyTensor) -> Result<Self, Self::Error> {
        let rows = Vec::<f32>::from(
            &from
                .to_tensor()
                .to_device(Device::Cpu)
                .to_kind(Kind::Float)
                .view([-1]),
        );
        rows.chunks(4)
            .map(|chunk| Xyxy::try_from_xyxy([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .try_collect()
    }
}
