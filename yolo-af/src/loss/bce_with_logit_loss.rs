use crate::common::*;

#[derive(Debug)]
pub struct BceWithLogitsLossInit {
    pub pos_weight: Option<Tensor>,
    pub reduction: Reduction,
}

impl BceWithLogitsLossInit {
    pub fn default(reduction: Reduction) -> Self {
        Self {
            pos_weight: None,
            reduction,
        }
    }

    pub fn build(self) -> BceWithLogitsLoss {
        let Self {
            pos_weight,
            reduction,
        } = self;

        BceWithLogitsLoss {
            pos_weight,
            reduction,
        }
    }
}

/// Binary cross entropy on logits with independent sigmoids per entry.
#[derive(Debug)]
pub struct BceWithLogitsLoss {
    pos_weight: Option<Tensor>,
    reduction: Reduction,
}

impl BceWithLogitsLoss {
    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Result<Tensor> {
        ensure!(
            input.size() == target.size(),
            "input and target tensors must have equal shape, but get {:?} and {:?}",
            input.size(),
            target.size()
        );
        debug_assert!(
            target.is_empty() || bool::from(target.ge(0.0).logical_and(&target.le(1.0)).all()),
            "target values must be in range of [0.0, 1.0]"
        );

        let pos_weight = self
            .pos_weight
            .as_ref()
            .map(|weight| weight.to_device(input.device()).to_kind(input.kind()));
        let loss = input.binary_cross_entropy_with_logits::<&Tensor>(
            target,
            None,
            pos_weight.as_ref(),
            self.reduction,
        );
        Ok(loss)
    }
}
