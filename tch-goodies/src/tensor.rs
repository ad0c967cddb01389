use crate::common::*;

pub trait TensorExt {
    fn is_empty(&self) -> bool;

    /// Return the positions of true entries of a 1-d boolean mask as an
    /// int64 tensor in shape `[num_true]`.
    fn f_mask_to_indexes(&self) -> Result<Tensor>;

    fn mask_to_indexes(&self) -> Tensor {
        self.f_mask_to_indexes().unwrap()
    }

    /// Check that every element is neither NaN nor infinite.
    fn all_finite(&self) -> bool;

    fn f_sum_tensors<T>(tensors: impl IntoIterator<Item = T>) -> Result<Tensor>
    where
        T: Borrow<Tensor>,
    {
        let mut iter = tensors.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| format_err!("the input iterator must not be empty"))?
            .borrow()
            .shallow_clone();
        let sum = iter.fold(first, |lhs, rhs| lhs + rhs.borrow());
        Ok(sum)
    }

    fn f_weighted_mean_tensors<T>(pairs: impl IntoIterator<Item = (T, f64)>) -> Result<Tensor>
    where
        T: Borrow<Tensor>,
    {
        let (tensors, weights) = pairs
            .into_iter()
            .map(|(tensor, weight)| (tensor.borrow() * weight, weight))
            .unzip_n_vec();
        let sum_weights: f64 = weights.iter().cloned().sum();
        ensure!(
            sum_weights.is_finite() && sum_weights > 0.0,
            "the sum of weights must be positive, but get {}",
            sum_weights
        );
        let sum_tensors = Self::f_sum_tensors(tensors)?;
        Ok(sum_tensors / sum_weights)
    }
}

impl TensorExt for Tensor {
    fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    fn f_mask_to_indexes(&self) -> Result<Tensor> {
        ensure!(
            self.dim() == 1 && self.kind() == Kind::Bool,
            "expect a 1-d bool tensor, but get {:?} tensor with shape {:?}",
            self.kind(),
            self.size()
        );
        let indexes = self.nonzero().view([-1]);
        Ok(indexes)
    }

    fn all_finite(&self) -> bool {
        tch::no_grad(|| bool::from(self.isfinite().all()))
    }
}
