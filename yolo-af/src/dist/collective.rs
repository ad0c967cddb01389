use crate::error::CollectiveError;

/// The collective communication runtime of data parallel training.
pub trait Collective {
    /// Whether the process runs in a distributed group.
    fn is_active(&self) -> bool;

    /// The number of processes in the group.
    fn world_size(&self) -> usize;

    /// Sum `values` element-wise across processes in place.
    ///
    /// It blocks until every process contributes. Every process obtains the
    /// same result.
    fn all_reduce_sum(&self, values: &mut [f64]) -> Result<(), CollectiveError>;
}

impl<C> Collective for &C
where
    C: Collective + ?Sized,
{
    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn world_size(&self) -> usize {
        (**self).world_size()
    }

    fn all_reduce_sum(&self, values: &mut [f64]) -> Result<(), CollectiveError> {
        (**self).all_reduce_sum(values)
    }
}

/// The collective of a lone process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Collective for SingleProcess {
    fn is_active(&self) -> bool {
        false
    }

    fn world_size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, _values: &mut [f64]) -> Result<(), CollectiveError> {
        Ok(())
    }
}
