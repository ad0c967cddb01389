use super::{Collective, SingleProcess};
use crate::{common::*, error::CollectiveError, loss::LossBreakdown};

/// Computes the loss divisor consistently across processes.
#[derive(Debug, Clone, Default)]
pub struct Normalizer<C = SingleProcess> {
    collective: C,
}

impl<C> Normalizer<C>
where
    C: Collective,
{
    pub fn new(collective: C) -> Self {
        Self { collective }
    }

    pub fn collective(&self) -> &C {
        &self.collective
    }

    /// The divisor of the task losses given the local positive count.
    ///
    /// It is the local count on a lone process, and the average count over
    /// processes in a group, floored at 1 in both cases. In a group it is a
    /// barrier that every process must reach once per step.
    pub fn num_foregrounds(&self, num_positives: usize) -> Result<f64, CollectiveError> {
        let count = if self.collective.is_active() {
            let mut values = [num_positives as f64];
            self.collective.all_reduce_sum(&mut values)?;
            values[0] / self.collective.world_size() as f64
        } else {
            num_positives as f64
        };
        Ok(count.max(1.0))
    }

    /// Average the logged loss values across processes.
    pub fn reduce_breakdown(&self, breakdown: &LossBreakdown) -> Result<LossBreakdown> {
        if !self.collective.is_active() {
            return Ok(*breakdown);
        }

        let world_size = self.collective.world_size() as f64;
        let mut values = breakdown.to_vec();
        self.collective.all_reduce_sum(&mut values)?;
        values.iter_mut().for_each(|value| *value /= world_size);
        LossBreakdown::from_slice(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::LocalGroup;
    use std::thread;

    #[test]
    fn single_process_floor() -> Result<()> {
        let normalizer: Normalizer = Normalizer::default();
        assert_eq!(normalizer.num_foregrounds(0)?, 1.0);
        assert_eq!(normalizer.num_foregrounds(1)?, 1.0);
        assert_eq!(normalizer.num_foregrounds(7)?, 7.0);
        Ok(())
    }

    #[test]
    fn group_of_one_agrees_with_single_process() -> Result<()> {
        let member = LocalGroup::new(1)?.remove(0);
        let grouped = Normalizer::new(member);
        let single = Normalizer::new(SingleProcess);

        for count in [0, 1, 2, 17] {
            assert_eq!(grouped.num_foregrounds(count)?, single.num_foregrounds(count)?);
        }
        Ok(())
    }

    #[test]
    fn group_average_count() -> Result<()> {
        let counts = [[3, 0], [0, 0], [5, 6]];
        let expects = [1.5, 1.0, 5.5];

        let handles: Vec<_> = LocalGroup::new(2)?
            .into_iter()
            .map(|member| {
                thread::spawn(move || -> Result<Vec<f64>, CollectiveError> {
                    let rank = member.rank();
                    let normalizer = Normalizer::new(member);
                    counts
                        .iter()
                        .map(|count| normalizer.num_foregrounds(count[rank]))
                        .try_collect()
                })
            })
            .collect();

        for handle in handles {
            let divisors = handle.join().map_err(|_| format_err!("thread panicked"))??;
            assert_eq!(divisors, expects);
        }
        Ok(())
    }

    #[test]
    fn breakdown_average() -> Result<()> {
        let handles: Vec<_> = LocalGroup::new(2)?
            .into_iter()
            .map(|member| {
                thread::spawn(move || -> Result<LossBreakdown> {
                    let scale = member.rank() as f64 + 1.0;
                    let breakdown = LossBreakdown {
                        objectness: scale,
                        classification: 2.0 * scale,
                        bbox: 3.0 * scale,
                        total: 4.0 * scale,
                    };
                    Normalizer::new(member).reduce_breakdown(&breakdown)
                })
            })
            .collect();

        for handle in handles {
            let breakdown = handle.join().map_err(|_| format_err!("thread panicked"))??;
            assert_eq!(
                breakdown,
                LossBreakdown {
                    objectness: 1.5,
                    classification: 3.0,
                    bbox: 4.5,
                    total: 6.0,
                }
            );
        }
        Ok(())
    }
}
