use super::Collective;
use crate::{common::*, error::CollectiveError};
use flume::{Receiver, Sender};

#[derive(Debug)]
struct Message {
    seq: u64,
    values: Vec<f64>,
}

/// One member of an in-process collective group.
///
/// Each member is meant to run on its own thread. Members exchange values
/// over one channel per ordered pair of ranks, so messages from a peer are
/// received in the order they are sent.
#[derive(Debug)]
pub struct LocalGroup {
    rank: usize,
    world_size: usize,
    /// Senders indexed by peer rank, `None` at the own rank.
    senders: Vec<Option<Sender<Message>>>,
    /// Receivers indexed by peer rank, `None` at the own rank.
    receivers: Vec<Option<Receiver<Message>>>,
    /// The sequence number of the next reduction.
    seq: Mutex<u64>,
}

impl LocalGroup {
    /// Create a group of `world_size` members ordered by rank.
    pub fn new(world_size: usize) -> Result<Vec<Self>> {
        ensure!(world_size > 0, "world_size must be positive");

        let mut senders: Vec<Vec<Option<Sender<Message>>>> = (0..world_size)
            .map(|_| (0..world_size).map(|_| None).collect())
            .collect();
        let mut receivers: Vec<Vec<Option<Receiver<Message>>>> = (0..world_size)
            .map(|_| (0..world_size).map(|_| None).collect())
            .collect();

        (0..world_size)
            .cartesian_product(0..world_size)
            .filter(|(from, to)| from != to)
            .for_each(|(from, to)| {
                let (tx, rx) = flume::unbounded();
                senders[from][to] = Some(tx);
                receivers[to][from] = Some(rx);
            });

        let members = izip!(0.., senders, receivers)
            .map(|(rank, senders, receivers)| Self {
                rank,
                world_size,
                senders,
                receivers,
                seq: Mutex::new(0),
            })
            .collect();
        Ok(members)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The number of reductions done so far.
    pub fn step(&self) -> u64 {
        *self.seq.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Continue counting reductions from `step`, for example after restoring
    /// a checkpoint. All members must resume at the same step.
    pub fn resume_at(&self, step: u64) {
        *self.seq.lock().unwrap_or_else(|err| err.into_inner()) = step;
    }
}

impl Collective for LocalGroup {
    fn is_active(&self) -> bool {
        true
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn all_reduce_sum(&self, values: &mut [f64]) -> Result<(), CollectiveError> {
        let rank = self.rank;
        let mut seq = self.seq.lock().unwrap_or_else(|err| err.into_inner());
        let expected = *seq;

        // broadcast local values
        for tx in self.senders.iter().flatten() {
            let message = Message {
                seq: expected,
                values: values.to_vec(),
            };
            tx.send(message)
                .map_err(|_| CollectiveError::Disconnected { rank })?;
        }

        // gather values of every rank
        let gathered: Vec<Vec<f64>> = self
            .receivers
            .iter()
            .enumerate()
            .map(|(peer, rx)| {
                let rx = match rx {
                    Some(rx) => rx,
                    None => return Ok(values.to_vec()),
                };
                let Message {
                    seq: found,
                    values: peer_values,
                } = rx
                    .recv()
                    .map_err(|_| CollectiveError::Disconnected { rank })?;

                if found != expected {
                    return Err(CollectiveError::Desync {
                        rank,
                        peer,
                        expected,
                        found,
                    });
                }
                if peer_values.len() != values.len() {
                    return Err(CollectiveError::LengthMismatch {
                        rank,
                        peer,
                        expected: values.len(),
                        found: peer_values.len(),
                    });
                }
                Ok(peer_values)
            })
            .try_collect()?;

        // sum in rank order so that all ranks get identical results
        values.iter_mut().enumerate().for_each(|(index, value)| {
            *value = gathered.iter().map(|peer_values| peer_values[index]).sum();
        });

        *seq += 1;
        Ok(())
    }
}
