//! Probe program configuration format.

use crate::common::*;
use yolo_af::LossConfig;

/// The main probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub loss: LossConfig,
    pub distributed: DistributedConfig,
    pub input: InputConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        let config = json5::from_str(&text)?;
        Ok(config)
    }
}

/// The simulated process group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedConfig {
    /// The number of ranks, each running on its own thread.
    pub world_size: NonZeroUsize,
}

/// Labels and synthetic predictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// The JSON5 file of per-image ground truth.
    pub labels_file: PathBuf,
    /// The number of images per rank and step.
    pub batch_size: NonZeroUsize,
    pub steps: NonZeroUsize,
    /// The seed of synthetic network outputs.
    pub seed: u64,
    /// The logit range of synthetic outputs, `[-logit_scale, logit_scale]`.
    pub logit_scale: R64,
}
