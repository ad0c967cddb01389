//! Ground truth labels of the probe input.

use crate::common::*;
use yolo_af::{GridSize, GroundTruth};

/// The labels file, one entry per image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelsFile {
    pub images: Vec<ImageLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageLabel {
    pub image_h: usize,
    pub image_w: usize,
    pub ground_truth: Vec<GroundTruth>,
}

impl LabelsFile {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        let labels: Self = json5::from_str(&text)?;
        ensure!(!labels.images.is_empty(), "the labels file has no images");
        Ok(labels)
    }

    /// The shared grid of all images.
    pub fn grid(&self, stride: usize) -> Result<GridSize> {
        let (image_h, image_w) = self
            .images
            .iter()
            .map(|image| (image.image_h, image.image_w))
            .dedup()
            .exactly_one()
            .map_err(|_| format_err!("all images must have the same size"))?;
        GridSize::from_image_size(image_h, image_w, stride)
    }

    /// The images assigned to `rank`, taken round robin.
    pub fn shard(&self, rank: usize, world_size: usize) -> Vec<&ImageLabel> {
        self.images.iter().skip(rank).step_by(world_size).collect()
    }
}
