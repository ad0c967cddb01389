use crate::common::*;

/// A labeled ground truth box in absolute pixel corner coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub bbox: Xyxy<f64>,
    pub class: usize,
}

impl GroundTruth {
    pub fn new(xyxy: [f64; 4], class: usize) -> Result<Self> {
        let bbox = Xyxy::try_from(bbox::Xyxy_ {
            x1: xyxy[0],
            y1: xyxy[1],
            x2: xyxy[2],
            y2: xyxy[3],
        })?;
        Ok(Self { bbox, class })
    }
}
