use crate::{common::*, error::LossError};

/// Detached per-task loss values for logging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossBreakdown {
    pub objectness: f64,
    pub classification: f64,
    pub bbox: f64,
    /// The weighted combination of the task losses.
    pub total: f64,
}

impl LossBreakdown {
    pub const NAMES: [&'static str; 4] = ["objectness", "classification", "bbox", "total"];

    /// Flatten values in the order of [NAMES](Self::NAMES).
    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.objectness, self.classification, self.bbox, self.total]
    }

    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match *values {
            [objectness, classification, bbox, total] => Ok(Self {
                objectness,
                classification,
                bbox,
                total,
            }),
            _ => bail!(
                "expect {} values, but get {}",
                Self::NAMES.len(),
                values.len()
            ),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        Self::NAMES.iter().copied().zip(self.to_vec())
    }

    pub fn is_finite(&self) -> bool {
        self.iter().all(|(_, value)| value.is_finite())
    }

    pub fn ensure_finite(self) -> Result<Self, LossError> {
        if self.is_finite() {
            Ok(self)
        } else {
            Err(LossError::NonFinite { breakdown: self })
        }
    }
}

impl fmt::Display for LossBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .iter()
            .map(|(name, value)| format!("{}={:.6}", name, value))
            .join(" ");
        write!(f, "{}", text)
    }
}
