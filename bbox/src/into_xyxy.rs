use crate::{common::*, element::Element, rect::Rect, Xyxy};

/// Unchecked corner-form box, convertible to [Xyxy] after validation.
///
/// This is also the serialized form of [Xyxy].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Xyxy_<T> {
    pub x1: T,
    pub y1: T,
    pub x2: T,
    pub y2: T,
}

impl<T> TryFrom<Xyxy_<T>> for Xyxy<T>
where
    T: Element,
{
    type Error = anyhow::Error;

    fn try_from(from: Xyxy_<T>) -> Result<Self, Self::Error> {
        Self::try_from(&from)
    }
}

impl<T> TryFrom<&Xyxy_<T>> for Xyxy<T>
where
    T: Element,
{
    type Error = anyhow::Error;

    fn try_from(from: &Xyxy_<T>) -> Result<Self, Self::Error> {
        let Xyxy_ { x1, y1, x2, y2 } = *from;
        ensure!(
            x1.is_finite() && y1.is_finite() && x2.is_finite() && y2.is_finite(),
            "box corners must be finite"
        );
        Self::try_from_xyxy([x1, y1, x2, y2])
    }
}

impl<'de, T> Deserialize<'de> for Xyxy<T>
where
    T: Element + Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let unchecked = Xyxy_::<T>::deserialize(deserializer)?;
        Self::try_from(unchecked).map_err(serde::de::Error::custom)
    }
}
