use super::Rect;
use crate::common::*;

/// Bounding box in corner format `(x1, y1, x2, y2)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Xyxy<T> {
    pub(crate) x1: T,
    pub(crate) y1: T,
    pub(crate) x2: T,
    pub(crate) y2: T,
}

impl<T> Xyxy<T> {
    pub fn try_cast<V>(self) -> Option<Xyxy<V>>
    where
        T: ToPrimitive,
        V: NumCast,
    {
        Some(Xyxy {
            x1: V::from(self.x1)?,
            y1: V::from(self.y1)?,
            x2: V::from(self.x2)?,
            y2: V::from(self.y2)?,
        })
    }

    pub fn cast<V>(self) -> Xyxy<V>
    where
        T: ToPrimitive,
        V: NumCast,
    {
        self.try_cast().unwrap()
    }
}

impl<T> Rect for Xyxy<T>
where
    T: Copy + Num + PartialOrd,
{
    type Type = T;

    fn x1(&self) -> Self::Type {
        self.x1
    }

    fn y1(&self) -> Self::Type {
        self.y1
    }

    fn x2(&self) -> Self::Type {
        self.x2
    }

    fn y2(&self) -> Self::Type {
        self.y2
    }

    fn cx(&self) -> Self::Type {
        let two = T::one() + T::one();
        self.x1 + self.w() / two
    }

    fn cy(&self) -> Self::Type {
        let two = T::one() + T::one();
        self.y1 + self.h() / two
    }

    fn w(&self) -> Self::Type {
        self.x2 - self.x1
    }

    fn h(&self) -> Self::Type {
        self.y2 - self.y1
    }

    fn try_from_xyxy(xyxy: [Self::Type; 4]) -> Result<Self> {
        let [x1, y1, x2, y2] = xyxy;
        ensure!(x2 >= x1 && y2 >= y1, "x2 >= x1 and y2 >= y1 must hold");
        Ok(Self { x1, y1, x2, y2 })
    }

    fn try_from_cxcywh(cxcywh: [Self::Type; 4]) -> Result<Self> {
        let [cx, cy, w, h] = cxcywh;
        let zero = T::zero();
        ensure!(w >= zero && h >= zero, "w and h must be non-negative");

        let two = T::one() + T::one();
        let x1 = cx - w / two;
        let x2 = cx + w / two;
        let y1 = cy - h / two;
        let y2 = cy + h / two;

        Ok(Self { x1, y1, x2, y2 })
    }
}
