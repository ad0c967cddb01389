use super::Xyxy;
use crate::common::*;

/// The generic axis-aligned rectangle in corner form.
///
/// `x` grows to the right and `y` grows downwards, so `x1 <= x2` and
/// `y1 <= y2` hold for every valid rectangle.
pub trait Rect {
    type Type;

    fn x1(&self) -> Self::Type;
    fn y1(&self) -> Self::Type;
    fn x2(&self) -> Self::Type;
    fn y2(&self) -> Self::Type;
    fn cx(&self) -> Self::Type;
    fn cy(&self) -> Self::Type;
    fn w(&self) -> Self::Type;
    fn h(&self) -> Self::Type;

    fn try_from_xyxy(xyxy: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;

    fn try_from_cxcywh(cxcywh: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;
}

pub trait RectNum: Rect
where
    Self::Type: Num + PartialOrd,
{
    fn from_xyxy(xyxy: [Self::Type; 4]) -> Self
    where
        Self: Sized,
    {
        Self::try_from_xyxy(xyxy).unwrap()
    }

    fn from_cxcywh(cxcywh: [Self::Type; 4]) -> Self
    where
        Self: Sized,
    {
        Self::try_from_cxcywh(cxcywh).unwrap()
    }

    fn xyxy(&self) -> [Self::Type; 4] {
        [self.x1(), self.y1(), self.x2(), self.y2()]
    }

    fn cxcywh(&self) -> [Self::Type; 4] {
        [self.cx(), self.cy(), self.w(), self.h()]
    }

    fn to_xyxy(&self) -> Xyxy<Self::Type> {
        Xyxy {
            x1: self.x1(),
            y1: self.y1(),
            x2: self.x2(),
            y2: self.y2(),
        }
    }

    fn area(&self) -> <Self::Type as Mul<Self::Type>>::Output
    where
        Self::Type: Mul<Self::Type>,
    {
        self.w() * self.h()
    }
}

pub trait RectFloat: RectNum
where
    Self::Type: Float,
{
    /// Compute the smallest rectangle enclosing both boxes.
    fn closure_with<R>(&self, other: &R) -> Xyxy<Self::Type>
    where
        R: Rect<Type = Self::Type>,
    {
        let x1 = self.x1().min(other.x1());
        let y1 = self.y1().min(other.y1());
        let x2 = self.x2().max(other.x2());
        let y2 = self.y2().max(other.y2());
        Xyxy::from_xyxy([x1, y1, x2, y2])
    }

    fn intersect_with<R>(&self, other: &R) -> Option<Xyxy<Self::Type>>
    where
        R: Rect<Type = Self::Type>,
    {
        let x1 = self.x1().max(other.x1());
        let y1 = self.y1().max(other.y1());
        let x2 = self.x2().min(other.x2());
        let y2 = self.y2().min(other.y2());
        (x2 > x1 && y2 > y1).then(|| Xyxy::from_xyxy([x1, y1, x2, y2]))
    }

    fn intersection_area_with<R>(&self, other: &R) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        self.intersect_with(other)
            .map(|rect| rect.area())
            .unwrap_or_else(<Self::Type as Zero>::zero)
    }

    fn iou_with<R>(&self, other: &R, epsilon: Self::Type) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        let inter_area = self.intersection_area_with(other);
        let union_area = self.area() + other.area() - inter_area + epsilon;
        inter_area / union_area
    }

    /// Compute the generalized IoU.
    ///
    /// The IoU is penalized by the fraction of the enclosing box not covered
    /// by the union. The value lies in `(-1, 1]` for positive `epsilon`.
    fn giou_with<R>(&self, other: &R, epsilon: Self::Type) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        let inter_area = self.intersection_area_with(other);
        let union_area = self.area() + other.area() - inter_area + epsilon;
        let closure_area = self.closure_with(other).area() + epsilon;
        let iou = inter_area / union_area;
        iou - (closure_area - union_area) / closure_area
    }
}

impl<T> RectNum for T
where
    T: Rect,
    T::Type: Num + PartialOrd,
{
}

impl<T> RectFloat for T
where
    T: Rect,
    T::Type: Float,
{
}
