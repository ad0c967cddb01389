//! Safe bounding box types and functions.

mod common;

pub mod into_xyxy;
pub use into_xyxy::*;

pub use rect::*;
pub mod rect;

pub use xyxy::*;
pub mod xyxy;

pub use element::*;
pub mod element;

pub mod prelude {
    pub use crate::rect::{Rect, RectFloat, RectNum};
}
