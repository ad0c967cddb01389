mod xyxy;

pub use xyxy::*;
