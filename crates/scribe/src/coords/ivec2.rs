use crate::coords::Vec2;

/// 2D vector with integer components.
///
/// Glyph bitmap sizes and bearings are whole pixels straight from the
/// rasterizer; they only become `f32` when a scale factor is applied.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct IVec2 {
    pub x: i32,
    pub y: i32,
}

impl IVec2 {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub const fn zero() -> Self {
        Self { x: 0, y: 0 }
    }

    #[inline]
    pub fn as_vec2(self) -> Vec2 {
        Vec2::new(self.x as f32, self.y as f32)
    }
}
