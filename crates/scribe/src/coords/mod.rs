//! Geometry types shared by the atlas and renderer.
//!
//! Canonical CPU space:
//! - Logical pixels
//! - Origin top-left
//! - +X right, +Y down
//!
//! The renderer converts to clip space through an orthographic projection
//! with a bottom-left origin, flipping each glyph quad during layout.

mod ivec2;
mod mat4;
mod vec2;
mod viewport;

pub use ivec2::IVec2;
pub use mat4::Mat4;
pub use vec2::Vec2;
pub use viewport::Viewport;
