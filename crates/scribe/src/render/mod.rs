//! GPU rendering: screen-space text on top of an existing color target.
//!
//! Convention:
//! - Pen positions arrive in logical pixels, top-left origin, +Y down.
//! - The vertex stage applies an orthographic projection with a
//!   bottom-left origin; each glyph quad is flipped during layout.
//!
//! The renderer owns its pipeline and buffers; the caller owns the
//! encoder and target view and submits the frame.

mod color;
mod ctx;
mod text;

pub use color::Color;
pub use ctx::{RenderCtx, RenderTarget};
pub use text::TextRenderer;
