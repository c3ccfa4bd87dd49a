//! Glyph-atlas text rendering for wgpu overlays.
//!
//! Two pieces: [`text::GlyphAtlas`] rasterizes an ASCII glyph set from a
//! font file into per-glyph GPU textures, and [`render::TextRenderer`]
//! lays out strings and draws them over an existing color target.
//!
//! The embedder owns the window, surface and frame loop; this crate only
//! borrows a device/queue and an encoder per call.

pub mod coords;
pub mod device;
pub mod logging;
pub mod render;
pub mod text;
