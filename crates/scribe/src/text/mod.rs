//! Font atlas: rasterized ASCII glyphs and their metrics.
//!
//! The atlas is built once during initialization and injected into the
//! renderer on every call; there is no process-wide default font.

mod atlas;

pub use atlas::{AtlasError, DEFAULT_PIXEL_HEIGHT, GLYPH_SLOTS, Glyph, GlyphAtlas};
