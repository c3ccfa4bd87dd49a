use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::coords::{IVec2, Vec2};

/// Number of glyph slots in an atlas (ASCII codes 0..=127).
pub const GLYPH_SLOTS: usize = 128;

/// Rasterization height the overlay layout constants were tuned for.
///
/// Purely a convenience for callers; nothing in the crate assumes it.
pub const DEFAULT_PIXEL_HEIGHT: u32 = 48;

static NEXT_ATLAS_ID: AtomicU64 = AtomicU64::new(0);

// ── errors ────────────────────────────────────────────────────────────────

/// Error returned by [`GlyphAtlas::load`] and [`GlyphAtlas::from_bytes`].
///
/// Both variants are fatal to construction: an atlas is never handed out
/// in a partially-usable state. Per-glyph rasterization problems are not
/// errors; those slots stay as zero placeholders.
#[derive(Debug)]
pub enum AtlasError {
    /// The font file could not be read.
    Io(std::io::Error),
    /// The font data was rejected by the rasterizer.
    Parse(String),
}

impl fmt::Display for AtlasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtlasError::Io(e) => write!(f, "failed to read font file: {e}"),
            AtlasError::Parse(msg) => write!(f, "failed to parse font: {msg}"),
        }
    }
}

impl std::error::Error for AtlasError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AtlasError::Io(e) => Some(e),
            AtlasError::Parse(_) => None,
        }
    }
}

impl From<std::io::Error> for AtlasError {
    fn from(e: std::io::Error) -> Self {
        AtlasError::Io(e)
    }
}

// ── glyph ─────────────────────────────────────────────────────────────────

/// One rasterized character slot.
///
/// A slot the font does not map keeps zeroed metrics and no texture;
/// callers must not assume every ASCII code is drawable. Whitespace
/// glyphs carry an advance but no texture either.
#[derive(Debug, Default)]
pub struct Glyph {
    /// Sole reference to the glyph texture; the view keeps it alive for
    /// the atlas's lifetime and releases it on drop.
    view: Option<wgpu::TextureView>,
    /// Bitmap dimensions in pixels.
    pub size: IVec2,
    /// Offset from the pen origin to the bitmap: `x` is the left side
    /// bearing, `y` the distance from the baseline up to the bitmap top.
    pub bearing: IVec2,
    /// Horizontal pen advance in 26.6 fixed point (1/64 pixel).
    pub advance: i32,
}

impl Glyph {
    /// Advance converted from 26.6 fixed point to whole pixels.
    #[inline]
    pub fn advance_px(&self) -> f32 {
        (self.advance >> 6) as f32
    }

    /// True when there is a bitmap to draw. Placeholder and whitespace
    /// slots have none and only move the pen.
    #[inline]
    pub fn is_drawable(&self) -> bool {
        self.size.x > 0 && self.size.y > 0
    }

    pub(crate) fn view(&self) -> Option<&wgpu::TextureView> {
        self.view.as_ref()
    }
}

// ── atlas ─────────────────────────────────────────────────────────────────

/// All 128 ASCII glyphs of one font at one pixel size.
///
/// Construction rasterizes every slot eagerly and uploads one `R8Unorm`
/// texture per non-empty bitmap; the font face is dropped once the slots
/// are filled. Dropping the atlas releases every glyph texture.
pub struct GlyphAtlas {
    id: u64,
    glyphs: Box<[Glyph; GLYPH_SLOTS]>,
    pixel_height: u32,
}

impl GlyphAtlas {
    /// Reads a TrueType/OpenType font file and rasterizes the ASCII range
    /// at `pixel_height`.
    pub fn load(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &Path,
        pixel_height: u32,
    ) -> Result<Self, AtlasError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(device, queue, &bytes, pixel_height)
    }

    /// Rasterizes the ASCII range from in-memory font data.
    pub fn from_bytes(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bytes: &[u8],
        pixel_height: u32,
    ) -> Result<Self, AtlasError> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| AtlasError::Parse(e.to_string()))?;

        let mut glyphs: Box<[Glyph; GLYPH_SLOTS]> =
            Box::new(std::array::from_fn(|_| Glyph::default()));

        for (code, slot) in glyphs.iter_mut().enumerate() {
            let ch = code as u8 as char;

            // Glyph index 0 is the font's .notdef slot; a code that maps
            // there has no real glyph. Leave the zero placeholder.
            if font.lookup_glyph_index(ch) == 0 {
                log::debug!("font does not map {ch:?} (code {code}); slot left empty");
                continue;
            }

            let (metrics, bitmap) = font.rasterize(ch, pixel_height as f32);

            slot.size = IVec2::new(metrics.width as i32, metrics.height as i32);
            slot.bearing = IVec2::new(metrics.xmin, metrics.ymin + metrics.height as i32);
            slot.advance = (metrics.advance_width * 64.0).round() as i32;

            // Whitespace rasterizes to an empty bitmap; wgpu cannot create
            // a zero-sized texture, so such slots carry metrics only.
            if metrics.width == 0 || metrics.height == 0 {
                continue;
            }

            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("scribe glyph"),
                size: wgpu::Extent3d {
                    width: metrics.width as u32,
                    height: metrics.height as u32,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::R8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });

            // Coverage rows are tightly packed: bytes_per_row is exactly
            // the bitmap width.
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &bitmap,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(metrics.width as u32),
                    rows_per_image: Some(metrics.height as u32),
                },
                wgpu::Extent3d {
                    width: metrics.width as u32,
                    height: metrics.height as u32,
                    depth_or_array_layers: 1,
                },
            );

            slot.view = Some(texture.create_view(&wgpu::TextureViewDescriptor::default()));
        }

        Ok(Self {
            id: NEXT_ATLAS_ID.fetch_add(1, Ordering::Relaxed),
            glyphs,
            pixel_height,
        })
    }

    /// Process-unique identity, used to key renderer-side caches.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pixel height the atlas was rasterized at.
    #[inline]
    pub fn pixel_height(&self) -> u32 {
        self.pixel_height
    }

    /// Unscaled distance between successive baselines.
    #[inline]
    pub fn line_height(&self) -> f32 {
        self.pixel_height as f32
    }

    /// Unscaled offset from a text block's top edge down to the first
    /// baseline: three quarters of the pixel height (36 at the default 48).
    #[inline]
    pub fn baseline_offset(&self) -> f32 {
        self.pixel_height as f32 * 0.75
    }

    /// Looks up the glyph slot for `ch`.
    ///
    /// Returns `None` outside the rasterized ASCII range; layout and
    /// measurement treat such characters as absent (no quad, no advance).
    #[inline]
    pub fn glyph(&self, ch: char) -> Option<&Glyph> {
        self.glyphs.get(ch as usize)
    }

    /// Tight bounding box of `text` laid out at `scale`, without drawing.
    ///
    /// Uses the same per-character advance and bearing formulas as the
    /// draw path, so the result can reserve space for a later
    /// `render_text` of the same string.
    ///
    /// Width is the widest line's summed advances. Height is the bearing
    /// extent of the glyphs plus one line height per embedded `'\n'`.
    #[must_use]
    pub fn measure(&self, text: &str, scale: f32) -> Vec2 {
        let mut width = 0.0f32;
        let mut line_width = 0.0f32;
        let mut extra_lines = 0u32;
        let mut max_top = 0.0f32;
        let mut min_bottom = 0.0f32;

        for ch in text.chars() {
            if ch == '\n' {
                width = width.max(line_width);
                line_width = 0.0;
                extra_lines += 1;
                continue;
            }
            let Some(glyph) = self.glyph(ch) else { continue };

            line_width += glyph.advance_px() * scale;

            let top = glyph.bearing.y as f32 * scale;
            let bottom = top - glyph.size.y as f32 * scale;
            max_top = max_top.max(top);
            min_bottom = min_bottom.min(bottom);
        }
        width = width.max(line_width);

        let height = extra_lines as f32 * self.line_height() * scale + (max_top - min_bottom);
        Vec2::new(width, height)
    }

    /// Builds an atlas from caller-supplied metrics, with no GPU resources.
    #[cfg(test)]
    pub(crate) fn synthetic(pixel_height: u32, fill: impl Fn(usize, &mut Glyph)) -> Self {
        let mut glyphs: Box<[Glyph; GLYPH_SLOTS]> =
            Box::new(std::array::from_fn(|_| Glyph::default()));
        for (code, slot) in glyphs.iter_mut().enumerate() {
            fill(code, slot);
        }
        Self {
            id: NEXT_ATLAS_ID.fetch_add(1, Ordering::Relaxed),
            glyphs,
            pixel_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Uniform latin metrics: 24×32 bitmap, bearing (2, 30), advance 28 px.
    fn test_atlas() -> GlyphAtlas {
        GlyphAtlas::synthetic(48, |code, g| match code as u8 as char {
            'A'..='Z' | 'a'..='z' | '0'..='9' => {
                g.size = IVec2::new(24, 32);
                g.bearing = IVec2::new(2, 30);
                g.advance = 28 << 6;
            }
            ' ' => {
                g.advance = 16 << 6;
            }
            _ => {}
        })
    }

    // ── slots ─────────────────────────────────────────────────────────────

    #[test]
    fn every_ascii_code_has_a_slot() {
        let atlas = test_atlas();
        for code in 0..GLYPH_SLOTS {
            assert!(atlas.glyph(code as u8 as char).is_some(), "code {code}");
        }
    }

    #[test]
    fn non_ascii_has_no_slot() {
        let atlas = test_atlas();
        assert!(atlas.glyph('é').is_none());
        assert!(atlas.glyph('\u{80}').is_none());
    }

    #[test]
    fn unmapped_slot_is_zero_placeholder() {
        let atlas = test_atlas();
        let glyph = atlas.glyph('\u{1}').unwrap();
        assert_eq!(glyph.size, IVec2::zero());
        assert_eq!(glyph.bearing, IVec2::zero());
        assert_eq!(glyph.advance, 0);
        assert!(!glyph.is_drawable());
    }

    #[test]
    fn whitespace_advances_without_bitmap() {
        let atlas = test_atlas();
        let space = atlas.glyph(' ').unwrap();
        assert!(!space.is_drawable());
        assert_eq!(space.advance_px(), 16.0);
    }

    // ── advance conversion ────────────────────────────────────────────────

    #[test]
    fn advance_px_shifts_out_the_fraction() {
        let glyph = Glyph { advance: 28 << 6, ..Glyph::default() };
        assert_eq!(glyph.advance_px(), 28.0);

        // Sub-pixel remainder truncates, as the fixed-point convention says.
        let glyph = Glyph { advance: (28 << 6) + 63, ..Glyph::default() };
        assert_eq!(glyph.advance_px(), 28.0);
    }

    // ── layout constants ──────────────────────────────────────────────────

    #[test]
    fn layout_constants_scale_with_pixel_height() {
        let atlas = test_atlas();
        assert_eq!(atlas.line_height(), 48.0);
        assert_eq!(atlas.baseline_offset(), 36.0);

        let small = GlyphAtlas::synthetic(24, |_, _| {});
        assert_eq!(small.line_height(), 24.0);
        assert_eq!(small.baseline_offset(), 18.0);
    }

    // ── measure ───────────────────────────────────────────────────────────

    #[test]
    fn measure_empty_is_zero() {
        let atlas = test_atlas();
        assert_eq!(atlas.measure("", 1.0), Vec2::zero());
        assert_eq!(atlas.measure("", 2.5), Vec2::zero());
    }

    #[test]
    fn measure_single_line() {
        let atlas = test_atlas();
        let m = atlas.measure("AB", 1.0);
        assert_eq!(m.x, 56.0); // two advances of 28
        assert_eq!(m.y, 32.0); // bearing top 30, bottom -2
    }

    #[test]
    fn measure_width_is_linear_in_scale() {
        let atlas = test_atlas();
        let base = atlas.measure("Hello world", 1.0);
        let doubled = atlas.measure("Hello world", 2.0);
        assert_relative_eq!(doubled.x, 2.0 * base.x, max_relative = 1e-6);
    }

    #[test]
    fn measure_height_grows_with_line_breaks() {
        let atlas = test_atlas();
        let one = atlas.measure("A", 1.0).y;
        let two = atlas.measure("A\nA", 1.0).y;
        let three = atlas.measure("A\nA\nA", 1.0).y;
        assert!(two > one);
        assert!(three > two);
        assert_eq!(two - one, atlas.line_height());
        assert_eq!(three - two, atlas.line_height());
    }

    #[test]
    fn measure_width_is_widest_line() {
        let atlas = test_atlas();
        let m = atlas.measure("AAAA\nAA", 1.0);
        assert_eq!(m.x, 4.0 * 28.0);
    }

    #[test]
    fn measure_skips_characters_outside_the_atlas() {
        let atlas = test_atlas();
        assert_eq!(atlas.measure("AéB", 1.0).x, atlas.measure("AB", 1.0).x);
    }
}
