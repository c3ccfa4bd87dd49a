use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::coords::{Mat4, Vec2, Viewport};
use crate::text::GlyphAtlas;

use super::color::Color;
use super::ctx::{RenderCtx, RenderTarget};

const VERTS_PER_GLYPH: usize = 6;
const INITIAL_GLYPH_CAPACITY: usize = 64;

// ── renderer ──────────────────────────────────────────────────────────────

/// Screen-space text renderer.
///
/// Lays out a string into glyph quads on the CPU, writes them into a
/// grow-only vertex buffer, and issues one draw call per visible glyph
/// with that glyph's texture bound. Construct one per device/target-format
/// pair; the same renderer serves any number of atlases.
///
/// The renderer tracks the drawable size through [`set_viewport`]; call it
/// from the embedder's resize handler before the next draw.
///
/// [`set_viewport`]: TextRenderer::set_viewport
pub struct TextRenderer {
    pipeline: wgpu::RenderPipeline,
    glyph_layout: wgpu::BindGroupLayout,
    uniform_buf: wgpu::Buffer,
    uniform_bind: wgpu::BindGroup,
    vertex_buf: wgpu::Buffer,
    vertex_capacity: usize, // in vertices
    glyph_binds: HashMap<(u64, u8), wgpu::BindGroup>,
    viewport: Viewport,
    projection: Mat4,
}

impl TextRenderer {
    /// Builds the text pipeline for the given color target format.
    pub fn new(device: &wgpu::Device, target_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("scribe text shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/text.wgsl").into()),
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scribe text uniform bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(uniform_min_binding_size()),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let glyph_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scribe glyph bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scribe text pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &glyph_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("scribe text pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[GlyphVertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(premul_alpha_blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("scribe glyph sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let uniform_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scribe text uniforms"),
            size: std::mem::size_of::<TextUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scribe text uniform bind group"),
            layout: &uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let vertex_capacity = INITIAL_GLYPH_CAPACITY * VERTS_PER_GLYPH;
        let vertex_buf = create_vertex_buffer(device, vertex_capacity);

        Self {
            pipeline,
            glyph_layout,
            uniform_buf,
            uniform_bind,
            vertex_buf,
            vertex_capacity,
            glyph_binds: HashMap::new(),
            viewport: Viewport::default(),
            projection: Mat4::identity(),
        }
    }

    /// Stores the drawable size and rebuilds the orthographic projection.
    ///
    /// Glyph y positions are flipped against this height, so a stale
    /// viewport draws text at the wrong place after a resize.
    pub fn set_viewport(&mut self, size: Vec2) {
        let w = size.x.max(1.0);
        let h = size.y.max(1.0);
        self.projection = Mat4::orthographic(0.0, w, 0.0, h);
        self.viewport = Viewport::new(w, h);
    }

    /// Current drawable size.
    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Draws `text` at `pos`, measured in logical pixels down from the
    /// target's top-left corner.
    ///
    /// `'\n'` starts a new line at the original x. Every visible glyph is
    /// one draw call bound to that glyph's texture; glyphs with an empty
    /// bitmap only advance the pen, and characters outside the atlas range
    /// are skipped entirely. The call records GPU work on the target's
    /// encoder and returns; nothing waits for completion.
    pub fn render_text(
        &mut self,
        ctx: &RenderCtx<'_>,
        target: &mut RenderTarget<'_>,
        text: &str,
        pos: Vec2,
        scale: f32,
        color: Color,
        atlas: &GlyphAtlas,
    ) {
        let batch = build_batch(atlas, text, pos, scale, self.viewport.height);
        if batch.skipped > 0 {
            log::debug!(
                "render_text: skipped {} characters outside the atlas range",
                batch.skipped
            );
        }
        if batch.spans.is_empty() {
            return;
        }

        let uniforms = TextUniforms {
            projection: self.projection.to_cols(),
            color: [color.r, color.g, color.b],
            _pad: 0.0,
        };

        // Uploads go through encoder-ordered copies, not queue writes: a
        // queue write issued while recording lands before every pass in
        // the submission, so a second render_text on the same encoder
        // would clobber this call's data before its pass executes.
        self.ensure_vertex_capacity(ctx.device, batch.vertices.len());
        stage_copy(
            ctx.device,
            target.encoder,
            &self.uniform_buf,
            bytemuck::bytes_of(&uniforms),
        );
        stage_copy(
            ctx.device,
            target.encoder,
            &self.vertex_buf,
            bytemuck::cast_slice(&batch.vertices),
        );

        for span in &batch.spans {
            self.ensure_glyph_bind(ctx.device, atlas, span.code);
        }

        let mut rpass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scribe text pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.uniform_bind, &[]);
        rpass.set_vertex_buffer(0, self.vertex_buf.slice(..));

        for span in &batch.spans {
            let Some(bind) = self.glyph_binds.get(&(atlas.id(), span.code)) else {
                continue;
            };
            rpass.set_bind_group(1, bind, &[]);
            rpass.draw(
                span.first_vertex..span.first_vertex + VERTS_PER_GLYPH as u32,
                0..1,
            );
        }
    }

    // ── resource helpers ──────────────────────────────────────────────────

    fn ensure_vertex_capacity(&mut self, device: &wgpu::Device, required: usize) {
        if required <= self.vertex_capacity {
            return;
        }
        let new_cap = required
            .next_power_of_two()
            .max(INITIAL_GLYPH_CAPACITY * VERTS_PER_GLYPH);
        self.vertex_buf = create_vertex_buffer(device, new_cap);
        self.vertex_capacity = new_cap;
    }

    fn ensure_glyph_bind(&mut self, device: &wgpu::Device, atlas: &GlyphAtlas, code: u8) {
        let key = (atlas.id(), code);
        if self.glyph_binds.contains_key(&key) {
            return;
        }
        let Some(glyph) = atlas.glyph(code as char) else { return };
        let Some(view) = glyph.view() else { return };

        let bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scribe glyph bind group"),
            layout: &self.glyph_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            }],
        });
        self.glyph_binds.insert(key, bind);
    }
}

fn create_vertex_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("scribe text vertices"),
        size: (capacity * std::mem::size_of::<GlyphVertex>()) as u64,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Records a copy of `bytes` into `dst` at the encoder's current position.
fn stage_copy(
    device: &wgpu::Device,
    encoder: &mut wgpu::CommandEncoder,
    dst: &wgpu::Buffer,
    bytes: &[u8],
) {
    let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("scribe staging"),
        contents: bytes,
        usage: wgpu::BufferUsages::COPY_SRC,
    });
    encoder.copy_buffer_to_buffer(&staging, 0, dst, 0, bytes.len() as u64);
}

fn premul_alpha_blend() -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    }
}

/// `TextUniforms` is a mat4 plus a padded vec3, so its size is non-zero.
fn uniform_min_binding_size() -> std::num::NonZeroU64 {
    std::num::NonZeroU64::new(std::mem::size_of::<TextUniforms>() as u64)
        .expect("TextUniforms has non-zero size by construction")
}

// ── layout ────────────────────────────────────────────────────────────────

/// One pending draw: six vertices starting at `first_vertex`, textured by
/// glyph `code`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct DrawSpan {
    code: u8,
    first_vertex: u32,
}

struct GlyphBatch {
    vertices: Vec<GlyphVertex>,
    spans: Vec<DrawSpan>,
    skipped: usize,
}

/// Lays out `text` into glyph quads.
///
/// Pen coordinates are top-down; emitted vertex positions are bottom-up,
/// flipped against `viewport_h` per glyph. Mirrors [`GlyphAtlas::measure`]:
/// same advance and bearing formulas, same skip policy.
fn build_batch(
    atlas: &GlyphAtlas,
    text: &str,
    pos: Vec2,
    scale: f32,
    viewport_h: f32,
) -> GlyphBatch {
    let mut vertices = Vec::new();
    let mut spans = Vec::new();
    let mut skipped = 0usize;

    // Drop the first baseline below the block origin so the top line is
    // visible at the nominal position.
    let mut pen = Vec2::new(pos.x, pos.y + atlas.baseline_offset() * scale);
    let line_start_x = pen.x;
    let line_height = atlas.line_height() * scale;

    for ch in text.chars() {
        if ch == '\n' {
            pen.y += line_height;
            pen.x = line_start_x;
            continue;
        }
        let Some(glyph) = atlas.glyph(ch) else {
            skipped += 1;
            continue;
        };

        if glyph.is_drawable() {
            let x = pen.x + glyph.bearing.x as f32 * scale;
            let y = viewport_h - pen.y - (glyph.size.y - glyph.bearing.y) as f32 * scale;
            let quad = glyph.size.as_vec2() * scale;

            let first_vertex = vertices.len() as u32;
            vertices.extend_from_slice(&quad_vertices(x, y, quad.x, quad.y));
            spans.push(DrawSpan {
                code: ch as u8,
                first_vertex,
            });
        }

        pen.x += glyph.advance_px() * scale;
    }

    GlyphBatch {
        vertices,
        spans,
        skipped,
    }
}

/// Two counter-clockwise triangles covering the quad, with the texture's
/// v axis flipped relative to position: the quad's top edge maps to v = 0.
fn quad_vertices(x: f32, y: f32, w: f32, h: f32) -> [GlyphVertex; 6] {
    [
        GlyphVertex::new(x, y + h, 0.0, 0.0),
        GlyphVertex::new(x, y, 0.0, 1.0),
        GlyphVertex::new(x + w, y, 1.0, 1.0),
        GlyphVertex::new(x, y + h, 0.0, 0.0),
        GlyphVertex::new(x + w, y, 1.0, 1.0),
        GlyphVertex::new(x + w, y + h, 1.0, 0.0),
    ]
}

// ── GPU types ─────────────────────────────────────────────────────────────

/// One vertex of a glyph quad, packed as a single vec4 attribute at
/// shader location 0: xy = screen-space position, zw = texture coordinate.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
struct GlyphVertex {
    pos: [f32; 2],
    uv: [f32; 2],
}

impl GlyphVertex {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x4];

    const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self {
            pos: [x, y],
            uv: [u, v],
        }
    }

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<GlyphVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// Uniform block: projection + solid color, padded to std140 layout.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct TextUniforms {
    projection: [[f32; 4]; 4],
    color: [f32; 3],
    _pad: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::IVec2;

    // Uniform latin metrics: 24×32 bitmap, bearing (2, 30), advance 28 px,
    // rasterized at the default 48 px height.
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

    fn quad_bounds(batch: &GlyphBatch, span: usize) -> (f32, f32, f32, f32) {
        let first = batch.spans[span].first_vertex as usize;
        let verts = &batch.vertices[first..first + VERTS_PER_GLYPH];
        let mut min_x = f32::MAX;
        let mut max_x = f32::MIN;
        let mut min_y = f32::MAX;
        let mut max_y = f32::MIN;
        for v in verts {
            min_x = min_x.min(v.pos[0]);
            max_x = max_x.max(v.pos[0]);
            min_y = min_y.min(v.pos[1]);
            max_y = max_y.max(v.pos[1]);
        }
        (min_x, max_x, min_y, max_y)
    }

    // ── quad placement ────────────────────────────────────────────────────

    #[test]
    fn single_glyph_quad_follows_the_layout_formulas() {
        let atlas = test_atlas();
        let batch = build_batch(&atlas, "A", Vec2::zero(), 1.0, 600.0);

        assert_eq!(batch.spans.len(), 1);
        assert_eq!(batch.vertices.len(), VERTS_PER_GLYPH);
        assert_eq!(batch.spans[0].code, b'A');

        // pen.y = 36 (baseline offset); x = bearing.x; quad bottom =
        // 600 - 36 - (32 - 30) = 562.
        let (min_x, max_x, min_y, max_y) = quad_bounds(&batch, 0);
        assert_eq!(min_x, 2.0);
        assert_eq!(max_x, 26.0);
        assert_eq!(min_y, 562.0);
        assert_eq!(max_y, 594.0);
    }

    #[test]
    fn scale_stretches_quads_and_offsets() {
        let atlas = test_atlas();
        let batch = build_batch(&atlas, "A", Vec2::zero(), 2.0, 600.0);

        let (min_x, max_x, min_y, max_y) = quad_bounds(&batch, 0);
        assert_eq!(min_x, 4.0); // bearing.x * 2
        assert_eq!(max_x - min_x, 48.0); // 24 * 2
        assert_eq!(max_y - min_y, 64.0); // 32 * 2
        // pen.y = 72; bottom = 600 - 72 - 4 = 524.
        assert_eq!(min_y, 524.0);
    }

    #[test]
    fn line_break_drops_one_line_height_and_resets_x() {
        let atlas = test_atlas();
        let batch = build_batch(&atlas, "A\nB", Vec2::zero(), 1.0, 600.0);

        assert_eq!(batch.spans.len(), 2);
        let (a_min_x, _, a_min_y, _) = quad_bounds(&batch, 0);
        let (b_min_x, _, b_min_y, _) = quad_bounds(&batch, 1);

        assert_eq!(a_min_x, b_min_x);
        assert_eq!(a_min_y - b_min_y, atlas.line_height());
    }

    #[test]
    fn viewport_height_change_shifts_quads_by_the_delta() {
        let atlas = test_atlas();
        let before = build_batch(&atlas, "A", Vec2::zero(), 1.0, 600.0);
        let after = build_batch(&atlas, "A", Vec2::zero(), 1.0, 728.0);

        let (_, _, y1, _) = quad_bounds(&before, 0);
        let (_, _, y2, _) = quad_bounds(&after, 0);
        assert_eq!(y2 - y1, 128.0);
    }

    // ── pen advancement ───────────────────────────────────────────────────

    #[test]
    fn whitespace_advances_the_pen_without_a_quad() {
        let atlas = test_atlas();
        let batch = build_batch(&atlas, "A B", Vec2::zero(), 1.0, 600.0);

        assert_eq!(batch.spans.len(), 2);
        let (b_min_x, _, _, _) = quad_bounds(&batch, 1);
        // A advance (28) + space advance (16) + B bearing (2).
        assert_eq!(b_min_x, 46.0);
    }

    #[test]
    fn characters_outside_the_atlas_are_skipped_without_advance() {
        let atlas = test_atlas();
        let batch = build_batch(&atlas, "AéB", Vec2::zero(), 1.0, 600.0);

        assert_eq!(batch.spans.len(), 2);
        assert_eq!(batch.skipped, 1);
        let (b_min_x, _, _, _) = quad_bounds(&batch, 1);
        // Same as "AB": A advance (28) + B bearing (2).
        assert_eq!(b_min_x, 30.0);
    }

    #[test]
    fn empty_text_emits_nothing() {
        let atlas = test_atlas();
        let batch = build_batch(&atlas, "", Vec2::zero(), 1.0, 600.0);
        assert!(batch.spans.is_empty());
        assert!(batch.vertices.is_empty());
    }

    // ── measure agreement ─────────────────────────────────────────────────

    #[test]
    fn pen_advance_between_quads_matches_measure() {
        let atlas = test_atlas();
        let batch = build_batch(&atlas, "AB", Vec2::zero(), 1.0, 600.0);

        let (a_min_x, _, _, _) = quad_bounds(&batch, 0);
        let (b_min_x, _, _, _) = quad_bounds(&batch, 1);
        // Both glyphs share a bearing, so the pen delta is the advance sum.
        assert_eq!(b_min_x - a_min_x, atlas.measure("A", 1.0).x);
    }

    #[test]
    fn quad_height_matches_measured_height_for_one_line() {
        let atlas = test_atlas();
        let batch = build_batch(&atlas, "AB", Vec2::zero(), 1.0, 600.0);

        let (_, _, min_y, max_y) = quad_bounds(&batch, 0);
        assert_eq!(max_y - min_y, atlas.measure("AB", 1.0).y);
    }

    // ── vertex format ─────────────────────────────────────────────────────

    #[test]
    fn quad_v_axis_is_flipped_against_position() {
        let quad = quad_vertices(10.0, 20.0, 24.0, 32.0);
        for v in &quad {
            if v.pos[1] == 52.0 {
                assert_eq!(v.uv[1], 0.0); // top of quad samples the bitmap top
            } else {
                assert_eq!(v.uv[1], 1.0);
            }
            if v.pos[0] == 10.0 {
                assert_eq!(v.uv[0], 0.0);
            } else {
                assert_eq!(v.uv[0], 1.0);
            }
        }
    }

    #[test]
    fn spans_are_six_vertices_apart() {
        let atlas = test_atlas();
        let batch = build_batch(&atlas, "ABC", Vec2::zero(), 1.0, 600.0);
        let firsts: Vec<u32> = batch.spans.iter().map(|s| s.first_vertex).collect();
        assert_eq!(firsts, vec![0, 6, 12]);
    }
}
