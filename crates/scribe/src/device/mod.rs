//! Headless GPU bootstrap.
//!
//! For embedders that do not bring their own wgpu device (tools, tests,
//! offscreen rendering). Applications with a window create the device
//! alongside their surface and hand the renderer a `RenderCtx` instead.

mod gpu;

pub use gpu::{GpuContext, GpuInit};
