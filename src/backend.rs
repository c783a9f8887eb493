//! The GPU operations the scene core relies on.
//!
//! Meshes, shader programs and textures never touch wgpu directly. They talk to a
//! [`GpuBackend`] through opaque handles ([`ProgramId`], [`BufferId`],
//! [`TextureId`]) in the same immediate style a GL program would: bind a program,
//! bind a buffer, enable the attributes, upload uniforms, draw, disable.
//!
//! [`WgpuBackend`](crate::WgpuBackend) is the real implementation. Unit tests run
//! against a backend that only records the calls it receives.

use glam::Mat4;

use crate::light::{Light, MAX_LIGHTS};

/// Handle to a compiled shader program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) usize);

/// Handle to a GPU vertex buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub(crate) usize);

/// Handle to a 2D texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub(crate) usize);

/// Errors reported by a backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The shader sources failed to compile or link. `message` is the backend's
    /// own diagnostic text.
    #[error("shader program '{label}' failed to compile: {message}")]
    ShaderCompile { label: String, message: String },
    /// A handle that this backend never issued.
    #[error("unknown {kind} handle {index}")]
    UnknownHandle { kind: &'static str, index: usize },
    /// A draw was issued without a bound program or vertex buffer.
    #[error("draw issued without a bound {0}")]
    NothingBound(&'static str),
    /// A draw was issued while the attributes the program reads were disabled.
    #[error("draw issued with vertex attribute {0:?} disabled")]
    MissingAttributes(VertexAttribute),
}

/// Vertex inputs understood by the mesh shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    Position,
    Normal,
}

impl VertexAttribute {
    /// Shader location the attribute is bound to.
    pub fn location(self) -> u32 {
        match self {
            VertexAttribute::Position => 0,
            VertexAttribute::Normal => 1,
        }
    }
}

/// How one attribute is read from an interleaved `f32` buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeBinding {
    pub attribute: VertexAttribute,
    /// Number of `f32` components.
    pub components: u32,
    /// Distance between consecutive vertices, in floats.
    pub stride: u32,
    /// Offset of the attribute inside a vertex, in floats.
    pub offset: u32,
}

/// Per-draw shader inputs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawUniforms {
    pub projection: Mat4,
    pub model_view: Mat4,
    /// View-space light positions (w = 1) for the first `light_count` lights.
    pub light_positions: [[f32; 4]; MAX_LIGHTS],
    pub light_colors: [[f32; 4]; MAX_LIGHTS],
    pub light_count: u32,
}

impl DrawUniforms {
    pub fn new(projection: Mat4, model_view: Mat4, lights: &[Light]) -> Self {
        let mut light_positions = [[0.0; 4]; MAX_LIGHTS];
        let mut light_colors = [[0.0; 4]; MAX_LIGHTS];
        let count = lights.len().min(MAX_LIGHTS);
        for (i, light) in lights.iter().take(count).enumerate() {
            light_positions[i] = light.view_position().to_array();
            light_colors[i] = light.color.extend(1.0).to_array();
        }
        Self {
            projection,
            model_view,
            light_positions,
            light_colors,
            light_count: count as u32,
        }
    }
}

/// Immediate-mode GPU operations used by the scene core.
pub trait GpuBackend {
    /// Compiles and links a program from a vertex and a fragment source text.
    fn compile_program(
        &mut self,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramId, BackendError>;

    fn bind_program(&mut self, program: ProgramId);

    /// Uploads `data` into a new static vertex buffer.
    fn create_vertex_buffer(&mut self, label: &str, data: &[f32]) -> BufferId;

    fn bind_vertex_buffer(&mut self, buffer: BufferId);

    fn enable_attribute(&mut self, binding: AttributeBinding);

    fn disable_attribute(&mut self, attribute: VertexAttribute);

    fn set_uniforms(&mut self, uniforms: &DrawUniforms);

    /// Uploads tightly packed RGBA8 pixels into a new 2D texture.
    fn create_texture(&mut self, label: &str, rgba: &[u8], width: u32, height: u32) -> TextureId;

    /// Binds `texture` for sampling, or disables the sampling path with `None`.
    fn bind_texture(&mut self, texture: Option<TextureId>);

    /// Draws `count` vertices from the bound buffer as a triangle list.
    fn draw_triangles(&mut self, first: u32, count: u32) -> Result<(), BackendError>;
}
