//! # stackview
//!
//! **A small scene engine built around an explicit model-view matrix stack.**
//!
//! Cameras own their view and projection and load them into a [`RenderContext`];
//! entities compose their [`Transform`] onto it for the length of a draw;
//! [`Mesh`]es carry polygon faces whose flat normals are computed with Newell's
//! method and flattened into one interleaved position + normal buffer.
//!
//! ## Quick Start
//!
//! ```
//! use stackview::{Camera, RenderContext, Transform, Vec3};
//!
//! let mut ctx = RenderContext::new();
//! let camera = Camera::new(640.0 / 480.0);
//! camera.activate(&mut ctx);
//!
//! let player = Transform::from_position(Vec3::new(0.0, 0.5, -7.0));
//! {
//!     let mut scope = ctx.scope();
//!     scope.multiply(player.matrix());
//!     // ... draw the player's mesh under `scope.model_view()` ...
//! }
//! assert_eq!(ctx.depth(), 0);
//! assert!(ctx.finish_frame().is_ok());
//! ```
//!
//! To open a window and play the bundled level, call [`run`] with an [`AppConfig`].

mod app;
mod backend;
mod camera;
mod driver;
mod ecs;
mod gpu;
mod input;
mod level;
mod light;
mod mesh;
mod render_context;
mod shader;
mod texture;
mod transform;
mod wgpu_backend;

pub use app::{AppConfig, AppError, FRAGMENT_SHADER_FILE, VERTEX_SHADER_FILE, run};
pub use backend::{
    AttributeBinding, BackendError, BufferId, DrawUniforms, GpuBackend, ProgramId, TextureId,
    VertexAttribute,
};
pub use camera::{
    CHASE_OFFSET, CHASE_PITCH_DEGREES, Camera, CameraId, FOV_Y_DEGREES, Z_FAR, Z_NEAR,
};
pub use driver::{DEFAULT_MAX_CATCH_UP, DEFAULT_TICK_RATE_HZ, FixedTicker};
pub use ecs::{MeshId, MeshRegistry, Player, RenderMesh};
pub use gpu::{GpuContext, GpuError};
pub use input::Input;
pub use level::{ActiveCamera, Level, LevelError};
pub use light::{Light, MAX_LIGHTS};
pub use mesh::{
    COMPILED_STRIDE, CompiledBuffer, Face, INTERLEAVED_LAYOUT, Mesh, MeshError, Shading,
    VertexNormalPair,
};
pub use render_context::{MatrixScope, RenderContext, RenderError};
pub use shader::{MESH_FRAGMENT_SOURCE, MESH_VERTEX_SOURCE, ShaderError, ShaderProgram};
pub use texture::{PendingTexture, TextureData, TextureError};
pub use transform::Transform;
pub use wgpu_backend::{PresentError, WgpuBackend};

// Re-export glam math types for convenience
pub use glam::{Mat4, Vec3, Vec4};

// Re-export commonly used winit types for convenience
pub use winit::keyboard::KeyCode;

pub use hecs::{Entity, World};
