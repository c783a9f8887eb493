use glam::{Mat4, Vec3, Vec4};

/// Maximum number of lights uploaded with each draw.
pub const MAX_LIGHTS: usize = 4;

/// A point light owned by a level.
///
/// `position` is authored in world space. The view-space and clip-space positions
/// are derived by [`Camera::commit`](crate::Camera::commit) once per frame, before
/// any mesh is drawn, since the shader lights in view space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub color: Vec3,
    view_position: Vec4,
    clip_position: Vec4,
}

impl Light {
    pub fn new(position: Vec3, color: Vec3) -> Self {
        let world = position.extend(1.0);
        Self {
            position,
            color,
            view_position: world,
            clip_position: world,
        }
    }

    /// Position in the view space of the last committed camera.
    pub fn view_position(&self) -> Vec4 {
        self.view_position
    }

    /// Position in the clip space of the last committed camera.
    pub fn clip_position(&self) -> Vec4 {
        self.clip_position
    }

    pub(crate) fn update_derived(&mut self, view: Mat4, view_projection: Mat4) {
        let world = self.position.extend(1.0);
        self.view_position = view * world;
        self.clip_position = view_projection * world;
    }
}
