//! Local transforms for scene entities.
//!
//! A [`Transform`] is a 4×4 local matrix plus the position and Euler angles that
//! were accumulated into it. Motion is applied on the **right** of the matrix, so
//! every step happens in the entity's own, already rotated frame:
//!
//! ```
//! use stackview::{Mat4, Transform, Vec3};
//!
//! let mut transform = Transform::new();
//! transform.yaw(std::f32::consts::FRAC_PI_2).translate_z(-1.0);
//!
//! // After a quarter turn, "forward" (-Z) points along -X in the parent frame.
//! let moved = transform.matrix().transform_point3(Vec3::ZERO);
//! assert!(moved.abs_diff_eq(Vec3::new(-1.0, 0.0, 0.0), 1e-6));
//! ```

use glam::{Mat4, Vec3};

use crate::backend::GpuBackend;
use crate::mesh::{Mesh, Shading};
use crate::render_context::{RenderContext, RenderError};

/// Local transform component.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    matrix: Mat4,
    position: Vec3,
    pitch: f32,
    yaw: f32,
    roll: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            matrix: Mat4::IDENTITY,
            position: Vec3::ZERO,
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
        }
    }
}

impl Transform {
    /// Identity transform at the origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transform translated to `position`.
    pub fn from_position(position: Vec3) -> Self {
        let mut transform = Self::new();
        transform.translate(position);
        transform
    }

    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// Sum of all translations applied, in the local frames they were applied in.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn pitch_angle(&self) -> f32 {
        self.pitch
    }

    pub fn yaw_angle(&self) -> f32 {
        self.yaw
    }

    pub fn roll_angle(&self) -> f32 {
        self.roll
    }

    pub fn translate(&mut self, offset: Vec3) -> &mut Self {
        self.matrix *= Mat4::from_translation(offset);
        self.position += offset;
        self
    }

    pub fn translate_x(&mut self, dx: f32) -> &mut Self {
        self.translate(Vec3::new(dx, 0.0, 0.0))
    }

    pub fn translate_y(&mut self, dy: f32) -> &mut Self {
        self.translate(Vec3::new(0.0, dy, 0.0))
    }

    pub fn translate_z(&mut self, dz: f32) -> &mut Self {
        self.translate(Vec3::new(0.0, 0.0, dz))
    }

    pub fn pitch(&mut self, angle: f32) -> &mut Self {
        self.matrix *= Mat4::from_rotation_x(angle);
        self.pitch += angle;
        self
    }

    pub fn yaw(&mut self, angle: f32) -> &mut Self {
        self.matrix *= Mat4::from_rotation_y(angle);
        self.yaw += angle;
        self
    }

    pub fn roll(&mut self, angle: f32) -> &mut Self {
        self.matrix *= Mat4::from_rotation_z(angle);
        self.roll += angle;
        self
    }

    /// Yaws around the entity's unpitched vertical axis.
    ///
    /// Expressed as three local rotations: undo the accumulated pitch, yaw, redo
    /// the pitch.
    pub fn poleyaw(&mut self, angle: f32) -> &mut Self {
        self.matrix *= Mat4::from_rotation_x(-self.pitch)
            * Mat4::from_rotation_y(angle)
            * Mat4::from_rotation_x(self.pitch);
        self.yaw += angle;
        self
    }

    /// Draws `mesh` with this transform composed onto the context.
    ///
    /// The context is pushed before and restored after, on every exit path, so the
    /// transform never leaks into sibling draws.
    pub fn render(
        &self,
        ctx: &mut RenderContext,
        backend: &mut dyn GpuBackend,
        mesh: Option<&Mesh>,
        shading: &Shading,
    ) -> Result<(), RenderError> {
        let mut scope = ctx.scope();
        scope.multiply(self.matrix);
        if let Some(mesh) = mesh {
            mesh.render(&scope, backend, shading)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::RecordingBackend;

    #[test]
    fn motion_is_applied_on_the_right() {
        let mut transform = Transform::new();
        let offset = Vec3::new(0.0, 0.5, -7.0);
        transform.translate(offset).yaw(0.3).pitch(-0.2);

        let expected = Mat4::from_translation(offset)
            * Mat4::from_rotation_y(0.3)
            * Mat4::from_rotation_x(-0.2);
        assert!(transform.matrix().abs_diff_eq(expected, 1e-6));
        assert_eq!(transform.position(), offset);
        assert!((transform.yaw_angle() - 0.3).abs() < 1e-6);
        assert!((transform.pitch_angle() + 0.2).abs() < 1e-6);
    }

    #[test]
    fn axis_translations_accumulate() {
        let mut transform = Transform::new();
        transform.translate_x(1.0).translate_y(2.0).translate_z(3.0);
        assert_eq!(transform.position(), Vec3::new(1.0, 2.0, 3.0));
        assert!(
            transform
                .matrix()
                .abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)), 1e-6)
        );
    }

    #[test]
    fn poleyaw_is_three_local_rotations() {
        let mut transform = Transform::new();
        transform.pitch(0.4);
        let before = transform.matrix();
        transform.poleyaw(0.9);

        let expected = before
            * Mat4::from_rotation_x(-0.4)
            * Mat4::from_rotation_y(0.9)
            * Mat4::from_rotation_x(0.4);
        assert!(transform.matrix().abs_diff_eq(expected, 1e-6));
        // With only a pitch applied, pole yaw equals yawing before pitching.
        let yaw_then_pitch = Mat4::from_rotation_y(0.9) * Mat4::from_rotation_x(0.4);
        assert!(transform.matrix().abs_diff_eq(yaw_then_pitch, 1e-5));
    }

    #[test]
    fn poleyaw_inverse_restores_matrix() {
        let mut transform = Transform::from_position(Vec3::new(2.0, 0.0, -4.0));
        transform.pitch(-0.7);
        let before = transform.matrix();
        transform.poleyaw(0.5).poleyaw(-0.5);
        assert!(transform.matrix().abs_diff_eq(before, 1e-5));
    }

    #[test]
    fn render_composes_and_restores_context() {
        let mut backend = RecordingBackend::new();
        let program = backend.compile_program("mesh", "", "").unwrap();
        let mut cube = Mesh::cube();
        cube.compute_normals()
            .unwrap()
            .compile(&mut backend, Some(program))
            .unwrap();

        let mut ctx = RenderContext::new();
        ctx.translate(Vec3::new(0.0, 0.0, -2.0));
        let parent = ctx.model_view();

        let transform = Transform::from_position(Vec3::new(0.0, 0.5, -7.0));
        let shading = Shading {
            lights: &[],
            texture: None,
        };
        transform
            .render(&mut ctx, &mut backend, Some(&cube), &shading)
            .unwrap();

        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.model_view(), parent);
        let uniforms = backend.uniforms();
        assert_eq!(uniforms.len(), 1);
        assert_eq!(uniforms[0].model_view, parent * transform.matrix());
    }

    #[test]
    fn render_without_mesh_still_balances() {
        let mut backend = RecordingBackend::new();
        let mut ctx = RenderContext::new();
        let shading = Shading {
            lights: &[],
            texture: None,
        };
        Transform::new()
            .render(&mut ctx, &mut backend, None, &shading)
            .unwrap();
        assert_eq!(ctx.depth(), 0);
        assert!(backend.calls.is_empty());
    }
}
