//! Cameras that own their view and projection matrices.
//!
//! A [`Camera`] keeps its own matrices and pushes them into the
//! [`RenderContext`] when it is activated and every time it commits. Exactly one
//! camera is active per context: [`Camera::is_active`] compares the context's view
//! owner against the camera's identity, never matrix values, so two cameras with
//! identical views are still told apart.
//!
//! # Conventions
//!
//! Camera motion is applied on the **left** of the view matrix, i.e. relative to
//! the world and before the existing view. Entity transforms use the opposite,
//! object-local convention (see [`Transform`]).
//!
//! ```
//! use stackview::{Camera, RenderContext};
//!
//! let mut ctx = RenderContext::new();
//! let mut level_camera = Camera::new(640.0 / 480.0);
//! let mut chase_camera = Camera::new(640.0 / 480.0);
//!
//! level_camera.activate(&mut ctx);
//! assert!(level_camera.is_active(&ctx));
//!
//! chase_camera.activate(&mut ctx);
//! assert!(!level_camera.is_active(&ctx));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Vec3};

use crate::light::Light;
use crate::render_context::RenderContext;
use crate::transform::Transform;

/// Vertical field of view, in degrees.
pub const FOV_Y_DEGREES: f32 = 45.0;
/// Near clipping plane.
pub const Z_NEAR: f32 = 0.1;
/// Far clipping plane.
pub const Z_FAR: f32 = 100.0;
/// Translation applied after the inverse target transform when locked on.
pub const CHASE_OFFSET: Vec3 = Vec3::new(0.0, -5.0, -5.0);
/// Downward tilt of the chase view, in degrees.
pub const CHASE_PITCH_DEGREES: f32 = 45.0;

/// Identity of a camera, used to decide which camera a context belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CameraId(u64);

impl CameraId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A perspective camera with accumulated orientation and an optional chase target.
///
/// Not `Clone`: a copy would share this camera's identity.
#[derive(Debug)]
pub struct Camera {
    id: CameraId,
    view: Mat4,
    projection: Mat4,
    model_view_projection: Mat4,
    pitch: f32,
    yaw: f32,
    roll: f32,
    position: Vec3,
    lock_target: Option<hecs::Entity>,
}

impl Camera {
    /// Creates an inactive camera with an identity view.
    ///
    /// `aspect` is the viewport width divided by its height.
    pub fn new(aspect: f32) -> Self {
        let projection = perspective(aspect);
        Self {
            id: CameraId::next(),
            view: Mat4::IDENTITY,
            projection,
            model_view_projection: projection,
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
            position: Vec3::ZERO,
            lock_target: None,
        }
    }

    /// Creates an inactive camera that follows `target`.
    pub fn locked_on(aspect: f32, target: hecs::Entity) -> Self {
        let mut camera = Self::new(aspect);
        camera.lock_on(target);
        camera
    }

    pub fn id(&self) -> CameraId {
        self.id
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    /// `projection × view`, as of the last [`Camera::commit`].
    pub fn model_view_projection(&self) -> Mat4 {
        self.model_view_projection
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

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn lock_target(&self) -> Option<hecs::Entity> {
        self.lock_target
    }

    /// Rebuilds the projection for a new viewport aspect ratio.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.projection = perspective(aspect);
    }

    /// Makes this camera the owner of the context's view and projection.
    ///
    /// Clears the context's matrix stack.
    pub fn activate(&self, ctx: &mut RenderContext) {
        ctx.reset_with_matrix(self.view, self.id);
        ctx.set_projection(self.projection);
    }

    /// Whether the context's view currently belongs to this camera.
    pub fn is_active(&self, ctx: &RenderContext) -> bool {
        ctx.view_owner() == Some(self.id)
    }

    pub fn translate(&mut self, offset: Vec3) -> &mut Self {
        self.view = Mat4::from_translation(offset) * self.view;
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
        self.view = Mat4::from_rotation_x(angle) * self.view;
        self.pitch += angle;
        self
    }

    pub fn yaw(&mut self, angle: f32) -> &mut Self {
        self.view = Mat4::from_rotation_y(angle) * self.view;
        self.yaw += angle;
        self
    }

    pub fn roll(&mut self, angle: f32) -> &mut Self {
        self.view = Mat4::from_rotation_z(angle) * self.view;
        self.roll += angle;
        self
    }

    /// Yaws around the world's vertical pole instead of the camera's tilted axis.
    ///
    /// The accumulated pitch is undone, the yaw applied, and the pitch redone, so
    /// the camera orbits the same "up" regardless of how far it is tilted.
    pub fn poleyaw(&mut self, angle: f32) -> &mut Self {
        self.view = Mat4::from_rotation_x(self.pitch)
            * Mat4::from_rotation_y(angle)
            * Mat4::from_rotation_x(-self.pitch)
            * self.view;
        self.yaw += angle;
        self
    }

    /// Follows `target`'s [`Transform`] from the next commit on.
    pub fn lock_on(&mut self, target: hecs::Entity) {
        self.lock_target = Some(target);
    }

    pub fn lock_off(&mut self) {
        self.lock_target = None;
    }

    /// Finalises the camera for this frame.
    ///
    /// When locked on, the view becomes a chase view of the target: the inverse of
    /// the target's transform, offset by [`CHASE_OFFSET`] and tilted by
    /// [`CHASE_PITCH_DEGREES`]. Then `projection × view` and every light's
    /// view-space and clip-space positions are recomputed, and if this camera is
    /// active its matrices are loaded into `ctx`.
    ///
    /// Call once per frame, after all camera motion and before drawing any mesh.
    pub fn commit(&mut self, ctx: &mut RenderContext, world: &hecs::World, lights: &mut [Light]) {
        if let Some(target) = self.lock_target {
            match world.get::<&Transform>(target) {
                Ok(transform) => self.chase(transform.matrix()),
                Err(err) => {
                    tracing::warn!(?target, %err, "lock target is gone, unlocking camera");
                    self.lock_target = None;
                }
            }
        }

        self.model_view_projection = self.projection * self.view;
        for light in lights.iter_mut() {
            light.update_derived(self.view, self.model_view_projection);
        }

        if self.is_active(ctx) {
            ctx.load_view(self.view, self.id);
            ctx.set_projection(self.projection);
        }
    }

    fn chase(&mut self, target: Mat4) {
        let pitch = CHASE_PITCH_DEGREES.to_radians();
        self.view =
            Mat4::from_rotation_x(pitch) * Mat4::from_translation(CHASE_OFFSET) * target.inverse();
        self.pitch = pitch;
        self.yaw = 0.0;
        self.roll = 0.0;
        self.position = CHASE_OFFSET;
    }
}

fn perspective(aspect: f32) -> Mat4 {
    Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR)
}
