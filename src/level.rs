//! The playable scene: a floor grid, a player cube, a light and two cameras.
//!
//! The level camera is free-flying and driven with WASD and the arrow keys. `C`
//! switches to a chase camera locked on the player, at which point the same keys
//! steer the player instead.

use glam::Vec3;
use winit::keyboard::KeyCode;

use crate::backend::{GpuBackend, TextureId};
use crate::camera::Camera;
use crate::ecs::{MeshRegistry, Player, RenderMesh};
use crate::input::Input;
use crate::light::Light;
use crate::mesh::{Mesh, MeshError, Shading};
use crate::render_context::{RenderContext, RenderError};
use crate::shader::ShaderProgram;
use crate::texture::PendingTexture;
use crate::transform::Transform;

/// Where the player cube starts.
pub const PLAYER_START: Vec3 = Vec3::new(0.0, 0.5, -7.0);
/// Where the floor grid is placed.
pub const FLOOR_POSITION: Vec3 = Vec3::new(-1.5, 0.0, -7.0);
/// The level's single point light.
pub const LIGHT_POSITION: Vec3 = Vec3::new(0.0, 4.0, -4.0);

/// Distance moved per tick while a movement key is held.
pub const MOVE_STEP: f32 = 0.1;
/// Level camera rotation per tick, in radians.
pub const CAMERA_TURN_STEP: f32 = 0.07;
/// Player rotation per tick, in radians.
pub const PLAYER_TURN_STEP: f32 = 0.01;

/// Which of the level's cameras owns the view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveCamera {
    Level,
    Chase,
}

#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error("failed to build level mesh: {0}")]
    Mesh(#[from] MeshError),
}

/// Held-key axes for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Steering {
    /// +1 for W, -1 for S.
    forward: f32,
    /// +1 for A, -1 for D.
    left: f32,
    /// +1 for Right, -1 for Left.
    turn: f32,
    /// +1 for Up, -1 for Down.
    tilt: f32,
}

impl Steering {
    fn read(input: &Input) -> Self {
        let axis = |positive: KeyCode, negative: KeyCode| {
            let mut value = 0.0;
            if input.is_down(positive) {
                value += 1.0;
            }
            if input.is_down(negative) {
                value -= 1.0;
            }
            value
        };
        Self {
            forward: axis(KeyCode::KeyW, KeyCode::KeyS),
            left: axis(KeyCode::KeyA, KeyCode::KeyD),
            turn: axis(KeyCode::ArrowRight, KeyCode::ArrowLeft),
            tilt: axis(KeyCode::ArrowUp, KeyCode::ArrowDown),
        }
    }
}

pub struct Level {
    world: hecs::World,
    meshes: MeshRegistry,
    player: hecs::Entity,
    floor: hecs::Entity,
    level_camera: Camera,
    chase_camera: Camera,
    active: ActiveCamera,
    lights: Vec<Light>,
    texture: Option<PendingTexture>,
}

impl Level {
    /// Builds and uploads the level's meshes and activates the level camera.
    pub fn new(
        backend: &mut dyn GpuBackend,
        ctx: &mut RenderContext,
        program: ShaderProgram,
        aspect: f32,
        texture: Option<PendingTexture>,
    ) -> Result<Self, LevelError> {
        let mut meshes = MeshRegistry::new();

        let mut cube = Mesh::cube();
        cube.compute_normals()?.compile(backend, Some(program.id()))?;
        let cube = meshes.add(cube);

        let mut grid = Mesh::floor_grid();
        grid.compute_normals()?.compile(backend, Some(program.id()))?;
        let grid = meshes.add(grid);

        let mut world = hecs::World::new();
        let floor = world.spawn((Transform::from_position(FLOOR_POSITION), RenderMesh::new(grid)));
        let player = world.spawn((
            Transform::from_position(PLAYER_START),
            RenderMesh::textured(cube),
            Player,
        ));

        let level_camera = Camera::new(aspect);
        let chase_camera = Camera::new(aspect);
        level_camera.activate(ctx);

        tracing::info!(meshes = meshes.len(), entities = world.len(), "level ready");

        Ok(Self {
            world,
            meshes,
            player,
            floor,
            level_camera,
            chase_camera,
            active: ActiveCamera::Level,
            lights: vec![Light::new(LIGHT_POSITION, Vec3::ONE)],
            texture,
        })
    }

    pub fn world(&self) -> &hecs::World {
        &self.world
    }

    pub fn player(&self) -> hecs::Entity {
        self.player
    }

    pub fn floor(&self) -> hecs::Entity {
        self.floor
    }

    pub fn active_camera(&self) -> ActiveCamera {
        self.active
    }

    pub fn level_camera(&self) -> &Camera {
        &self.level_camera
    }

    pub fn chase_camera(&self) -> &Camera {
        &self.chase_camera
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Switches between the free level camera and the chase camera.
    pub fn toggle_camera(&mut self, ctx: &mut RenderContext) {
        self.active = match self.active {
            ActiveCamera::Level => {
                self.chase_camera.lock_on(self.player);
                self.chase_camera.activate(ctx);
                ActiveCamera::Chase
            }
            ActiveCamera::Chase => {
                self.chase_camera.lock_off();
                self.level_camera.activate(ctx);
                ActiveCamera::Level
            }
        };
        tracing::debug!(active = ?self.active, "camera toggled");
    }

    /// Applies one tick of keyboard input.
    pub fn update(&mut self, input: &Input, ctx: &mut RenderContext) {
        if input.was_just_pressed(KeyCode::KeyC) {
            self.toggle_camera(ctx);
        }

        let steering = Steering::read(input);
        let active = self.active;
        let level_camera = &mut self.level_camera;

        for (_, (transform, _)) in self.world.query_mut::<(&mut Transform, &Player)>() {
            match active {
                ActiveCamera::Level => {
                    transform
                        .yaw(steering.turn * PLAYER_TURN_STEP)
                        .pitch(steering.tilt * PLAYER_TURN_STEP);
                }
                ActiveCamera::Chase => {
                    transform
                        .translate(Vec3::new(
                            -steering.left * MOVE_STEP,
                            0.0,
                            -steering.forward * MOVE_STEP,
                        ))
                        .poleyaw(steering.turn * PLAYER_TURN_STEP)
                        .pitch(steering.tilt * PLAYER_TURN_STEP);
                }
            }
        }

        if active == ActiveCamera::Level {
            level_camera
                .translate(Vec3::new(
                    steering.left * MOVE_STEP,
                    0.0,
                    steering.forward * MOVE_STEP,
                ))
                .yaw(steering.turn * CAMERA_TURN_STEP)
                .pitch(steering.tilt * CAMERA_TURN_STEP);
        }
    }

    /// Rebuilds both projections for a new viewport and reloads the active camera.
    pub fn resize(&mut self, aspect: f32, ctx: &mut RenderContext) {
        self.level_camera.set_aspect(aspect);
        self.chase_camera.set_aspect(aspect);
        match self.active {
            ActiveCamera::Level => self.level_camera.activate(ctx),
            ActiveCamera::Chase => self.chase_camera.activate(ctx),
        }
    }

    /// Commits the active camera and draws every entity with a mesh.
    pub fn render(
        &mut self,
        ctx: &mut RenderContext,
        backend: &mut dyn GpuBackend,
    ) -> Result<(), RenderError> {
        ctx.begin_frame();
        let texture = self.poll_texture(backend);

        let camera = match self.active {
            ActiveCamera::Level => &mut self.level_camera,
            ActiveCamera::Chase => &mut self.chase_camera,
        };
        camera.commit(ctx, &self.world, &mut self.lights);
        if camera.lock_target().is_none() && self.active == ActiveCamera::Chase {
            // The player is gone; fall back to the free camera.
            self.active = ActiveCamera::Level;
            self.level_camera.activate(ctx);
            self.level_camera.commit(ctx, &self.world, &mut self.lights);
        }

        for (_, (transform, render_mesh)) in self
            .world
            .query::<(&Transform, &RenderMesh)>()
            .iter()
        {
            let shading = Shading {
                lights: &self.lights,
                texture: if render_mesh.textured { texture } else { None },
            };
            transform.render(ctx, backend, self.meshes.get(render_mesh.mesh), &shading)?;
        }

        ctx.finish_frame()
    }

    fn poll_texture(&mut self, backend: &mut dyn GpuBackend) -> Option<TextureId> {
        self.texture.as_mut().and_then(|texture| texture.poll(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{Call, RecordingBackend};
    use glam::Mat4;

    const ASPECT: f32 = 640.0 / 480.0;

    fn level() -> (Level, RenderContext, RecordingBackend) {
        let mut backend = RecordingBackend::new();
        let mut ctx = RenderContext::new();
        let program = ShaderProgram::builtin_mesh(&mut backend).unwrap();
        let level = Level::new(&mut backend, &mut ctx, program, ASPECT, None).unwrap();
        backend.clear();
        (level, ctx, backend)
    }

    fn player_transform(level: &Level) -> Transform {
        *level.world().get::<&Transform>(level.player()).unwrap()
    }

    fn hold(input: &mut Input, keys: &[KeyCode]) {
        for &key in keys {
            input.on_key_pressed(key);
        }
        input.update();
    }

    #[test]
    fn starts_on_the_level_camera() {
        let (level, ctx, _) = level();
        assert_eq!(level.active_camera(), ActiveCamera::Level);
        assert!(level.level_camera().is_active(&ctx));
        assert!(!level.chase_camera().is_active(&ctx));
        assert_eq!(player_transform(&level).position(), PLAYER_START);
    }

    #[test]
    fn toggle_moves_activation_and_lock() {
        let (mut level, mut ctx, _) = level();

        level.toggle_camera(&mut ctx);
        assert!(level.chase_camera().is_active(&ctx));
        assert!(!level.level_camera().is_active(&ctx));
        assert_eq!(level.chase_camera().lock_target(), Some(level.player()));

        level.toggle_camera(&mut ctx);
        assert!(level.level_camera().is_active(&ctx));
        assert!(!level.chase_camera().is_active(&ctx));
        assert_eq!(level.chase_camera().lock_target(), None);
    }

    #[test]
    fn c_key_toggles_once_per_press() {
        let (mut level, mut ctx, _) = level();
        let mut input = Input::new();

        hold(&mut input, &[KeyCode::KeyC]);
        level.update(&input, &mut ctx);
        assert_eq!(level.active_camera(), ActiveCamera::Chase);

        // Still held: no second toggle.
        input.update();
        level.update(&input, &mut ctx);
        assert_eq!(level.active_camera(), ActiveCamera::Chase);
    }

    #[test]
    fn keys_fly_the_level_camera() {
        let (mut level, mut ctx, _) = level();
        let mut input = Input::new();
        hold(&mut input, &[KeyCode::KeyW, KeyCode::KeyA]);

        level.update(&input, &mut ctx);

        let expected = Mat4::from_translation(Vec3::new(MOVE_STEP, 0.0, MOVE_STEP));
        assert!(level.level_camera().view().abs_diff_eq(expected, 1e-6));
        assert_eq!(player_transform(&level).position(), PLAYER_START);
    }

    #[test]
    fn arrows_turn_camera_and_player_together() {
        let (mut level, mut ctx, _) = level();
        let mut input = Input::new();
        hold(&mut input, &[KeyCode::ArrowLeft, KeyCode::ArrowUp]);

        level.update(&input, &mut ctx);

        assert!((level.level_camera().yaw_angle() + CAMERA_TURN_STEP).abs() < 1e-6);
        assert!((level.level_camera().pitch_angle() - CAMERA_TURN_STEP).abs() < 1e-6);
        let player = player_transform(&level);
        assert!((player.yaw_angle() + PLAYER_TURN_STEP).abs() < 1e-6);
        assert!((player.pitch_angle() - PLAYER_TURN_STEP).abs() < 1e-6);
    }

    #[test]
    fn chase_mode_steers_the_player() {
        let (mut level, mut ctx, _) = level();
        level.toggle_camera(&mut ctx);
        let camera_view = level.level_camera().view();

        let mut input = Input::new();
        hold(&mut input, &[KeyCode::KeyW]);
        level.update(&input, &mut ctx);

        let moved = player_transform(&level).position();
        assert!(moved.abs_diff_eq(PLAYER_START + Vec3::new(0.0, 0.0, -MOVE_STEP), 1e-6));
        assert_eq!(level.level_camera().view(), camera_view);
    }

    #[test]
    fn render_draws_every_mesh_entity_balanced() {
        let (mut level, mut ctx, mut backend) = level();
        level.render(&mut ctx, &mut backend).unwrap();

        assert_eq!(backend.draws(), 2);
        assert_eq!(ctx.depth(), 0);
        for uniforms in backend.uniforms() {
            assert_eq!(uniforms.light_count, 1);
        }
    }

    #[test]
    fn chase_render_uses_the_player_view() {
        let (mut level, mut ctx, mut backend) = level();
        level.toggle_camera(&mut ctx);
        level.render(&mut ctx, &mut backend).unwrap();

        let player = player_transform(&level).matrix();
        let eye = level.chase_camera().view() * player;
        let origin = eye.transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(0.0, 0.0, -(50f32).sqrt()), 1e-4));
        assert_eq!(ctx.model_view(), level.chase_camera().view());
    }

    #[test]
    fn despawned_player_falls_back_to_level_camera() {
        let (mut level, mut ctx, mut backend) = level();
        level.toggle_camera(&mut ctx);
        level.world.despawn(level.player).unwrap();

        level.render(&mut ctx, &mut backend).unwrap();
        assert_eq!(level.active_camera(), ActiveCamera::Level);
        assert!(level.level_camera().is_active(&ctx));
        assert_eq!(backend.draws(), 1);
    }

    #[test]
    fn texture_is_bound_only_for_textured_meshes() {
        let (mut level, mut ctx, mut backend) = level();
        level.texture = Some(PendingTexture::from_data(
            "white",
            crate::texture::TextureData {
                rgba: vec![255; 4],
                width: 1,
                height: 1,
            },
        ));
        level.render(&mut ctx, &mut backend).unwrap();

        let bound: Vec<_> = backend
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::BindTexture(t) => Some(*t),
                _ => None,
            })
            .collect();
        assert_eq!(bound.len(), 2);
        assert_eq!(bound.iter().filter(|t| t.is_some()).count(), 1);
    }

    #[test]
    fn loading_texture_draws_untextured() {
        let (mut level, mut ctx, mut backend) = level();
        let (_tx, rx) = std::sync::mpsc::channel();
        level.texture = Some(PendingTexture::loading("slow", rx));

        level.render(&mut ctx, &mut backend).unwrap();
        level.render(&mut ctx, &mut backend).unwrap();

        let bound: Vec<_> = backend
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::BindTexture(t) => Some(*t),
                _ => None,
            })
            .collect();
        assert_eq!(bound.len(), 4);
        assert!(bound.iter().all(Option::is_none));
        assert!(
            !backend
                .calls
                .iter()
                .any(|c| matches!(c, Call::CreateTexture(..)))
        );
    }

    #[test]
    fn resize_keeps_the_active_camera() {
        let (mut level, mut ctx, _) = level();
        level.toggle_camera(&mut ctx);
        level.resize(16.0 / 9.0, &mut ctx);
        assert!(level.chase_camera().is_active(&ctx));
        assert_eq!(ctx.projection(), level.chase_camera().projection());
    }
}
