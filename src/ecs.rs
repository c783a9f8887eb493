//! Components for entities stored in a level's `hecs` world.
//!
//! Entities carry a [`Transform`](crate::Transform) and, when drawable, a
//! [`RenderMesh`] that points into the level's [`MeshRegistry`]. Neither component
//! owns anything: meshes live in the registry and other entities are referred to by
//! `hecs::Entity` handles.
//!
//! ```
//! use stackview::{Mesh, MeshRegistry, RenderMesh, Transform, Vec3};
//!
//! let mut meshes = MeshRegistry::new();
//! let cube = meshes.add(Mesh::cube());
//!
//! let mut world = hecs::World::new();
//! let player = world.spawn((
//!     Transform::from_position(Vec3::new(0.0, 0.5, -7.0)),
//!     RenderMesh::textured(cube),
//! ));
//! assert!(world.get::<&RenderMesh>(player).is_ok());
//! ```

use crate::mesh::Mesh;

/// Type-safe index of a mesh in a [`MeshRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshId(pub(crate) usize);

/// Owns every mesh of a level.
#[derive(Debug, Default)]
pub struct MeshRegistry {
    meshes: Vec<Mesh>,
}

impl MeshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() - 1)
    }

    pub fn get(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)
    }

    pub fn get_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.meshes.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

/// Draws a registry mesh at the entity's transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderMesh {
    pub mesh: MeshId,
    /// Sample the level texture once it has loaded.
    pub textured: bool,
}

impl RenderMesh {
    pub fn new(mesh: MeshId) -> Self {
        Self {
            mesh,
            textured: false,
        }
    }

    pub fn textured(mesh: MeshId) -> Self {
        Self {
            mesh,
            textured: true,
        }
    }
}

/// Marks the entity steered by the keyboard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Player;
