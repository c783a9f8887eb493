use std::path::{Path, PathBuf};

use crate::backend::{BackendError, GpuBackend, ProgramId};

/// Built-in mesh shader, used when no shader directory is configured.
pub const MESH_VERTEX_SOURCE: &str = include_str!("../shaders/mesh.vert.wgsl");
pub const MESH_FRAGMENT_SOURCE: &str = include_str!("../shaders/mesh.frag.wgsl");

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("failed to read shader source '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// A compiled vertex + fragment pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderProgram {
    id: ProgramId,
}

impl ShaderProgram {
    /// Compiles a program from source text.
    pub fn from_sources(
        backend: &mut dyn GpuBackend,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, ShaderError> {
        let id = backend.compile_program(label, vertex_source, fragment_source)?;
        tracing::debug!(program = label, "shader program compiled");
        Ok(Self { id })
    }

    /// Reads both stages from disk and compiles them.
    pub fn load(
        backend: &mut dyn GpuBackend,
        vertex_path: &Path,
        fragment_path: &Path,
    ) -> Result<Self, ShaderError> {
        let vertex_source = read_source(vertex_path)?;
        let fragment_source = read_source(fragment_path)?;
        let label = vertex_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("shader");
        Self::from_sources(backend, label, &vertex_source, &fragment_source)
    }

    /// Compiles the built-in mesh shader.
    pub fn builtin_mesh(backend: &mut dyn GpuBackend) -> Result<Self, ShaderError> {
        Self::from_sources(backend, "mesh", MESH_VERTEX_SOURCE, MESH_FRAGMENT_SOURCE)
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }
}

fn read_source(path: &Path) -> Result<String, ShaderError> {
    std::fs::read_to_string(path).map_err(|source| ShaderError::Io {
        path: path.to_path_buf(),
        source,
    })
}
