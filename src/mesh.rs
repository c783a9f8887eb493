//! Polygon meshes with flat per-face normals.
//!
//! A [`Mesh`] is built in three steps:
//!
//! 1. Fill the vertex pool and the face list (usually hand-authored data such as
//!    [`Mesh::cube`]).
//! 2. [`Mesh::compute_normals`] derives one normal per face with Newell's method and
//!    points every vertex of the face at it.
//! 3. [`Mesh::compile`] flattens the faces into an interleaved buffer and uploads it.
//!
//! ```
//! use stackview::{Face, Mesh, Vec3};
//!
//! let mut mesh = Mesh::with_capacity(3, 1);
//! mesh.push_vertex(Vec3::new(0.0, 0.0, 0.0)).unwrap();
//! mesh.push_vertex(Vec3::new(1.0, 0.0, 0.0)).unwrap();
//! mesh.push_vertex(Vec3::new(0.0, 1.0, 0.0)).unwrap();
//! mesh.push_face(Face::new([0, 1, 2])).unwrap();
//! mesh.compute_normals().unwrap();
//! assert_eq!(mesh.normals()[0], Vec3::new(0.0, 0.0, 1.0));
//! ```
//!
//! # Compiled layout
//!
//! | Attribute | Floats | Offset (floats) |
//! |-----------|--------|-----------------|
//! | position  | 3      | 0               |
//! | normal    | 3      | 3               |
//!
//! Each compiled vertex is [`COMPILED_STRIDE`] floats; faces are emitted in order,
//! and vertices in face order within each face.

use glam::Vec3;

use crate::backend::{
    AttributeBinding, BufferId, DrawUniforms, GpuBackend, ProgramId, TextureId, VertexAttribute,
};
use crate::light::Light;
use crate::render_context::{RenderContext, RenderError};

/// Floats per compiled vertex: 3 position followed by 3 normal.
pub const COMPILED_STRIDE: usize = 6;

/// Attribute layout of a compiled mesh buffer.
pub const INTERLEAVED_LAYOUT: [AttributeBinding; 2] = [
    AttributeBinding {
        attribute: VertexAttribute::Position,
        components: 3,
        stride: COMPILED_STRIDE as u32,
        offset: 0,
    },
    AttributeBinding {
        attribute: VertexAttribute::Normal,
        components: 3,
        stride: COMPILED_STRIDE as u32,
        offset: 3,
    },
];

/// Errors from building or compiling a mesh.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("mesh compiled before compute_normals")]
    NormalsNotComputed,
    #[error("mesh is already compiled")]
    AlreadyCompiled,
    #[error("face {face} references vertex {vertex}, but the pool holds {len}")]
    VertexOutOfRange { face: usize, vertex: usize, len: usize },
    #[error("face {face} has fewer than three vertices")]
    DegenerateFace { face: usize },
}

/// One corner of a face: a vertex index and, once computed, a normal index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexNormalPair {
    pub vertex: usize,
    pub normal: Option<usize>,
}

/// A planar polygon given as an ordered loop of vertex indices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Face {
    pairs: Vec<VertexNormalPair>,
}

impl Face {
    /// Creates a face from vertex indices in winding order.
    pub fn new(vertices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            pairs: vertices
                .into_iter()
                .map(|vertex| VertexNormalPair {
                    vertex,
                    normal: None,
                })
                .collect(),
        }
    }

    pub fn pairs(&self) -> &[VertexNormalPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Index of the vertex following `idx` around the loop.
    pub fn next_vertex(&self, idx: usize) -> usize {
        (idx + 1) % self.pairs.len()
    }

    /// Newell normal of the polygon.
    ///
    /// The result is proportional to twice the polygon's area and is **not**
    /// normalized. Works for convex planar polygons with any number of vertices.
    ///
    /// # Panics
    ///
    /// Panics if a vertex index is outside `vertices`; [`Mesh::compute_normals`]
    /// validates indices first.
    pub fn compute_normal(&self, vertices: &[Vec3]) -> Vec3 {
        let mut normal = Vec3::ZERO;
        for i in 0..self.pairs.len() {
            let a = vertices[self.pairs[i].vertex];
            let b = vertices[self.pairs[self.next_vertex(i)].vertex];
            normal.x += (a.y - b.y) * (a.z + b.z);
            normal.y += (a.z - b.z) * (a.x + b.x);
            normal.z += (a.x - b.x) * (a.y + b.y);
        }
        normal
    }

    /// Average of the face's vertex positions.
    ///
    /// # Panics
    ///
    /// Panics if a vertex index is outside `vertices`, like [`Face::compute_normal`].
    pub fn center(&self, vertices: &[Vec3]) -> Vec3 {
        if self.pairs.is_empty() {
            return Vec3::ZERO;
        }
        let sum: Vec3 = self.pairs.iter().map(|p| vertices[p.vertex]).sum();
        sum / self.pairs.len() as f32
    }
}

/// Inputs shared by every draw of a frame.
#[derive(Clone, Copy, Debug)]
pub struct Shading<'a> {
    /// Lights whose derived positions were committed by the active camera.
    pub lights: &'a [Light],
    /// Texture to sample, or `None` while it is not ready.
    pub texture: Option<TextureId>,
}

/// GPU-side result of [`Mesh::compile`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompiledBuffer {
    pub buffer: BufferId,
    /// Floats per item.
    pub item_size: u32,
    /// Number of compiled vertices.
    pub item_count: u32,
}

/// Polygon mesh geometry plus its compiled GPU buffer.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    vertices: Vec<Vec3>,
    normals: Vec<Vec3>,
    faces: Vec<Face>,
    normals_computed: bool,
    compiled: Vec<f32>,
    gpu: Option<CompiledBuffer>,
    program: Option<ProgramId>,
}

impl Mesh {
    /// Creates an empty mesh with room for `vertex_count` vertices and
    /// `face_count` faces (and one normal per face).
    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            normals: Vec::with_capacity(face_count),
            faces: Vec::with_capacity(face_count),
            ..Default::default()
        }
    }

    /// Creates a mesh from a vertex pool and faces.
    pub fn new(vertices: Vec<Vec3>, faces: Vec<Face>) -> Self {
        Self {
            vertices,
            faces,
            ..Default::default()
        }
    }

    /// Appends a vertex and returns its index.
    ///
    /// The pools are frozen once the mesh is compiled.
    pub fn push_vertex(&mut self, position: Vec3) -> Result<usize, MeshError> {
        self.ensure_uncompiled()?;
        self.vertices.push(position);
        Ok(self.vertices.len() - 1)
    }

    /// Appends a face and returns its index.
    ///
    /// The pools are frozen once the mesh is compiled.
    pub fn push_face(&mut self, face: Face) -> Result<usize, MeshError> {
        self.ensure_uncompiled()?;
        self.normals_computed = false;
        self.faces.push(face);
        Ok(self.faces.len() - 1)
    }

    fn ensure_uncompiled(&self) -> Result<(), MeshError> {
        match self.gpu {
            Some(_) => Err(MeshError::AlreadyCompiled),
            None => Ok(()),
        }
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// The interleaved buffer produced by [`Mesh::compile`], empty before that.
    pub fn compiled(&self) -> &[f32] {
        &self.compiled
    }

    pub fn compiled_buffer(&self) -> Option<CompiledBuffer> {
        self.gpu
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    /// Computes one Newell normal per face.
    ///
    /// The normal of face `i` is stored at `normals[i]` and every corner of face `i`
    /// gets normal index `i`, which gives flat shading.
    pub fn compute_normals(&mut self) -> Result<&mut Self, MeshError> {
        for (i, face) in self.faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(MeshError::DegenerateFace { face: i });
            }
            if let Some(pair) = face.pairs.iter().find(|p| p.vertex >= self.vertices.len()) {
                return Err(MeshError::VertexOutOfRange {
                    face: i,
                    vertex: pair.vertex,
                    len: self.vertices.len(),
                });
            }
        }

        self.normals.clear();
        for (i, face) in self.faces.iter_mut().enumerate() {
            self.normals.push(face.compute_normal(&self.vertices));
            for pair in &mut face.pairs {
                pair.normal = Some(i);
            }
        }
        self.normals_computed = true;

        Ok(self)
    }

    /// Builds the interleaved `[x, y, z, nx, ny, nz]` buffer without uploading it.
    pub fn flatten(&self) -> Result<Vec<f32>, MeshError> {
        if !self.normals_computed {
            return Err(MeshError::NormalsNotComputed);
        }

        let count: usize = self.faces.iter().map(Face::len).sum();
        let mut data = Vec::with_capacity(count * COMPILED_STRIDE);
        for face in &self.faces {
            for pair in &face.pairs {
                let normal = pair.normal.ok_or(MeshError::NormalsNotComputed)?;
                data.extend_from_slice(&self.vertices[pair.vertex].to_array());
                data.extend_from_slice(&self.normals[normal].to_array());
            }
        }
        Ok(data)
    }

    /// Flattens the mesh, uploads it, and remembers the program to draw it with.
    ///
    /// [`Mesh::compute_normals`] must have run first. A mesh compiles once; the
    /// buffer is immutable afterwards.
    pub fn compile(
        &mut self,
        backend: &mut dyn GpuBackend,
        program: Option<ProgramId>,
    ) -> Result<&mut Self, MeshError> {
        if self.gpu.is_some() {
            return Err(MeshError::AlreadyCompiled);
        }

        let data = self.flatten()?;
        let item_count = (data.len() / COMPILED_STRIDE) as u32;
        let buffer = backend.create_vertex_buffer("Compiled Mesh", &data);

        self.compiled = data;
        self.gpu = Some(CompiledBuffer {
            buffer,
            item_size: COMPILED_STRIDE as u32,
            item_count,
        });
        self.program = program;

        Ok(self)
    }

    /// Draws the compiled mesh under the context's current matrices.
    ///
    /// Does nothing when the mesh has no program or was never compiled. The vertex
    /// attributes enabled for the draw are disabled again before returning, even if
    /// the draw fails.
    pub fn render(
        &self,
        ctx: &RenderContext,
        backend: &mut dyn GpuBackend,
        shading: &Shading,
    ) -> Result<(), RenderError> {
        let (Some(program), Some(compiled)) = (self.program, self.gpu) else {
            return Ok(());
        };

        backend.bind_program(program);
        backend.bind_vertex_buffer(compiled.buffer);
        for binding in INTERLEAVED_LAYOUT {
            backend.enable_attribute(binding);
        }

        backend.set_uniforms(&DrawUniforms::new(
            ctx.projection(),
            ctx.model_view(),
            shading.lights,
        ));
        backend.bind_texture(shading.texture);
        let drawn = backend.draw_triangles(0, compiled.item_count);

        for binding in INTERLEAVED_LAYOUT.iter().rev() {
            backend.disable_attribute(binding.attribute);
        }

        drawn.map_err(RenderError::from)
    }

    /// The 8-vertex, 12-triangle unit cube centered at the origin, wound
    /// counter-clockwise when seen from outside.
    pub fn cube() -> Self {
        let vertices = vec![
            Vec3::new(-0.5, -0.5, -0.5),
            Vec3::new(-0.5, -0.5, 0.5),
            Vec3::new(-0.5, 0.5, -0.5),
            Vec3::new(-0.5, 0.5, 0.5),
            Vec3::new(0.5, -0.5, -0.5),
            Vec3::new(0.5, -0.5, 0.5),
            Vec3::new(0.5, 0.5, -0.5),
            Vec3::new(0.5, 0.5, 0.5),
        ];

        #[rustfmt::skip]
        let faces = [
            [4, 6, 5], [5, 6, 7], // +X
            [6, 2, 7], [7, 2, 3], // +Y
            [2, 0, 3], [3, 0, 1], // -X
            [0, 4, 1], [1, 4, 5], // -Y
            [7, 3, 5], [5, 3, 1], // +Z
            [4, 0, 6], [6, 0, 2], // -Z
        ];

        Self::new(vertices, faces.into_iter().map(Face::new).collect())
    }

    /// A floor of thin strips on the plane `y = -1`, spanning x in [-20, 20) and
    /// z in [-10, 10].
    pub fn floor_grid() -> Self {
        const STRIPS: usize = 100;
        const STEP: f32 = 0.4;
        const WIDTH: f32 = 0.01;

        let mut vertices = Vec::with_capacity(STRIPS * 4);
        let mut faces = Vec::with_capacity(STRIPS * 2);
        for i in 0..STRIPS {
            let x = -20.0 + i as f32 * STEP;
            let a = vertices.len();
            let (b, c, d) = (a + 1, a + 2, a + 3);
            vertices.extend([
                Vec3::new(x + WIDTH, -1.0, 10.0),
                Vec3::new(x, -1.0, 10.0),
                Vec3::new(x + WIDTH, -1.0, -10.0),
                Vec3::new(x, -1.0, -10.0),
            ]);
            faces.push(Face::new([a, b, c]));
            faces.push(Face::new([c, d, b]));
        }
        Self::new(vertices, faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{Call, RecordingBackend};

    fn triangle_mesh() -> Mesh {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let faces = vec![
            Face::new([0, 1, 2]),
            Face::new([0, 3, 1]),
            Face::new([0, 2, 3]),
        ];
        Mesh::new(vertices, faces)
    }

    #[test]
    fn newell_normal_of_ccw_triangle_points_up_z() {
        let vertices = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
        ];
        let normal = Face::new([0, 1, 2]).compute_normal(&vertices);
        // Twice the area, not unit length.
        assert_eq!(normal, Vec3::new(0.0, 0.0, 4.0));
    }

    #[test]
    fn newell_normal_is_invariant_under_cyclic_relabeling() {
        let vertices = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.5, 0.0),
            Vec3::new(2.5, 2.0, 1.0),
            Vec3::new(1.0, 3.0, 1.5),
            Vec3::new(-0.5, 1.5, 0.75),
        ];
        let order = [0usize, 1, 2, 3, 4];
        let reference = Face::new(order).compute_normal(&vertices);

        for shift in 1..order.len() {
            let mut rotated = order;
            rotated.rotate_left(shift);
            let normal = Face::new(rotated).compute_normal(&vertices);
            assert!(
                normal.abs_diff_eq(reference, 1e-5),
                "shift {shift}: {normal} != {reference}"
            );
        }
    }

    #[test]
    fn newell_normal_handles_quads() {
        let vertices = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(0.0, 0.0, -1.0),
        ];
        let normal = Face::new([0, 1, 2, 3]).compute_normal(&vertices);
        assert!(normal.normalize().abs_diff_eq(Vec3::Y, 1e-6));
        assert!((normal.length() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn cube_face_normals_point_outward() {
        let mut cube = Mesh::cube();
        cube.compute_normals().unwrap();

        let expected = [
            Vec3::X,
            Vec3::X,
            Vec3::Y,
            Vec3::Y,
            Vec3::NEG_X,
            Vec3::NEG_X,
            Vec3::NEG_Y,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::Z,
            Vec3::NEG_Z,
            Vec3::NEG_Z,
        ];
        assert_eq!(cube.vertices().len(), 8);
        assert_eq!(cube.normals().len(), 12);
        for (i, (normal, axis)) in cube.normals().iter().zip(expected).enumerate() {
            assert!(
                normal.normalize().abs_diff_eq(axis, 1e-6),
                "face {i}: {normal} is not along {axis}"
            );
        }

        // Outward also means the normal points away from the cube's center.
        for (face, normal) in cube.faces().iter().zip(cube.normals()) {
            assert!(face.center(cube.vertices()).dot(*normal) > 0.0);
        }
    }

    #[test]
    fn compute_normals_assigns_face_index_to_every_corner() {
        let mut mesh = triangle_mesh();
        mesh.compute_normals().unwrap();
        for (i, face) in mesh.faces().iter().enumerate() {
            assert!(face.pairs().iter().all(|p| p.normal == Some(i)));
        }
    }

    #[test]
    fn face_center_is_the_centroid() {
        let vertices = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
            Vec3::new(0.0, 6.0, 3.0),
        ];
        let center = Face::new([0, 1, 2]).center(&vertices);
        assert!(center.abs_diff_eq(Vec3::new(1.0, 2.0, 1.0), 1e-6));
    }

    #[test]
    fn compile_before_normals_is_rejected() {
        let mut mesh = triangle_mesh();
        let mut backend = RecordingBackend::new();
        let err = mesh.compile(&mut backend, None).unwrap_err();
        assert!(matches!(err, MeshError::NormalsNotComputed));
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn compute_normals_rejects_out_of_range_vertices() {
        let mut mesh = Mesh::new(vec![Vec3::ZERO, Vec3::X], vec![Face::new([0, 1, 7])]);
        assert!(matches!(
            mesh.compute_normals(),
            Err(MeshError::VertexOutOfRange {
                face: 0,
                vertex: 7,
                len: 2
            })
        ));
    }

    #[test]
    fn compute_normals_rejects_degenerate_faces() {
        let mut mesh = Mesh::new(vec![Vec3::ZERO, Vec3::X], vec![Face::new([0, 1])]);
        assert!(matches!(
            mesh.compute_normals(),
            Err(MeshError::DegenerateFace { face: 0 })
        ));
    }

    #[test]
    fn compile_interleaves_positions_and_normals_in_face_order() {
        let mut mesh = triangle_mesh();
        let mut backend = RecordingBackend::new();
        mesh.compute_normals()
            .unwrap()
            .compile(&mut backend, None)
            .unwrap();

        let data = mesh.compiled();
        assert_eq!(data.len(), 3 * 3 * COMPILED_STRIDE);
        assert_eq!(data.len(), 54);

        let mut offset = 0;
        for (f, face) in mesh.faces().iter().enumerate() {
            for pair in face.pairs() {
                let chunk = &data[offset..offset + COMPILED_STRIDE];
                assert_eq!(&chunk[..3], &mesh.vertices()[pair.vertex].to_array());
                assert_eq!(&chunk[3..], &mesh.normals()[f].to_array());
                offset += COMPILED_STRIDE;
            }
        }

        let compiled = mesh.compiled_buffer().unwrap();
        assert_eq!(compiled.item_size, 6);
        assert_eq!(compiled.item_count, 9);
        assert_eq!(
            backend.calls,
            vec![Call::CreateVertexBuffer(compiled.buffer, data.to_vec())]
        );
    }

    #[test]
    fn compiled_length_matches_total_face_vertices() {
        let mut cube = Mesh::cube();
        let mut backend = RecordingBackend::new();
        cube.compute_normals()
            .unwrap()
            .compile(&mut backend, None)
            .unwrap();
        assert_eq!(cube.compiled().len(), 6 * 12 * 3);
    }

    #[test]
    fn compile_twice_is_rejected() {
        let mut mesh = triangle_mesh();
        let mut backend = RecordingBackend::new();
        mesh.compute_normals().unwrap();
        mesh.compile(&mut backend, None).unwrap();
        assert!(matches!(
            mesh.compile(&mut backend, None),
            Err(MeshError::AlreadyCompiled)
        ));
    }

    #[test]
    fn compiled_mesh_rejects_new_geometry() {
        let mut mesh = triangle_mesh();
        let mut backend = RecordingBackend::new();
        mesh.compute_normals().unwrap();
        mesh.compile(&mut backend, None).unwrap();
        let (vertex_count, face_count) = (mesh.vertices().len(), mesh.faces().len());
        let compiled_len = mesh.compiled().len();

        assert!(matches!(
            mesh.push_vertex(Vec3::ONE),
            Err(MeshError::AlreadyCompiled)
        ));
        assert!(matches!(
            mesh.push_face(Face::new([0, 1, 2])),
            Err(MeshError::AlreadyCompiled)
        ));
        assert_eq!(mesh.vertices().len(), vertex_count);
        assert_eq!(mesh.faces().len(), face_count);
        assert_eq!(mesh.compiled().len(), compiled_len);
    }

    #[test]
    fn render_without_program_is_a_no_op() {
        let mut mesh = triangle_mesh();
        let mut backend = RecordingBackend::new();
        mesh.compute_normals()
            .unwrap()
            .compile(&mut backend, None)
            .unwrap();
        backend.clear();

        let ctx = RenderContext::new();
        let shading = Shading {
            lights: &[],
            texture: None,
        };
        mesh.render(&ctx, &mut backend, &shading).unwrap();
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn render_binds_draws_and_releases_attributes() {
        let mut backend = RecordingBackend::new();
        let program = backend.compile_program("mesh", "", "").unwrap();
        let mut mesh = triangle_mesh();
        mesh.compute_normals()
            .unwrap()
            .compile(&mut backend, Some(program))
            .unwrap();
        let buffer = mesh.compiled_buffer().unwrap().buffer;
        backend.clear();

        let ctx = RenderContext::new();
        let shading = Shading {
            lights: &[],
            texture: None,
        };
        mesh.render(&ctx, &mut backend, &shading).unwrap();

        assert_eq!(backend.calls[0], Call::BindProgram(program));
        assert_eq!(backend.calls[1], Call::BindVertexBuffer(buffer));
        assert_eq!(backend.calls[2], Call::EnableAttribute(INTERLEAVED_LAYOUT[0]));
        assert_eq!(backend.calls[3], Call::EnableAttribute(INTERLEAVED_LAYOUT[1]));
        assert!(backend.calls.contains(&Call::Draw(0, 9)));
        assert!(backend.calls.contains(&Call::BindTexture(None)));
        assert!(backend.enabled.is_empty(), "attributes leaked past the draw");
    }

    #[test]
    fn render_uses_context_matrices() {
        let mut backend = RecordingBackend::new();
        let program = backend.compile_program("mesh", "", "").unwrap();
        let mut mesh = triangle_mesh();
        mesh.compute_normals()
            .unwrap()
            .compile(&mut backend, Some(program))
            .unwrap();

        let mut ctx = RenderContext::new();
        ctx.translate(Vec3::new(0.0, 0.5, -7.0));
        let shading = Shading {
            lights: &[],
            texture: None,
        };
        mesh.render(&ctx, &mut backend, &shading).unwrap();

        let uniforms = backend.uniforms();
        assert_eq!(uniforms.len(), 1);
        assert_eq!(uniforms[0].model_view, ctx.model_view());
        assert_eq!(uniforms[0].projection, ctx.projection());
    }

    #[test]
    fn floor_grid_normals_are_vertical() {
        let mut grid = Mesh::floor_grid();
        grid.compute_normals().unwrap();
        assert_eq!(grid.faces().len(), 200);
        for normal in grid.normals() {
            assert!(normal.x.abs() < 1e-6 && normal.z.abs() < 1e-6);
            assert!(normal.y.abs() > 0.0);
        }
    }
}
