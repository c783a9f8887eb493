//! [`GpuBackend`] on top of wgpu.
//!
//! wgpu records work into render passes rather than executing GL-style calls
//! one by one, so this backend keeps the immediate-mode state (bound program,
//! buffer, texture, enabled attributes) itself and turns each accepted draw into a
//! [`DrawRecord`]. [`WgpuBackend::present`] replays the records of the last frame
//! into a single render pass.
//!
//! # Bind groups
//!
//! - **Group 0**: per-draw uniforms, one 256-byte aligned slot per draw selected by
//!   dynamic offset
//! - **Group 1**: texture and sampler; a 1x1 white texture when nothing is bound

use std::num::NonZeroU64;

use wgpu::util::DeviceExt;

use crate::backend::{
    AttributeBinding, BackendError, BufferId, DrawUniforms, GpuBackend, ProgramId, TextureId,
    VertexAttribute,
};
use crate::gpu::GpuContext;
use crate::light::MAX_LIGHTS;
use crate::mesh::{COMPILED_STRIDE, INTERLEAVED_LAYOUT};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const INITIAL_UNIFORM_SLOTS: usize = 64;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

/// Uniform block shared by both mesh shader stages.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct UniformBlock {
    projection: [[f32; 4]; 4],
    model_view: [[f32; 4]; 4],
    /// Inverse transpose of `model_view`, for normals.
    normal_matrix: [[f32; 4]; 4],
    light_positions: [[f32; 4]; MAX_LIGHTS],
    light_colors: [[f32; 4]; MAX_LIGHTS],
    /// x: light count.
    params: [u32; 4],
}

impl From<&DrawUniforms> for UniformBlock {
    fn from(uniforms: &DrawUniforms) -> Self {
        Self {
            projection: uniforms.projection.to_cols_array_2d(),
            model_view: uniforms.model_view.to_cols_array_2d(),
            normal_matrix: uniforms.model_view.inverse().transpose().to_cols_array_2d(),
            light_positions: uniforms.light_positions,
            light_colors: uniforms.light_colors,
            params: [uniforms.light_count, 0, 0, 0],
        }
    }
}

/// Failures while presenting a frame.
#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    #[error("failed to acquire surface texture: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}

struct GpuTexture {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

/// One accepted draw, replayed by [`WgpuBackend::present`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DrawRecord {
    program: ProgramId,
    buffer: BufferId,
    texture: Option<TextureId>,
    uniform_offset: u32,
    first: u32,
    count: u32,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    clear_color: wgpu::Color,

    pipeline_layout: wgpu::PipelineLayout,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,

    pipelines: Vec<wgpu::RenderPipeline>,
    buffers: Vec<wgpu::Buffer>,
    textures: Vec<GpuTexture>,
    default_texture: GpuTexture,

    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_stride: usize,
    uniform_slots: usize,
    uniform_staging: Vec<u8>,

    depth_view: wgpu::TextureView,
    depth_size: (u32, u32),

    bound_program: Option<ProgramId>,
    bound_buffer: Option<BufferId>,
    bound_texture: Option<TextureId>,
    enabled: Vec<AttributeBinding>,
    current_uniform: Option<u32>,
    draws: Vec<DrawRecord>,
}

impl WgpuBackend {
    /// Creates the shared layouts, the default texture and the depth buffer.
    pub fn new(gpu: &GpuContext, clear_color: [f64; 4]) -> Self {
        let device = &gpu.device;
        let block_size = std::mem::size_of::<UniformBlock>();

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Uniforms Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(block_size as u64),
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mesh Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let default_texture = upload_texture(
            device,
            &gpu.queue,
            &texture_layout,
            &sampler,
            "Default White Texture",
            &[255, 255, 255, 255],
            1,
            1,
        );

        let alignment = device.limits().min_uniform_buffer_offset_alignment as usize;
        let uniform_stride = block_size.div_ceil(alignment) * alignment;
        let (uniform_buffer, uniform_bind_group) = create_uniform_buffer(
            device,
            &uniform_layout,
            uniform_stride * INITIAL_UNIFORM_SLOTS,
        );

        let depth_view = create_depth_view(gpu);

        let [r, g, b, a] = clear_color;
        Self {
            device: gpu.device.clone(),
            queue: gpu.queue.clone(),
            surface_format: gpu.config.format,
            clear_color: wgpu::Color { r, g, b, a },
            pipeline_layout,
            uniform_layout,
            texture_layout,
            sampler,
            pipelines: Vec::new(),
            buffers: Vec::new(),
            textures: Vec::new(),
            default_texture,
            uniform_buffer,
            uniform_bind_group,
            uniform_stride,
            uniform_slots: INITIAL_UNIFORM_SLOTS,
            uniform_staging: Vec::new(),
            depth_view,
            depth_size: (gpu.width(), gpu.height()),
            bound_program: None,
            bound_buffer: None,
            bound_texture: None,
            enabled: Vec::new(),
            current_uniform: None,
            draws: Vec::new(),
        }
    }

    /// Discards the draws and uniforms recorded for the previous frame.
    pub fn begin_frame(&mut self) {
        self.draws.clear();
        self.uniform_staging.clear();
        self.current_uniform = None;
    }

    /// Number of draws recorded since [`WgpuBackend::begin_frame`].
    pub fn pending_draws(&self) -> usize {
        self.draws.len()
    }

    /// Encodes the recorded draws into one pass and presents it.
    ///
    /// A lost or outdated surface is reconfigured and the frame skipped.
    pub fn present(&mut self, gpu: &GpuContext) -> Result<(), PresentError> {
        if self.depth_size != (gpu.width(), gpu.height()) {
            self.depth_view = create_depth_view(gpu);
            self.depth_size = (gpu.width(), gpu.height());
        }
        self.upload_uniforms();

        let output = match gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost or outdated, reconfiguring");
                gpu.surface.configure(&gpu.device, &gpu.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("timed out acquiring surface texture, frame skipped");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mesh Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &self.draws {
                let texture = draw
                    .texture
                    .and_then(|id| self.textures.get(id.0))
                    .unwrap_or(&self.default_texture);
                pass.set_pipeline(&self.pipelines[draw.program.0]);
                pass.set_bind_group(0, &self.uniform_bind_group, &[draw.uniform_offset]);
                pass.set_bind_group(1, &texture.bind_group, &[]);
                pass.set_vertex_buffer(0, self.buffers[draw.buffer.0].slice(..));
                pass.draw(draw.first..draw.first + draw.count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    /// Writes the staged uniform slots, growing the buffer when a frame needs more.
    fn upload_uniforms(&mut self) {
        let needed = self.uniform_staging.len() / self.uniform_stride;
        if needed > self.uniform_slots {
            self.uniform_slots = needed.next_power_of_two();
            let (buffer, bind_group) = create_uniform_buffer(
                &self.device,
                &self.uniform_layout,
                self.uniform_stride * self.uniform_slots,
            );
            self.uniform_buffer = buffer;
            self.uniform_bind_group = bind_group;
            tracing::debug!(slots = self.uniform_slots, "grew uniform buffer");
        }
        if !self.uniform_staging.is_empty() {
            self.queue
                .write_buffer(&self.uniform_buffer, 0, &self.uniform_staging);
        }
    }

    fn is_enabled(&self, attribute: VertexAttribute) -> bool {
        self.enabled.iter().any(|b| b.attribute == attribute)
    }
}

impl GpuBackend for WgpuBackend {
    fn compile_program(
        &mut self,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramId, BackendError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{label} vertex")),
                source: wgpu::ShaderSource::Wgsl(vertex_source.into()),
            });
        let fragment = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{label} fragment")),
                source: wgpu::ShaderSource::Wgsl(fragment_source.into()),
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: (COMPILED_STRIDE * std::mem::size_of::<f32>())
                            as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &VERTEX_ATTRIBUTES,
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.surface_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ShaderCompile {
                label: label.to_string(),
                message: error.to_string(),
            });
        }

        self.pipelines.push(pipeline);
        tracing::info!(program = label, "render pipeline created");
        Ok(ProgramId(self.pipelines.len() - 1))
    }

    fn bind_program(&mut self, program: ProgramId) {
        self.bound_program = Some(program);
    }

    fn create_vertex_buffer(&mut self, label: &str, data: &[f32]) -> BufferId {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::VERTEX,
            });
        self.buffers.push(buffer);
        BufferId(self.buffers.len() - 1)
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferId) {
        self.bound_buffer = Some(buffer);
    }

    fn enable_attribute(&mut self, binding: AttributeBinding) {
        if !INTERLEAVED_LAYOUT.contains(&binding) {
            tracing::warn!(?binding, "attribute layout differs from the pipeline's vertex layout");
        }
        self.enabled.retain(|b| b.attribute != binding.attribute);
        self.enabled.push(binding);
    }

    fn disable_attribute(&mut self, attribute: VertexAttribute) {
        self.enabled.retain(|b| b.attribute != attribute);
    }

    fn set_uniforms(&mut self, uniforms: &DrawUniforms) {
        let offset = self.uniform_staging.len();
        let block = UniformBlock::from(uniforms);
        self.uniform_staging
            .extend_from_slice(bytemuck::bytes_of(&block));
        self.uniform_staging.resize(offset + self.uniform_stride, 0);
        self.current_uniform = Some(offset as u32);
    }

    fn create_texture(&mut self, label: &str, rgba: &[u8], width: u32, height: u32) -> TextureId {
        let expected = (width as usize) * (height as usize) * 4;
        let texture = if expected > 0 && rgba.len() == expected {
            upload_texture(
                &self.device,
                &self.queue,
                &self.texture_layout,
                &self.sampler,
                label,
                rgba,
                width,
                height,
            )
        } else {
            tracing::error!(
                texture = label,
                width,
                height,
                bytes = rgba.len(),
                "pixel data does not match texture size, using white"
            );
            upload_texture(
                &self.device,
                &self.queue,
                &self.texture_layout,
                &self.sampler,
                label,
                &[255, 255, 255, 255],
                1,
                1,
            )
        };
        self.textures.push(texture);
        TextureId(self.textures.len() - 1)
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        self.bound_texture = texture;
    }

    fn draw_triangles(&mut self, first: u32, count: u32) -> Result<(), BackendError> {
        let program = self
            .bound_program
            .ok_or(BackendError::NothingBound("program"))?;
        let buffer = self
            .bound_buffer
            .ok_or(BackendError::NothingBound("vertex buffer"))?;
        let uniform_offset = self
            .current_uniform
            .ok_or(BackendError::NothingBound("uniform block"))?;

        if program.0 >= self.pipelines.len() {
            return Err(BackendError::UnknownHandle {
                kind: "program",
                index: program.0,
            });
        }
        if buffer.0 >= self.buffers.len() {
            return Err(BackendError::UnknownHandle {
                kind: "buffer",
                index: buffer.0,
            });
        }
        if let Some(texture) = self.bound_texture {
            if texture.0 >= self.textures.len() {
                return Err(BackendError::UnknownHandle {
                    kind: "texture",
                    index: texture.0,
                });
            }
        }
        for attribute in [VertexAttribute::Position, VertexAttribute::Normal] {
            if !self.is_enabled(attribute) {
                return Err(BackendError::MissingAttributes(attribute));
            }
        }

        self.draws.push(DrawRecord {
            program,
            buffer,
            texture: self.bound_texture,
            uniform_offset,
            first,
            count,
        });
        Ok(())
    }
}

fn create_uniform_buffer(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    size: usize,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Draw Uniforms"),
        size: size as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Draw Uniforms Bind Group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: NonZeroU64::new(std::mem::size_of::<UniformBlock>() as u64),
            }),
        }],
    });
    (buffer, bind_group)
}

#[allow(clippy::too_many_arguments)]
fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    label: &str,
    rgba: &[u8],
    width: u32,
    height: u32,
) -> GpuTexture {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        rgba,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });
    GpuTexture {
        _texture: texture,
        bind_group,
    }
}

fn create_depth_view(gpu: &GpuContext) -> wgpu::TextureView {
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: gpu.width(),
            height: gpu.height(),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
