//! `GraphicsBackend` on top of wgpu.
//!
//! wgpu records work into command buffers instead of drawing immediately, so
//! every `clear` and `draw_triangle_strip` becomes its own render pass and
//! queue submission. A `write_quad_buffer` issued before a draw is therefore
//! visible to exactly that draw, which keeps the per-sprite rewrite semantics
//! of the renderer. Uniform "locations" are `(group, binding)` slots; texture
//! units map onto the bind group that holds a texture/sampler pair.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use glam::Mat4;
use image::RgbaImage;

use crate::backend::GraphicsBackend;
use crate::error::RenderError;
use crate::gpu_context::GpuContext;
use crate::projection::ProjectionUniform;
use crate::shader::{LinkedProgram, UniformInfo, UniformKind, UniformLocation};
use crate::vertex::SpriteVertex;

const TEXTURE_BINDING: u32 = 0;
const SAMPLER_BINDING: u32 = 1;

pub struct WgpuTexture {
    texture: wgpu::Texture,
    bind_group: Rc<wgpu::BindGroup>,
}

impl Drop for WgpuTexture {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

pub struct WgpuProgram {
    label: String,
    pipeline: wgpu::RenderPipeline,
    uniform_buffers: HashMap<UniformLocation, wgpu::Buffer>,
    /// Bind groups owned by the program (uniform buffers and empty gaps).
    owned_groups: Vec<(u32, wgpu::BindGroup)>,
    /// Groups filled from a texture unit at draw time.
    texture_groups: Vec<u32>,
    sampler_units: RefCell<HashMap<u32, u32>>,
}

pub struct WgpuQuadBuffer {
    buffer: wgpu::Buffer,
    capacity: usize,
}

impl Drop for WgpuQuadBuffer {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

struct FrameTarget {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

pub struct WgpuBackend {
    gpu: GpuContext,
    texture_layout: wgpu::BindGroupLayout,
    blend: Option<wgpu::BlendState>,
    clear_color: wgpu::Color,
    viewport: (u32, u32),
    texture_units: HashMap<u32, Rc<wgpu::BindGroup>>,
    current_program: Option<Rc<WgpuProgram>>,
    current_quad: Option<Rc<WgpuQuadBuffer>>,
    frame: Option<FrameTarget>,
}

impl WgpuBackend {
    pub fn new(gpu: GpuContext) -> Self {
        let texture_layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Texture Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: TEXTURE_BINDING,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: SAMPLER_BINDING,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });
        let viewport = gpu.size;

        Self {
            gpu,
            texture_layout,
            blend: None,
            clear_color: wgpu::Color::BLACK,
            viewport,
            texture_units: HashMap::new(),
            current_program: None,
            current_quad: None,
            frame: None,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Reconfigures the swap chain for a new framebuffer size.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        // An acquired frame belongs to the old configuration.
        self.frame = None;
        self.gpu.resize(width, height);
    }

    /// Presents whatever was drawn since the last present.
    pub fn present(&mut self) {
        if let Some(frame) = self.frame.take() {
            frame.output.present();
        }
    }

    fn ensure_frame(&mut self) -> bool {
        if self.frame.is_none() {
            self.frame = self
                .gpu
                .begin_frame()
                .map(|(output, view)| FrameTarget { output, view });
        }
        self.frame.is_some()
    }

    fn buffer_group_layout(
        &self,
        group: u32,
        uniforms: &[&UniformInfo],
    ) -> Result<wgpu::BindGroupLayout, RenderError> {
        let mut entries = Vec::with_capacity(uniforms.len());
        for uniform in uniforms {
            match uniform.kind {
                UniformKind::Buffer { .. } => entries.push(wgpu::BindGroupLayoutEntry {
                    binding: uniform.location.binding,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }),
                _ => {
                    return Err(RenderError::ShaderLink {
                        log: format!(
                            "group {group}: '{}' must share a group with a texture at binding {TEXTURE_BINDING}",
                            uniform.name
                        ),
                    })
                }
            }
        }
        Ok(self
            .gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Uniform Bind Group Layout"),
                entries: &entries,
            }))
    }

    fn is_texture_group(group: u32, uniforms: &[&UniformInfo]) -> Result<bool, RenderError> {
        if !uniforms.iter().any(|u| u.kind == UniformKind::Texture) {
            return Ok(false);
        }
        let slot = |binding: u32| {
            uniforms
                .iter()
                .find(|u| u.location.binding == binding)
                .map(|u| u.kind)
        };
        let well_formed = uniforms.len() == 2
            && slot(TEXTURE_BINDING) == Some(UniformKind::Texture)
            && slot(SAMPLER_BINDING) == Some(UniformKind::Sampler);
        if !well_formed {
            return Err(RenderError::ShaderLink {
                log: format!(
                    "group {group}: texture groups hold exactly a texture at binding {TEXTURE_BINDING} and a sampler at binding {SAMPLER_BINDING}"
                ),
            });
        }
        Ok(true)
    }
}

impl GraphicsBackend for WgpuBackend {
    type Texture = WgpuTexture;
    type Program = Rc<WgpuProgram>;
    type QuadBuffer = Rc<WgpuQuadBuffer>;

    fn create_texture(&mut self, image: &RgbaImage, label: &str) -> WgpuTexture {
        let device = &self.gpu.device;
        let (width, height) = image.dimensions();
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        // Pixel art: nearest filtering, no mipmaps, clamped edges.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sprite Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: TEXTURE_BINDING,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: SAMPLER_BINDING,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        WgpuTexture {
            texture,
            bind_group: Rc::new(bind_group),
        }
    }

    fn bind_texture(&mut self, texture: &WgpuTexture, unit: u32) {
        self.texture_units
            .insert(unit, Rc::clone(&texture.bind_group));
    }

    fn create_program(
        &mut self,
        program: &LinkedProgram,
        label: &str,
    ) -> Result<Rc<WgpuProgram>, RenderError> {
        let mut groups: BTreeMap<u32, Vec<&UniformInfo>> = BTreeMap::new();
        for uniform in &program.uniforms {
            groups.entry(uniform.location.group).or_default().push(uniform);
        }
        let group_count = groups.keys().next_back().map_or(0, |last| last + 1);

        let device = &self.gpu.device;
        let empty: Vec<&UniformInfo> = Vec::new();
        let mut layouts = Vec::with_capacity(group_count as usize);
        let mut owned_groups = Vec::new();
        let mut texture_groups = Vec::new();
        let mut uniform_buffers = HashMap::new();

        for group in 0..group_count {
            let uniforms = groups.get(&group).unwrap_or(&empty);
            if Self::is_texture_group(group, uniforms)? {
                layouts.push(None);
                texture_groups.push(group);
                continue;
            }

            let layout = self.buffer_group_layout(group, uniforms)?;
            let mut buffers = Vec::with_capacity(uniforms.len());
            for uniform in uniforms {
                let UniformKind::Buffer { size } = uniform.kind else {
                    continue;
                };
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(uniform.name.as_str()),
                    size: u64::from(size.max(16)).next_multiple_of(16),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                buffers.push((uniform.location, buffer));
            }
            let entries: Vec<wgpu::BindGroupEntry> = buffers
                .iter()
                .map(|(location, buffer)| wgpu::BindGroupEntry {
                    binding: location.binding,
                    resource: buffer.as_entire_binding(),
                })
                .collect();
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &layout,
                entries: &entries,
            });

            owned_groups.push((group, bind_group));
            uniform_buffers.extend(buffers);
            layouts.push(Some(layout));
        }

        let layout_refs: Vec<&wgpu::BindGroupLayout> = layouts
            .iter()
            .map(|layout| layout.as_ref().unwrap_or(&self.texture_layout))
            .collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &layout_refs,
            push_constant_ranges: &[],
        });

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(program.vertex_source.as_str().into()),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(program.fragment_source.as_str().into()),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some(program.vertex_entry.as_str()),
                compilation_options: Default::default(),
                buffers: &[SpriteVertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(program.fragment_entry.as_str()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.gpu.surface_format,
                    blend: self.blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Rc::new(WgpuProgram {
            label: label.to_string(),
            pipeline,
            uniform_buffers,
            owned_groups,
            texture_groups,
            sampler_units: RefCell::new(HashMap::new()),
        }))
    }

    fn use_program(&mut self, program: Option<&Rc<WgpuProgram>>) {
        self.current_program = program.cloned();
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        let Some(program) = &self.current_program else {
            log::warn!("set_uniform_mat4({location}) with no program bound");
            return;
        };
        let Some(buffer) = program.uniform_buffers.get(&location) else {
            log::warn!("Program '{}' has no uniform buffer at {location}", program.label);
            return;
        };
        let uniform = ProjectionUniform::from(*value);
        self.gpu
            .queue
            .write_buffer(buffer, 0, bytemuck::bytes_of(&uniform));
    }

    fn set_uniform_sampler(&mut self, location: UniformLocation, unit: u32) {
        let Some(program) = &self.current_program else {
            log::warn!("set_uniform_sampler({location}) with no program bound");
            return;
        };
        if !program.texture_groups.contains(&location.group) {
            log::warn!("Program '{}' has no texture at {location}", program.label);
            return;
        }
        program
            .sampler_units
            .borrow_mut()
            .insert(location.group, unit);
    }

    fn create_quad_buffer(&mut self, vertex_capacity: usize, label: &str) -> Rc<WgpuQuadBuffer> {
        let byte_len = (vertex_capacity * std::mem::size_of::<SpriteVertex>()).max(1) as u64;
        let buffer = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: byte_len,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Rc::new(WgpuQuadBuffer {
            buffer,
            capacity: vertex_capacity,
        })
    }

    fn bind_quad_buffer(&mut self, buffer: Option<&Rc<WgpuQuadBuffer>>) {
        self.current_quad = buffer.cloned();
    }

    fn write_quad_buffer(&mut self, buffer: &Rc<WgpuQuadBuffer>, vertices: &[SpriteVertex]) {
        let count = vertices.len().min(buffer.capacity);
        if count < vertices.len() {
            log::warn!(
                "Quad buffer holds {} vertices, dropping {}",
                buffer.capacity,
                vertices.len() - count
            );
        }
        self.gpu
            .queue
            .write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(&vertices[..count]));
    }

    fn draw_triangle_strip(&mut self, vertex_count: u32) {
        let (Some(program), Some(quad)) = (self.current_program.clone(), self.current_quad.clone())
        else {
            log::warn!("Draw skipped: program or quad buffer not bound");
            return;
        };
        if !self.ensure_frame() {
            return;
        }
        let Some(frame) = &self.frame else {
            return;
        };

        let mut texture_bindings = Vec::with_capacity(program.texture_groups.len());
        for group in &program.texture_groups {
            let unit = program
                .sampler_units
                .borrow()
                .get(group)
                .copied()
                .unwrap_or(0);
            let Some(bind_group) = self.texture_units.get(&unit) else {
                log::warn!("Draw skipped: no texture bound to unit {unit}");
                return;
            };
            texture_bindings.push((*group, Rc::clone(bind_group)));
        }

        let frame_width = frame.output.texture.width();
        let frame_height = frame.output.texture.height();
        let viewport_width = self.viewport.0.min(frame_width).max(1);
        let viewport_height = self.viewport.1.min(frame_height).max(1);

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Sprite Draw Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sprite Draw Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });

            pass.set_pipeline(&program.pipeline);
            pass.set_viewport(
                0.0,
                0.0,
                viewport_width as f32,
                viewport_height as f32,
                0.0,
                1.0,
            );
            for (group, bind_group) in &program.owned_groups {
                pass.set_bind_group(*group, bind_group, &[]);
            }
            for (group, bind_group) in &texture_bindings {
                pass.set_bind_group(*group, bind_group.as_ref(), &[]);
            }
            pass.set_vertex_buffer(0, quad.buffer.slice(..));
            pass.draw(0..vertex_count, 0..1);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = wgpu::Color {
            r: f64::from(color[0]),
            g: f64::from(color[1]),
            b: f64::from(color[2]),
            a: f64::from(color[3]),
        };
    }

    fn enable_alpha_blending(&mut self) {
        self.blend = Some(wgpu::BlendState::ALPHA_BLENDING);
    }

    fn clear(&mut self) {
        if !self.ensure_frame() {
            return;
        }
        let Some(frame) = &self.frame else {
            return;
        };

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Clear Encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}
