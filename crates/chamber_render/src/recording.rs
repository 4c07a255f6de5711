//! Headless backend that records every graphics command instead of issuing it.
//!
//! Handles share the command log, so releasing a resource (dropping its
//! handle) shows up as a `Delete*` command in order with everything else.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Mat4;
use image::RgbaImage;

use crate::backend::GraphicsBackend;
use crate::error::RenderError;
use crate::shader::{LinkedProgram, UniformLocation};
use crate::vertex::SpriteVertex;

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateTexture { id: u32, width: u32, height: u32 },
    BindTexture { id: u32, unit: u32 },
    DeleteTexture { id: u32 },
    CreateProgram { id: u32, uniforms: Vec<String> },
    UseProgram { id: Option<u32> },
    DeleteProgram { id: u32 },
    UniformMat4 { location: UniformLocation, value: [f32; 16] },
    UniformSampler { location: UniformLocation, unit: u32 },
    CreateQuadBuffer { id: u32, vertex_capacity: usize },
    BindQuadBuffer { id: Option<u32> },
    WriteQuadBuffer { id: u32, vertices: Vec<SpriteVertex> },
    DeleteQuadBuffer { id: u32 },
    DrawTriangleStrip { vertex_count: u32 },
    SetViewport { width: u32, height: u32 },
    SetClearColor { color: [f32; 4] },
    EnableAlphaBlending,
    Clear,
}

type CommandLog = Rc<RefCell<Vec<GpuCommand>>>;

#[derive(Debug)]
pub struct RecordedTexture {
    id: u32,
    log: CommandLog,
}

impl RecordedTexture {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for RecordedTexture {
    fn drop(&mut self) {
        self.log
            .borrow_mut()
            .push(GpuCommand::DeleteTexture { id: self.id });
    }
}

#[derive(Debug)]
pub struct RecordedProgram {
    id: u32,
    log: CommandLog,
}

impl RecordedProgram {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for RecordedProgram {
    fn drop(&mut self) {
        self.log
            .borrow_mut()
            .push(GpuCommand::DeleteProgram { id: self.id });
    }
}

#[derive(Debug)]
pub struct RecordedQuadBuffer {
    id: u32,
    capacity: usize,
    log: CommandLog,
}

impl RecordedQuadBuffer {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for RecordedQuadBuffer {
    fn drop(&mut self) {
        self.log
            .borrow_mut()
            .push(GpuCommand::DeleteQuadBuffer { id: self.id });
    }
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    log: CommandLog,
    next_id: u32,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<GpuCommand> {
        self.log.borrow().clone()
    }

    pub fn clear_commands(&self) {
        self.log.borrow_mut().clear();
    }

    fn record(&self, command: GpuCommand) {
        self.log.borrow_mut().push(command);
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl GraphicsBackend for RecordingBackend {
    type Texture = RecordedTexture;
    type Program = RecordedProgram;
    type QuadBuffer = RecordedQuadBuffer;

    fn create_texture(&mut self, image: &RgbaImage, _label: &str) -> RecordedTexture {
        let id = self.allocate_id();
        self.record(GpuCommand::CreateTexture {
            id,
            width: image.width(),
            height: image.height(),
        });
        RecordedTexture {
            id,
            log: Rc::clone(&self.log),
        }
    }

    fn bind_texture(&mut self, texture: &RecordedTexture, unit: u32) {
        self.record(GpuCommand::BindTexture {
            id: texture.id,
            unit,
        });
    }

    fn create_program(
        &mut self,
        program: &LinkedProgram,
        _label: &str,
    ) -> Result<RecordedProgram, RenderError> {
        let id = self.allocate_id();
        self.record(GpuCommand::CreateProgram {
            id,
            uniforms: program.uniforms.iter().map(|u| u.name.clone()).collect(),
        });
        Ok(RecordedProgram {
            id,
            log: Rc::clone(&self.log),
        })
    }

    fn use_program(&mut self, program: Option<&RecordedProgram>) {
        self.record(GpuCommand::UseProgram {
            id: program.map(|p| p.id),
        });
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        self.record(GpuCommand::UniformMat4 {
            location,
            value: value.to_cols_array(),
        });
    }

    fn set_uniform_sampler(&mut self, location: UniformLocation, unit: u32) {
        self.record(GpuCommand::UniformSampler { location, unit });
    }

    fn create_quad_buffer(&mut self, vertex_capacity: usize, _label: &str) -> RecordedQuadBuffer {
        let id = self.allocate_id();
        self.record(GpuCommand::CreateQuadBuffer {
            id,
            vertex_capacity,
        });
        RecordedQuadBuffer {
            id,
            capacity: vertex_capacity,
            log: Rc::clone(&self.log),
        }
    }

    fn bind_quad_buffer(&mut self, buffer: Option<&RecordedQuadBuffer>) {
        self.record(GpuCommand::BindQuadBuffer {
            id: buffer.map(|b| b.id),
        });
    }

    fn write_quad_buffer(&mut self, buffer: &RecordedQuadBuffer, vertices: &[SpriteVertex]) {
        debug_assert!(vertices.len() <= buffer.capacity);
        self.record(GpuCommand::WriteQuadBuffer {
            id: buffer.id,
            vertices: vertices.to_vec(),
        });
    }

    fn draw_triangle_strip(&mut self, vertex_count: u32) {
        self.record(GpuCommand::DrawTriangleStrip { vertex_count });
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.record(GpuCommand::SetViewport { width, height });
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.record(GpuCommand::SetClearColor { color });
    }

    fn enable_alpha_blending(&mut self) {
        self.record(GpuCommand::EnableAlphaBlending);
    }

    fn clear(&mut self) {
        self.record(GpuCommand::Clear);
    }
}
