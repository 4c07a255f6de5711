//! The seam between the renderer and a graphics API.
//!
//! Every call takes the backend explicitly; there is no ambient "current
//! context". Resource handles release their GPU objects when dropped.
//! Uniform setters apply to the program most recently passed to
//! `use_program`, the same way a GL-style API behaves.

use glam::Mat4;
use image::RgbaImage;

use crate::error::RenderError;
use crate::shader::{LinkedProgram, UniformLocation};
use crate::vertex::SpriteVertex;

pub trait GraphicsBackend {
    type Texture;
    type Program;
    type QuadBuffer;

    /// Uploads RGBA8 pixels to a new 2D texture sampled with nearest
    /// filtering, no mipmaps and clamp-to-edge wrapping.
    fn create_texture(&mut self, image: &RgbaImage, label: &str) -> Self::Texture;
    fn bind_texture(&mut self, texture: &Self::Texture, unit: u32);

    fn create_program(
        &mut self,
        program: &LinkedProgram,
        label: &str,
    ) -> Result<Self::Program, RenderError>;
    fn use_program(&mut self, program: Option<&Self::Program>);
    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4);
    /// Points a texture uniform at a texture unit.
    fn set_uniform_sampler(&mut self, location: UniformLocation, unit: u32);

    /// Allocates a dynamically updated vertex buffer of `vertex_capacity`
    /// sprite vertices.
    fn create_quad_buffer(&mut self, vertex_capacity: usize, label: &str) -> Self::QuadBuffer;
    fn bind_quad_buffer(&mut self, buffer: Option<&Self::QuadBuffer>);
    /// Overwrites the start of `buffer` in place; never reallocates.
    fn write_quad_buffer(&mut self, buffer: &Self::QuadBuffer, vertices: &[SpriteVertex]);
    fn draw_triangle_strip(&mut self, vertex_count: u32);

    fn set_viewport(&mut self, width: u32, height: u32);
    fn set_clear_color(&mut self, color: [f32; 4]);
    fn enable_alpha_blending(&mut self);
    fn clear(&mut self);
}
