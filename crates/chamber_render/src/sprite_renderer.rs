//! Draws textured, axis-aligned rectangles in screen pixels (origin at the
//! bottom-left) with one shared program and one reusable 4-vertex buffer.
//!
//! A frame is bracketed: `begin` -> any number of `draw` -> `end`. Every
//! `draw` rewrites the whole quad and issues its own draw call; there is no
//! batching, which is only reasonable at very low sprite counts.

use glam::Mat4;

use crate::backend::GraphicsBackend;
use crate::error::RenderError;
use crate::projection::screen_projection;
use crate::shader::{ShaderProgram, UniformLocation};
use crate::texture::Texture;
use crate::vertex::SpriteVertex;

pub const PROJECTION_UNIFORM: &str = "u_projection";
pub const TEXTURE_UNIFORM: &str = "u_texture";
pub const QUAD_VERTEX_COUNT: usize = 4;

const TEXTURE_UNIT: u32 = 0;
const VERTEX_SHADER: &str = include_str!("shaders/sprite_vertex.wgsl");
const FRAGMENT_SHADER: &str = include_str!("shaders/sprite_fragment.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Idle,
    Ready { viewport: (u32, u32) },
}

/// Triangle-strip order: bottom-left, bottom-right, top-left, top-right.
pub fn quad_vertices(x: f32, y: f32, w: f32, h: f32) -> [SpriteVertex; QUAD_VERTEX_COUNT] {
    let (x0, y0) = (x, y);
    let (x1, y1) = (x + w, y + h);
    [
        SpriteVertex::new(x0, y0, 0.0, 0.0),
        SpriteVertex::new(x1, y0, 1.0, 0.0),
        SpriteVertex::new(x0, y1, 0.0, 1.0),
        SpriteVertex::new(x1, y1, 1.0, 1.0),
    ]
}

pub struct SpriteRenderer<B: GraphicsBackend> {
    // Drop order releases the program before the quad buffer.
    program: ShaderProgram<B>,
    quad_buffer: B::QuadBuffer,
    projection_location: UniformLocation,
    texture_location: UniformLocation,
    projection: Mat4,
    quad: [SpriteVertex; QUAD_VERTEX_COUNT],
    state: RendererState,
}

impl<B: GraphicsBackend> SpriteRenderer<B> {
    pub fn new(backend: &mut B) -> Result<Self, RenderError> {
        let program = ShaderProgram::new(backend, VERTEX_SHADER, FRAGMENT_SHADER, "Sprite Program")?;
        let projection_location = program.uniform_location(PROJECTION_UNIFORM)?;
        let texture_location = program.uniform_location(TEXTURE_UNIFORM)?;
        let quad_buffer = backend.create_quad_buffer(QUAD_VERTEX_COUNT, "Sprite Quad Buffer");

        Ok(Self {
            program,
            quad_buffer,
            projection_location,
            texture_location,
            projection: Mat4::IDENTITY,
            quad: [SpriteVertex::new(0.0, 0.0, 0.0, 0.0); QUAD_VERTEX_COUNT],
            state: RendererState::Idle,
        })
    }

    pub fn begin(
        &mut self,
        backend: &mut B,
        viewport_width: u32,
        viewport_height: u32,
    ) -> Result<(), RenderError> {
        if let RendererState::Ready { .. } = self.state {
            return Err(RenderError::OutOfOrder {
                op: "begin",
                state: "a frame is already open",
            });
        }

        self.program.bind(backend);
        self.projection = screen_projection(viewport_width, viewport_height);
        backend.set_uniform_mat4(self.projection_location, &self.projection);
        backend.set_uniform_sampler(self.texture_location, TEXTURE_UNIT);
        backend.bind_quad_buffer(Some(&self.quad_buffer));

        self.state = RendererState::Ready {
            viewport: (viewport_width, viewport_height),
        };
        Ok(())
    }

    pub fn draw(
        &mut self,
        backend: &mut B,
        texture: &Texture<B>,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) -> Result<(), RenderError> {
        if self.state == RendererState::Idle {
            return Err(RenderError::OutOfOrder {
                op: "draw",
                state: "idle (call begin first)",
            });
        }

        texture.bind(backend, TEXTURE_UNIT);
        self.quad = quad_vertices(x, y, w, h);
        backend.write_quad_buffer(&self.quad_buffer, &self.quad);
        backend.draw_triangle_strip(QUAD_VERTEX_COUNT as u32);
        Ok(())
    }

    pub fn end(&mut self, backend: &mut B) -> Result<(), RenderError> {
        if self.state == RendererState::Idle {
            return Err(RenderError::OutOfOrder {
                op: "end",
                state: "idle (call begin first)",
            });
        }

        backend.bind_quad_buffer(None);
        self.program.unbind(backend);
        self.state = RendererState::Idle;
        Ok(())
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    /// Projection uploaded by the most recent `begin`.
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    /// Geometry most recently written to the quad buffer.
    pub fn quad(&self) -> &[SpriteVertex; QUAD_VERTEX_COUNT] {
        &self.quad
    }

    pub fn release(self) {
        log::debug!("Releasing sprite renderer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{GpuCommand, RecordingBackend};

    fn white_texture(backend: &mut RecordingBackend, w: u32, h: u32) -> Texture<RecordingBackend> {
        let image = image::RgbaImage::from_pixel(w, h, image::Rgba([255, 255, 255, 255]));
        Texture::from_image(backend, &image, "white")
    }

    fn writes(commands: &[GpuCommand]) -> Vec<Vec<SpriteVertex>> {
        commands
            .iter()
            .filter_map(|c| match c {
                GpuCommand::WriteQuadBuffer { vertices, .. } => Some(vertices.clone()),
                _ => None,
            })
            .collect()
    }

    fn setup() -> (RecordingBackend, SpriteRenderer<RecordingBackend>, Texture<RecordingBackend>) {
        let mut backend = RecordingBackend::new();
        let renderer = SpriteRenderer::new(&mut backend).expect("sprite renderer");
        let texture = white_texture(&mut backend, 24, 24);
        backend.clear_commands();
        (backend, renderer, texture)
    }

    #[test]
    fn construction_allocates_one_four_vertex_buffer() {
        let mut backend = RecordingBackend::new();
        let _renderer = SpriteRenderer::new(&mut backend).expect("sprite renderer");
        let commands = backend.commands();

        assert!(matches!(commands[0], GpuCommand::CreateProgram { .. }));
        assert!(commands.iter().any(|c| matches!(
            c,
            GpuCommand::CreateQuadBuffer {
                vertex_capacity: 4,
                ..
            }
        )));
    }

    #[test]
    fn quad_corners_map_to_unit_square() {
        let (mut backend, mut renderer, texture) = setup();
        renderer.begin(&mut backend, 800, 600).expect("begin");
        renderer
            .draw(&mut backend, &texture, 10.0, 20.0, 30.0, 40.0)
            .expect("draw");
        renderer.end(&mut backend).expect("end");

        let expected = vec![
            SpriteVertex::new(10.0, 20.0, 0.0, 0.0),
            SpriteVertex::new(40.0, 20.0, 1.0, 0.0),
            SpriteVertex::new(10.0, 60.0, 0.0, 1.0),
            SpriteVertex::new(40.0, 60.0, 1.0, 1.0),
        ];
        assert_eq!(writes(&backend.commands()), vec![expected.clone()]);
        assert_eq!(renderer.quad().to_vec(), expected);
    }

    #[test]
    fn frame_issues_commands_in_protocol_order() {
        let (mut backend, mut renderer, texture) = setup();
        renderer.begin(&mut backend, 800, 600).expect("begin");
        renderer
            .draw(&mut backend, &texture, 0.0, 0.0, 24.0, 24.0)
            .expect("draw");
        renderer.end(&mut backend).expect("end");

        let commands = backend.commands();
        assert_eq!(commands.len(), 9);
        assert!(matches!(commands[0], GpuCommand::UseProgram { id: Some(_) }));
        assert!(matches!(commands[1], GpuCommand::UniformMat4 { .. }));
        assert!(matches!(
            commands[2],
            GpuCommand::UniformSampler { unit: 0, .. }
        ));
        assert!(matches!(commands[3], GpuCommand::BindQuadBuffer { id: Some(_) }));
        assert_eq!(
            commands[4],
            GpuCommand::BindTexture {
                id: texture.raw().id(),
                unit: 0
            }
        );
        assert!(matches!(commands[5], GpuCommand::WriteQuadBuffer { .. }));
        assert_eq!(commands[6], GpuCommand::DrawTriangleStrip { vertex_count: 4 });
        assert_eq!(commands[7], GpuCommand::BindQuadBuffer { id: None });
        assert_eq!(commands[8], GpuCommand::UseProgram { id: None });
    }

    #[test]
    fn begin_uploads_projection_for_viewport() {
        let (mut backend, mut renderer, _texture) = setup();
        renderer.begin(&mut backend, 800, 600).expect("begin");

        let uploaded = backend.commands().into_iter().find_map(|c| match c {
            GpuCommand::UniformMat4 { value, .. } => Some(value),
            _ => None,
        });
        assert_eq!(uploaded, Some(screen_projection(800, 600).to_cols_array()));
        assert_eq!(renderer.state(), RendererState::Ready { viewport: (800, 600) });
    }

    #[test]
    fn each_draw_overwrites_the_shared_buffer() {
        let (mut backend, mut renderer, texture) = setup();
        renderer.begin(&mut backend, 800, 600).expect("begin");
        renderer
            .draw(&mut backend, &texture, 0.0, 0.0, 10.0, 10.0)
            .expect("first draw");
        renderer
            .draw(&mut backend, &texture, 100.0, 100.0, 5.0, 5.0)
            .expect("second draw");
        renderer.end(&mut backend).expect("end");

        let written = writes(&backend.commands());
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|w| w.len() == QUAD_VERTEX_COUNT));
        assert_eq!(written[1], quad_vertices(100.0, 100.0, 5.0, 5.0).to_vec());
        assert_eq!(renderer.quad(), &quad_vertices(100.0, 100.0, 5.0, 5.0));

        let draws = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::DrawTriangleStrip { .. }))
            .count();
        assert_eq!(draws, 2);
    }

    #[test]
    fn draw_before_begin_is_rejected_without_gpu_work() {
        let (mut backend, mut renderer, texture) = setup();
        let err = renderer
            .draw(&mut backend, &texture, 0.0, 0.0, 1.0, 1.0)
            .expect_err("draw while idle");
        assert!(matches!(err, RenderError::OutOfOrder { op: "draw", .. }));
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn end_before_begin_is_rejected() {
        let (mut backend, mut renderer, _texture) = setup();
        let err = renderer.end(&mut backend).expect_err("end while idle");
        assert!(matches!(err, RenderError::OutOfOrder { op: "end", .. }));
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn nested_begin_is_rejected() {
        let (mut backend, mut renderer, _texture) = setup();
        renderer.begin(&mut backend, 800, 600).expect("begin");
        let before = backend.commands().len();
        let err = renderer
            .begin(&mut backend, 800, 600)
            .expect_err("second begin");
        assert!(matches!(err, RenderError::OutOfOrder { op: "begin", .. }));
        assert_eq!(backend.commands().len(), before);
    }

    #[test]
    fn draw_after_end_is_rejected() {
        let (mut backend, mut renderer, texture) = setup();
        renderer.begin(&mut backend, 800, 600).expect("begin");
        renderer.end(&mut backend).expect("end");
        assert_eq!(renderer.state(), RendererState::Idle);
        assert!(renderer
            .draw(&mut backend, &texture, 0.0, 0.0, 1.0, 1.0)
            .is_err());
    }

    #[test]
    fn new_viewport_changes_next_projection() {
        let (mut backend, mut renderer, _texture) = setup();
        renderer.begin(&mut backend, 800, 600).expect("begin");
        renderer.end(&mut backend).expect("end");
        renderer.begin(&mut backend, 1024, 768).expect("begin");

        assert_eq!(renderer.projection(), screen_projection(1024, 768));
        let last_upload = backend
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                GpuCommand::UniformMat4 { value, .. } => Some(value),
                _ => None,
            })
            .last();
        assert_eq!(last_upload, Some(screen_projection(1024, 768).to_cols_array()));
    }

    #[test]
    fn release_frees_program_then_buffer() {
        let (backend, renderer, _texture) = setup();
        renderer.release();
        let commands = backend.commands();
        assert!(matches!(commands[0], GpuCommand::DeleteProgram { .. }));
        assert!(matches!(commands[1], GpuCommand::DeleteQuadBuffer { .. }));
    }
}
