pub mod backend;
pub mod error;
pub mod gpu_context;
pub mod projection;
pub mod recording;
pub mod shader;
pub mod sprite_renderer;
pub mod texture;
pub mod vertex;
pub mod wgpu_backend;

pub use backend::GraphicsBackend;
pub use error::RenderError;
pub use gpu_context::GpuContext;
pub use projection::{screen_projection, ProjectionUniform};
pub use recording::{GpuCommand, RecordingBackend};
pub use shader::{ShaderProgram, ShaderStage, UniformInfo, UniformKind, UniformLocation};
pub use sprite_renderer::{RendererState, SpriteRenderer};
pub use texture::Texture;
pub use vertex::SpriteVertex;
pub use wgpu_backend::WgpuBackend;
