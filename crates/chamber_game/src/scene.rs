//! The demo scene: one player sprite drawn near the middle of the viewport.
//!
//! Generic over the graphics backend so the whole frame can be exercised
//! against the recording backend in tests.

use chamber_core::resource::ResourceLoader;
use chamber_render::{GraphicsBackend, RenderError, SpriteRenderer, Texture};

pub const PLAYER_TEXTURE_PATH: &str = "/assets/player.png";
pub const PLAYER_SIZE: f32 = 24.0;
pub const CLEAR_COLOR: [f32; 4] = [0.08, 0.08, 0.1, 1.0];

/// Player rectangle `(x, y, w, h)`: offset one sprite size down-left of the
/// viewport center, so its top-right corner sits on the center.
pub fn player_rect(viewport: (u32, u32)) -> (f32, f32, f32, f32) {
    let x = viewport.0 as f32 / 2.0 - PLAYER_SIZE;
    let y = viewport.1 as f32 / 2.0 - PLAYER_SIZE;
    (x, y, PLAYER_SIZE, PLAYER_SIZE)
}

pub struct Scene<B: GraphicsBackend> {
    // Dropped before the renderer that drew it.
    player: Texture<B>,
    renderer: SpriteRenderer<B>,
}

impl<B: GraphicsBackend> Scene<B> {
    /// Sets global render state, then builds the renderer and loads the
    /// player texture.
    pub fn new(
        backend: &mut B,
        loader: &ResourceLoader,
        viewport: (u32, u32),
    ) -> Result<Self, RenderError> {
        backend.enable_alpha_blending();
        backend.set_clear_color(CLEAR_COLOR);
        backend.set_viewport(viewport.0, viewport.1);

        let renderer = SpriteRenderer::new(backend)?;
        let player = Texture::load(backend, loader, PLAYER_TEXTURE_PATH)?;
        log::info!(
            "Loaded {} ({}x{})",
            PLAYER_TEXTURE_PATH,
            player.width(),
            player.height()
        );

        Ok(Self { player, renderer })
    }

    pub fn render(&mut self, backend: &mut B, viewport: (u32, u32)) -> Result<(), RenderError> {
        backend.clear();

        let (x, y, w, h) = player_rect(viewport);
        self.renderer.begin(backend, viewport.0, viewport.1)?;
        self.renderer.draw(backend, &self.player, x, y, w, h)?;
        self.renderer.end(backend)
    }

    pub fn renderer(&self) -> &SpriteRenderer<B> {
        &self.renderer
    }
}

/// Applies a framebuffer resize. Returns false for a zero-sized (minimized)
/// framebuffer, which leaves everything untouched.
pub fn apply_resize<B: GraphicsBackend>(
    backend: &mut B,
    viewport: &mut (u32, u32),
    width: u32,
    height: u32,
) -> bool {
    if width == 0 || height == 0 {
        return false;
    }
    *viewport = (width, height);
    backend.set_viewport(width, height);
    true
}
