use std::sync::Arc;
use winit::error::OsError;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

use crate::config::PlatformConfig;

/// Creates the main window. It starts hidden; call `set_visible(true)` once
/// the GPU surface is configured so the first visible frame is not garbage.
pub fn create_window(
    event_loop: &ActiveEventLoop,
    config: &PlatformConfig,
) -> Result<Arc<Window>, OsError> {
    let attrs = WindowAttributes::default()
        .with_title(&config.title)
        .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height))
        .with_resizable(config.resizable)
        .with_visible(false);

    let window = event_loop.create_window(attrs)?;
    Ok(Arc::new(window))
}
