use chamber_core::resource::ResourceLoader;
use image::RgbaImage;

use crate::backend::GraphicsBackend;
use crate::error::RenderError;

/// Decodes an encoded image to RGBA8, flipped so that row 0 is the bottom of
/// the picture. Texture coordinate (0, 0) then samples the bottom-left pixel,
/// matching the renderer's bottom-left screen origin.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, RenderError> {
    let image =
        image::load_from_memory(bytes).map_err(|e| RenderError::ImageDecode(e.to_string()))?;
    Ok(image.flipv().into_rgba8())
}

pub struct Texture<B: GraphicsBackend> {
    raw: B::Texture,
    width: u32,
    height: u32,
    label: String,
}

impl<B: GraphicsBackend> Texture<B> {
    pub fn from_bytes(backend: &mut B, bytes: &[u8], label: &str) -> Result<Self, RenderError> {
        let image = decode_rgba(bytes).map_err(|err| match err {
            RenderError::ImageDecode(reason) => {
                RenderError::ImageDecode(format!("{label}: {reason}"))
            }
            other => other,
        })?;
        Ok(Self::from_image(backend, &image, label))
    }

    pub fn from_image(backend: &mut B, image: &RgbaImage, label: &str) -> Self {
        let (width, height) = image.dimensions();
        let raw = backend.create_texture(image, label);
        log::debug!("Texture '{}' uploaded ({}x{})", label, width, height);
        Self {
            raw,
            width,
            height,
            label: label.to_string(),
        }
    }

    /// Reads `path` through `loader` and uploads it.
    pub fn load(backend: &mut B, loader: &ResourceLoader, path: &str) -> Result<Self, RenderError> {
        let bytes = loader.read(path)?;
        Self::from_bytes(backend, &bytes, path)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bind(&self, backend: &mut B, unit: u32) {
        backend.bind_texture(&self.raw, unit);
    }

    pub fn raw(&self) -> &B::Texture {
        &self.raw
    }

    pub fn release(self) {
        log::debug!("Releasing texture '{}'", self.label);
    }
}
