//! Lossy webp converter backed by libwebp.

use super::{decode, downscale, ConvertError};

pub struct WebpConverter {
    quality: u8,
    max_width: u32,
    max_height: u32,
    identity: String,
}

impl WebpConverter {
    pub(crate) fn new(quality: u8, max_width: u32, max_height: u32, identity: String) -> Self {
        Self {
            quality,
            max_width,
            max_height,
            identity,
        }
    }

    pub(crate) fn identity(&self) -> &str {
        &self.identity
    }

    pub(crate) fn render(&self, content_type: &str, bytes: &[u8]) -> Result<Vec<u8>, ConvertError> {
        let img = decode(content_type, bytes)?;
        let img = downscale(img, self.max_width, self.max_height);
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let encoded =
            webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode(f32::from(self.quality));
        Ok(encoded.to_vec())
    }
}
