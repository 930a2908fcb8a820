//! Jpeg converter using image's built-in encoder.

use image::codecs::jpeg::JpegEncoder;

use super::{decode, downscale, ConvertError};

pub struct JpegConverter {
    quality: u8,
    max_width: u32,
    max_height: u32,
    extension: String,
    identity: String,
}

impl JpegConverter {
    pub(crate) fn new(
        quality: u8,
        max_width: u32,
        max_height: u32,
        extension: String,
        identity: String,
    ) -> Self {
        Self {
            quality,
            max_width,
            max_height,
            extension,
            identity,
        }
    }

    pub(crate) fn identity(&self) -> &str {
        &self.identity
    }

    pub(crate) fn extension(&self) -> &str {
        &self.extension
    }

    pub(crate) fn render(&self, content_type: &str, bytes: &[u8]) -> Result<Vec<u8>, ConvertError> {
        let img = decode(content_type, bytes)?;
        let img = downscale(img, self.max_width, self.max_height);
        // Jpeg has no alpha channel.
        let rgb = img.to_rgb8();
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
        encoder.encode_image(&rgb).map_err(ConvertError::Encode)?;
        Ok(out)
    }
}
