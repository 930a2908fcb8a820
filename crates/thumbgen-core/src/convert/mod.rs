//! Image converters: decode, downscale, re-encode, all in memory.
//!
//! One variant per converter kind, each carrying its own strongly-typed
//! configuration resolved once at startup. A converter never touches
//! storage; the scheduler feeds it source bytes and writes what it returns.

mod jpeg;
mod webp;

use anyhow::Result;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::config::ConverterConfig;
use crate::fingerprint;

pub use jpeg::JpegConverter;
pub use webp::WebpConverter;

/// Per-unit conversion failure, classified for the scheduler's logs.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("unsupported content type: {0}")]
    UnsupportedFormat(String),
    #[error("decode image")]
    Decode(#[source] image::ImageError),
    #[error("encode image")]
    Encode(#[source] image::ImageError),
}

pub enum Converter {
    Webp(WebpConverter),
    Jpeg(JpegConverter),
}

impl Converter {
    /// Build a converter and its identity from configuration. Runs once at
    /// startup; the config is never re-interpreted per file.
    pub fn from_config(cfg: &ConverterConfig) -> Result<Converter> {
        let identity = fingerprint::converter_identity(cfg)?;
        Ok(match cfg {
            ConverterConfig::Webp {
                quality,
                max_width,
                max_height,
            } => Converter::Webp(WebpConverter::new(*quality, *max_width, *max_height, identity)),
            ConverterConfig::Jpeg {
                quality,
                max_width,
                max_height,
                extension,
            } => Converter::Jpeg(JpegConverter::new(
                *quality,
                *max_width,
                *max_height,
                extension.as_deref().unwrap_or("jpg").to_owned(),
                identity,
            )),
        })
    }

    /// Digest of this converter's effective configuration.
    pub fn identity(&self) -> &str {
        match self {
            Converter::Webp(c) => c.identity(),
            Converter::Jpeg(c) => c.identity(),
        }
    }

    /// Deterministic destination path for an input path: the input's
    /// extension replaced with the converter's output extension.
    pub fn output_path_for(&self, input_path: &str) -> String {
        match self {
            Converter::Webp(_) => replace_extension(input_path, "webp"),
            Converter::Jpeg(c) => replace_extension(input_path, c.extension()),
        }
    }

    /// Decode, downscale if needed, and encode. Pure in-memory; no I/O.
    pub fn render(&self, content_type: &str, bytes: &[u8]) -> Result<Vec<u8>, ConvertError> {
        match self {
            Converter::Webp(c) => c.render(content_type, bytes),
            Converter::Jpeg(c) => c.render(content_type, bytes),
        }
    }
}

fn replace_extension(input_path: &str, new_ext: &str) -> String {
    let (dir, name) = match input_path.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, input_path),
    };
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    };
    match dir {
        Some(dir) => format!("{}/{}.{}", dir, stem, new_ext),
        None => format!("{}.{}", stem, new_ext),
    }
}

fn decode(content_type: &str, bytes: &[u8]) -> Result<DynamicImage, ConvertError> {
    let format = match content_type {
        "image/jpeg" => ImageFormat::Jpeg,
        "image/png" => ImageFormat::Png,
        "image/webp" => ImageFormat::WebP,
        other => return Err(ConvertError::UnsupportedFormat(other.to_owned())),
    };
    image::load_from_memory_with_format(bytes, format).map_err(ConvertError::Decode)
}

/// Scale down so both dimensions fit the configured bounds (0 = no bound),
/// preserving aspect ratio. Never upscales.
fn downscale(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let x_coef = if max_width == 0 {
        1.0
    } else {
        f64::from(max_width) / f64::from(img.width())
    };
    let y_coef = if max_height == 0 {
        1.0
    } else {
        f64::from(max_height) / f64::from(img.height())
    };
    let coef = x_coef.min(y_coef);
    if coef >= 1.0 {
        return img;
    }
    let width = ((f64::from(img.width()) * coef + 0.5) as u32).max(1);
    let height = ((f64::from(img.height()) * coef + 0.5) as u32).max(1);
    tracing::debug!(width, height, "downscaling image");
    img.resize_exact(width, height, FilterType::CatmullRom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 60, 30]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn webp_converter(max_width: u32, max_height: u32) -> Converter {
        Converter::from_config(&ConverterConfig::Webp {
            quality: 80,
            max_width,
            max_height,
        })
        .unwrap()
    }

    #[test]
    fn output_path_substitutes_the_extension() {
        let conv = webp_converter(0, 0);
        assert_eq!(conv.output_path_for("a.png"), "a.webp");
        assert_eq!(conv.output_path_for("sub/dir/b.jpeg"), "sub/dir/b.webp");
        assert_eq!(conv.output_path_for("archive.tar.gz"), "archive.tar.webp");
        assert_eq!(conv.output_path_for("noext"), "noext.webp");
        assert_eq!(conv.output_path_for("dir.v2/noext"), "dir.v2/noext.webp");
    }

    #[test]
    fn jpeg_output_extension_is_configurable() {
        let conv = Converter::from_config(&ConverterConfig::Jpeg {
            quality: 85,
            max_width: 0,
            max_height: 0,
            extension: Some("thumb.jpg".to_owned()),
        })
        .unwrap();
        assert_eq!(conv.output_path_for("a.png"), "a.thumb.jpg");

        let default = Converter::from_config(&ConverterConfig::Jpeg {
            quality: 85,
            max_width: 0,
            max_height: 0,
            extension: None,
        })
        .unwrap();
        assert_eq!(default.output_path_for("a.png"), "a.jpg");
    }

    #[test]
    fn webp_render_downscales_to_fit_bounds() {
        let conv = webp_converter(50, 0);
        let out = conv.render("image/png", &png_bytes(100, 40)).unwrap();
        let decoded = image::load_from_memory_with_format(&out, ImageFormat::WebP).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (50, 20));
    }

    #[test]
    fn render_never_upscales() {
        let conv = webp_converter(1000, 1000);
        let out = conv.render("image/png", &png_bytes(100, 40)).unwrap();
        let decoded = image::load_from_memory_with_format(&out, ImageFormat::WebP).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 40));
    }

    #[test]
    fn tighter_bound_wins_when_both_are_set() {
        let conv = webp_converter(50, 10);
        let out = conv.render("image/png", &png_bytes(100, 40)).unwrap();
        let decoded = image::load_from_memory_with_format(&out, ImageFormat::WebP).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (25, 10));
    }

    #[test]
    fn jpeg_render_produces_decodable_jpeg() {
        let conv = Converter::from_config(&ConverterConfig::Jpeg {
            quality: 85,
            max_width: 30,
            max_height: 0,
            extension: None,
        })
        .unwrap();
        let out = conv.render("image/png", &png_bytes(60, 60)).unwrap();
        let decoded = image::load_from_memory_with_format(&out, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (30, 30));
    }

    #[test]
    fn unsupported_content_type_is_rejected_before_decoding() {
        let conv = webp_converter(0, 0);
        let err = conv.render("text/plain", b"not an image").unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat(_)));
    }

    #[test]
    fn garbage_bytes_fail_as_decode_error() {
        let conv = webp_converter(0, 0);
        let err = conv.render("image/png", b"garbage").unwrap_err();
        assert!(matches!(err, ConvertError::Decode(_)));
    }
}
