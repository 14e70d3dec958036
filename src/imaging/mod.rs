//! Image decoding and thumbnail generation.
//!
//! Pure Rust, no shell-outs: the `image` crate decodes JPEG/PNG/WebP/GIF/BMP/TIFF,
//! and raw sensor formats (CR2/NEF/DNG) go through `rawloader`+`imagepipe` when the
//! `raw` feature is enabled. Everything downstream — hashing, color statistics, the
//! embedded preview — operates on the same decoded `DynamicImage`.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("raw decoding is not enabled in this build (feature `raw`)")]
    RawDisabled,
    #[error("raw decode failed: {0}")]
    RawFailed(String),
}

/// Decoded image plus the decoder-reported format/color-mode strings that
/// become `data-format`/`data-mode` attributes.
pub struct Decoded {
    pub image: DynamicImage,
    pub format: String,
    pub mode: String,
}

const RAW_EXTS: &[&str] = &["cr2", "nef", "dng", "arw", "raf", "orf"];

pub fn is_raw_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| RAW_EXTS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode an image file. Raw formats are detected by extension and routed
/// through the raw pipeline (feature-gated); everything else goes through
/// the standard `image` crate decoder.
pub fn decode(path: &Path) -> Result<Decoded, DecodeError> {
    if is_raw_extension(path) {
        return decode_raw(path);
    }
    let bytes = std::fs::read(path).map_err(|e| DecodeError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let reader = image::ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
    let format = reader.format();
    let image = reader.decode()?;
    Ok(Decoded {
        mode: color_mode(&image),
        format: format_name(format),
        image,
    })
}

#[cfg(feature = "raw")]
fn decode_raw(path: &Path) -> Result<Decoded, DecodeError> {
    let raw = rawloader::decode_file(path).map_err(|e| DecodeError::RawFailed(e.to_string()))?;
    let params = imagepipe::Pipeline::new_from_source(imagepipe::ImageSource::Raw(raw))
        .map_err(|e| DecodeError::RawFailed(e.to_string()))?
        .output_8bit(None)
        .map_err(|e| DecodeError::RawFailed(e.to_string()))?;
    let buf = image::RgbImage::from_raw(params.width as u32, params.height as u32, params.data)
        .ok_or_else(|| DecodeError::RawFailed("decoded buffer size mismatch".to_string()))?;
    let image = DynamicImage::ImageRgb8(buf);
    Ok(Decoded {
        mode: color_mode(&image),
        format: "RAW".to_string(),
        image,
    })
}

#[cfg(not(feature = "raw"))]
fn decode_raw(_path: &Path) -> Result<Decoded, DecodeError> {
    Err(DecodeError::RawDisabled)
}

fn format_name(format: Option<ImageFormat>) -> String {
    match format {
        Some(ImageFormat::Jpeg) => "JPEG",
        Some(ImageFormat::Png) => "PNG",
        Some(ImageFormat::WebP) => "WEBP",
        Some(ImageFormat::Gif) => "GIF",
        Some(ImageFormat::Bmp) => "BMP",
        Some(ImageFormat::Tiff) => "TIFF",
        Some(other) => return format!("{:?}", other).to_uppercase(),
        None => "UNKNOWN",
    }
    .to_string()
}

fn color_mode(img: &DynamicImage) -> String {
    use image::DynamicImage::*;
    match img {
        ImageLuma8(_) | ImageLuma16(_) => "L",
        ImageLumaA8(_) | ImageLumaA16(_) => "LA",
        ImageRgb8(_) | ImageRgb16(_) | ImageRgb32F(_) => "RGB",
        ImageRgba8(_) | ImageRgba16(_) | ImageRgba32F(_) => "RGBA",
        _ => "RGB",
    }
    .to_string()
}

/// Resize to an exact `size x size` grayscale-agnostic square thumbnail used
/// as the common input for perceptual hashes (64x64) and algorithms/blur-hash
/// (256x256).
pub fn square_thumbnail(img: &DynamicImage, size: u32) -> DynamicImage {
    img.resize_to_fill(size, size, FilterType::Lanczos3)
}

/// Encode a thumbnail to bytes in the requested format for the embedded
/// base-64 preview. `avif` is not supported by the pure-Rust encoder stack
/// carried here and degrades to JPEG (logged once per call).
pub fn encode_thumbnail(img: &DynamicImage, thumb_type: &str, quality: u8) -> Result<(Vec<u8>, &'static str), DecodeError> {
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);
    match thumb_type.to_lowercase().as_str() {
        "png" => {
            img.write_to(&mut cursor, ImageFormat::Png)?;
            Ok((buf, "image/png"))
        }
        "webp" => {
            img.write_to(&mut cursor, ImageFormat::WebP)?;
            Ok((buf, "image/webp"))
        }
        other => {
            if other != "jpeg" && other != "jpg" {
                log::warn!("thumb_type {other:?} unsupported, falling back to jpeg");
            }
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
            img.to_rgb8()
                .write_with_encoder(encoder)?;
            Ok((buf, "image/jpeg"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |_, _| Rgb([10, 20, 30])))
    }

    #[test]
    fn square_thumbnail_is_exact_size() {
        let img = solid(300, 150);
        let thumb = square_thumbnail(&img, 64);
        assert_eq!(thumb.width(), 64);
        assert_eq!(thumb.height(), 64);
    }

    #[test]
    fn encode_thumbnail_jpeg_roundtrips() {
        let img = solid(32, 32);
        let (bytes, mime) = encode_thumbnail(&img, "jpeg", 80).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(mime, "image/jpeg");
        assert!(image::load_from_memory(&bytes).is_ok());
    }

    #[test]
    fn encode_thumbnail_png_roundtrips() {
        let img = solid(16, 16);
        let (bytes, mime) = encode_thumbnail(&img, "png", 80).unwrap();
        assert_eq!(mime, "image/png");
        assert!(image::load_from_memory(&bytes).is_ok());
    }

    #[test]
    fn unsupported_thumb_type_falls_back_to_jpeg() {
        let img = solid(16, 16);
        let (_, mime) = encode_thumbnail(&img, "avif", 80).unwrap();
        assert_eq!(mime, "image/jpeg");
    }

    #[test]
    fn raw_extension_detection() {
        assert!(is_raw_extension(Path::new("a.CR2")));
        assert!(is_raw_extension(Path::new("a.nef")));
        assert!(!is_raw_extension(Path::new("a.jpg")));
    }
}
