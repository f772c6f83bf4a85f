use std::io::Cursor;

use axum::body::Bytes;
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use thiserror::Error;

/// Thumbnails never exceed this size on their larger side.
pub const MAX_WIDTH: u32 = 192;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("thumbnail worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub struct Thumbnail {
    pub data: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Resizes on the blocking pool since decoding and resampling are CPU bound.
pub async fn generate(data: Bytes) -> Result<Thumbnail, ThumbnailError> {
    let thumbnail = tokio::task::spawn_blocking(move || generate_blocking(&data, MAX_WIDTH)).await??;
    Ok(thumbnail)
}

/// Scales the image so that its larger dimension is at most `max_size`.
///
/// Smaller images keep their dimensions. The thumbnail is encoded in the
/// source format when the encoder supports it, PNG otherwise.
pub fn generate_blocking(data: &[u8], max_size: u32) -> Result<Thumbnail, image::ImageError> {
    let format = image::guess_format(data)?;
    let img = image::load_from_memory_with_format(data, format)?;

    let (width, height) = fit_within(img.width(), img.height(), max_size);
    let resized = if (width, height) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3)
    };

    let format = output_format(format);
    let encoded = encode(&resized, format)?;

    Ok(Thumbnail {
        data: encoded,
        content_type: format.to_mime_type(),
        width,
        height,
    })
}

fn fit_within(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    let larger = width.max(height);
    if larger <= max_size {
        return (width, height);
    }

    let scale = f64::from(max_size) / f64::from(larger);
    let scaled = |side: u32| -> u32 {
        // bounded by max_size, so the cast cannot truncate
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let side = (f64::from(side) * scale).round() as u32;
        side.clamp(1, max_size)
    };
    (scaled(width), scaled(height))
}

fn output_format(source: ImageFormat) -> ImageFormat {
    match source {
        ImageFormat::Jpeg
        | ImageFormat::Png
        | ImageFormat::Gif
        | ImageFormat::Bmp
        | ImageFormat::Tiff
        | ImageFormat::WebP => source,
        _ => ImageFormat::Png,
    }
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    if format == ImageFormat::Jpeg && img.color().has_alpha() {
        DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut buffer, format)?;
    } else {
        img.write_to(&mut buffer, format)?;
    }
    Ok(buffer.into_inner())
}
