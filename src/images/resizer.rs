use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use log::info;

use super::{ImageFormat, ResizeError, ResizeRequest, Resizer};
use crate::storage::ObjectStore;

/// Resizer backed by the origin bucket and the `image` crate.
pub struct ImageResizer {
    store: Arc<dyn ObjectStore>,
    jpeg_quality: u8,
}

impl ImageResizer {
    pub fn new(store: Arc<dyn ObjectStore>, jpeg_quality: u8) -> Self {
        Self {
            store,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }
}

#[async_trait]
impl Resizer for ImageResizer {
    async fn resize(&self, request: &ResizeRequest) -> Result<Bytes, ResizeError> {
        let download_start = Instant::now();
        let source = self.store.get_object(&request.object_key).await?;
        info!(
            "Downloaded {} ({} bytes) in {}ms",
            request.object_key,
            source.bytes.len(),
            download_start.elapsed().as_millis()
        );

        let (width, height, format, quality) =
            (request.width, request.height, request.format, self.jpeg_quality);

        // Decoding and encoding are CPU bound
        let output = tokio::task::spawn_blocking(move || {
            convert_image(&source.bytes, width, height, format, quality)
        })
        .await
        .map_err(|e| ResizeError::TaskFailed(e.to_string()))??;

        Ok(Bytes::from(output))
    }
}

/// Decodes `data`, fits it inside `width` x `height` and encodes it as `format`.
/// A zero width or height keeps the original dimensions.
pub fn convert_image(
    data: &[u8],
    width: u32,
    height: u32,
    format: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, ResizeError> {
    let start = Instant::now();
    let img = image::load_from_memory(data)
        .map_err(|e| ResizeError::ImageError(format!("Failed to load image: {}", e)))?;
    let (original_width, original_height) = (img.width(), img.height());

    let resized = fit_within(img, width, height);
    info!(
        "original: {}x{}, target: {}x{}, output: {}x{}, done in {}ms",
        original_width,
        original_height,
        width,
        height,
        resized.width(),
        resized.height(),
        start.elapsed().as_millis()
    );

    encode_image(resized, format, quality)
}

// Only ever shrinks: the output is bounded by the source, not by the request
fn fit_within(img: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if width == 0 || height == 0 {
        return img;
    }
    if width >= img.width() && height >= img.height() {
        return img;
    }
    img.thumbnail(width, height)
}

fn encode_image(img: DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, ResizeError> {
    let mut output = Vec::new();

    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = img.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
            encoder
                .encode_image(&rgb)
                .map_err(|e| ResizeError::ImageError(format!("JPEG encoding failed: {}", e)))?;
        }
        ImageFormat::Png => {
            img.write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png)
                .map_err(|e| ResizeError::ImageError(format!("PNG encoding failed: {}", e)))?;
        }
    }

    Ok(output)
}
