//! Vertical image compositing.
//!
//! Stacks face crops top to bottom into one JPEG so a batch of crops can be
//! submitted as a single face-search query.

use crate::types::DetectionCrop;
use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("image {index} could not be decoded: {source}")]
    Decode {
        index: usize,
        source: image::ImageError,
    },
    #[error("composite encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("compositor task failed: {0}")]
    Join(String),
}

/// Combines several images into one.
#[async_trait]
pub trait ImageCompositor: Send + Sync {
    async fn compose(&self, images: Vec<DetectionCrop>) -> Result<Vec<u8>, ComposeError>;
}

/// Stacks images vertically on the blocking thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct VerticalCompositor;

#[async_trait]
impl ImageCompositor for VerticalCompositor {
    async fn compose(&self, images: Vec<DetectionCrop>) -> Result<Vec<u8>, ComposeError> {
        // The trivial cases need no decoding.
        if images.len() <= 1 {
            return compose_vertical(&images);
        }
        tokio::task::spawn_blocking(move || compose_vertical(&images))
            .await
            .map_err(|e| ComposeError::Join(e.to_string()))?
    }
}

/// Stack `images` vertically, left aligned, into a JPEG.
///
/// `[]` yields an empty buffer and a single image is returned unchanged.
/// The canvas is as wide as the widest input; uncovered area is black.
pub fn compose_vertical(images: &[DetectionCrop]) -> Result<Vec<u8>, ComposeError> {
    match images {
        [] => return Ok(Vec::new()),
        [only] => return Ok(only.0.clone()),
        _ => {}
    }

    let decoded = images
        .iter()
        .enumerate()
        .map(|(index, crop)| {
            image::load_from_memory(crop.as_bytes())
                .map(|img| img.to_rgb8())
                .map_err(|source| ComposeError::Decode { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let width = decoded.iter().map(|img| img.width()).max().unwrap_or(0);
    let height = decoded.iter().map(|img| img.height()).sum();
    let mut canvas = RgbImage::new(width, height);

    let mut y_offset = 0i64;
    for img in &decoded {
        image::imageops::overlay(&mut canvas, img, 0, y_offset);
        y_offset += i64::from(img.height());
    }

    let mut out = Cursor::new(Vec::new());
    canvas.write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}
