//! Sanity checks for images handed in at the intake boundary.

use std::path::Path;

use image::DynamicImage;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

pub const MIN_IMAGE_SIDE: u32 = 100;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "gif"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImageRejection {
    #[error("image too small ({width}x{height}), need at least 100x100")]
    TooSmall { width: u32, height: u32 },

    #[error("image appears blank (very low contrast, std dev {std_dev:.2})")]
    Blank { std_dev: f64 },

    #[error("image is completely white")]
    AllWhite,

    #[error("image is completely black")]
    AllBlack,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageStats {
    pub width: u32,
    pub height: u32,
    pub mean: f64,
    pub std_dev: f64,
}

#[instrument(level = "debug", skip(image))]
pub fn validate_image(image: &DynamicImage) -> Result<ImageStats, ImageRejection> {
    let (width, height) = (image.width(), image.height());
    if width < MIN_IMAGE_SIDE || height < MIN_IMAGE_SIDE {
        return Err(ImageRejection::TooSmall { width, height });
    }

    let gray = image.to_luma8();
    let count = gray.len() as f64;
    let mean = gray.iter().map(|&p| p as f64).sum::<f64>() / count;
    let variance = gray
        .iter()
        .map(|&p| (p as f64 - mean).powi(2))
        .sum::<f64>()
        / count;
    let std_dev = variance.sqrt();
    log::debug!("Image {width}x{height}, mean {mean:.1}, std dev {std_dev:.2}");

    if std_dev < 1.0 {
        return Err(ImageRejection::Blank { std_dev });
    }
    if mean > 254.0 {
        return Err(ImageRejection::AllWhite);
    }
    if mean < 1.0 {
        return Err(ImageRejection::AllBlack);
    }
    Ok(ImageStats {
        width,
        height,
        mean,
        std_dev,
    })
}

pub fn is_supported_extension(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|it| it.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|it| it.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}
