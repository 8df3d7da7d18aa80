//! Grades photographed multiple-choice answer sheets.
//!
//! The pipeline runs strictly in order for every sheet: locate the sheet
//! outline, warp it into a canonical frame, lay the bubble grid over it, read
//! each question and score the answers against a versioned key. Nothing is
//! kept between calls, so one [`SheetEvaluator`] can grade sheets from many
//! threads at once.

mod answer_key;
pub mod config;
pub mod decoder;
mod error;
pub mod grid;
pub mod homography;
pub mod locator;
pub mod perspective;
mod result;
pub mod scoring;
pub mod util;
pub mod validation;

pub use answer_key::*;
pub use error::*;
pub use grid::{BubbleCell, BubbleGrid, LayoutConfig};
pub use result::*;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    decoder::decode_question, grid::map_grid, locator::locate_sheet, perspective::normalize,
};

/// Tuning for a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationOptions {
    /// Fraction of a cell that must be marked for its option to count.
    pub fill_threshold: f32,
    /// Smallest sheet outline accepted, as a fraction of the image area.
    pub min_sheet_area_ratio: f32,
    /// Resample the sheet to this size instead of its measured size. Set
    /// both to match the layout's template, or either to 0 to keep the
    /// measured size.
    pub canonical_width: Option<u32>,
    pub canonical_height: Option<u32>,
    /// Longest side the outline search runs at, 0 for full resolution.
    pub max_locate_side: u32,
    pub cell_blur_sigma: f32,
    pub block_radius: u32,
    pub threshold_offset: u8,
    /// Reject unusable photos (tiny, blank, all white or black) up front.
    pub validate_input: bool,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            fill_threshold: 0.05,
            min_sheet_area_ratio: 0.2,
            canonical_width: Some(800),
            canonical_height: Some(1000),
            max_locate_side: 1024,
            cell_blur_sigma: 0.8,
            block_radius: 5,
            threshold_offset: 2,
            validate_input: false,
        }
    }
}

impl EvaluationOptions {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let unit = |name, value: f32| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigurationError::InvalidOption {
                    name,
                    range: "0.0..=1.0",
                    value,
                })
            }
        };
        unit("fill_threshold", self.fill_threshold)?;
        unit("min_sheet_area_ratio", self.min_sheet_area_ratio)?;
        if !(self.cell_blur_sigma >= 0.0 && self.cell_blur_sigma.is_finite()) {
            return Err(ConfigurationError::InvalidOption {
                name: "cell_blur_sigma",
                range: "0.0..",
                value: self.cell_blur_sigma,
            });
        }
        if self.block_radius == 0 {
            return Err(ConfigurationError::InvalidOption {
                name: "block_radius",
                range: "1..",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Forced canonical size, when both sides are set and non-zero.
    pub fn canonical_size(&self) -> Option<(u32, u32)> {
        self.canonical_width
            .zip(self.canonical_height)
            .filter(|(width, height)| *width > 0 && *height > 0)
    }
}

/// Grades one sheet with default options.
pub fn evaluate(
    image: &DynamicImage,
    key: &AnswerKey,
    layout: &LayoutConfig,
) -> Result<SheetEvaluationResult, EvaluationError> {
    evaluate_with_options(image, key, layout, &EvaluationOptions::default())
}

/// Decodes `bytes` and grades the sheet.
pub fn evaluate_bytes(
    bytes: &[u8],
    key: &AnswerKey,
    layout: &LayoutConfig,
    options: &EvaluationOptions,
) -> Result<SheetEvaluationResult, EvaluationError> {
    let image = image::load_from_memory(bytes)?;
    evaluate_with_options(&image, key, layout, options)
}

#[instrument(skip_all, fields(version = key.version(), width = image.width(), height = image.height()))]
pub fn evaluate_with_options(
    image: &DynamicImage,
    key: &AnswerKey,
    layout: &LayoutConfig,
    options: &EvaluationOptions,
) -> Result<SheetEvaluationResult, EvaluationError> {
    options.validate()?;
    layout.validate()?;
    layout.check_key(key)?;
    if options.validate_input {
        let stats = validation::validate_image(image)?;
        log::debug!("Input accepted: {stats:?}");
    }

    let gray = image.to_luma8();
    let quad = locate_sheet(&gray, options.min_sheet_area_ratio, options.max_locate_side);
    let canonical = normalize(&gray, &quad, options.canonical_size());
    #[cfg(feature = "debug")]
    if let Err(err) = canonical.image.save("debug/canonical.png") {
        log::warn!("Failed to write debug image: {err}");
    }

    let grid = map_grid(layout, canonical.width(), canonical.height());
    let options_per_question = layout.options_per_question as usize;
    let decoded = grid
        .questions
        .iter()
        .map(|question| decode_question(&canonical.image, question, options_per_question, options))
        .collect::<Vec<_>>();

    let mut result = scoring::score(decoded, key)?;
    result.diagnostics.sheet_fallback = quad.fallback;
    result.diagnostics.warp_fallback = canonical.warp_fallback;
    if result.is_low_confidence() {
        log::warn!("Low confidence evaluation: {:?}", result.diagnostics);
    }
    Ok(result)
}

/// Builds a [`SheetEvaluator`] with every key checked against the layout.
#[derive(Debug, Clone, Default)]
pub struct SheetEvaluatorBuilder {
    layout: LayoutConfig,
    options: EvaluationOptions,
    keys: AnswerKeySet,
}

impl SheetEvaluatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    pub fn options(mut self, options: EvaluationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn keys(mut self, keys: AnswerKeySet) -> Self {
        self.keys = keys;
        self
    }

    pub fn key(mut self, key: AnswerKey) -> Self {
        self.keys.insert(key);
        self
    }

    #[instrument(skip(self), level = "debug")]
    pub fn build(self) -> Result<SheetEvaluator, ConfigurationError> {
        self.options.validate()?;
        self.layout.validate()?;
        for version in self.keys.versions() {
            self.layout.check_key(self.keys.get(version)?)?;
        }
        log::debug!(
            "Evaluator ready with {} answer key(s): {:?}",
            self.keys.len(),
            self.keys.versions().collect::<Vec<_>>()
        );
        Ok(SheetEvaluator {
            layout: self.layout,
            options: self.options,
            keys: self.keys,
        })
    }
}

/// Validated, immutable grading setup shared by any number of evaluations.
#[derive(Debug, Clone)]
pub struct SheetEvaluator {
    layout: LayoutConfig,
    options: EvaluationOptions,
    keys: AnswerKeySet,
}

impl SheetEvaluator {
    pub fn builder() -> SheetEvaluatorBuilder {
        SheetEvaluatorBuilder::new()
    }

    pub fn keys(&self) -> &AnswerKeySet {
        &self.keys
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    pub fn evaluate(
        &self,
        image: &DynamicImage,
        version: &str,
    ) -> Result<SheetEvaluationResult, EvaluationError> {
        let key = self.keys.get(version)?;
        evaluate_with_options(image, key, &self.layout, &self.options)
    }

    pub fn evaluate_bytes(
        &self,
        bytes: &[u8],
        version: &str,
    ) -> Result<SheetEvaluationResult, EvaluationError> {
        let key = self.keys.get(version)?;
        evaluate_bytes(bytes, key, &self.layout, &self.options)
    }
}
