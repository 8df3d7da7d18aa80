use geo::Coord;
use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tracing::instrument;

use crate::{homography, locator::SheetQuad, util::distance};

/// Rectified sheet. All bubble geometry is expressed in this frame.
#[derive(Debug, Clone)]
pub struct CanonicalImage {
    pub image: GrayImage,
    /// Set when the warp was degenerate and `image` is the unwarped source.
    pub warp_fallback: bool,
}

impl CanonicalImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Orders corners as top-left, top-right, bottom-right, bottom-left.
///
/// Top-left has the smallest `x + y` and bottom-right the largest. Top-right
/// has the smallest `y - x` and bottom-left the largest. Ties go to the
/// earliest point.
pub fn order_corners(points: &[Coord<f32>; 4]) -> [Coord<f32>; 4] {
    let sum = |p: Coord<f32>| p.x + p.y;
    let diff = |p: Coord<f32>| p.y - p.x;
    [
        pick(points, sum, |a, b| a < b),
        pick(points, diff, |a, b| a < b),
        pick(points, sum, |a, b| a > b),
        pick(points, diff, |a, b| a > b),
    ]
}

fn pick(
    points: &[Coord<f32>; 4],
    key: impl Fn(Coord<f32>) -> f32,
    better: impl Fn(f32, f32) -> bool,
) -> Coord<f32> {
    points[1..].iter().fold(points[0], |best, &point| {
        if better(key(point), key(best)) {
            point
        } else {
            best
        }
    })
}

/// Size of the rectified sheet for ordered corners.
///
/// Each side uses the longer of its two opposite edges. Corners are pixel
/// positions, so an edge of length `n` spans `n + 1` pixels.
pub fn target_size(ordered: &[Coord<f32>; 4]) -> (u32, u32) {
    let [tl, tr, br, bl] = *ordered;
    let width = distance(tl, tr).max(distance(bl, br));
    let height = distance(tl, bl).max(distance(tr, br));
    (width.round() as u32 + 1, height.round() as u32 + 1)
}

/// Warps the located sheet into its canonical frame.
///
/// `target` forces the output size, otherwise it is derived from the corners.
/// A degenerate quadrilateral leaves the image unwarped.
#[instrument(level = "debug", skip(gray, quad))]
pub fn normalize(gray: &GrayImage, quad: &SheetQuad, target: Option<(u32, u32)>) -> CanonicalImage {
    let ordered = order_corners(&quad.corners);
    let (width, height) = target.unwrap_or_else(|| target_size(&ordered));

    if quad.fallback && (width, height) == gray.dimensions() {
        log::debug!("Full frame quad at native size, skipping warp");
        return CanonicalImage {
            image: gray.clone(),
            warp_fallback: false,
        };
    }
    if width < 2 || height < 2 {
        log::warn!("Sheet collapses to {width}x{height}, leaving image unwarped");
        return unwarped(gray);
    }

    let right = (width - 1) as f32;
    let bottom = (height - 1) as f32;
    let destination = [
        Coord { x: 0.0, y: 0.0 },
        Coord { x: right, y: 0.0 },
        Coord { x: right, y: bottom },
        Coord { x: 0.0, y: bottom },
    ];
    let projection = match homography::from_four_points(&ordered, &destination) {
        Ok(h) => Projection::from_matrix(homography::to_row_major(&h)),
        Err(err) => {
            log::warn!("Degenerate sheet corners {ordered:?}: {err}");
            None
        }
    };
    let Some(projection) = projection else {
        log::warn!("Perspective transform unavailable, leaving image unwarped");
        return unwarped(gray);
    };

    let mut image = GrayImage::new(width, height);
    warp_into(
        gray,
        &projection,
        Interpolation::Bilinear,
        Luma([255]),
        &mut image,
    );
    log::debug!(
        "Warped {}x{} source into {width}x{height} canonical frame",
        gray.width(),
        gray.height()
    );
    CanonicalImage {
        image,
        warp_fallback: false,
    }
}

fn unwarped(gray: &GrayImage) -> CanonicalImage {
    CanonicalImage {
        image: gray.clone(),
        warp_fallback: true,
    }
}
