use std::cmp::Reverse;

use float_ord::FloatOrd;
use geo::{Area, Centroid, Coord, EuclideanLength, LineString, Polygon, Simplify};
use image::{imageops, imageops::FilterType, GrayImage};
use imageproc::{
    contours::{find_contours, BorderType},
    distance_transform::Norm,
    edges::canny,
    filter::gaussian_blur_f32,
    morphology::dilate_mut,
};
use tracing::instrument;

use crate::util::{distance, scale_to_max_side, to_geo_poly};

const BLUR_SIGMA: f32 = 1.1;
const CANNY_LOW: f32 = 75.0;
const CANNY_HIGH: f32 = 200.0;
const MAX_CANDIDATES: usize = 5;
/// Polygon approximation tolerance as a fraction of the contour perimeter.
const APPROX_EPSILON: f32 = 0.02;

/// Four corners of the answer sheet in source image coordinates, in no
/// particular order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SheetQuad {
    pub corners: [Coord<f32>; 4],
    /// Set when no outline was found and the whole frame stands in for it.
    pub fallback: bool,
}

impl SheetQuad {
    pub fn full_frame(width: u32, height: u32) -> Self {
        let right = width.saturating_sub(1) as f32;
        let bottom = height.saturating_sub(1) as f32;
        Self {
            corners: [
                Coord { x: 0.0, y: 0.0 },
                Coord { x: right, y: 0.0 },
                Coord { x: right, y: bottom },
                Coord { x: 0.0, y: bottom },
            ],
            fallback: true,
        }
    }
}

/// Finds the outline of the answer sheet.
///
/// Never fails. When no plausible four sided outline exists the full frame is
/// returned with [`SheetQuad::fallback`] set.
#[instrument(level = "debug", skip(gray), fields(width = gray.width(), height = gray.height()))]
pub fn locate_sheet(gray: &GrayImage, min_area_ratio: f32, max_side: u32) -> SheetQuad {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return SheetQuad::full_frame(width, height);
    }

    let scale = scale_to_max_side(width, height, max_side);
    let resized;
    let work = if scale.is_identity() {
        gray
    } else {
        resized = imageops::resize(
            gray,
            scale.target_width,
            scale.target_height,
            FilterType::Triangle,
        );
        &resized
    };

    let blurred = gaussian_blur_f32(work, BLUR_SIGMA);
    let mut edges = canny(&blurred, CANNY_LOW, CANNY_HIGH);
    // Closes single pixel gaps canny leaves at sharp corners.
    dilate_mut(&mut edges, Norm::LInf, 1);

    let min_area = min_area_ratio * scale.target_width as f32 * scale.target_height as f32;
    match find_quad(&edges, min_area) {
        Some(corners) => {
            let corners = corners.map(|it| scale.restore(it));
            log::debug!("Sheet outline found at {corners:?}");
            SheetQuad {
                corners,
                fallback: false,
            }
        }
        None => {
            log::warn!("No sheet outline found, falling back to the full {width}x{height} frame");
            SheetQuad::full_frame(width, height)
        }
    }
}

#[instrument(level = "trace", skip(edges))]
fn find_quad(edges: &GrayImage, min_area: f32) -> Option<[Coord<f32>; 4]> {
    let mut candidates = find_contours::<i32>(edges)
        .into_iter()
        .filter(|it| it.border_type == BorderType::Outer && it.parent.is_none())
        .filter(|it| it.points.len() > 3)
        .map(|it| {
            let poly = to_geo_poly(&it.points);
            let area = poly.unsigned_area();
            (poly, area)
        })
        .collect::<Vec<_>>();
    candidates.sort_by_key(|(_, area)| Reverse(FloatOrd(*area)));

    candidates
        .into_iter()
        .take(MAX_CANDIDATES)
        .take_while(|(_, area)| *area >= min_area)
        .find_map(|(poly, area)| {
            let quad = approximate_quad(&poly);
            log::trace!("Contour with area {area} approximates to quad {quad:?}");
            quad
        })
}

/// Douglas-Peucker approximation of a closed contour, kept only if it has
/// exactly four vertices.
///
/// The ring is rotated to start at the point farthest from the centroid,
/// which is always a corner of a convex outline. Started mid-edge, a corner
/// close to the start can fall within `epsilon` of the closing chord and be
/// lost.
fn approximate_quad(poly: &Polygon<f32>) -> Option<[Coord<f32>; 4]> {
    let ring = poly.exterior();
    let epsilon = APPROX_EPSILON * ring.euclidean_length();
    let center = poly.centroid()?.0;

    let mut points = ring.0.clone();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    let (start, _) = points
        .iter()
        .enumerate()
        .max_by_key(|(_, it)| FloatOrd(distance(**it, center)))?;
    points.rotate_left(start);
    points.push(points[0]);

    let LineString(mut vertices) = LineString::new(points).simplify(&epsilon);
    if vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }

    match vertices.as_slice() {
        [a, b, c, d] => Some([*a, *b, *c, *d]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use image::Luma;
    use imageproc::{drawing::draw_polygon_mut, point::Point};

    use super::*;

    fn sheet_on_table(width: u32, height: u32, corners: &[Point<i32>]) -> GrayImage {
        let mut image = GrayImage::from_pixel(width, height, Luma([40]));
        draw_polygon_mut(&mut image, corners, Luma([235]));
        image
    }

    fn assert_corners_near(found: &[Coord<f32>; 4], expected: &[Point<i32>], tolerance: f32) {
        for point in expected {
            let target = Coord {
                x: point.x as f32,
                y: point.y as f32,
            };
            let nearest = found
                .iter()
                .map(|it| distance(*it, target))
                .fold(f32::MAX, f32::min);
            assert!(
                nearest <= tolerance,
                "corner {point:?} not found in {found:?} (nearest {nearest})"
            );
        }
    }

    #[test]
    fn finds_skewed_sheet() {
        let corners = [
            Point::new(60, 40),
            Point::new(340, 60),
            Point::new(330, 260),
            Point::new(50, 250),
        ];
        let image = sheet_on_table(400, 300, &corners);
        let quad = locate_sheet(&image, 0.2, 0);
        assert!(!quad.fallback);
        assert_corners_near(&quad.corners, &corners, 4.0);
    }

    #[test]
    fn finds_sheet_on_downscaled_copy() {
        let corners = [
            Point::new(120, 80),
            Point::new(680, 120),
            Point::new(660, 520),
            Point::new(100, 500),
        ];
        let image = sheet_on_table(800, 600, &corners);
        let quad = locate_sheet(&image, 0.2, 400);
        assert!(!quad.fallback);
        assert_corners_near(&quad.corners, &corners, 8.0);
    }

    #[test]
    fn corner_next_to_trace_start_is_kept() {
        // The top edge rises slowly to the right, so the topmost row of the
        // outline starts well left of the top-right corner.
        let corners = [
            Point::new(60, 50),
            Point::new(360, 42),
            Point::new(350, 270),
            Point::new(50, 260),
        ];
        let image = sheet_on_table(400, 300, &corners);
        let quad = locate_sheet(&image, 0.2, 0);
        assert!(!quad.fallback);
        assert_corners_near(&quad.corners, &corners, 4.0);
    }

    #[test]
    fn finds_photographed_sheet_at_default_scale() {
        let corners = [
            Point::new(100, 120),
            Point::new(905, 100),
            Point::new(930, 1150),
            Point::new(80, 1130),
        ];
        let image = sheet_on_table(1000, 1250, &corners);
        let quad = locate_sheet(&image, 0.2, 1024);
        assert!(!quad.fallback);
        assert_corners_near(&quad.corners, &corners, 6.0);
    }

    #[test]
    fn blank_image_falls_back_to_full_frame() {
        let image = GrayImage::from_pixel(320, 240, Luma([200]));
        let quad = locate_sheet(&image, 0.2, 0);
        assert_eq!(quad, SheetQuad::full_frame(320, 240));
        assert!(quad.fallback);
    }

    #[test]
    fn small_quads_are_ignored() {
        let corners = [
            Point::new(100, 100),
            Point::new(140, 100),
            Point::new(140, 130),
            Point::new(100, 130),
        ];
        let image = sheet_on_table(400, 300, &corners);
        let quad = locate_sheet(&image, 0.2, 0);
        assert!(quad.fallback);
    }

    #[test]
    fn round_outline_is_not_a_sheet() {
        let mut image = GrayImage::from_pixel(400, 400, Luma([40]));
        imageproc::drawing::draw_filled_circle_mut(&mut image, (200, 200), 150, Luma([235]));
        let quad = locate_sheet(&image, 0.2, 0);
        assert!(quad.fallback);
    }
}
