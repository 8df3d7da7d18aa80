use geo::{Coord, EuclideanLength, Line, LineString, Polygon};
use image::{imageops, GrayImage};
use imageproc::{point::Point, rect::Rect};

pub(crate) fn to_geo_poly(points: &[Point<i32>]) -> Polygon<f32> {
    let points = points
        .iter()
        .map(|point| Coord {
            x: point.x as f32,
            y: point.y as f32,
        })
        .collect();
    Polygon::new(LineString::new(points), vec![])
}

pub(crate) fn distance(a: Coord<f32>, b: Coord<f32>) -> f32 {
    Line::new(a, b).euclidean_length()
}

/// Twice the signed area of the triangle `a b c`.
pub(crate) fn cross(a: Coord<f32>, b: Coord<f32>, c: Coord<f32>) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub factor_x: f32,
    pub factor_y: f32,
    pub target_width: u32,
    pub target_height: u32,
}

impl Scale {
    pub fn is_identity(&self) -> bool {
        self.factor_x == 1.0 && self.factor_y == 1.0
    }

    /// Maps a point from the scaled image back into the source image.
    pub fn restore(&self, point: Coord<f32>) -> Coord<f32> {
        Coord {
            x: point.x * self.factor_x,
            y: point.y * self.factor_y,
        }
    }
}

/// Fits `width x height` into a `max_side` square, keeping the aspect ratio.
/// A `max_side` of 0 means no limit.
pub fn scale_to_max_side(width: u32, height: u32, max_side: u32) -> Scale {
    let longest = width.max(height);
    if max_side == 0 || longest <= max_side {
        return Scale {
            factor_x: 1.0,
            factor_y: 1.0,
            target_width: width,
            target_height: height,
        };
    }
    let ratio = max_side as f32 / longest as f32;
    let target_width = ((width as f32 * ratio).round() as u32).max(1);
    let target_height = ((height as f32 * ratio).round() as u32).max(1);
    let factor_x = width as f32 / target_width as f32;
    let factor_y = height as f32 / target_height as f32;
    log::debug!("Resize will change image dimensions from (w: {width}, h: {height}) to (w: {target_width}, h: {target_height}) with scaling factor ({factor_x}, {factor_y}).");
    Scale {
        factor_x,
        factor_y,
        target_width,
        target_height,
    }
}

/// Crops `rect` grown by `padding` on every side, clamped to the image.
///
/// Returns the crop and where `rect` sits inside it.
pub(crate) fn crop_padded(image: &GrayImage, rect: Rect, padding: u32) -> Option<(GrayImage, Rect)> {
    if image.width() == 0 || image.height() == 0 {
        return None;
    }
    let frame = Rect::at(0, 0).of_size(image.width(), image.height());
    let grown = Rect::at(rect.left() - padding as i32, rect.top() - padding as i32)
        .of_size(rect.width() + 2 * padding, rect.height() + 2 * padding);
    let outer = grown.intersect(frame)?;
    let inner = rect.intersect(frame)?;
    log::trace!("Slicing subimage to {outer:?}");
    let crop = imageops::crop_imm(
        image,
        outer.left() as u32,
        outer.top() as u32,
        outer.width(),
        outer.height(),
    )
    .to_image();
    let inner = Rect::at(inner.left() - outer.left(), inner.top() - outer.top())
        .of_size(inner.width(), inner.height());
    Some((crop, inner))
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    #[test]
    fn scale_keeps_small_images() {
        let scale = scale_to_max_side(800, 600, 1024);
        assert!(scale.is_identity());
        assert_eq!((scale.target_width, scale.target_height), (800, 600));
        assert!(scale_to_max_side(5000, 4000, 0).is_identity());
    }

    #[test]
    fn scale_shrinks_longest_side() {
        let scale = scale_to_max_side(4000, 3000, 1000);
        assert_eq!((scale.target_width, scale.target_height), (1000, 750));
        let restored = scale.restore(Coord { x: 500.0, y: 375.0 });
        assert!((restored.x - 2000.0).abs() < 1e-3);
        assert!((restored.y - 1500.0).abs() < 1e-3);
    }

    #[test]
    fn padded_crop_is_clamped() {
        let image = GrayImage::from_fn(20, 10, |x, y| Luma([(x + y * 20) as u8]));
        let (crop, inner) = crop_padded(&image, Rect::at(1, 2).of_size(4, 3), 3).unwrap();
        assert_eq!(crop.dimensions(), (8, 8));
        assert_eq!(inner, Rect::at(1, 2).of_size(4, 3));
        assert_eq!(crop.get_pixel(inner.left() as u32, inner.top() as u32), &Luma([41]));
    }

    #[test]
    fn crop_outside_image_is_none() {
        let image = GrayImage::new(20, 10);
        assert!(crop_padded(&image, Rect::at(30, 2).of_size(4, 3), 2).is_none());
    }
}
