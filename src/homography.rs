//! Exact four-point homography.
//!
//! Solves the 8x8 linear system of the Direct Linear Transform with `h33`
//! fixed to one. Callers get an error instead of a garbage matrix when the
//! correspondence is degenerate.

use geo::Coord;
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use thiserror::Error;

use crate::util::cross;

/// Below this, three of the four points are treated as collinear.
const MIN_TRIANGLE_AREA: f32 = 1e-3;
const MIN_DETERMINANT: f64 = 1e-12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HomographyError {
    #[error("points {0:?} are collinear")]
    Collinear([usize; 3]),

    #[error("linear system is singular")]
    Singular,
}

/// Computes `H` with `H * [src, 1]^T ~ [dst, 1]^T` for all four pairs.
pub fn from_four_points(
    src: &[Coord<f32>; 4],
    dst: &[Coord<f32>; 4],
) -> Result<Matrix3<f64>, HomographyError> {
    check_general_position(src)?;
    check_general_position(dst)?;

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (i, (s, d)) in src.iter().zip(dst).enumerate() {
        let (x, y) = (s.x as f64, s.y as f64);
        let (u, v) = (d.x as f64, d.y as f64);
        let r = 2 * i;
        a.row_mut(r)
            .copy_from_slice(&[x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y]);
        a.row_mut(r + 1)
            .copy_from_slice(&[0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y]);
        b[r] = u;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b).ok_or(HomographyError::Singular)?;
    let h = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
    if !h.iter().all(|it| it.is_finite()) || h.determinant().abs() < MIN_DETERMINANT {
        return Err(HomographyError::Singular);
    }
    Ok(h)
}

/// Applies `h` to a point. `None` when the point maps to infinity.
pub fn project(h: &Matrix3<f64>, point: Coord<f32>) -> Option<Coord<f32>> {
    let p = h * Vector3::new(point.x as f64, point.y as f64, 1.0);
    if p[2].abs() < 1e-15 {
        return None;
    }
    Some(Coord {
        x: (p[0] / p[2]) as f32,
        y: (p[1] / p[2]) as f32,
    })
}

/// Row-major `f32` copy, the layout `imageproc` projections are built from.
pub fn to_row_major(h: &Matrix3<f64>) -> [f32; 9] {
    let mut out = [0.0; 9];
    for (i, value) in out.iter_mut().enumerate() {
        *value = h[(i / 3, i % 3)] as f32;
    }
    out
}

fn check_general_position(points: &[Coord<f32>; 4]) -> Result<(), HomographyError> {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    for triple in TRIPLES {
        let [a, b, c] = triple.map(|i| points[i]);
        if cross(a, b, c).abs() < MIN_TRIANGLE_AREA {
            return Err(HomographyError::Collinear(triple));
        }
    }
    Ok(())
}
