// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rotation and vector helpers shared by the parser and the geometry builder

use nalgebra::Matrix3;

use crate::error::{IdfError, Result};
use crate::types::Point;

/// Relative tolerance below which two vectors count as (anti-)parallel
pub const PARALLEL_TOLERANCE: f64 = 1e-10;

/// Normalise a vector, returning it with its original magnitude
///
/// A zero vector is returned unchanged with magnitude zero.
pub fn normalise(v: &Point) -> (Point, f64) {
    let magnitude = v.norm();
    if magnitude == 0.0 {
        (*v, 0.0)
    } else {
        (v / magnitude, magnitude)
    }
}

/// Axis and angle (radians) rotating `a` onto `b`
///
/// The angle carries a negative sign: `-acos(a.b / |a||b|)`. Parallel
/// vectors need no rotation and give `Ok(None)`. Anti-parallel vectors fail
/// with [`IdfError::DegenerateRotation`].
pub fn axis_angle_between(a: &Point, b: &Point) -> Result<Option<(Point, f64)>> {
    let scale = a.norm() * b.norm();
    if scale == 0.0 {
        return Ok(None);
    }

    let cross = a.cross(b);
    let dot = a.dot(b);
    if cross.norm() <= PARALLEL_TOLERANCE * scale {
        if dot > 0.0 {
            return Ok(None);
        }
        return Err(IdfError::DegenerateRotation {
            component: String::new(),
            a: [a.x, a.y, a.z],
            b: [b.x, b.y, b.z],
        });
    }

    let (axis, _) = normalise(&cross);
    let angle = -(dot / scale).clamp(-1.0, 1.0).acos();
    Ok(Some((axis, angle)))
}

/// Rotation matrix for a rotation of `theta` radians about `axis`
///
/// The axis is normalised first.
pub fn rotation_matrix_from_axis_angle(axis: &Point, theta: f64) -> Matrix3<f64> {
    let (u, _) = normalise(axis);
    let (x, y, z) = (u.x, u.y, u.z);
    let c = theta.cos();
    let s = theta.sin();
    let t = 1.0 - c;

    Matrix3::new(
        c + x * x * t,
        x * y * t - z * s,
        x * z * t + y * s,
        y * x * t + z * s,
        c + y * y * t,
        y * z * t - x * s,
        z * x * t - y * s,
        z * y * t + x * s,
        c + z * z * t,
    )
}

/// Any unit vector orthogonal to `v`
pub fn get_an_orthogonal_unit_vector(v: &Point) -> Point {
    let candidate = if v.z.abs() < v.x.abs() {
        Point::new(v.y, -v.x, 0.0)
    } else {
        Point::new(0.0, -v.z, v.y)
    };
    normalise(&candidate).0
}

/// Rotate `v` about `axis` by `theta` radians
#[inline]
pub fn rotate(v: &Point, axis: &Point, theta: f64) -> Point {
    rotation_matrix_from_axis_angle(axis, theta) * v
}
