//! Axis-angle rotations and homogeneous transform helpers.
//!
//! Matrices follow the column-vector convention: `p' = M · [p, 1]ᵀ`, so a
//! product `A · B` applies `B` first.

use super::{Mat4, Vec3};
use crate::GeometryError;

/// Rotate `p` by the Rodrigues vector `rvec`.
///
/// `p' = cosθ·p + sinθ·(v×p) + (1−cosθ)(v·p)v` with `θ = ‖rvec‖` and
/// `v = rvec / θ`. A zero vector is the identity rotation.
pub fn rotate_rodrigues(p: &Vec3, rvec: &Vec3) -> Vec3 {
    let theta = rvec.norm();
    if theta == 0.0 {
        return *p;
    }
    let v = rvec / theta;
    let (sin_t, cos_t) = theta.sin_cos();
    p * cos_t + v.cross(p) * sin_t + v * (v.dot(p) * (1.0 - cos_t))
}

/// Rotate each point by its own Rodrigues vector.
pub fn rotate_rodrigues_batch(points: &[Vec3], rvecs: &[Vec3]) -> Result<Vec<Vec3>, GeometryError> {
    if points.len() != rvecs.len() {
        return Err(GeometryError::LengthMismatch {
            expected: points.len(),
            got: rvecs.len(),
        });
    }
    Ok(points
        .iter()
        .zip(rvecs)
        .map(|(p, r)| rotate_rodrigues(p, r))
        .collect())
}

/// Homogeneous rotation about `axis` (through the origin) by `angle_deg` degrees.
///
/// `axis` is expected to be unit length; it is used as given.
pub fn axis_rotation_matrix(axis: &Vec3, angle_deg: f64) -> Mat4 {
    let (s, c) = angle_deg.to_radians().sin_cos();
    let t = 1.0 - c;
    let (x, y, z) = (axis.x, axis.y, axis.z);

    Mat4::new(
        t * x * x + c,
        t * x * y - s * z,
        t * x * z + s * y,
        0.0,
        t * x * y + s * z,
        t * y * y + c,
        t * y * z - s * x,
        0.0,
        t * x * z - s * y,
        t * y * z + s * x,
        t * z * z + c,
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
    )
}

pub fn translation_matrix(v: &Vec3) -> Mat4 {
    Mat4::new_translation(v)
}

/// Rotation about an axis passing through `origin`.
///
/// Equivalent to translating by `-origin`, rotating, then translating back.
pub fn pivoted_rotation(origin: &Vec3, axis: &Vec3, angle_deg: f64) -> Mat4 {
    translation_matrix(origin) * axis_rotation_matrix(axis, angle_deg) * translation_matrix(&-origin)
}

/// Apply a homogeneous transform to a point.
pub fn transform_point(m: &Mat4, p: &Vec3) -> Vec3 {
    (m * p.push(1.0)).xyz()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn assert_vec_close(a: &Vec3, b: &Vec3, tol: f64) {
        assert!((a - b).norm() <= tol, "vectors differ: {a:?} vs {b:?} (tol={tol})");
    }

    #[test]
    fn zero_rotation_vector_is_identity() {
        let p = Vec3::new(1.0, -2.0, 3.0);
        assert_eq!(rotate_rodrigues(&p, &Vec3::zeros()), p);
    }

    #[test]
    fn quarter_turn_about_z() {
        let p = Vec3::new(1.0, 0.0, 0.0);
        let r = rotate_rodrigues(&p, &Vec3::new(0.0, 0.0, FRAC_PI_2));
        assert_vec_close(&r, &Vec3::new(0.0, 1.0, 0.0), 1e-12);
    }

    #[test]
    fn batch_rejects_length_mismatch() {
        let err = rotate_rodrigues_batch(&[Vec3::zeros(); 2], &[Vec3::zeros()]).unwrap_err();
        assert_eq!(err, GeometryError::LengthMismatch { expected: 2, got: 1 });
    }

    #[test]
    fn batch_rotates_each_point_independently() {
        let points = [Vec3::x(), Vec3::x()];
        let rvecs = [Vec3::zeros(), Vec3::new(0.0, 0.0, FRAC_PI_2)];
        let out = rotate_rodrigues_batch(&points, &rvecs).unwrap();
        assert_vec_close(&out[0], &Vec3::x(), 1e-12);
        assert_vec_close(&out[1], &Vec3::y(), 1e-12);
    }

    #[test]
    fn zero_angle_matrix_is_identity() {
        for axis in [Vec3::x(), Vec3::y(), Vec3::z(), Vec3::new(1.0, 2.0, -2.0) / 3.0] {
            assert_eq!(axis_rotation_matrix(&axis, 0.0), Mat4::identity());
        }
    }

    #[test]
    fn matrix_agrees_with_rodrigues_vector() {
        let axis = Vec3::new(1.0, -1.0, 0.5).normalize();
        let angle_deg: f64 = 37.0;
        let m = axis_rotation_matrix(&axis, angle_deg);
        let p = Vec3::new(0.3, 0.7, -1.1);
        let expected = rotate_rodrigues(&p, &(axis * angle_deg.to_radians()));
        assert_vec_close(&transform_point(&m, &p), &expected, 1e-12);
    }

    #[test]
    fn pivoted_rotation_keeps_pivot_fixed() {
        let origin = Vec3::new(10.0, -5.0, 2.0);
        let m = pivoted_rotation(&origin, &Vec3::z(), 90.0);
        assert_vec_close(&transform_point(&m, &origin), &origin, 1e-12);

        let p = origin + Vec3::x();
        assert_vec_close(&transform_point(&m, &p), &(origin + Vec3::y()), 1e-12);
    }
}
