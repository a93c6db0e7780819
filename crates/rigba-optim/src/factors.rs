//! Reprojection residual of a single observation, generic over the scalar.
//!
//! The functions here follow the rig and camera models in `rigba-core` but are
//! written against [`nalgebra::RealField`], so they evaluate on `f64` and on
//! dual numbers alike. All parameters of one observation arrive in a single
//! local slice laid out by [`slot`].

use nalgebra::{RealField, Vector2, Vector3};
use rigba_core::{AxisCoordinates, DistortionKind, Real, Vec2, MIN_AXIS_NORM};

/// Offsets inside the per-observation local parameter vector.
pub(crate) mod slot {
    /// X, Y, Z directions, A origin and direction, C origin and direction.
    pub const AXES: usize = 0;
    pub const POINT: usize = 21;
    /// `fx, fy, cx, cy` then up to four distortion coefficients.
    pub const CAMERA: usize = 24;
    pub const EXTRINSIC: usize = 32;
    pub const RELATIVE: usize = 38;
    pub const LOCAL_DIM: usize = 44;
}

/// Data side of one observation residual.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ObservationModel {
    /// Machine coordinates of the view; `None` for rigid per-view poses.
    pub coords: Option<AxisCoordinates>,
    pub distortion: DistortionKind,
    /// Seen by the secondary camera through the relative pose.
    pub secondary: bool,
    pub pixel: Vec2,
}

#[inline]
fn lit<T: RealField>(v: Real) -> T {
    nalgebra::convert(v)
}

fn vec3<T: RealField>(p: &[T], start: usize) -> Vector3<T> {
    Vector3::new(p[start].clone(), p[start + 1].clone(), p[start + 2].clone())
}

fn unit_or_raw<T: RealField>(v: &Vector3<T>) -> Vector3<T> {
    let n = v.norm();
    if n > lit::<T>(MIN_AXIS_NORM) {
        v / n
    } else {
        v.clone()
    }
}

/// Rotate `p` by a Rodrigues vector.
pub(crate) fn rotate_rodrigues<T: RealField>(p: &Vector3<T>, rvec: &Vector3<T>) -> Vector3<T> {
    let theta2 = rvec.norm_squared();
    if theta2 < lit::<T>(1e-16) {
        // Second-order series; keeps derivatives finite at the identity.
        let rp = rvec.cross(p);
        let rrp = rvec.cross(&rp);
        return p + rp + rrp * lit::<T>(0.5);
    }
    let theta = theta2.sqrt();
    let v = rvec / theta.clone();
    let (s, c) = (theta.clone().sin(), theta.cos());
    let along = v.dot(p) * (T::one() - c.clone());
    p * c + v.cross(p) * s + v * along
}

/// Rotate `p` by `angle_deg` about the line through `origin` along
/// `direction`. The direction is normalized first.
fn rotate_about_line<T: RealField>(
    p: &Vector3<T>,
    origin: &Vector3<T>,
    direction: &Vector3<T>,
    angle_deg: Real,
) -> Vector3<T> {
    let k = unit_or_raw(direction);
    let (s, c) = angle_deg.to_radians().sin_cos();
    let v = p - origin;
    let along = k.dot(&v) * lit::<T>(1.0 - c);
    let rotated = &v * lit::<T>(c) + k.cross(&v) * lit::<T>(s) + k * along;
    rotated + origin
}

/// Carry a target point through the rig motion of `coords`: C by `-c`, then A
/// by `+a`, then the linear offset `x·X̂ + y·Ŷ − z·Ẑ`.
fn resolve_point<T: RealField>(axes: &[T], coords: &AxisCoordinates, p: Vector3<T>) -> Vector3<T> {
    let row = |k: usize| vec3(axes, slot::AXES + 3 * k);
    let mut q = p;
    if coords.c_active() {
        q = rotate_about_line(&q, &row(5), &row(6), -coords.c);
    }
    if coords.a_active() {
        q = rotate_about_line(&q, &row(3), &row(4), coords.a);
    }
    q + unit_or_raw(&row(0)) * lit::<T>(coords.x) + unit_or_raw(&row(1)) * lit::<T>(coords.y)
        - unit_or_raw(&row(2)) * lit::<T>(coords.z)
}

fn transform<T: RealField>(p: &[T], start: usize, q: &Vector3<T>) -> Vector3<T> {
    rotate_rodrigues(q, &vec3(p, start)) + vec3(p, start + 3)
}

fn project<T: RealField>(cam: &[T], kind: DistortionKind, pc: &Vector3<T>) -> Vector2<T> {
    let x = pc.x.clone() / pc.z.clone();
    let y = pc.y.clone() / pc.z.clone();
    let r2 = x.clone() * x.clone() + y.clone() * y.clone();
    let (k1, k2) = (cam[4].clone(), cam[5].clone());
    let radial = T::one() + k1 * r2.clone() + k2 * r2.clone() * r2.clone();
    let (xd, yd) = match kind {
        DistortionKind::Radial2 => (x * radial.clone(), y * radial),
        DistortionKind::RadialTangential4 => {
            let (p1, p2) = (cam[6].clone(), cam[7].clone());
            let two = lit::<T>(2.0);
            let xy = x.clone() * y.clone();
            let x_tan = two.clone() * p1.clone() * xy.clone()
                + p2.clone() * (r2.clone() + two.clone() * x.clone() * x.clone());
            let y_tan = p1 * (r2 + two.clone() * y.clone() * y.clone()) + two * p2 * xy;
            (x * radial.clone() + x_tan, y * radial + y_tan)
        }
    };
    Vector2::new(
        cam[0].clone() * xd + cam[2].clone(),
        cam[1].clone() * yd + cam[3].clone(),
    )
}

/// `projected - observed` for one observation.
pub(crate) fn observation_residual<T: RealField>(p: &[T], obs: &ObservationModel) -> Vector2<T> {
    debug_assert_eq!(p.len(), slot::LOCAL_DIM);
    let point = vec3(p, slot::POINT);
    let world = match &obs.coords {
        Some(coords) => resolve_point(p, coords, point),
        None => point,
    };
    let mut pc = transform(p, slot::EXTRINSIC, &world);
    if obs.secondary {
        pc = transform(p, slot::RELATIVE, &pc);
    }
    let px = project(&p[slot::CAMERA..slot::EXTRINSIC], obs.distortion, &pc);
    Vector2::new(
        px.x.clone() - lit::<T>(obs.pixel.x),
        px.y.clone() - lit::<T>(obs.pixel.y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigba_core::{
        CameraModel, Distortion, Intrinsics, RigAxes, RotaryAxis, SixDof, Vec3,
    };

    fn local(
        axes: &RigAxes,
        point: Vec3,
        camera: &CameraModel,
        extrinsic: &SixDof,
        relative: &SixDof,
    ) -> Vec<Real> {
        let mut p = vec![0.0; slot::LOCAL_DIM];
        for (k, row) in axes.rows().iter().enumerate() {
            p[slot::AXES + 3 * k..slot::AXES + 3 * k + 3].copy_from_slice(row.as_slice());
        }
        p[slot::POINT..slot::POINT + 3].copy_from_slice(point.as_slice());
        let cam = camera.to_params();
        p[slot::CAMERA..slot::CAMERA + cam.len()].copy_from_slice(&cam);
        p[slot::EXTRINSIC..slot::EXTRINSIC + 6].copy_from_slice(&extrinsic.to_array());
        p[slot::RELATIVE..slot::RELATIVE + 6].copy_from_slice(&relative.to_array());
        p
    }

    fn camera(distortion: Distortion) -> CameraModel {
        CameraModel::new(
            Intrinsics {
                fx: 910.0,
                fy: 905.0,
                cx: 640.0,
                cy: 360.0,
            },
            distortion,
        )
    }

    #[test]
    fn f64_evaluation_matches_core_models() {
        let mut axes = RigAxes::aligned();
        axes.x = Vec3::new(2.0, 0.01, 0.0);
        axes.a = RotaryAxis::new(Vec3::new(0.0, 0.1, -0.05), Vec3::new(1.0, 0.02, 0.01));
        axes.c = RotaryAxis::new(Vec3::new(0.02, 0.01, 0.0), Vec3::new(0.0, 0.01, 3.0));
        let coords = AxisCoordinates::new(0.02, -0.01, 0.03, 11.0, -23.0);
        let cam = camera(Distortion::RadialTangential4 {
            k1: -0.1,
            k2: 0.02,
            p1: 0.001,
            p2: -0.002,
        });
        let extrinsic = SixDof::new(Vec3::new(0.02, -0.03, 0.01), Vec3::new(0.01, 0.0, 0.8));
        let relative = SixDof::new(Vec3::new(0.0, 0.05, 0.0), Vec3::new(-0.1, 0.0, 0.0));
        let point = Vec3::new(0.05, -0.02, 0.01);
        let p = local(&axes, point, &cam, &extrinsic, &relative);

        for secondary in [false, true] {
            let mut pc = extrinsic.transform_point(&rigba_core::transform_point(
                &axes.resolve(&coords),
                &point,
            ));
            if secondary {
                pc = relative.transform_point(&pc);
            }
            let expected = cam.project(&pc);
            let model = ObservationModel {
                coords: Some(coords),
                distortion: cam.distortion_kind(),
                secondary,
                pixel: Vec2::new(600.0, 300.0),
            };
            let r = observation_residual(&p, &model);
            assert!(
                (r.x - (expected.x - 600.0)).abs() < 1e-9 && (r.y - (expected.y - 300.0)).abs() < 1e-9,
                "secondary={secondary}: {r:?} vs {expected:?}"
            );
        }
    }

    #[test]
    fn radial_model_ignores_unused_coefficient_slots() {
        let cam = camera(Distortion::Radial2 { k1: -0.05, k2: 0.01 });
        let extrinsic = SixDof::new(Vec3::zeros(), Vec3::new(0.0, 0.0, 1.0));
        let mut p = local(
            &RigAxes::aligned(),
            Vec3::new(0.1, 0.2, 0.0),
            &cam,
            &extrinsic,
            &SixDof::identity(),
        );
        let model = ObservationModel {
            coords: None,
            distortion: cam.distortion_kind(),
            secondary: false,
            pixel: Vec2::zeros(),
        };
        let before = observation_residual(&p, &model);
        p[slot::CAMERA + 6] = 5.0;
        p[slot::CAMERA + 7] = -5.0;
        assert_eq!(observation_residual(&p, &model), before);

        let expected = cam.project(&Vec3::new(0.1, 0.2, 1.0));
        assert!((before - expected).norm() < 1e-12);
    }

    #[test]
    fn tiny_rotation_vectors_use_the_series() {
        let p = Vector3::new(0.3, -0.2, 1.0);
        let r = Vector3::new(1e-9, -2e-9, 5e-10);
        let series = rotate_rodrigues(&p, &r);
        let exact = rigba_core::rotate_rodrigues(&p, &r);
        assert!((series - exact).norm() < 1e-14);
        assert_eq!(rotate_rodrigues(&p, &Vector3::zeros()), p);
    }
}
