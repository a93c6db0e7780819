//! Synthetic scene helpers.
//!
//! Build point sets and generate exact (noise-free) observations with the same
//! camera and rig models used by the optimizer. Points that land behind a
//! camera are skipped.

use crate::{
    transform_point, AxisCoordinates, CameraModel, Observation, Real, RigAxes, SixDof, Vec3,
};

/// Regular `nx × ny × nz` lattice starting at `origin`.
///
/// Ordering is deterministic: X fastest, then Y, then Z.
pub fn lattice_points(nx: usize, ny: usize, nz: usize, spacing: Real, origin: Vec3) -> Vec<Vec3> {
    let mut points = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                points.push(origin + Vec3::new(i as Real, j as Real, k as Real) * spacing);
            }
        }
    }
    points
}

/// Observe every point from every view with every camera.
///
/// `poses[v]` maps world points into the camera-0 frame. Camera 1 (if any) sees
/// the camera-0 frame through `relative`.
pub fn observe_extrinsic(
    cameras: &[CameraModel],
    relative: Option<&SixDof>,
    poses: &[SixDof],
    points: &[Vec3],
) -> Vec<Observation> {
    observe(cameras, relative, poses.len(), points, |v, p| {
        poses[v].transform_point(p)
    })
}

/// Observe a target carried by a kinematic rig from a fixed camera.
pub fn observe_kinematic(
    cameras: &[CameraModel],
    relative: Option<&SixDof>,
    axes: &RigAxes,
    camera_extrinsic: &SixDof,
    coords: &[AxisCoordinates],
    points: &[Vec3],
) -> Vec<Observation> {
    let transforms: Vec<_> = coords.iter().map(|c| axes.resolve(c)).collect();
    observe(cameras, relative, coords.len(), points, |v, p| {
        camera_extrinsic.transform_point(&transform_point(&transforms[v], p))
    })
}

fn observe<F>(
    cameras: &[CameraModel],
    relative: Option<&SixDof>,
    n_views: usize,
    points: &[Vec3],
    to_cam0: F,
) -> Vec<Observation>
where
    F: Fn(usize, &Vec3) -> Vec3,
{
    let mut observations = Vec::with_capacity(n_views * points.len() * cameras.len());
    for view in 0..n_views {
        for (point, pw) in points.iter().enumerate() {
            let p0 = to_cam0(view, pw);
            for (camera, model) in cameras.iter().enumerate() {
                let pc = match (camera, relative) {
                    (0, _) | (_, None) => p0,
                    (_, Some(rel)) => rel.transform_point(&p0),
                };
                if let Some(px) = model.try_project(&pc) {
                    observations.push(Observation::new(view, camera, point, px.x, px.y));
                }
            }
        }
    }
    observations
}
