//! Reprojection residuals for a rig bundle problem.

use nalgebra::DVector;
use rigba_core::{transform_point, Mat4, Real, SixDof, Vec3};

use crate::{ParamLayout, RigData};

/// World-to-primary-camera transform of one view.
enum ViewTransform {
    Rigid(SixDof),
    /// Rig motion followed by the shared camera pose.
    Kinematic(Mat4, SixDof),
}

impl ViewTransform {
    fn apply(&self, p: &Vec3) -> Vec3 {
        match self {
            ViewTransform::Rigid(pose) => pose.transform_point(p),
            ViewTransform::Kinematic(motion, camera) => {
                camera.transform_point(&transform_point(motion, p))
            }
        }
    }
}

/// `projected - observed` for every observation, as consecutive `(x, y)` rows.
///
/// Each view's transform is resolved once per call. Axis directions are
/// renormalized during resolution, so trial vectors with non-unit directions
/// are fine.
pub fn evaluate_residuals(data: &RigData, layout: &ParamLayout, x: &[Real]) -> DVector<Real> {
    let params = layout.view(x);
    let topology = data.topology();

    let transforms: Vec<ViewTransform> = match params.axes() {
        Some(axes) => {
            let camera = params.extrinsic(0);
            (0..topology.n_views)
                .map(|v| {
                    let motion = data
                        .coords(v)
                        .map(|c| axes.resolve(c))
                        .unwrap_or_else(Mat4::identity);
                    ViewTransform::Kinematic(motion, camera)
                })
                .collect()
        }
        None => (0..topology.n_views)
            .map(|v| ViewTransform::Rigid(params.extrinsic(v)))
            .collect(),
    };
    let cameras: Vec<_> = (0..topology.n_cameras()).map(|c| params.camera(c)).collect();
    let relative = params.relative_pose();

    let observations = data.observations();
    let mut r = DVector::zeros(2 * observations.len());
    for (i, obs) in observations.iter().enumerate() {
        let p0 = transforms[obs.view].apply(&params.point(obs.point));
        let pc = match (obs.camera, &relative) {
            (0, _) | (_, None) => p0,
            (_, Some(rel)) => rel.transform_point(&p0),
        };
        let projected = cameras[obs.camera].project(&pc);
        r[2 * i] = projected.x - obs.pixel.x;
        r[2 * i + 1] = projected.y - obs.pixel.y;
    }
    r
}

/// Root mean square over all residual entries (`2N` of them).
pub fn rmse(r: &DVector<Real>) -> Real {
    if r.is_empty() {
        return 0.0;
    }
    (r.norm_squared() / r.len() as Real).sqrt()
}
