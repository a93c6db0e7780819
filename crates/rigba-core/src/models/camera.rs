use serde::{Deserialize, Serialize};

use super::{Distortion, DistortionKind, Intrinsics};
use crate::{Real, SixDof, Vec2, Vec3};

/// One physical camera: intrinsics plus distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
}

impl CameraModel {
    pub fn new(intrinsics: Intrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    pub fn distortion_kind(&self) -> DistortionKind {
        self.distortion.kind()
    }

    /// Number of scalars this camera contributes to the parameter vector.
    pub fn param_dim(&self) -> usize {
        Intrinsics::DIM + self.distortion.kind().num_coeffs()
    }

    /// Project a camera-frame point to pixels.
    ///
    /// No cheirality check: the optimizer needs a value for every trial
    /// parameter vector. Use [`CameraModel::try_project`] when points behind
    /// the camera must be rejected.
    pub fn project(&self, p_c: &Vec3) -> Vec2 {
        let n = Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        let n_d = self.distortion.distort(&n);
        self.intrinsics.to_pixel(&n_d)
    }

    pub fn try_project(&self, p_c: &Vec3) -> Option<Vec2> {
        if p_c.z <= 0.0 {
            return None;
        }
        Some(self.project(p_c))
    }

    /// Apply the world-to-camera transform, then project.
    pub fn project_world(&self, extrinsic: &SixDof, p_w: &Vec3) -> Vec2 {
        self.project(&extrinsic.transform_point(p_w))
    }

    /// Flat parameter list `[fx, fy, cx, cy, coeffs...]`.
    pub fn to_params(&self) -> Vec<Real> {
        let mut v = self.intrinsics.to_array().to_vec();
        v.extend(self.distortion.coeffs());
        v
    }
}
