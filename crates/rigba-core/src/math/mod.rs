//! Mathematical utilities and type definitions.
//!
//! This module provides the fundamental types used throughout the workspace
//! and the rotation/transform primitives used by the camera and rig models.

use nalgebra::{Isometry3, Matrix3, Matrix4, Point3, Translation3, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::GeometryError;

pub mod rotation;

pub use rotation::{
    axis_rotation_matrix, pivoted_rotation, rotate_rodrigues, rotate_rodrigues_batch,
    transform_point, translation_matrix,
};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 4×4 matrix with [`Real`] entries.
pub type Mat4 = Matrix4<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// Rigid transform stored as a Rodrigues rotation vector and a translation.
///
/// This is the parameterization the optimizer works on directly: six free
/// scalars with no manifold constraint. `p' = R(rotation) p + translation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SixDof {
    pub rotation: Vec3,
    pub translation: Vec3,
}

impl SixDof {
    pub const DIM: usize = 6;

    pub fn identity() -> Self {
        Self {
            rotation: Vec3::zeros(),
            translation: Vec3::zeros(),
        }
    }

    pub fn new(rotation: Vec3, translation: Vec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Build from `[rx, ry, rz, tx, ty, tz]`.
    pub fn from_array(v: &[Real; 6]) -> Self {
        Self {
            rotation: Vec3::new(v[0], v[1], v[2]),
            translation: Vec3::new(v[3], v[4], v[5]),
        }
    }

    /// `[rx, ry, rz, tx, ty, tz]`.
    pub fn to_array(&self) -> [Real; 6] {
        [
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
            self.translation.x,
            self.translation.y,
            self.translation.z,
        ]
    }

    pub fn transform_point(&self, p: &Vec3) -> Vec3 {
        rotate_rodrigues(p, &self.rotation) + self.translation
    }

    pub fn to_iso3(&self) -> Iso3 {
        Iso3::from_parts(
            Translation3::from(self.translation),
            UnitQuaternion::from_scaled_axis(self.rotation),
        )
    }

    pub fn from_iso3(pose: &Iso3) -> Self {
        Self {
            rotation: pose.rotation.scaled_axis(),
            translation: pose.translation.vector,
        }
    }
}

impl TryFrom<&[Real]> for SixDof {
    type Error = GeometryError;

    fn try_from(v: &[Real]) -> Result<Self, Self::Error> {
        let v: &[Real; 6] = v
            .try_into()
            .map_err(|_| GeometryError::PoseLength(v.len()))?;
        Ok(Self::from_array(v))
    }
}

impl Default for SixDof {
    fn default() -> Self {
        Self::identity()
    }
}
