use serde::{Deserialize, Serialize};

use crate::{AxisCoordinates, Real, SixDof, Vec2};

/// One detected image point: point `point` seen by camera `camera` in view `view`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub view: usize,
    pub camera: usize,
    pub point: usize,
    /// Measured pixel coordinates.
    pub pixel: Vec2,
}

impl Observation {
    pub fn new(view: usize, camera: usize, point: usize, x: Real, y: Real) -> Self {
        Self {
            view,
            camera,
            point,
            pixel: Vec2::new(x, y),
        }
    }
}

/// How poses are parameterized for a whole dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseMode {
    /// Each view carries its own world-to-camera rigid transform.
    Extrinsic,
    /// Each view carries machine axis coordinates; the camera is fixed.
    Kinematic,
}

impl PoseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PoseMode::Extrinsic => "extrinsic",
            PoseMode::Kinematic => "kinematic",
        }
    }
}

impl std::str::FromStr for PoseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extrinsic" => Ok(PoseMode::Extrinsic),
            "kinematic" => Ok(PoseMode::Kinematic),
            other => Err(format!("unknown pose mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PoseKind {
    Extrinsic(SixDof),
    Kinematic(AxisCoordinates),
}

impl PoseKind {
    pub fn mode(&self) -> PoseMode {
        match self {
            PoseKind::Extrinsic(_) => PoseMode::Extrinsic,
            PoseKind::Kinematic(_) => PoseMode::Kinematic,
        }
    }
}

/// A view of the scene as read from input.
///
/// `sample_index` is an external identifier carried through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub sample_index: i64,
    pub kind: PoseKind,
}

impl PoseSample {
    pub fn extrinsic(sample_index: i64, pose: SixDof) -> Self {
        Self {
            sample_index,
            kind: PoseKind::Extrinsic(pose),
        }
    }

    pub fn kinematic(sample_index: i64, coords: AxisCoordinates) -> Self {
        Self {
            sample_index,
            kind: PoseKind::Kinematic(coords),
        }
    }

    pub fn coords(&self) -> Option<&AxisCoordinates> {
        match &self.kind {
            PoseKind::Kinematic(c) => Some(c),
            PoseKind::Extrinsic(_) => None,
        }
    }
}
