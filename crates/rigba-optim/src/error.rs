use rigba_core::{DistortionKind, GeometryError, PoseMode};
use thiserror::Error;

/// Errors raised while assembling or decoding a rig bundle problem.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OptimError {
    #[error("rig supports 1 or 2 cameras, got {0}")]
    CameraCount(usize),
    #[error("parameter vector has length {got}, layout expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("{what} count {got} does not match topology (expected {expected})")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("camera {camera} uses {got:?} distortion, topology expects {expected:?}")]
    DistortionMismatch {
        camera: usize,
        expected: DistortionKind,
        got: DistortionKind,
    },
    #[error("view {view} pose is {got:?}, dataset pose mode is {expected:?}")]
    PoseModeMismatch {
        view: usize,
        expected: PoseMode,
        got: PoseMode,
    },
    #[error("observation {observation}: {field} index {value} out of range (< {limit})")]
    IndexOutOfRange {
        observation: usize,
        field: &'static str,
        value: usize,
        limit: usize,
    },
    #[error("kinematic rig requires axis geometry")]
    MissingAxes,
    #[error("axis geometry given for an extrinsic-pose rig")]
    UnexpectedAxes,
    #[error("stereo rig requires a relative pose")]
    MissingRelativePose,
    #[error("relative pose given for a single-camera rig")]
    UnexpectedRelativePose,
    #[error("no observations")]
    NoObservations,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}
