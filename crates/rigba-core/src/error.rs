use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("axis {0} has a zero-length direction")]
    DegenerateAxis(&'static str),
    #[error("expected {expected} rotation vectors, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("a 6-DOF pose needs 6 values, got {0}")]
    PoseLength(usize),
    #[error("distortion needs 2 or 4 coefficients, got {0}")]
    DistortionCoeffCount(usize),
}
