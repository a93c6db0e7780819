use crate::{GeometryError, Real, Vec2};
use serde::{Deserialize, Serialize};

/// Which distortion parameterization a camera uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistortionKind {
    /// `k1, k2`
    Radial2,
    /// `k1, k2, p1, p2` (OpenCV order)
    RadialTangential4,
}

impl DistortionKind {
    pub fn num_coeffs(self) -> usize {
        match self {
            DistortionKind::Radial2 => 2,
            DistortionKind::RadialTangential4 => 4,
        }
    }
}

/// Lens distortion applied in normalized image coordinates.
///
/// Both variants share the radial factor `r = 1 + k1·n + k2·n²` with
/// `n = x² + y²`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Distortion {
    Radial2 {
        k1: Real,
        k2: Real,
    },
    RadialTangential4 {
        k1: Real,
        k2: Real,
        p1: Real,
        p2: Real,
    },
}

impl Distortion {
    /// Build from a coefficient list; the length selects the variant.
    pub fn from_coeffs(coeffs: &[Real]) -> Result<Self, GeometryError> {
        match coeffs {
            &[k1, k2] => Ok(Distortion::Radial2 { k1, k2 }),
            &[k1, k2, p1, p2] => Ok(Distortion::RadialTangential4 { k1, k2, p1, p2 }),
            _ => Err(GeometryError::DistortionCoeffCount(coeffs.len())),
        }
    }

    pub fn zeros(kind: DistortionKind) -> Self {
        match kind {
            DistortionKind::Radial2 => Distortion::Radial2 { k1: 0.0, k2: 0.0 },
            DistortionKind::RadialTangential4 => Distortion::RadialTangential4 {
                k1: 0.0,
                k2: 0.0,
                p1: 0.0,
                p2: 0.0,
            },
        }
    }

    pub fn kind(&self) -> DistortionKind {
        match self {
            Distortion::Radial2 { .. } => DistortionKind::Radial2,
            Distortion::RadialTangential4 { .. } => DistortionKind::RadialTangential4,
        }
    }

    pub fn coeffs(&self) -> Vec<Real> {
        match *self {
            Distortion::Radial2 { k1, k2 } => vec![k1, k2],
            Distortion::RadialTangential4 { k1, k2, p1, p2 } => vec![k1, k2, p1, p2],
        }
    }

    pub fn distort(&self, n_undist: &Vec2) -> Vec2 {
        let (x, y) = (n_undist.x, n_undist.y);
        let r2 = x * x + y * y;
        match *self {
            Distortion::Radial2 { k1, k2 } => {
                let radial = 1.0 + k1 * r2 + k2 * r2 * r2;
                Vec2::new(x * radial, y * radial)
            }
            Distortion::RadialTangential4 { k1, k2, p1, p2 } => {
                let radial = 1.0 + k1 * r2 + k2 * r2 * r2;
                let xy = x * y;
                let x_tan = 2.0 * p1 * xy + p2 * (r2 + 2.0 * x * x);
                let y_tan = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * xy;
                Vec2::new(x * radial + x_tan, y * radial + y_tan)
            }
        }
    }
}
