use nalgebra::DVector;
use rigba_core::Real;

/// Robust loss kernels for iteratively re-weighted least squares (IRLS).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum RobustKernel {
    /// Plain L2.
    #[default]
    None,
    /// Quadratic up to `delta`, linear beyond.
    Huber { delta: Real },
    /// `c² log(1 + r²/c²)`.
    Cauchy { c: Real },
    /// Smooth L1: `2 s² (sqrt(1 + r²/s²) - 1)`.
    SoftL1 { scale: Real },
}

impl RobustKernel {
    /// Loss `rho(r²)` and IRLS weight `w` for a squared residual norm.
    ///
    /// Both rows of an observation are scaled by `sqrt(w)` before the
    /// linearized step is solved.
    pub fn rho_and_weight(self, r2: Real) -> (Real, Real) {
        match self {
            RobustKernel::None => (r2, 1.0),
            RobustKernel::Huber { delta } => {
                let r = r2.sqrt();
                if r <= delta {
                    (r2, 1.0)
                } else {
                    (2.0 * delta * r - delta * delta, delta / r)
                }
            }
            RobustKernel::Cauchy { c } => {
                let t = r2 / (c * c);
                (c * c * (1.0 + t).ln(), 1.0 / (1.0 + t))
            }
            RobustKernel::SoftL1 { scale } => {
                let s2 = scale * scale;
                let root = (1.0 + r2 / s2).sqrt();
                (2.0 * s2 * (root - 1.0), 1.0 / root)
            }
        }
    }

    pub fn is_none(self) -> bool {
        matches!(self, RobustKernel::None)
    }
}

/// Row scales for residuals laid out as consecutive `(x, y)` pairs.
///
/// The weight of each pair is computed from its squared pixel error and shared
/// by both rows.
pub fn pairwise_row_scales(kernel: RobustKernel, r: &DVector<Real>) -> DVector<Real> {
    debug_assert_eq!(r.len() % 2, 0);
    let mut scales = DVector::from_element(r.len(), 1.0);
    if kernel.is_none() {
        return scales;
    }
    for i in 0..r.len() / 2 {
        let (rx, ry) = (r[2 * i], r[2 * i + 1]);
        let (_, w) = kernel.rho_and_weight(rx * rx + ry * ry);
        let s = w.sqrt();
        scales[2 * i] = s;
        scales[2 * i + 1] = s;
    }
    scales
}
