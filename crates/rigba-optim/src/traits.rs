use std::ops::Range;

use nalgebra::DVector;
use rigba_core::Real;

use crate::SparseJacobian;

/// Non-linear least squares problem over a flat parameter vector.
///
/// Robust kernels enter as IRLS row scaling: residual and Jacobian rows are
/// multiplied by `sqrt(w_i)` computed from the unweighted residuals. The
/// weights are not differentiated.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real>;

    /// Unweighted Jacobian at `x`, given the unweighted residuals `r` there.
    fn jacobian_unweighted(&self, x: &DVector<Real>, r: &DVector<Real>) -> SparseJacobian;

    /// Per-row IRLS scales (`sqrt(w)`).
    fn robust_row_scales(&self, r_unweighted: &DVector<Real>) -> DVector<Real> {
        DVector::from_element(r_unweighted.len(), 1.0)
    }

    /// Disjoint parameter ranges such that no residual row touches two of
    /// them. Sparse backends eliminate these blocks with a Schur complement.
    fn eliminated_blocks(&self) -> Vec<Range<usize>> {
        Vec::new()
    }

    /// Weighted residuals seen by the solver.
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let mut r = self.residuals_unweighted(x);
        let scales = self.robust_row_scales(&r);
        debug_assert_eq!(scales.len(), r.len());
        r.component_mul_assign(&scales);
        r
    }

    /// Weighted residuals and Jacobian from a single residual evaluation.
    fn linearize(&self, x: &DVector<Real>) -> (DVector<Real>, SparseJacobian) {
        let r = self.residuals_unweighted(x);
        self.linearize_at(x, r)
    }

    /// As [`NllsProblem::linearize`], reusing unweighted residuals already
    /// computed at `x`.
    fn linearize_at(&self, x: &DVector<Real>, mut r: DVector<Real>) -> (DVector<Real>, SparseJacobian) {
        let scales = self.robust_row_scales(&r);
        let mut j = self.jacobian_unweighted(x, &r);
        debug_assert_eq!(scales.len(), j.nrows());
        j.scale_rows(&scales);
        r.component_mul_assign(&scales);
        (r, j)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    /// Iteration budget. The dense backend turns this into a
    /// function-evaluation cap of `max_iters * (n + 1)` (MINPACK convention);
    /// the sparse backend counts outer iterations.
    pub max_iters: usize,
    /// Relative tolerance on cost reduction.
    pub ftol: Real,
    /// Orthogonality tolerance between residuals and Jacobian columns.
    pub gtol: Real,
    /// Relative tolerance on the parameter step.
    pub xtol: Real,
    /// Log per-solve details at `debug` level.
    pub verbose: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-10,
            gtol: 1e-10,
            xtol: 1e-10,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolveReport {
    /// Number of residual evaluations.
    pub iterations: usize,
    /// `0.5 * ||r||²` of the weighted residuals at the returned parameters.
    pub final_cost: Real,
    pub converged: bool,
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}
