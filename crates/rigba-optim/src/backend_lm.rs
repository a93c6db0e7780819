use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use rigba_core::Real;

use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};

/// Unweighted residuals are evaluated once per parameter update and shared by
/// the residual and Jacobian callbacks.
struct LmAdapter<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<Real>,
    r_unweighted: DVector<Real>,
}

impl<'a, P: NllsProblem> LmAdapter<'a, P> {
    fn new(problem: &'a P, params: DVector<Real>) -> Self {
        let r_unweighted = problem.residuals_unweighted(&params);
        Self {
            problem,
            params,
            r_unweighted,
        }
    }
}

impl<'a, P: NllsProblem> LeastSquaresProblem<Real, Dyn, Dyn> for LmAdapter<'a, P> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.params.clone_from(x);
        self.r_unweighted = self.problem.residuals_unweighted(x);
    }

    fn params(&self) -> DVector<Real> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        let mut r = self.r_unweighted.clone();
        r.component_mul_assign(&self.problem.robust_row_scales(&r));
        // A non-finite trial point makes LM shrink the trust region.
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        let (_, j) = self
            .problem
            .linearize_at(&self.params, self.r_unweighted.clone());
        j.is_finite().then(|| j.to_dense())
    }
}

/// MINPACK-style Levenberg-Marquardt from the `levenberg-marquardt` crate.
///
/// Works on a dense copy of the Jacobian; suited to small problems. See
/// [`crate::SparseLmBackend`] for large ones.
#[derive(Debug, Default, Clone)]
pub struct LmBackend;

impl NllsSolverBackend for LmBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport) {
        let lm = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.xtol)
            .with_gtol(opts.gtol)
            .with_patience(opts.max_iters.max(1));

        if opts.verbose {
            debug!(
                "LM solve: {} params, {} residuals, ftol={:e} xtol={:e} gtol={:e}",
                problem.num_params(),
                problem.num_residuals(),
                opts.ftol,
                opts.xtol,
                opts.gtol
            );
        }

        let adapter = LmAdapter::new(problem, x0);
        let (adapter, report) = lm.minimize(adapter);

        if opts.verbose {
            debug!(
                "LM finished: {:?} after {} evaluations",
                report.termination, report.number_of_evaluations
            );
        }

        (
            adapter.params,
            SolveReport {
                iterations: report.number_of_evaluations,
                final_cost: report.objective_function,
                converged: report.termination.was_successful(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::LmBackend;
    use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SparseJacobian};
    use nalgebra::DVector;
    use rigba_core::Real;

    /// Fit `y = a * exp(b * t)` to exact samples.
    struct ExpFit {
        t: Vec<Real>,
        y: Vec<Real>,
    }

    impl NllsProblem for ExpFit {
        fn num_params(&self) -> usize {
            2
        }

        fn num_residuals(&self) -> usize {
            self.t.len()
        }

        fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
            DVector::from_iterator(
                self.t.len(),
                self.t
                    .iter()
                    .zip(&self.y)
                    .map(|(t, y)| x[0] * (x[1] * t).exp() - y),
            )
        }

        fn jacobian_unweighted(&self, x: &DVector<Real>, _r: &DVector<Real>) -> SparseJacobian {
            let mut j = SparseJacobian::new(2);
            for t in &self.t {
                let e = (x[1] * t).exp();
                j.push_row([(0, e), (1, x[0] * t * e)]);
            }
            j
        }
    }

    #[test]
    fn lm_backend_fits_exponential() {
        let t: Vec<Real> = (0..10).map(|i| i as Real * 0.1).collect();
        let y = t.iter().map(|t| 2.0 * (-1.5 * t).exp()).collect();
        let problem = ExpFit { t, y };

        let (x, report) = LmBackend.solve(
            &problem,
            DVector::from_vec(vec![1.0, 0.0]),
            &SolveOptions::default(),
        );

        assert!((x[0] - 2.0).abs() < 1e-6, "a = {}", x[0]);
        assert!((x[1] + 1.5).abs() < 1e-6, "b = {}", x[1]);
        assert!(report.final_cost < 1e-12, "final cost too high: {}", report.final_cost);
        assert!(report.converged, "LM did not report convergence: {report:?}");
        assert!(report.iterations > 0);
    }
}
