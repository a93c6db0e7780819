//! Joint refinement of rig axes, points, cameras and poses.
//!
//! One problem type covers every rig configuration: one or two cameras,
//! per-view rigid poses or a kinematic rig seen by a fixed camera.

use std::ops::Range;

use log::{debug, info, warn};
use nalgebra::DVector;
use rigba_core::{Real, Vec3};

use crate::jacobian_ad::jacobian_unweighted_ad;
use crate::{
    evaluate_residuals, pairwise_row_scales, rmse, FixedMask, FixedParams, LmBackend,
    NllsProblem, NllsSolverBackend, OptimError, ParamLayout, RigData, RigState, RobustKernel,
    SolveOptions, SolveReport, SparseJacobian, SparseLmBackend, SparsityPattern,
};

/// Rig bundle adjustment problem with an automatically differentiated,
/// structurally sparse Jacobian.
#[derive(Debug, Clone)]
pub struct RigBundleProblem {
    data: RigData,
    layout: ParamLayout,
    pattern: SparsityPattern,
    kernel: RobustKernel,
}

impl RigBundleProblem {
    pub fn new(data: RigData) -> Self {
        let layout = ParamLayout::new(data.topology());
        let pattern = SparsityPattern::build(&data, &layout);
        debug!(
            "rig bundle: {} params, {} residuals, {} non-zeros",
            layout.len(),
            data.num_residuals(),
            pattern.nnz()
        );
        Self {
            data,
            layout,
            pattern,
            kernel: RobustKernel::None,
        }
    }

    pub fn with_kernel(mut self, kernel: RobustKernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn data(&self) -> &RigData {
        &self.data
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    pub fn pattern(&self) -> &SparsityPattern {
        &self.pattern
    }

    pub fn kernel(&self) -> RobustKernel {
        self.kernel
    }

    /// Unweighted reprojection RMSE in pixels.
    pub fn rmse(&self, x: &DVector<Real>) -> Real {
        rmse(&self.residuals_unweighted(x))
    }
}

impl NllsProblem for RigBundleProblem {
    fn num_params(&self) -> usize {
        self.layout.len()
    }

    fn num_residuals(&self) -> usize {
        self.data.num_residuals()
    }

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
        evaluate_residuals(&self.data, &self.layout, x.as_slice())
    }

    fn jacobian_unweighted(&self, x: &DVector<Real>, _r: &DVector<Real>) -> SparseJacobian {
        jacobian_unweighted_ad(&self.data, &self.layout, &self.pattern, x)
    }

    fn robust_row_scales(&self, r_unweighted: &DVector<Real>) -> DVector<Real> {
        pairwise_row_scales(self.kernel, r_unweighted)
    }

    /// One block per point; every observation sees exactly one point.
    fn eliminated_blocks(&self) -> Vec<Range<usize>> {
        (0..self.data.topology().n_points)
            .map(|i| self.layout.point(i))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RigBundleOptions {
    pub solve: SolveOptions,
    /// Slide rotary axis origins to a canonical point on each axis after the
    /// solve.
    pub anchor_rotary_origins: bool,
    /// Hold the kinematic gauge columns (see [`ParamLayout::gauge_mask`]) at
    /// their initial values during the solve.
    pub hold_gauge: bool,
}

impl Default for RigBundleOptions {
    fn default() -> Self {
        Self {
            solve: SolveOptions::default(),
            anchor_rotary_origins: true,
            hold_gauge: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RigBundleResult {
    /// Refined state with unit axis directions.
    pub state: RigState,
    pub initial_rmse: Real,
    pub final_rmse: Real,
    pub report: SolveReport,
}

/// Refine `initial` and return the normalized result.
///
/// Fails on layout mismatches and on zero-length axis directions, either in
/// the initial guess or after the solve. Hitting the iteration limit is not an
/// error; the last iterate is returned with `converged = false`.
pub fn refine_rig_bundle<B: NllsSolverBackend>(
    backend: &B,
    problem: &RigBundleProblem,
    initial: &RigState,
    opts: &RigBundleOptions,
) -> Result<RigBundleResult, OptimError> {
    if let Some(axes) = &initial.axes {
        axes.validate()?;
    }
    let x0 = problem.layout().pack(initial)?;
    let initial_rmse = problem.rmse(&x0);
    info!(
        "rig bundle: {} observations, {} parameters, initial RMSE {:.6} px",
        problem.data().observations().len(),
        x0.len(),
        initial_rmse
    );
    log_state("initial", initial);

    let mask = if opts.hold_gauge {
        problem.layout().gauge_mask(&x0)
    } else {
        FixedMask::all_free(x0.len())
    };
    if !mask.is_empty() {
        debug!("holding {} gauge columns: {:?}", mask.count(), mask.iter().collect::<Vec<_>>());
    }
    let held = FixedParams::new(problem, mask);
    let (x, report) = backend.solve(&held, x0, &opts.solve);
    if !report.converged {
        warn!(
            "solver stopped without converging after {} evaluations",
            report.iterations
        );
    }

    let state = problem
        .layout()
        .unpack(&x)?
        .normalized(opts.anchor_rotary_origins)?;
    let final_rmse = problem.rmse(&problem.layout().pack(&state)?);
    info!(
        "rig bundle: final RMSE {:.6} px, cost {:.3e}, {} evaluations",
        final_rmse, report.final_cost, report.iterations
    );
    log_state("refined", &state);

    Ok(RigBundleResult {
        state,
        initial_rmse,
        final_rmse,
        report,
    })
}

/// Supported solver backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// [`BackendKind::Dense`] up to [`BackendKind::DENSE_PARAM_LIMIT`]
    /// parameters, [`BackendKind::Sparse`] beyond.
    #[default]
    Auto,
    /// [`LmBackend`] on a dense copy of the Jacobian.
    Dense,
    /// [`SparseLmBackend`] with the points eliminated.
    Sparse,
}

impl BackendKind {
    pub const DENSE_PARAM_LIMIT: usize = 300;

    /// Concrete backend for a problem with `n_params` parameters.
    pub fn resolve(self, n_params: usize) -> Self {
        match self {
            BackendKind::Auto if n_params <= Self::DENSE_PARAM_LIMIT => BackendKind::Dense,
            BackendKind::Auto => BackendKind::Sparse,
            kind => kind,
        }
    }
}

/// [`refine_rig_bundle`] with the backend picked by `kind`.
pub fn refine_rig_bundle_with(
    kind: BackendKind,
    problem: &RigBundleProblem,
    initial: &RigState,
    opts: &RigBundleOptions,
) -> Result<RigBundleResult, OptimError> {
    let kind = kind.resolve(problem.layout().len());
    debug!("rig bundle: {kind:?} backend");
    match kind {
        BackendKind::Sparse => refine_rig_bundle(&SparseLmBackend, problem, initial, opts),
        BackendKind::Dense | BackendKind::Auto => {
            refine_rig_bundle(&LmBackend, problem, initial, opts)
        }
    }
}

fn v3(v: &Vec3) -> String {
    format!("({:.6}, {:.6}, {:.6})", v.x, v.y, v.z)
}

fn log_state(stage: &str, state: &RigState) {
    if let Some(axes) = &state.axes {
        info!(
            "{stage} axis directions: X {} Y {} Z {} A {} C {}",
            v3(&axes.x),
            v3(&axes.y),
            v3(&axes.z),
            v3(&axes.a.direction),
            v3(&axes.c.direction)
        );
        info!(
            "{stage} rotary origins: A {} C {}",
            v3(&axes.a.origin),
            v3(&axes.c.origin)
        );
    }
    for (c, camera) in state.cameras.iter().enumerate() {
        let k = &camera.intrinsics;
        debug!(
            "{stage} camera {c}: fx {:.3} fy {:.3} cx {:.3} cy {:.3} distortion {:?}",
            k.fx,
            k.fy,
            k.cx,
            k.cy,
            camera.distortion.coeffs()
        );
    }
    for (k, pose) in state.extrinsics.iter().enumerate() {
        debug!(
            "{stage} extrinsic {k}: rvec {} tvec {}",
            v3(&pose.rotation),
            v3(&pose.translation)
        );
    }
    if let Some(rel) = &state.relative_pose {
        debug!(
            "{stage} relative pose: rvec {} tvec {}",
            v3(&rel.rotation),
            v3(&rel.translation)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_backend_switches_on_problem_size() {
        let limit = BackendKind::DENSE_PARAM_LIMIT;
        assert_eq!(BackendKind::Auto.resolve(limit), BackendKind::Dense);
        assert_eq!(BackendKind::Auto.resolve(limit + 1), BackendKind::Sparse);
        assert_eq!(BackendKind::Sparse.resolve(10), BackendKind::Sparse);
        assert_eq!(BackendKind::Dense.resolve(10_000), BackendKind::Dense);
    }
}
