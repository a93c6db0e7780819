//! End-to-end rig bundle adjustment runs: read a dataset, refine it, write the
//! solution and a JSON report.

mod error;
pub mod input;
pub mod output;
mod text;

use std::path::Path;

use log::info;
use rigba_core::Real;
use rigba_optim::{
    refine_rig_bundle_with, BackendKind, RigBundleOptions, RigBundleProblem, RobustKernel,
    SolveOptions,
};
use serde::{Deserialize, Serialize};

pub use error::{ParseError, PipelineError};
pub use input::{parse_dataset, read_dataset, RigDataset};
pub use output::{
    format_solution, parse_solution, read_solution, write_atomic, write_solution, RigSolution,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigBundleConfig {
    /// Robust kernel applied per observation.
    pub robust_kernel: Option<RobustKernelConfig>,
    /// Iteration budget (if `None`, use the solver default).
    pub max_iters: Option<usize>,
    pub ftol: Option<Real>,
    pub gtol: Option<Real>,
    pub xtol: Option<Real>,
    /// Move rotary axis origins to a canonical point on each axis.
    pub anchor_rotary_origins: bool,
    /// Hold the kinematic gauge parameters at their initial values.
    pub hold_gauge: bool,
    pub backend: BackendConfig,
    pub verbose: bool,
}

impl Default for RigBundleConfig {
    fn default() -> Self {
        Self {
            robust_kernel: Some(RobustKernelConfig::None),
            max_iters: None,
            ftol: None,
            gtol: None,
            xtol: None,
            anchor_rotary_origins: true,
            hold_gauge: true,
            backend: BackendConfig::Auto,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendConfig {
    #[default]
    Auto,
    Dense,
    Sparse,
}

impl BackendConfig {
    pub fn to_kind(self) -> BackendKind {
        match self {
            BackendConfig::Auto => BackendKind::Auto,
            BackendConfig::Dense => BackendKind::Dense,
            BackendConfig::Sparse => BackendKind::Sparse,
        }
    }

    fn from_kind(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Auto => BackendConfig::Auto,
            BackendKind::Dense => BackendConfig::Dense,
            BackendKind::Sparse => BackendConfig::Sparse,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RobustKernelConfig {
    None,
    Huber { delta: Real },
    Cauchy { c: Real },
    SoftL1 { scale: Real },
}

impl RobustKernelConfig {
    pub fn to_kernel(&self) -> RobustKernel {
        match *self {
            RobustKernelConfig::None => RobustKernel::None,
            RobustKernelConfig::Huber { delta } => RobustKernel::Huber { delta },
            RobustKernelConfig::Cauchy { c } => RobustKernel::Cauchy { c },
            RobustKernelConfig::SoftL1 { scale } => RobustKernel::SoftL1 { scale },
        }
    }
}

impl RigBundleConfig {
    pub fn kernel(&self) -> RobustKernel {
        self.robust_kernel
            .as_ref()
            .map(RobustKernelConfig::to_kernel)
            .unwrap_or(RobustKernel::None)
    }

    pub fn options(&self) -> RigBundleOptions {
        let defaults = SolveOptions::default();
        RigBundleOptions {
            solve: SolveOptions {
                max_iters: self.max_iters.unwrap_or(defaults.max_iters),
                ftol: self.ftol.unwrap_or(defaults.ftol),
                gtol: self.gtol.unwrap_or(defaults.gtol),
                xtol: self.xtol.unwrap_or(defaults.xtol),
                verbose: self.verbose,
            },
            anchor_rotary_origins: self.anchor_rotary_origins,
            hold_gauge: self.hold_gauge,
        }
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigBundleReport {
    /// Reprojection RMSE in pixels before refinement.
    pub initial_rmse: Real,
    pub final_rmse: Real,
    pub final_cost: Real,
    /// Residual evaluations spent by the solver.
    pub iterations: usize,
    pub converged: bool,
    pub n_observations: usize,
    pub n_params: usize,
    /// Backend that ran the solve.
    pub backend: BackendConfig,
}

impl RigBundleReport {
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, &json)
    }
}

/// Refine a parsed dataset.
pub fn run_rig_bundle(
    dataset: RigDataset,
    config: &RigBundleConfig,
) -> Result<(RigSolution, RigBundleReport), PipelineError> {
    let poses = dataset.poses.clone();
    let (data, initial) = dataset.into_parts()?;
    let n_observations = data.observations().len();
    let problem = RigBundleProblem::new(data).with_kernel(config.kernel());
    let n_params = problem.layout().len();

    let backend = config.backend.to_kind().resolve(n_params);
    let result = refine_rig_bundle_with(backend, &problem, &initial, &config.options())?;
    let report = RigBundleReport {
        initial_rmse: result.initial_rmse,
        final_rmse: result.final_rmse,
        final_cost: result.report.final_cost,
        iterations: result.report.iterations,
        converged: result.report.converged,
        n_observations,
        n_params,
        backend: BackendConfig::from_kind(backend),
    };
    Ok((RigSolution::new(&poses, result.state), report))
}

/// Read `input`, refine, and write the solution to `output`.
///
/// Nothing is written if any step fails.
pub fn run_files(
    input: &Path,
    output: &Path,
    config: &RigBundleConfig,
) -> Result<RigBundleReport, PipelineError> {
    info!("reading {}", input.display());
    let dataset = read_dataset(input)?;
    let (solution, report) = run_rig_bundle(dataset, config)?;
    write_solution(output, &solution)?;
    info!("wrote {}", output.display());
    Ok(report)
}
