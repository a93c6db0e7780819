//! Non-linear refinement for kinematic camera rigs.
//!
//! The crate flattens a rig (axes, points, cameras, poses) into one parameter
//! vector, evaluates reprojection residuals, differentiates them per
//! observation with dual numbers and solves with Levenberg-Marquardt, either
//! on a dense Jacobian or on sparse normal equations with the points
//! eliminated by a Schur complement.

mod backend_lm;
mod backend_sparse;
mod data;
mod error;
mod factors;
mod fixed;
mod jacobian_ad;
mod layout;
pub mod problems;
mod residuals;
mod robust;
mod sparse;
mod sparsity;
mod traits;

pub use backend_lm::LmBackend;
pub use backend_sparse::SparseLmBackend;
pub use data::RigData;
pub use error::OptimError;
pub use fixed::{FixedMask, FixedParams};
pub use jacobian_ad::jacobian_unweighted_ad;
pub use layout::{ParamLayout, ParamView, RigState, RigTopology};
pub use problems::rig_bundle::{
    refine_rig_bundle, refine_rig_bundle_with, BackendKind, RigBundleOptions, RigBundleProblem,
    RigBundleResult,
};
pub use residuals::{evaluate_residuals, rmse};
pub use robust::{pairwise_row_scales, RobustKernel};
pub use sparse::SparseJacobian;
pub use sparsity::{BlockRef, SparsityPattern};
pub use traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
