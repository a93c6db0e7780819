//! Jacobian of the reprojection residuals by forward-mode automatic
//! differentiation.
//!
//! Every observation touches at most five parameter blocks. They are gathered
//! into a fixed-size local vector, the residual is evaluated once on
//! `DualSVec64<LOCAL_DIM>` numbers, and only the derivatives of the blocks in
//! the sparsity pattern are scattered into the global Jacobian.

use nalgebra::{DVector, SVector};
use num_dual::{jacobian, DualSVec64};
use rigba_core::Real;

use crate::factors::{observation_residual, slot::LOCAL_DIM, ObservationModel};
use crate::{ParamLayout, RigData, SparseJacobian, SparsityPattern};

pub(crate) fn observation_model(data: &RigData, obs: usize) -> ObservationModel {
    let o = &data.observations()[obs];
    let topology = data.topology();
    ObservationModel {
        coords: data.coords(o.view).copied(),
        distortion: topology.cameras[o.camera],
        secondary: o.camera == 1 && topology.is_stereo(),
        pixel: o.pixel,
    }
}

/// Unweighted residual Jacobian with the shape and structure of `pattern`.
pub fn jacobian_unweighted_ad(
    data: &RigData,
    layout: &ParamLayout,
    pattern: &SparsityPattern,
    x: &DVector<Real>,
) -> SparseJacobian {
    debug_assert_eq!(x.len(), layout.len());
    let (rows, cols) = pattern.shape();
    let mut jac = SparseJacobian::with_capacity(cols, rows, pattern.nnz());

    for o in 0..data.observations().len() {
        let blocks = pattern.observation_blocks(o);
        let mut local = SVector::<Real, LOCAL_DIM>::zeros();
        for b in blocks {
            local.as_mut_slice()[b.local..b.local + b.columns.len()]
                .copy_from_slice(&x.as_slice()[b.columns.clone()]);
        }

        let model = observation_model(data, o);
        let (_, d) = jacobian(
            |p: SVector<DualSVec64<LOCAL_DIM>, LOCAL_DIM>| {
                observation_residual(p.as_slice(), &model)
            },
            local,
        );

        for k in 0..2 {
            jac.push_row(blocks.iter().flat_map(|b| {
                b.columns
                    .clone()
                    .zip(b.local..)
                    .map(move |(col, l)| (col, d[(k, l)]))
            }));
        }
    }
    jac
}
