//! Holding parameters at their starting value during a solve.

use std::ops::Range;

use nalgebra::DVector;
use rigba_core::Real;

use crate::{NllsProblem, SparseJacobian};

/// Set of parameter indices that must not move.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedMask {
    fixed: Vec<bool>,
}

impl FixedMask {
    pub fn all_free(dim: usize) -> Self {
        Self {
            fixed: vec![false; dim],
        }
    }

    /// Indices at or above `dim` are ignored.
    pub fn fix_indices(dim: usize, indices: &[usize]) -> Self {
        let mut mask = Self::all_free(dim);
        for &i in indices {
            if let Some(f) = mask.fixed.get_mut(i) {
                *f = true;
            }
        }
        mask
    }

    pub fn dim(&self) -> usize {
        self.fixed.len()
    }

    pub fn is_fixed(&self, idx: usize) -> bool {
        self.fixed.get(idx).copied().unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.fixed
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.then_some(i))
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        !self.fixed.iter().any(|f| *f)
    }

    pub(crate) fn as_slice(&self) -> &[bool] {
        &self.fixed
    }
}

/// Wraps a problem so that masked parameters have zero Jacobian columns.
///
/// Both backends then leave those entries of `x` exactly where they started.
pub struct FixedParams<'a, P> {
    inner: &'a P,
    mask: FixedMask,
}

impl<'a, P: NllsProblem> FixedParams<'a, P> {
    pub fn new(inner: &'a P, mask: FixedMask) -> Self {
        debug_assert_eq!(mask.dim(), inner.num_params());
        Self { inner, mask }
    }

    pub fn mask(&self) -> &FixedMask {
        &self.mask
    }
}

impl<P: NllsProblem> NllsProblem for FixedParams<'_, P> {
    fn num_params(&self) -> usize {
        self.inner.num_params()
    }

    fn num_residuals(&self) -> usize {
        self.inner.num_residuals()
    }

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
        self.inner.residuals_unweighted(x)
    }

    fn jacobian_unweighted(&self, x: &DVector<Real>, r: &DVector<Real>) -> SparseJacobian {
        let mut j = self.inner.jacobian_unweighted(x, r);
        if !self.mask.is_empty() {
            j.zero_columns(self.mask.as_slice());
        }
        j
    }

    fn robust_row_scales(&self, r_unweighted: &DVector<Real>) -> DVector<Real> {
        self.inner.robust_row_scales(r_unweighted)
    }

    fn eliminated_blocks(&self) -> Vec<Range<usize>> {
        self.inner.eliminated_blocks()
    }
}
