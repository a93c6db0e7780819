//! Structural non-zeros of the rig bundle Jacobian.
//!
//! Each observation owns two residual rows with identical column sets, so the
//! pattern is kept as one list of parameter blocks per observation plus its
//! transpose (observations touching each column). Every block also records
//! where it sits in the per-observation local vector used for automatic
//! differentiation.

use std::ops::Range;

use crate::factors::slot;
use crate::{ParamLayout, RigData};

/// One parameter block touched by an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRef {
    /// Columns in the global parameter vector.
    pub columns: Range<usize>,
    /// Start of the block in the local differentiation vector.
    pub(crate) local: usize,
}

impl BlockRef {
    fn new(columns: Range<usize>, local: usize) -> Self {
        Self { columns, local }
    }
}

#[derive(Debug, Clone)]
pub struct SparsityPattern {
    n_cols: usize,
    observations: Vec<Vec<BlockRef>>,
    columns: Vec<Vec<usize>>,
}

impl SparsityPattern {
    pub fn build(data: &RigData, layout: &ParamLayout) -> Self {
        let topology = data.topology();
        let mut observations = Vec::with_capacity(data.observations().len());

        for obs in data.observations() {
            let mut blocks = Vec::with_capacity(6);
            if let Some(linear) = layout.linear_axes() {
                blocks.push(BlockRef::new(linear, slot::AXES));
                if let Some(coords) = data.coords(obs.view) {
                    if coords.a_active() {
                        blocks.extend(layout.a_axis().map(|r| BlockRef::new(r, slot::AXES + 9)));
                    }
                    if coords.c_active() {
                        blocks.extend(layout.c_axis().map(|r| BlockRef::new(r, slot::AXES + 15)));
                    }
                }
            }
            blocks.push(BlockRef::new(layout.point(obs.point), slot::POINT));
            blocks.push(BlockRef::new(layout.intrinsics(obs.camera), slot::CAMERA));
            blocks.push(BlockRef::new(layout.extrinsic(obs.view), slot::EXTRINSIC));
            if obs.camera == 1 && topology.is_stereo() {
                blocks.extend(
                    layout
                        .relative_pose()
                        .map(|r| BlockRef::new(r, slot::RELATIVE)),
                );
            }
            observations.push(blocks);
        }

        let mut columns = vec![Vec::new(); layout.len()];
        for (o, blocks) in observations.iter().enumerate() {
            for col in blocks.iter().flat_map(|b| b.columns.clone()) {
                columns[col].push(o);
            }
        }

        Self {
            n_cols: layout.len(),
            observations,
            columns,
        }
    }

    /// `(rows, cols)` of the full Jacobian.
    pub fn shape(&self) -> (usize, usize) {
        (2 * self.observations.len(), self.n_cols)
    }

    /// Blocks touched by observation `obs`, in ascending column order.
    pub fn observation_blocks(&self, obs: usize) -> &[BlockRef] {
        &self.observations[obs]
    }

    /// Column ranges marked in `row`, ascending.
    pub fn row_columns(&self, row: usize) -> impl Iterator<Item = Range<usize>> + '_ {
        self.observations[row / 2].iter().map(|b| b.columns.clone())
    }

    /// Number of marked columns in `row`.
    pub fn row_count(&self, row: usize) -> usize {
        self.observations[row / 2]
            .iter()
            .map(|b| b.columns.len())
            .sum()
    }

    pub fn is_marked(&self, row: usize, col: usize) -> bool {
        self.observations[row / 2]
            .iter()
            .any(|b| b.columns.contains(&col))
    }

    pub fn nnz(&self) -> usize {
        (0..self.observations.len())
            .map(|o| 2 * self.row_count(2 * o))
            .sum()
    }

    /// Rows with a marked entry in `col`, ascending.
    pub fn column_rows(&self, col: usize) -> impl Iterator<Item = usize> + '_ {
        self.columns[col].iter().flat_map(|o| [2 * o, 2 * o + 1])
    }
}
