//! Levenberg-Marquardt on sparse normal equations.
//!
//! The parameters are split into eliminated blocks (the 3-D points of a bundle
//! problem) and the reduced columns (everything else). Each iteration forms
//! `JᵀJ` block by block from the sparse Jacobian, folds the eliminated blocks
//! into a dense reduced system with a Schur complement, factors that system by
//! Cholesky and back-substitutes the eliminated blocks. Memory and time grow
//! with the number of reduced columns, not with the number of points.

use std::ops::Range;

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use rigba_core::Real;

use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport, SparseJacobian};

const INITIAL_DAMPING: Real = 1e-4;
const MIN_DAMPING: Real = 1e-12;
const MAX_DAMPING: Real = 1e30;

/// Column split into eliminated blocks and the reduced set.
struct Partition {
    blocks: Vec<Range<usize>>,
    block_of: Vec<Option<usize>>,
    /// Position of each reduced column in the reduced system.
    reduced: Vec<Option<usize>>,
    n_reduced: usize,
}

impl Partition {
    /// `None` if the blocks overlap or run past `n`.
    fn new(n: usize, blocks: Vec<Range<usize>>) -> Option<Self> {
        let mut block_of = vec![None; n];
        for (b, range) in blocks.iter().enumerate() {
            if range.end > n {
                return None;
            }
            for col in range.clone() {
                if block_of[col].replace(b).is_some() {
                    return None;
                }
            }
        }
        let mut reduced = vec![None; n];
        let mut n_reduced = 0;
        for (col, block) in block_of.iter().enumerate() {
            if block.is_none() {
                reduced[col] = Some(n_reduced);
                n_reduced += 1;
            }
        }
        Some(Self {
            blocks,
            block_of,
            reduced,
            n_reduced,
        })
    }

    fn dense(n: usize) -> Self {
        Self {
            blocks: Vec::new(),
            block_of: vec![None; n],
            reduced: (0..n).map(Some).collect(),
            n_reduced: n,
        }
    }

    /// Every row touches at most one eliminated block.
    fn separates(&self, j: &SparseJacobian) -> bool {
        (0..j.nrows()).all(|row| {
            let mut seen = None;
            j.row(row)
                .0
                .iter()
                .filter_map(|c| self.block_of[*c])
                .all(|b| *seen.get_or_insert(b) == b)
        })
    }
}

struct BlockSystem {
    range: Range<usize>,
    v: DMatrix<Real>,
    /// Reduced columns sharing a row with this block, ascending.
    cols: Vec<usize>,
    /// Coupling `J_bᵀ J_c` restricted to `cols`.
    w: DMatrix<Real>,
}

struct NormalEquations {
    /// `Jᵀr`.
    g: DVector<Real>,
    /// Diagonal of `JᵀJ`.
    diag: DVector<Real>,
    /// `JᵀJ` over the reduced columns.
    u: DMatrix<Real>,
    blocks: Vec<BlockSystem>,
}

impl NormalEquations {
    fn assemble(part: &Partition, j: &SparseJacobian, r: &DVector<Real>) -> Self {
        let g = j.tr_mul(r);
        let mut diag = DVector::zeros(j.ncols());
        let mut u = DMatrix::zeros(part.n_reduced, part.n_reduced);

        let mut touched = vec![Vec::new(); part.blocks.len()];
        let mut row_block = Vec::with_capacity(j.nrows());
        for row in 0..j.nrows() {
            let cols = j.row(row).0;
            let block = cols.iter().find_map(|c| part.block_of[*c]);
            if let Some(b) = block {
                touched[b].extend(cols.iter().filter_map(|c| part.reduced[*c]));
            }
            row_block.push(block);
        }
        let mut blocks: Vec<BlockSystem> = touched
            .into_iter()
            .zip(&part.blocks)
            .map(|(mut cols, range)| {
                cols.sort_unstable();
                cols.dedup();
                let s = range.len();
                BlockSystem {
                    range: range.clone(),
                    v: DMatrix::zeros(s, s),
                    w: DMatrix::zeros(s, cols.len()),
                    cols,
                }
            })
            .collect();

        let mut kept = Vec::new();
        let mut elim = Vec::new();
        for (row, block) in row_block.into_iter().enumerate() {
            let (cols, values) = j.row(row);
            kept.clear();
            elim.clear();
            for (c, v) in cols.iter().zip(values) {
                diag[*c] += v * v;
                match part.reduced[*c] {
                    Some(a) => kept.push((a, *v)),
                    None => elim.push((*c, *v)),
                }
            }
            for &(a, va) in &kept {
                for &(b, vb) in &kept {
                    u[(a, b)] += va * vb;
                }
            }
            let Some(b) = block else { continue };
            let sys = &mut blocks[b];
            let start = sys.range.start;
            for &(p, vp) in &elim {
                for &(q, vq) in &elim {
                    sys.v[(p - start, q - start)] += vp * vq;
                }
                for &(a, va) in &kept {
                    if let Ok(k) = sys.cols.binary_search(&a) {
                        sys.w[(p - start, k)] += vp * va;
                    }
                }
            }
        }

        Self {
            g,
            diag,
            u,
            blocks,
        }
    }

    /// Damped step solving `(JᵀJ + μD) δ = -Jᵀr`. `None` when a
    /// factorization fails.
    fn solve(&self, part: &Partition, mu: Real, scale: &DVector<Real>) -> Option<DVector<Real>> {
        let mut s = self.u.clone();
        let mut rhs = DVector::zeros(part.n_reduced);
        for (col, red) in part.reduced.iter().enumerate() {
            if let Some(a) = *red {
                s[(a, a)] += mu * scale[col];
                rhs[a] = -self.g[col];
            }
        }

        let mut factors = Vec::with_capacity(self.blocks.len());
        for sys in &self.blocks {
            let mut v = sys.v.clone();
            for (k, col) in sys.range.clone().enumerate() {
                v[(k, k)] += mu * scale[col];
            }
            let chol = v.cholesky()?;
            let g_b = self.g.rows(sys.range.start, sys.range.len()).into_owned();
            let wt = sys.w.transpose();
            let reduce_s = &wt * chol.solve(&sys.w);
            let reduce_rhs = &wt * chol.solve(&g_b);
            for (i, a) in sys.cols.iter().enumerate() {
                rhs[*a] += reduce_rhs[i];
                for (k, b) in sys.cols.iter().enumerate() {
                    s[(*a, *b)] -= reduce_s[(i, k)];
                }
            }
            factors.push((chol, g_b));
        }
        let dc = s.cholesky()?.solve(&rhs);

        let mut delta = DVector::zeros(self.g.len());
        for (col, red) in part.reduced.iter().enumerate() {
            if let Some(a) = *red {
                delta[col] = dc[a];
            }
        }
        for (sys, (chol, g_b)) in self.blocks.iter().zip(factors) {
            let dc_b = DVector::from_iterator(sys.cols.len(), sys.cols.iter().map(|a| dc[*a]));
            let db = chol.solve(&(-(g_b + &sys.w * dc_b)));
            delta.rows_mut(sys.range.start, sys.range.len()).copy_from(&db);
        }
        Some(delta)
    }

    /// Largest cosine between the residual and a Jacobian column.
    fn gradient_cosine(&self, r_norm: Real) -> Real {
        if r_norm == 0.0 {
            return 0.0;
        }
        self.g
            .iter()
            .zip(self.diag.iter())
            .filter(|(_, h)| **h > 0.0)
            .map(|(g, h)| g.abs() / (h.sqrt() * r_norm))
            .fold(0.0, Real::max)
    }
}

fn cost_of(r: &DVector<Real>) -> Real {
    0.5 * r.norm_squared()
}

fn weighted<P: NllsProblem>(problem: &P, r_unweighted: &DVector<Real>) -> DVector<Real> {
    r_unweighted.component_mul(&problem.robust_row_scales(r_unweighted))
}

/// Levenberg-Marquardt over a [`SparseJacobian`] with Schur elimination of
/// [`NllsProblem::eliminated_blocks`].
///
/// Damping follows Nielsen's update on a Marquardt-scaled diagonal, floored so
/// that gauge directions stay regularized. Stopping rules mirror the MINPACK
/// ones used by [`crate::LmBackend`], with `max_iters` counting
/// linearizations. A step that meets `xtol` is still tried once.
#[derive(Debug, Default, Clone)]
pub struct SparseLmBackend;

impl NllsSolverBackend for SparseLmBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport) {
        let n = problem.num_params();
        let mut x = x0;
        let mut evaluations = 1;
        let (mut r, mut j) = problem.linearize(&x);
        let mut cost = cost_of(&r);

        let report = |evaluations, cost, converged| SolveReport {
            iterations: evaluations,
            final_cost: cost,
            converged,
        };
        if !cost.is_finite() || !j.is_finite() {
            warn!("sparse LM: non-finite residuals or Jacobian at the initial point");
            return (x, report(evaluations, cost, false));
        }

        let mut part = Partition::new(n, problem.eliminated_blocks()).unwrap_or_else(|| {
            warn!("sparse LM: eliminated blocks overlap, solving the full system");
            Partition::dense(n)
        });
        if !part.separates(&j) {
            warn!("sparse LM: a residual row spans two eliminated blocks, solving the full system");
            part = Partition::dense(n);
        }
        if opts.verbose {
            debug!(
                "sparse LM: {} params ({} reduced, {} blocks), {} residuals, {} non-zeros",
                n,
                part.n_reduced,
                part.blocks.len(),
                j.nrows(),
                j.nnz()
            );
        }

        let mut scale = DVector::<Real>::from_element(n, 0.0);
        let mut mu = INITIAL_DAMPING;
        let mut nu = 2.0;

        for iter in 0..opts.max_iters.max(1) {
            if cost == 0.0 {
                return (x, report(evaluations, cost, true));
            }
            let normal = NormalEquations::assemble(&part, &j, &r);
            if normal.gradient_cosine(r.norm()) <= opts.gtol {
                return (x, report(evaluations, cost, true));
            }
            for (d, h) in scale.iter_mut().zip(normal.diag.iter()) {
                *d = d.max(*h);
            }
            let damping = scale.map(|d| if d > 0.0 { d } else { 1.0 });

            loop {
                let Some(delta) = normal.solve(&part, mu, &damping) else {
                    mu *= nu;
                    nu *= 2.0;
                    if mu > MAX_DAMPING {
                        return (x, report(evaluations, cost, false));
                    }
                    continue;
                };
                let tiny_step = delta.norm() <= opts.xtol * (x.norm() + opts.xtol);
                let predicted = 0.5
                    * (-normal.g.dot(&delta)
                        + mu * delta.component_mul(&damping).dot(&delta));

                let x_trial = &x + &delta;
                let r_trial_unweighted = problem.residuals_unweighted(&x_trial);
                evaluations += 1;
                let r_trial = weighted(problem, &r_trial_unweighted);
                let trial_cost = cost_of(&r_trial);
                let actual = cost - trial_cost;
                let rho = if trial_cost.is_finite() && predicted > 0.0 {
                    actual / predicted
                } else {
                    -1.0
                };

                if rho > 0.0 {
                    let small = actual.abs() <= opts.ftol * cost && predicted <= opts.ftol * cost;
                    x = x_trial;
                    cost = trial_cost;
                    mu = (mu * (1.0 - (2.0 * rho - 1.0).powi(3)).max(1.0 / 3.0)).max(MIN_DAMPING);
                    nu = 2.0;
                    if opts.verbose {
                        debug!("sparse LM iter {iter}: cost {cost:.6e}, mu {mu:.3e}, rho {rho:.3}");
                    }
                    if small || tiny_step {
                        return (x, report(evaluations, cost, true));
                    }
                    let (r_next, j_next) = problem.linearize_at(&x, r_trial_unweighted);
                    if !j_next.is_finite() {
                        warn!("sparse LM: non-finite Jacobian, stopping");
                        return (x, report(evaluations, cost, false));
                    }
                    r = r_next;
                    j = j_next;
                    break;
                }

                if tiny_step || predicted <= opts.ftol * cost {
                    return (x, report(evaluations, cost, true));
                }
                mu *= nu;
                nu *= 2.0;
                if mu > MAX_DAMPING {
                    return (x, report(evaluations, cost, false));
                }
            }
        }

        if opts.verbose {
            debug!("sparse LM: iteration limit reached, cost {cost:.6e}");
        }
        (x, report(evaluations, cost, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmBackend;

    /// Planar points `p_m` seen in frames rotated by `theta + phi_k` and
    /// shifted by `t`. Frame 0 sees the points directly.
    ///
    /// Parameters: `[theta, tx, ty, p0x, p0y, p1x, ...]`.
    struct RotatedFrames {
        phis: Vec<Real>,
        /// `(point, frame, measurement)`.
        obs: Vec<(usize, usize, [Real; 2])>,
        n_points: usize,
        eliminate: bool,
    }

    fn rot(a: Real) -> [[Real; 2]; 2] {
        let (s, c) = a.sin_cos();
        [[c, -s], [s, c]]
    }

    impl RotatedFrames {
        fn new(eliminate: bool) -> (Self, DVector<Real>) {
            let theta: Real = 0.3;
            let t = [0.5, -0.2];
            let phis = vec![0.0, 0.4, -0.7, 1.1];
            let points: Vec<[Real; 2]> = (0..6)
                .map(|m| {
                    let m = m as Real;
                    [m.cos() + 0.2 * m, (2.0 * m).sin()]
                })
                .collect();
            let mut obs = Vec::new();
            for (m, p) in points.iter().enumerate() {
                obs.push((m, 0, *p));
                for (k, phi) in phis.iter().enumerate().skip(1) {
                    let r = rot(theta + phi);
                    obs.push((
                        m,
                        k,
                        [
                            r[0][0] * p[0] + r[0][1] * p[1] + t[0],
                            r[1][0] * p[0] + r[1][1] * p[1] + t[1],
                        ],
                    ));
                }
            }
            let mut truth = vec![theta, t[0], t[1]];
            truth.extend(points.iter().flatten());
            (
                Self {
                    phis,
                    obs,
                    n_points: points.len(),
                    eliminate,
                },
                DVector::from_vec(truth),
            )
        }

        fn initial(truth: &DVector<Real>) -> DVector<Real> {
            let mut x = truth.clone();
            x[0] = 0.0;
            x[1] = 0.0;
            x[2] = 0.0;
            for i in 3..x.len() {
                x[i] += 0.05 * (i as Real).sin();
            }
            x
        }
    }

    impl NllsProblem for RotatedFrames {
        fn num_params(&self) -> usize {
            3 + 2 * self.n_points
        }

        fn num_residuals(&self) -> usize {
            2 * self.obs.len()
        }

        fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
            let mut r = DVector::zeros(self.num_residuals());
            for (i, (m, k, z)) in self.obs.iter().enumerate() {
                let p = [x[3 + 2 * m], x[4 + 2 * m]];
                let q = if *k == 0 {
                    p
                } else {
                    let rm = rot(x[0] + self.phis[*k]);
                    [
                        rm[0][0] * p[0] + rm[0][1] * p[1] + x[1],
                        rm[1][0] * p[0] + rm[1][1] * p[1] + x[2],
                    ]
                };
                r[2 * i] = q[0] - z[0];
                r[2 * i + 1] = q[1] - z[1];
            }
            r
        }

        fn jacobian_unweighted(&self, x: &DVector<Real>, _r: &DVector<Real>) -> SparseJacobian {
            let mut j = SparseJacobian::new(self.num_params());
            for (m, k, _) in &self.obs {
                let (px, py) = (3 + 2 * m, 4 + 2 * m);
                if *k == 0 {
                    j.push_row([(px, 1.0), (py, 0.0)]);
                    j.push_row([(px, 0.0), (py, 1.0)]);
                    continue;
                }
                let a = x[0] + self.phis[*k];
                let (s, c) = a.sin_cos();
                let (u, v) = (x[px], x[py]);
                j.push_row([(0, -s * u - c * v), (1, 1.0), (px, c), (py, -s)]);
                j.push_row([(0, c * u - s * v), (2, 1.0), (px, s), (py, c)]);
            }
            j
        }

        fn eliminated_blocks(&self) -> Vec<Range<usize>> {
            if !self.eliminate {
                return Vec::new();
            }
            (0..self.n_points).map(|m| 3 + 2 * m..5 + 2 * m).collect()
        }
    }

    #[test]
    fn schur_elimination_recovers_shared_and_block_parameters() {
        let (problem, truth) = RotatedFrames::new(true);
        let (x, report) = SparseLmBackend.solve(
            &problem,
            RotatedFrames::initial(&truth),
            &SolveOptions::default(),
        );
        assert!(report.converged, "{report:?}");
        assert!(report.final_cost < 1e-16, "{report:?}");
        assert!((&x - &truth).amax() < 1e-8, "x = {x}");
    }

    #[test]
    fn elimination_does_not_change_the_result() {
        let (with, truth) = RotatedFrames::new(true);
        let (without, _) = RotatedFrames::new(false);
        let x0 = RotatedFrames::initial(&truth);
        let opts = SolveOptions::default();

        let (a, _) = SparseLmBackend.solve(&with, x0.clone(), &opts);
        let (b, _) = SparseLmBackend.solve(&without, x0.clone(), &opts);
        let (c, _) = LmBackend.solve(&without, x0, &opts);
        assert!((&a - &b).amax() < 1e-8);
        assert!((&a - &c).amax() < 1e-8);
    }

    #[test]
    fn one_step_matches_the_dense_normal_equations() {
        let (problem, truth) = RotatedFrames::new(true);
        let x = RotatedFrames::initial(&truth);
        let (r, j) = problem.linearize(&x);
        let n = problem.num_params();
        let part = Partition::new(n, problem.eliminated_blocks()).unwrap();
        assert!(part.separates(&j));
        let normal = NormalEquations::assemble(&part, &j, &r);

        let mu = 0.1;
        let scale = DVector::from_fn(n, |k, _| 1.0 + k as Real);
        let delta = normal.solve(&part, mu, &scale).unwrap();

        let jd = j.to_dense();
        let mut h = jd.transpose() * &jd;
        for k in 0..n {
            h[(k, k)] += mu * scale[k];
        }
        let expected = h.cholesky().unwrap().solve(&(-(jd.transpose() * &r)));
        assert!((delta - expected).amax() < 1e-10);
    }

    #[test]
    fn overlapping_blocks_fall_back_to_the_full_system() {
        assert!(Partition::new(5, vec![0..3, 2..4]).is_none());
        assert!(Partition::new(5, vec![3..6]).is_none());

        let mut j = SparseJacobian::new(4);
        j.push_row([(0, 1.0), (2, 1.0)]);
        let part = Partition::new(4, vec![0..2, 2..4]).unwrap();
        assert!(!part.separates(&j));
        assert_eq!(Partition::dense(4).n_reduced, 4);
    }

    #[test]
    fn zero_columns_do_not_move() {
        let (problem, truth) = RotatedFrames::new(true);
        struct Held<'a>(&'a RotatedFrames);
        impl NllsProblem for Held<'_> {
            fn num_params(&self) -> usize {
                self.0.num_params()
            }
            fn num_residuals(&self) -> usize {
                self.0.num_residuals()
            }
            fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
                self.0.residuals_unweighted(x)
            }
            fn jacobian_unweighted(&self, x: &DVector<Real>, r: &DVector<Real>) -> SparseJacobian {
                let mut j = self.0.jacobian_unweighted(x, r);
                let mut mask = vec![false; self.num_params()];
                mask[0] = true;
                j.zero_columns(&mask);
                j
            }
            fn eliminated_blocks(&self) -> Vec<Range<usize>> {
                self.0.eliminated_blocks()
            }
        }
        let x0 = RotatedFrames::initial(&truth);
        let (x, _) = SparseLmBackend.solve(&Held(&problem), x0.clone(), &SolveOptions::default());
        assert_eq!(x[0], x0[0]);
        assert!(x[1] != x0[1]);
    }
}
