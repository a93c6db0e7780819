//! Flat parameter vector layout for a rig bundle problem.
//!
//! Block order:
//! 1. rig axes (21 values, kinematic rigs only): X, Y, Z directions, A origin,
//!    A direction, C origin, C direction,
//! 2. points (3 per point),
//! 3. per camera: `fx, fy, cx, cy` followed by its distortion coefficients,
//! 4. extrinsics: one shared camera pose for kinematic rigs, one pose per view
//!    otherwise (6 each, rvec then tvec),
//! 5. relative pose of the secondary camera (6, stereo rigs only).

use std::ops::Range;

use nalgebra::DVector;
use rigba_core::{
    CameraModel, Distortion, DistortionKind, GeometryError, Intrinsics, PoseMode, Real, RigAxes,
    SixDof, Vec3,
};

use crate::{FixedMask, OptimError};

/// Shape of a rig bundle problem. Fixed for the duration of a solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RigTopology {
    pub n_views: usize,
    pub n_points: usize,
    /// Distortion model per camera; one entry per camera (1 or 2).
    pub cameras: Vec<DistortionKind>,
    pub pose_mode: PoseMode,
}

impl RigTopology {
    pub fn new(
        n_views: usize,
        n_points: usize,
        cameras: Vec<DistortionKind>,
        pose_mode: PoseMode,
    ) -> Result<Self, OptimError> {
        if cameras.is_empty() || cameras.len() > 2 {
            return Err(OptimError::CameraCount(cameras.len()));
        }
        Ok(Self {
            n_views,
            n_points,
            cameras,
            pose_mode,
        })
    }

    pub fn n_cameras(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_stereo(&self) -> bool {
        self.cameras.len() == 2
    }

    pub fn is_kinematic(&self) -> bool {
        self.pose_mode == PoseMode::Kinematic
    }

    /// Number of 6-DOF extrinsic blocks.
    pub fn n_extrinsics(&self) -> usize {
        if self.is_kinematic() {
            1
        } else {
            self.n_views
        }
    }
}

/// Decoded parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct RigState {
    /// Present iff the rig is kinematic.
    pub axes: Option<RigAxes>,
    pub points: Vec<Vec3>,
    pub cameras: Vec<CameraModel>,
    /// Shared camera pose (kinematic) or one world-to-camera pose per view.
    pub extrinsics: Vec<SixDof>,
    /// Secondary camera relative to the primary one; present iff stereo.
    pub relative_pose: Option<SixDof>,
}

impl RigState {
    /// Unit axis directions and, optionally, canonical rotary origins.
    ///
    /// Neither step changes any projection.
    pub fn normalized(&self, anchor_rotary_origins: bool) -> Result<Self, GeometryError> {
        let axes = match &self.axes {
            Some(axes) => {
                let unit = axes.normalized()?;
                Some(if anchor_rotary_origins {
                    unit.anchor_rotary_origins()
                } else {
                    unit
                })
            }
            None => None,
        };
        Ok(Self {
            axes,
            ..self.clone()
        })
    }
}

/// Offsets of each block inside the flat parameter vector.
#[derive(Debug, Clone)]
pub struct ParamLayout {
    topology: RigTopology,
    points_start: usize,
    intrinsics: Vec<Range<usize>>,
    extrinsics_start: usize,
    relative_start: Option<usize>,
    len: usize,
}

const LINEAR_AXES: Range<usize> = 0..9;
const A_AXIS: Range<usize> = 9..15;
const C_AXIS: Range<usize> = 15..21;

impl ParamLayout {
    pub fn new(topology: &RigTopology) -> Self {
        let mut offset = if topology.is_kinematic() {
            RigAxes::DIM
        } else {
            0
        };
        let points_start = offset;
        offset += 3 * topology.n_points;

        let intrinsics = topology
            .cameras
            .iter()
            .map(|kind| {
                let start = offset;
                offset += Intrinsics::DIM + kind.num_coeffs();
                start..offset
            })
            .collect();

        let extrinsics_start = offset;
        offset += SixDof::DIM * topology.n_extrinsics();

        let relative_start = topology.is_stereo().then(|| {
            let start = offset;
            offset += SixDof::DIM;
            start
        });

        Self {
            topology: topology.clone(),
            points_start,
            intrinsics,
            extrinsics_start,
            relative_start,
            len: offset,
        }
    }

    pub fn topology(&self) -> &RigTopology {
        &self.topology
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn axes(&self) -> Option<Range<usize>> {
        self.topology.is_kinematic().then_some(0..RigAxes::DIM)
    }

    /// X, Y and Z direction columns.
    pub fn linear_axes(&self) -> Option<Range<usize>> {
        self.topology.is_kinematic().then_some(LINEAR_AXES)
    }

    /// A origin and direction columns.
    pub fn a_axis(&self) -> Option<Range<usize>> {
        self.topology.is_kinematic().then_some(A_AXIS)
    }

    /// C origin and direction columns.
    pub fn c_axis(&self) -> Option<Range<usize>> {
        self.topology.is_kinematic().then_some(C_AXIS)
    }

    pub fn points(&self) -> Range<usize> {
        self.points_start..self.points_start + 3 * self.topology.n_points
    }

    pub fn point(&self, i: usize) -> Range<usize> {
        let start = self.points_start + 3 * i;
        start..start + 3
    }

    pub fn intrinsics(&self, camera: usize) -> Range<usize> {
        self.intrinsics[camera].clone()
    }

    pub fn extrinsics(&self) -> Range<usize> {
        self.extrinsics_start..self.extrinsics_start + SixDof::DIM * self.topology.n_extrinsics()
    }

    /// Pose block used by `view`. All views share one block on kinematic rigs.
    pub fn extrinsic(&self, view: usize) -> Range<usize> {
        let slot = if self.topology.is_kinematic() { 0 } else { view };
        let start = self.extrinsics_start + SixDof::DIM * slot;
        start..start + SixDof::DIM
    }

    pub fn relative_pose(&self) -> Option<Range<usize>> {
        self.relative_start.map(|s| s..s + SixDof::DIM)
    }

    /// Columns to hold during a kinematic solve so that the problem has no
    /// gauge freedom left:
    /// - the dominant component of each axis direction fixes its length,
    /// - the rotary origin coordinate along the same component fixes where the
    ///   origin sits on its line,
    /// - the shared camera pose fixes the world frame.
    ///
    /// Dominant components are read from `x0`. Empty for extrinsic rigs.
    pub fn gauge_mask(&self, x0: &DVector<Real>) -> FixedMask {
        let mut fixed = Vec::new();
        if let Some(axes) = self.axes() {
            let dominant = |row: usize| x0.fixed_rows::<3>(axes.start + 3 * row).iamax();
            for row in [0, 1, 2, 4, 6] {
                fixed.push(axes.start + 3 * row + dominant(row));
            }
            for (origin, direction) in [(3, 4), (5, 6)] {
                fixed.push(axes.start + 3 * origin + dominant(direction));
            }
            fixed.extend(self.extrinsic(0));
        }
        FixedMask::fix_indices(self.len, &fixed)
    }

    pub fn view<'a>(&'a self, x: &'a [Real]) -> ParamView<'a> {
        debug_assert_eq!(x.len(), self.len);
        ParamView { layout: self, x }
    }

    pub fn pack(&self, state: &RigState) -> Result<DVector<Real>, OptimError> {
        self.check_state(state)?;
        let mut x = DVector::zeros(self.len);

        if let (Some(axes), Some(range)) = (&state.axes, self.axes()) {
            for (k, row) in axes.rows().iter().enumerate() {
                let s = range.start + 3 * k;
                x.fixed_rows_mut::<3>(s).copy_from(row);
            }
        }
        for (i, p) in state.points.iter().enumerate() {
            x.fixed_rows_mut::<3>(self.point(i).start).copy_from(p);
        }
        for (c, camera) in state.cameras.iter().enumerate() {
            let range = self.intrinsics(c);
            for (dst, v) in x.as_mut_slice()[range].iter_mut().zip(camera.to_params()) {
                *dst = v;
            }
        }
        for (k, pose) in state.extrinsics.iter().enumerate() {
            let range = self.extrinsic(k);
            x.as_mut_slice()[range].copy_from_slice(&pose.to_array());
        }
        if let (Some(rel), Some(range)) = (&state.relative_pose, self.relative_pose()) {
            x.as_mut_slice()[range].copy_from_slice(&rel.to_array());
        }
        Ok(x)
    }

    pub fn unpack(&self, x: &DVector<Real>) -> Result<RigState, OptimError> {
        if x.len() != self.len {
            return Err(OptimError::DimensionMismatch {
                expected: self.len,
                got: x.len(),
            });
        }
        let view = self.view(x.as_slice());
        Ok(RigState {
            axes: view.axes(),
            points: (0..self.topology.n_points).map(|i| view.point(i)).collect(),
            cameras: (0..self.topology.n_cameras())
                .map(|c| view.camera(c))
                .collect(),
            extrinsics: (0..self.topology.n_extrinsics())
                .map(|k| view.extrinsic(k))
                .collect(),
            relative_pose: view.relative_pose(),
        })
    }

    fn check_state(&self, state: &RigState) -> Result<(), OptimError> {
        let t = &self.topology;
        match (t.is_kinematic(), state.axes.is_some()) {
            (true, false) => return Err(OptimError::MissingAxes),
            (false, true) => return Err(OptimError::UnexpectedAxes),
            _ => {}
        }
        match (t.is_stereo(), state.relative_pose.is_some()) {
            (true, false) => return Err(OptimError::MissingRelativePose),
            (false, true) => return Err(OptimError::UnexpectedRelativePose),
            _ => {}
        }
        check_count("point", t.n_points, state.points.len())?;
        check_count("camera", t.n_cameras(), state.cameras.len())?;
        check_count("extrinsic", t.n_extrinsics(), state.extrinsics.len())?;
        for (camera, (model, expected)) in state.cameras.iter().zip(&t.cameras).enumerate() {
            if model.distortion_kind() != *expected {
                return Err(OptimError::DistortionMismatch {
                    camera,
                    expected: *expected,
                    got: model.distortion_kind(),
                });
            }
        }
        Ok(())
    }
}

fn check_count(what: &'static str, expected: usize, got: usize) -> Result<(), OptimError> {
    if expected != got {
        return Err(OptimError::CountMismatch {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

/// Typed read access to a parameter slice.
#[derive(Debug, Clone, Copy)]
pub struct ParamView<'a> {
    layout: &'a ParamLayout,
    x: &'a [Real],
}

impl<'a> ParamView<'a> {
    fn vec3(&self, start: usize) -> Vec3 {
        Vec3::new(self.x[start], self.x[start + 1], self.x[start + 2])
    }

    fn six_dof(&self, start: usize) -> SixDof {
        SixDof::from_array(&std::array::from_fn(|k| self.x[start + k]))
    }

    pub fn axes(&self) -> Option<RigAxes> {
        let start = self.layout.axes()?.start;
        let rows: [Vec3; 7] = std::array::from_fn(|k| self.vec3(start + 3 * k));
        Some(RigAxes::from_rows(&rows))
    }

    pub fn point(&self, i: usize) -> Vec3 {
        self.vec3(self.layout.point(i).start)
    }

    pub fn camera(&self, camera: usize) -> CameraModel {
        let p = &self.x[self.layout.intrinsics(camera)];
        let intrinsics = Intrinsics {
            fx: p[0],
            fy: p[1],
            cx: p[2],
            cy: p[3],
        };
        let k = &p[Intrinsics::DIM..];
        let distortion = match self.layout.topology.cameras[camera] {
            DistortionKind::Radial2 => Distortion::Radial2 { k1: k[0], k2: k[1] },
            DistortionKind::RadialTangential4 => Distortion::RadialTangential4 {
                k1: k[0],
                k2: k[1],
                p1: k[2],
                p2: k[3],
            },
        };
        CameraModel::new(intrinsics, distortion)
    }

    pub fn extrinsic(&self, view: usize) -> SixDof {
        self.six_dof(self.layout.extrinsic(view).start)
    }

    pub fn relative_pose(&self) -> Option<SixDof> {
        self.layout
            .relative_pose()
            .map(|r| self.six_dof(r.start))
    }
}
