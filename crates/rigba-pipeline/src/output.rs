//! Solution writer and reader.
//!
//! ```text
//! n_views n_points n_cameras pose_mode
//! per camera: fx fy cx cy / distortion coefficients
//! relative pose                                  stereo only
//! 7 axis rows + camera extrinsic                 kinematic only
//! sample rx ry rz tx ty tz (one per view)        extrinsic only
//! index x y z (one per point)
//! ```
//!
//! Floats are written in shortest round-trip form, so reading a solution back
//! reproduces the refined values exactly.

use std::fmt::Display;
use std::io::Write;
use std::path::Path;

use log::debug;
use rigba_core::{
    CameraModel, Distortion, Intrinsics, PoseKind, PoseMode, PoseSample, RigAxes, Vec3,
};
use rigba_optim::RigState;
use tempfile::NamedTempFile;

use crate::text::Records;
use crate::{ParseError, PipelineError};

#[derive(Debug, Clone, PartialEq)]
pub struct RigSolution {
    pub n_views: usize,
    /// Sample index per refined view pose; empty for kinematic rigs, whose
    /// per-view coordinates are inputs.
    pub sample_indices: Vec<i64>,
    pub state: RigState,
}

impl RigSolution {
    pub fn new(poses: &[PoseSample], state: RigState) -> Self {
        let sample_indices = poses
            .iter()
            .filter(|p| matches!(p.kind, PoseKind::Extrinsic(_)))
            .map(|p| p.sample_index)
            .collect();
        Self {
            n_views: poses.len(),
            sample_indices,
            state,
        }
    }

    pub fn pose_mode(&self) -> PoseMode {
        if self.state.axes.is_some() {
            PoseMode::Kinematic
        } else {
            PoseMode::Extrinsic
        }
    }
}

fn push_line<T: Display>(out: &mut String, values: impl IntoIterator<Item = T>) {
    let line = values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    out.push_str(&line);
    out.push('\n');
}

pub fn format_solution(solution: &RigSolution) -> String {
    let state = &solution.state;
    let mut out = String::new();
    out.push_str(&format!(
        "{} {} {} {}\n",
        solution.n_views,
        state.points.len(),
        state.cameras.len(),
        solution.pose_mode().as_str()
    ));
    for camera in &state.cameras {
        push_line(&mut out, camera.intrinsics.to_array());
        push_line(&mut out, camera.distortion.coeffs());
    }
    if let Some(rel) = &state.relative_pose {
        push_line(&mut out, rel.to_array());
    }
    match &state.axes {
        Some(axes) => {
            for row in axes.rows() {
                push_line(&mut out, row.iter());
            }
            for ext in &state.extrinsics {
                push_line(&mut out, ext.to_array());
            }
        }
        None => {
            for (sample, pose) in solution.sample_indices.iter().zip(&state.extrinsics) {
                out.push_str(&format!("{sample} "));
                push_line(&mut out, pose.to_array());
            }
        }
    }
    for (i, p) in state.points.iter().enumerate() {
        out.push_str(&format!("{i} "));
        push_line(&mut out, p.iter());
    }
    out
}

pub fn parse_solution(text: &str) -> Result<RigSolution, ParseError> {
    let mut records = Records::new(text);
    let h = records.next_exact("header", 4)?;
    let n_views: usize = h.parse(0)?;
    let n_points: usize = h.parse(1)?;
    let n_cameras: usize = h.parse(2)?;
    let pose_mode: PoseMode = h.tokens[3]
        .parse()
        .map_err(|message| ParseError::InvalidHeader {
            line: h.line,
            field: "pose mode",
            message,
        })?;

    let mut cameras = Vec::with_capacity(n_cameras);
    for _ in 0..n_cameras {
        let k = records.next_exact("intrinsics", 4)?.reals(0)?;
        let d = records.next_record("distortion")?;
        d.expect_len("distortion", &[2, 4])?;
        let distortion = Distortion::from_coeffs(&d.reals(0)?)
            .map_err(|source| ParseError::Geometry { line: d.line, source })?;
        let intrinsics = Intrinsics {
            fx: k[0],
            fy: k[1],
            cx: k[2],
            cy: k[3],
        };
        cameras.push(CameraModel::new(intrinsics, distortion));
    }
    let relative_pose = if n_cameras == 2 {
        Some(records.next_exact("relative pose", 6)?.six_dof(0)?)
    } else {
        None
    };

    let mut sample_indices = Vec::new();
    let mut extrinsics = Vec::new();
    let axes = match pose_mode {
        PoseMode::Kinematic => {
            let mut rows = [Vec3::zeros(); 7];
            for row in rows.iter_mut() {
                *row = records.next_exact("axis row", 3)?.vec3(0)?;
            }
            extrinsics.push(records.next_exact("camera extrinsic", 6)?.six_dof(0)?);
            Some(RigAxes::from_rows(&rows))
        }
        PoseMode::Extrinsic => {
            for _ in 0..n_views {
                let r = records.next_exact("pose", 7)?;
                sample_indices.push(r.parse(0)?);
                extrinsics.push(r.six_dof(1)?);
            }
            None
        }
    };

    let mut points = Vec::with_capacity(n_points);
    for _ in 0..n_points {
        let r = records.next_exact("point", 4)?;
        r.index(0, "point", n_points)?;
        points.push(r.vec3(1)?);
    }

    Ok(RigSolution {
        n_views,
        sample_indices,
        state: RigState {
            axes,
            points,
            cameras,
            extrinsics,
            relative_pose,
        },
    })
}

/// Write `contents` to `path` through a temporary file in the same directory,
/// renamed into place once fully written.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), PipelineError> {
    let io_err = |source: std::io::Error| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(contents.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    debug!("wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

pub fn write_solution(path: &Path, solution: &RigSolution) -> Result<(), PipelineError> {
    write_atomic(path, &format_solution(solution))
}

pub fn read_solution(path: &Path) -> Result<RigSolution, PipelineError> {
    let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_solution(&text).map_err(|source| PipelineError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
