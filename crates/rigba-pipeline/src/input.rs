//! Dataset reader.
//!
//! ```text
//! n_views n_points n_observations [n_cameras] [pose_mode]
//! per camera: K (9 values, row-major), distortion (2 or 4 values)
//! relative pose (6 values)                      stereo only
//! X, Y, Z, A origin, A dir, C origin, C dir     kinematic only, 3 values each
//! camera extrinsic (6 values)                   kinematic only
//! observations + pose headers, flat or grouped
//! points (3 values each)
//! ```
//!
//! With `n_observations > 0` the observations come first as
//! `view cam point x y` lines followed by one pose header per view. With
//! `n_observations == 0` each view is a group: `n_obs <pose header>` then
//! `n_obs` lines of `point x y` (camera 0) or `cam point x y`.
//!
//! Pose headers are `sample rx ry rz tx ty tz` (extrinsic) or
//! `sample x y z a c` (kinematic).

use std::path::Path;

use log::{debug, warn};
use rigba_core::{
    AxisCoordinates, CameraModel, Distortion, GeometryError, Intrinsics, Mat3, Observation,
    PoseKind, PoseMode, PoseSample, RigAxes, Vec3, MIN_AXIS_NORM,
};
use rigba_optim::{RigData, RigState, RigTopology};

use crate::text::{Record, Records};
use crate::{ParseError, PipelineError};

/// Everything read from one input file.
#[derive(Debug, Clone)]
pub struct RigDataset {
    pub topology: RigTopology,
    pub poses: Vec<PoseSample>,
    pub observations: Vec<Observation>,
    /// Initial guess for the solver.
    pub initial: RigState,
}

impl RigDataset {
    /// Split into solver inputs.
    pub fn into_parts(self) -> Result<(RigData, RigState), PipelineError> {
        let data = RigData::new(self.topology, self.poses, self.observations)?;
        Ok((data, self.initial))
    }
}

struct Header {
    n_views: usize,
    n_points: usize,
    n_observations: usize,
    n_cameras: usize,
    pose_mode: PoseMode,
}

fn parse_header(r: &Record<'_>) -> Result<Header, ParseError> {
    r.expect_len("header", &[3, 4, 5])?;
    let mut header = Header {
        n_views: r.parse(0)?,
        n_points: r.parse(1)?,
        n_observations: r.parse(2)?,
        n_cameras: 1,
        pose_mode: PoseMode::Extrinsic,
    };
    let mut rest = &r.tokens[3..];
    if let Some(token) = rest.first() {
        // n_cameras may be omitted when only the pose mode is given.
        if let Ok(n) = token.parse::<usize>() {
            if !(1..=2).contains(&n) {
                return Err(ParseError::InvalidHeader {
                    line: r.line,
                    field: "camera count",
                    message: format!("expected 1 or 2, got {n}"),
                });
            }
            header.n_cameras = n;
            rest = &rest[1..];
        }
    }
    match rest {
        [] => {}
        [mode] => {
            header.pose_mode = mode.parse().map_err(|message| ParseError::InvalidHeader {
                line: r.line,
                field: "pose mode",
                message,
            })?;
        }
        _ => {
            return Err(ParseError::InvalidHeader {
                line: r.line,
                field: "header",
                message: format!("unexpected token '{}'", rest[rest.len() - 1]),
            })
        }
    }
    Ok(header)
}

fn parse_camera(records: &mut Records<'_>) -> Result<CameraModel, ParseError> {
    let k = records.next_exact("intrinsic matrix", 9)?;
    let values = k.reals(0)?;
    let intrinsics = Intrinsics::from_matrix(&Mat3::from_row_slice(&values));

    let d = records.next_record("distortion")?;
    d.expect_len("distortion", &[2, 4])?;
    let distortion = Distortion::from_coeffs(&d.reals(0)?)
        .map_err(|source| ParseError::Geometry { line: d.line, source })?;
    Ok(CameraModel::new(intrinsics, distortion))
}

const AXIS_ROWS: [(&str, bool); 7] = [
    ("X", true),
    ("Y", true),
    ("Z", true),
    ("A origin", false),
    ("A", true),
    ("C origin", false),
    ("C", true),
];

fn parse_axes(records: &mut Records<'_>) -> Result<RigAxes, ParseError> {
    let mut rows = [Vec3::zeros(); 7];
    for (row, (name, is_direction)) in rows.iter_mut().zip(AXIS_ROWS) {
        let r = records.next_exact("axis row", 3)?;
        *row = r.vec3(0)?;
        if is_direction && !(row.norm() >= MIN_AXIS_NORM) {
            return Err(ParseError::Geometry {
                line: r.line,
                source: GeometryError::DegenerateAxis(name),
            });
        }
    }
    Ok(RigAxes::from_rows(&rows))
}

fn parse_pose(r: &Record<'_>, from: usize, mode: PoseMode) -> Result<PoseSample, ParseError> {
    let sample_index = r.parse(from)?;
    Ok(match mode {
        PoseMode::Extrinsic => PoseSample::extrinsic(sample_index, r.six_dof(from + 1)?),
        PoseMode::Kinematic => {
            let v = r.reals(from + 1)?;
            PoseSample::kinematic(
                sample_index,
                AxisCoordinates::new(v[0], v[1], v[2], v[3], v[4]),
            )
        }
    })
}

fn pose_len(mode: PoseMode) -> usize {
    match mode {
        PoseMode::Extrinsic => 7,
        PoseMode::Kinematic => 6,
    }
}

/// Parse a dataset from text.
pub fn parse_dataset(text: &str) -> Result<RigDataset, ParseError> {
    let mut records = Records::new(text);
    let header_record = records.next_record("header")?;
    let h = parse_header(&header_record)?;
    debug!(
        "dataset header: {} views, {} points, {} observations, {} camera(s), {} poses",
        h.n_views,
        h.n_points,
        h.n_observations,
        h.n_cameras,
        h.pose_mode.as_str()
    );

    let cameras = (0..h.n_cameras)
        .map(|_| parse_camera(&mut records))
        .collect::<Result<Vec<_>, _>>()?;
    let relative_pose = if h.n_cameras == 2 {
        Some(records.next_exact("relative pose", 6)?.six_dof(0)?)
    } else {
        None
    };
    let (axes, camera_extrinsic) = match h.pose_mode {
        PoseMode::Kinematic => {
            let axes = parse_axes(&mut records)?;
            let ext = records.next_exact("camera extrinsic", 6)?.six_dof(0)?;
            (Some(axes), Some(ext))
        }
        PoseMode::Extrinsic => (None, None),
    };

    let obs_fields = |r: &Record<'_>, view: usize, from: usize| -> Result<Observation, ParseError> {
        let (camera, from) = if r.len() - from == 4 {
            (r.index(from, "camera", h.n_cameras)?, from + 1)
        } else {
            (0, from)
        };
        let point = r.index(from, "point", h.n_points)?;
        Ok(Observation::new(view, camera, point, r.real(from + 1)?, r.real(from + 2)?))
    };

    let plen = pose_len(h.pose_mode);
    let mut poses = Vec::with_capacity(h.n_views);
    let observations = if h.n_observations > 0 {
        let mut observations = Vec::with_capacity(h.n_observations);
        for _ in 0..h.n_observations {
            let r = records.next_record("observation")?;
            r.expect_len("observation", &[4, 5])?;
            let view = r.index(0, "view", h.n_views)?;
            observations.push(obs_fields(&r, view, 1)?);
        }
        for _ in 0..h.n_views {
            let r = records.next_exact("pose", plen)?;
            poses.push(parse_pose(&r, 0, h.pose_mode)?);
        }
        observations
    } else {
        let mut observations = Vec::new();
        for view in 0..h.n_views {
            let r = records.next_exact("pose group header", plen + 1)?;
            let n_obs: usize = r.parse(0)?;
            poses.push(parse_pose(&r, 1, h.pose_mode)?);
            observations.reserve(n_obs);
            for _ in 0..n_obs {
                let o = records.next_record("observation")?;
                o.expect_len("observation", &[3, 4])?;
                observations.push(obs_fields(&o, view, 0)?);
            }
        }
        observations
    };

    let points = (0..h.n_points)
        .map(|_| records.next_exact("point", 3)?.vec3(0))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(line) = records.trailing() {
        warn!("ignoring trailing data from line {line}");
    }

    let extrinsics = match camera_extrinsic {
        Some(ext) => vec![ext],
        None => poses
            .iter()
            .filter_map(|p| match p.kind {
                PoseKind::Extrinsic(pose) => Some(pose),
                PoseKind::Kinematic(_) => None,
            })
            .collect(),
    };
    let topology = RigTopology {
        n_views: h.n_views,
        n_points: h.n_points,
        cameras: cameras.iter().map(CameraModel::distortion_kind).collect(),
        pose_mode: h.pose_mode,
    };

    Ok(RigDataset {
        topology,
        poses,
        observations,
        initial: RigState {
            axes,
            points,
            cameras,
            extrinsics,
            relative_pose,
        },
    })
}

/// Read and parse a dataset file.
pub fn read_dataset(path: &Path) -> Result<RigDataset, PipelineError> {
    let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_dataset(&text).map_err(|source| PipelineError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
