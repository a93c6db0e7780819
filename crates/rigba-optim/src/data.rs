use rigba_core::{AxisCoordinates, Observation, PoseKind, PoseSample, SixDof};

use crate::{OptimError, RigTopology};

/// Read-only inputs of a rig bundle problem: topology, per-view poses and the
/// observation table.
///
/// Construction validates every index, so the residual and sparsity code can
/// index without checks.
#[derive(Debug, Clone)]
pub struct RigData {
    topology: RigTopology,
    poses: Vec<PoseSample>,
    observations: Vec<Observation>,
}

impl RigData {
    pub fn new(
        topology: RigTopology,
        poses: Vec<PoseSample>,
        observations: Vec<Observation>,
    ) -> Result<Self, OptimError> {
        if poses.len() != topology.n_views {
            return Err(OptimError::CountMismatch {
                what: "pose",
                expected: topology.n_views,
                got: poses.len(),
            });
        }
        for (view, pose) in poses.iter().enumerate() {
            if pose.kind.mode() != topology.pose_mode {
                return Err(OptimError::PoseModeMismatch {
                    view,
                    expected: topology.pose_mode,
                    got: pose.kind.mode(),
                });
            }
        }
        if observations.is_empty() {
            return Err(OptimError::NoObservations);
        }
        for (i, obs) in observations.iter().enumerate() {
            check_index(i, "view", obs.view, topology.n_views)?;
            check_index(i, "camera", obs.camera, topology.n_cameras())?;
            check_index(i, "point", obs.point, topology.n_points)?;
        }
        Ok(Self {
            topology,
            poses,
            observations,
        })
    }

    pub fn topology(&self) -> &RigTopology {
        &self.topology
    }

    pub fn poses(&self) -> &[PoseSample] {
        &self.poses
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Machine coordinates of `view`, if the rig is kinematic.
    pub fn coords(&self, view: usize) -> Option<&AxisCoordinates> {
        self.poses[view].coords()
    }

    pub fn num_residuals(&self) -> usize {
        2 * self.observations.len()
    }

    /// Initial world-to-camera poses carried by extrinsic pose samples.
    pub fn initial_extrinsics(&self) -> Vec<SixDof> {
        self.poses
            .iter()
            .filter_map(|p| match p.kind {
                PoseKind::Extrinsic(pose) => Some(pose),
                PoseKind::Kinematic(_) => None,
            })
            .collect()
    }
}

fn check_index(
    observation: usize,
    field: &'static str,
    value: usize,
    limit: usize,
) -> Result<(), OptimError> {
    if value >= limit {
        return Err(OptimError::IndexOutOfRange {
            observation,
            field,
            value,
            limit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigba_core::{DistortionKind, PoseMode};

    fn topology() -> RigTopology {
        RigTopology::new(2, 3, vec![DistortionKind::Radial2], PoseMode::Extrinsic).unwrap()
    }

    fn poses() -> Vec<PoseSample> {
        vec![
            PoseSample::extrinsic(10, SixDof::identity()),
            PoseSample::extrinsic(11, SixDof::identity()),
        ]
    }

    #[test]
    fn valid_data_is_accepted() {
        let obs = vec![Observation::new(1, 0, 2, 1.0, 2.0)];
        let data = RigData::new(topology(), poses(), obs).unwrap();
        assert_eq!(data.num_residuals(), 2);
        assert_eq!(data.initial_extrinsics().len(), 2);
        assert!(data.coords(0).is_none());
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let cases = [
            (Observation::new(2, 0, 0, 0.0, 0.0), "view"),
            (Observation::new(0, 1, 0, 0.0, 0.0), "camera"),
            (Observation::new(0, 0, 3, 0.0, 0.0), "point"),
        ];
        for (obs, field) in cases {
            let err = RigData::new(topology(), poses(), vec![obs]).unwrap_err();
            assert!(
                matches!(err, OptimError::IndexOutOfRange { field: f, .. } if f == field),
                "expected {field} error, got {err:?}"
            );
        }
    }

    #[test]
    fn pose_mode_must_match_topology() {
        let mut p = poses();
        p[1] = PoseSample::kinematic(11, Default::default());
        let err = RigData::new(topology(), p, vec![Observation::new(0, 0, 0, 0.0, 0.0)]);
        assert!(matches!(err, Err(OptimError::PoseModeMismatch { view: 1, .. })));
    }

    #[test]
    fn empty_observation_table_is_rejected() {
        assert_eq!(
            RigData::new(topology(), poses(), vec![]).unwrap_err(),
            OptimError::NoObservations
        );
    }
}
