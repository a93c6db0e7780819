use rigba_core::synthetic::{lattice_points, observe_extrinsic, observe_kinematic};
use rigba_core::{
    AxisCoordinates, CameraModel, Distortion, Intrinsics, PoseMode, PoseSample, Real, RigAxes,
    RotaryAxis, SixDof, Vec3,
};
use rigba_optim::{
    refine_rig_bundle, LmBackend, OptimError, RigBundleOptions, RigBundleProblem, RigData,
    RigState, RigTopology, RobustKernel, SparseLmBackend,
};

fn camera(fx: Real, distortion: Distortion) -> CameraModel {
    CameraModel::new(
        Intrinsics {
            fx,
            fy: fx * 1.01,
            cx: 640.0,
            cy: 480.0,
        },
        distortion,
    )
}

fn perturb_camera(cam: &CameraModel) -> CameraModel {
    let mut out = *cam;
    out.intrinsics.fx += 4.0;
    out.intrinsics.fy -= 3.0;
    out.intrinsics.cx += 2.0;
    out.intrinsics.cy -= 1.5;
    out
}

fn perturb_points(points: &[Vec3]) -> Vec<Vec3> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let s = i as Real;
            p + Vec3::new((s * 0.7).sin(), (s * 1.3).cos(), (s * 0.4).sin()) * 1e-3
        })
        .collect()
}

fn perturb_pose(pose: &SixDof) -> SixDof {
    SixDof::new(
        pose.rotation + Vec3::new(2e-3, -1e-3, 1.5e-3),
        pose.translation + Vec3::new(2e-3, 1e-3, -3e-3),
    )
}

fn assert_unit_directions(axes: &RigAxes) {
    for (name, dir) in [
        ("X", axes.x),
        ("Y", axes.y),
        ("Z", axes.z),
        ("A", axes.a.direction),
        ("C", axes.c.direction),
    ] {
        assert!(
            (dir.norm() - 1.0).abs() < 1e-9,
            "{name} direction not unit length: {}",
            dir.norm()
        );
    }
}

struct Scene {
    data: RigData,
    truth: RigState,
}

fn stereo_scene() -> Scene {
    let cams = [
        camera(
            900.0,
            Distortion::RadialTangential4 {
                k1: -0.05,
                k2: 0.01,
                p1: 0.0005,
                p2: -0.0003,
            },
        ),
        camera(880.0, Distortion::Radial2 { k1: -0.04, k2: 0.008 }),
    ];
    let relative = SixDof::new(Vec3::new(0.0, 0.02, 0.0), Vec3::new(-0.12, 0.0, 0.0));
    let poses: Vec<SixDof> = (0..5)
        .map(|i| {
            let t = i as Real;
            SixDof::new(
                Vec3::new(0.08 * (t - 2.0), 0.05 * (t - 1.0).sin(), 0.02 * t),
                Vec3::new(0.02 * t - 0.04, -0.01 * t, 1.2 + 0.05 * t),
            )
        })
        .collect();
    let points = lattice_points(3, 3, 2, 0.08, Vec3::new(-0.08, -0.08, -0.04));
    let observations = observe_extrinsic(&cams, Some(&relative), &poses, &points);

    let topology = RigTopology::new(
        poses.len(),
        points.len(),
        cams.iter().map(|c| c.distortion_kind()).collect(),
        PoseMode::Extrinsic,
    )
    .unwrap();
    let samples = poses
        .iter()
        .enumerate()
        .map(|(i, p)| PoseSample::extrinsic(100 + i as i64, *p))
        .collect();
    Scene {
        data: RigData::new(topology, samples, observations).unwrap(),
        truth: RigState {
            axes: None,
            points,
            cameras: cams.to_vec(),
            extrinsics: poses,
            relative_pose: Some(relative),
        },
    }
}

fn kinematic_scene() -> Scene {
    let mut axes = RigAxes::aligned();
    axes.x = Vec3::new(1.0, 0.002, -0.001).normalize();
    axes.y = Vec3::new(-0.003, 1.0, 0.001).normalize();
    axes.z = Vec3::new(0.001, 0.002, 1.0).normalize();
    axes.a = RotaryAxis::new(Vec3::new(0.0, 0.05, -0.02), Vec3::new(1.0, 0.01, 0.003).normalize());
    axes.c = RotaryAxis::new(Vec3::new(0.03, -0.01, 0.0), Vec3::new(0.002, -0.004, 1.0).normalize());

    let coords: Vec<AxisCoordinates> = (0..14)
        .map(|i| {
            let t = i as Real;
            let a = if i % 3 == 0 { 0.0 } else { 12.0 * (t * 0.9).sin() };
            let c = if i % 4 == 1 { 0.0 } else { 20.0 * (t * 0.6).cos() };
            AxisCoordinates::new(
                0.03 * (t * 0.5).sin(),
                0.03 * (t * 0.8).cos(),
                0.02 * (t * 0.3).sin(),
                a,
                c,
            )
        })
        .collect();
    let cams = [camera(1200.0, Distortion::Radial2 { k1: -0.02, k2: 0.004 })];
    let cam_pose = SixDof::new(Vec3::new(0.01, -0.02, 0.005), Vec3::new(0.0, 0.0, 0.9));
    let points = lattice_points(4, 4, 2, 0.05, Vec3::new(-0.075, -0.075, -0.025));
    let observations = observe_kinematic(&cams, None, &axes, &cam_pose, &coords, &points);

    let topology = RigTopology::new(
        coords.len(),
        points.len(),
        vec![cams[0].distortion_kind()],
        PoseMode::Kinematic,
    )
    .unwrap();
    let samples = coords
        .iter()
        .enumerate()
        .map(|(i, c)| PoseSample::kinematic(i as i64, *c))
        .collect();
    Scene {
        data: RigData::new(topology, samples, observations).unwrap(),
        truth: RigState {
            axes: Some(axes),
            points,
            cameras: cams.to_vec(),
            extrinsics: vec![cam_pose],
            relative_pose: None,
        },
    }
}

fn perturbed(truth: &RigState) -> RigState {
    let axes = truth.axes.map(|mut axes| {
        axes.x += Vec3::new(0.0, 0.004, 0.002);
        axes.a.direction += Vec3::new(0.0, -0.003, 0.004);
        axes.a.origin += Vec3::new(0.0, 0.002, -0.001);
        axes.c.direction += Vec3::new(0.003, 0.002, 0.0);
        axes.c.origin += Vec3::new(-0.002, 0.001, 0.0);
        axes
    });
    RigState {
        axes,
        points: perturb_points(&truth.points),
        cameras: truth.cameras.iter().map(perturb_camera).collect(),
        extrinsics: truth.extrinsics.iter().map(perturb_pose).collect(),
        relative_pose: truth.relative_pose.as_ref().map(perturb_pose),
    }
}

#[test]
fn stereo_extrinsic_rig_converges_on_exact_data() {
    let scene = stereo_scene();
    let problem = RigBundleProblem::new(scene.data);
    let initial = perturbed(&scene.truth);

    let result =
        refine_rig_bundle(&LmBackend, &problem, &initial, &RigBundleOptions::default()).unwrap();

    assert!(result.initial_rmse > 1.0, "perturbation too small: {}", result.initial_rmse);
    assert!(
        result.final_rmse < 1e-6,
        "final RMSE too high: {} (initial {})",
        result.final_rmse,
        result.initial_rmse
    );
    assert!(result.final_rmse <= result.initial_rmse);
    assert!(result.state.axes.is_none());
    assert!(result.state.relative_pose.is_some());
    assert_eq!(result.state.extrinsics.len(), 5);
}

#[test]
fn kinematic_rig_converges_with_unit_axes() {
    let scene = kinematic_scene();
    let problem = RigBundleProblem::new(scene.data);
    let initial = perturbed(&scene.truth);

    let result =
        refine_rig_bundle(&LmBackend, &problem, &initial, &RigBundleOptions::default()).unwrap();

    assert!(result.initial_rmse > 1.0, "perturbation too small: {}", result.initial_rmse);
    assert!(
        result.final_rmse < 1e-6,
        "final RMSE too high: {} (initial {})",
        result.final_rmse,
        result.initial_rmse
    );
    assert!(result.final_rmse <= result.initial_rmse);

    let axes = result.state.axes.expect("kinematic result carries axes");
    assert_unit_directions(&axes);
    // Both rotary axes are dominated by a single component (A ~ X, C ~ Z).
    assert_eq!(axes.a.origin.x, 0.0);
    assert_eq!(axes.c.origin.z, 0.0);
}

#[test]
fn robust_kernel_still_converges_without_outliers() {
    let scene = stereo_scene();
    let problem = RigBundleProblem::new(scene.data).with_kernel(RobustKernel::Huber { delta: 2.0 });
    let initial = perturbed(&scene.truth);

    let result =
        refine_rig_bundle(&LmBackend, &problem, &initial, &RigBundleOptions::default()).unwrap();
    assert!(result.final_rmse < 1e-6, "final RMSE too high: {}", result.final_rmse);
}

#[test]
fn anchoring_can_be_disabled() {
    let scene = kinematic_scene();
    let problem = RigBundleProblem::new(scene.data);
    let mut initial = scene.truth.clone();
    if let Some(axes) = initial.axes.as_mut() {
        axes.a.origin.x = 0.25;
    }
    let opts = RigBundleOptions {
        anchor_rotary_origins: false,
        ..Default::default()
    };

    let result = refine_rig_bundle(&LmBackend, &problem, &initial, &opts).unwrap();
    let axes = result.state.axes.unwrap();
    assert!(axes.a.origin.x != 0.0, "origin was re-anchored: {:?}", axes.a.origin);
    assert!(result.final_rmse < 1e-6, "final RMSE too high: {}", result.final_rmse);
}

#[test]
fn degenerate_initial_axis_is_rejected() {
    let scene = kinematic_scene();
    let problem = RigBundleProblem::new(scene.data);
    let mut initial = scene.truth.clone();
    if let Some(axes) = initial.axes.as_mut() {
        axes.y = Vec3::zeros();
    }
    let err = refine_rig_bundle(&LmBackend, &problem, &initial, &RigBundleOptions::default())
        .unwrap_err();
    assert!(matches!(err, OptimError::Geometry(_)), "unexpected error {err:?}");
}

#[test]
fn state_must_match_topology() {
    let scene = stereo_scene();
    let problem = RigBundleProblem::new(scene.data);
    let mut initial = scene.truth.clone();
    initial.relative_pose = None;
    let err = refine_rig_bundle(&LmBackend, &problem, &initial, &RigBundleOptions::default())
        .unwrap_err();
    assert_eq!(err, OptimError::MissingRelativePose);
}

#[test]
fn sparse_backend_converges_on_both_rigs() {
    for scene in [stereo_scene(), kinematic_scene()] {
        let initial = perturbed(&scene.truth);
        let problem = RigBundleProblem::new(scene.data);
        let result =
            refine_rig_bundle(&SparseLmBackend, &problem, &initial, &RigBundleOptions::default())
                .unwrap();
        assert!(
            result.final_rmse < 1e-6,
            "final RMSE too high: {} (initial {})",
            result.final_rmse,
            result.initial_rmse
        );
        assert!(result.report.converged, "{:?}", result.report);
        if let Some(axes) = &result.state.axes {
            assert_unit_directions(axes);
        }
    }
}

#[test]
fn kinematic_camera_pose_is_held_during_the_solve() {
    let scene = kinematic_scene();
    let problem = RigBundleProblem::new(scene.data);
    let initial = perturbed(&scene.truth);

    for result in [
        refine_rig_bundle(&LmBackend, &problem, &initial, &RigBundleOptions::default()),
        refine_rig_bundle(&SparseLmBackend, &problem, &initial, &RigBundleOptions::default()),
    ] {
        let result = result.unwrap();
        assert_eq!(result.state.extrinsics, initial.extrinsics);
        assert!(result.final_rmse < 1e-6, "final RMSE too high: {}", result.final_rmse);
    }
}
