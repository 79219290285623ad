//! End-to-end tests of the estimator, its pose history and the update loop
//!
//! These tests drive the public API the way a vehicle integration does: sensor events go in,
//! poses at arbitrary timestamps come out. The synthetic drives come from [`gpsins::sim`] so the
//! truth is known exactly.
//!
//! ## Test Structure
//!
//! 1. Interpolation properties on hand-built poses
//! 2. History bookkeeping (eviction, not-yet and too-late answers)
//! 3. Geodetic conversions against sampled points
//! 4. Filter behaviour (covariance growth, convergence)
//! 5. Full scenarios through [`gpsins::sim::replay`] and through the service thread
use std::f64::consts::PI;

use assert_approx_eq::assert_approx_eq;
use nalgebra::{Matrix3, Rotation3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gpsins::earth::{ecef_to_geodetic, geodetic_to_ecef};
use gpsins::interpolate::interpolate;
use gpsins::sim::{ScenarioConfig, build_event_stream, replay};
use gpsins::{
    AttitudeSample, EstimatorConfig, EstimatorService, InterpolationStrategy, KalmanEstimator,
    Pose, PoseHistory, PoseQuery, PositionFix, SensorEvent,
};

const SECOND_NS: u64 = 1_000_000_000;
const STRATEGIES: [InterpolationStrategy; 2] =
    [InterpolationStrategy::Slerp, InterpolationStrategy::RowLerp];

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_pose(rng: &mut StdRng) -> Pose {
    let euler = Vector3::new(
        rng.random_range(-PI / 2.0..PI / 2.0),
        rng.random_range(-1.4..1.4),
        rng.random_range(-PI..PI),
    );
    let translation = Vector3::new(
        rng.random_range(-100.0..100.0),
        rng.random_range(-100.0..100.0),
        rng.random_range(-10.0..10.0),
    );
    Pose::from_euler(&euler, translation)
}

fn straight_drive(duration_s: f64) -> ScenarioConfig {
    ScenarioConfig {
        imu_rate_hz: 100.0,
        gps_rate_hz: 1.0,
        duration_s,
        velocity_ned: [1.0, 0.0, 0.0],
        ..Default::default()
    }
}

#[test]
fn interpolation_returns_brackets_and_saturates() {
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..50 {
        let a = random_pose(&mut rng);
        let b = random_pose(&mut rng);
        for strategy in STRATEGIES {
            assert_eq!(interpolate(&a, 1_000, &b, 5_000, 1_000, strategy), a);
            assert_eq!(interpolate(&a, 1_000, &b, 5_000, 5_000, strategy), b);
            assert_eq!(interpolate(&a, 1_000, &b, 5_000, 10, strategy), a);
            assert_eq!(interpolate(&a, 1_000, &b, 5_000, 9_000, strategy), b);
        }
    }
}

#[test]
fn interpolated_rotations_stay_orthonormal() {
    let mut rng = StdRng::seed_from_u64(2);
    for _ in 0..200 {
        let a = random_pose(&mut rng);
        let b = random_pose(&mut rng);
        let wanted = rng.random_range(0..=SECOND_NS);
        let slerp = interpolate(&a, 0, &b, SECOND_NS, wanted, InterpolationStrategy::Slerp);
        assert!(slerp.is_orthonormal(1e-9), "slerp at {wanted}: {slerp}");

        let lerp = interpolate(&a, 0, &b, SECOND_NS, wanted, InterpolationStrategy::RowLerp);
        for row in lerp.rotation.row_iter() {
            assert_approx_eq!(row.norm(), 1.0, 1e-9);
        }
    }
}

#[test]
fn antiparallel_rows_copy_the_closer_bracket() {
    let prev = Pose::identity();
    let angle = (-0.999f64).acos();
    let next = Pose::new(
        Rotation3::from_axis_angle(&Vector3::z_axis(), angle).into_inner(),
        Vector3::zeros(),
    );
    let near_prev = interpolate(
        &prev,
        0,
        &next,
        SECOND_NS,
        1_000,
        InterpolationStrategy::RowLerp,
    );
    assert_eq!(near_prev.rotation.row(0), prev.rotation.row(0));
    assert_eq!(near_prev.rotation.row(1), prev.rotation.row(1));
    assert_eq!(near_prev.rotation.row(2), prev.rotation.row(2));

    let near_next = interpolate(
        &prev,
        0,
        &next,
        SECOND_NS,
        SECOND_NS - 1_000,
        InterpolationStrategy::RowLerp,
    );
    assert_eq!(near_next.rotation.row(0), next.rotation.row(0));
    assert_eq!(near_next.rotation.row(1), next.rotation.row(1));
}

#[test]
fn history_evicts_oldest_poses() {
    let history = PoseHistory::default();
    for i in 1..=6u64 {
        let pose = Pose::new(Matrix3::identity(), Vector3::new(i as f64, 0.0, 0.0));
        history.add_pose(pose, 1.0, i * SECOND_NS).unwrap();
    }
    assert_eq!(history.len(), 4);
    assert_eq!(history.pose_at_time(SECOND_NS), PoseQuery::TooLate);
    assert_eq!(history.pose_at_time(7 * SECOND_NS), PoseQuery::NotYet);
    let found = *history.pose_at_time(5 * SECOND_NS + SECOND_NS / 2).found().unwrap();
    assert_approx_eq!(found.pose.translation[0], 5.5, 1e-12);
}

#[test]
fn geodetic_round_trip() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..500 {
        let lat = rng.random_range(-89.9f64..89.9).to_radians();
        let lon = rng.random_range(-180.0f64..180.0).to_radians();
        let height = rng.random_range(-500.0..10_000.0);
        let llh = ecef_to_geodetic(&geodetic_to_ecef(lat, lon, height));
        assert!((llh[0] - lat).abs() < 1e-8, "latitude {lat}");
        assert!((llh[1] - lon).abs() < 1e-8, "longitude {lon}");
        assert!((llh[2] - height).abs() < 1e-3, "height {height}");
    }
}

#[test]
fn prediction_grows_and_fixes_shrink_uncertainty() {
    init_logger();
    let mut est = KalmanEstimator::new(EstimatorConfig::default()).unwrap();
    let g = est.gravity();
    let mut trace = est.trace();
    for step in 1..=100u64 {
        est.predictor(&AttitudeSample::at_rest(step * 10_000_000, 0.01, 0.0, g))
            .unwrap();
        assert!(est.trace() > trace);
        trace = est.trace();
    }
    let fix = PositionFix::new(SECOND_NS, Vector3::new(5.0, 5.0, 0.0), Vector3::zeros());
    for _ in 0..5 {
        est.corrector(&fix).unwrap();
        assert!(est.trace() <= trace + 1e-12);
        trace = est.trace();
    }
    assert!((est.position() - fix.position).norm() < 0.05);
}

#[test]
fn straight_drive_pose_at_time() {
    init_logger();
    let mut est = KalmanEstimator::new(EstimatorConfig {
        history_capacity: 512,
        ..Default::default()
    })
    .unwrap();
    let events = build_event_stream(&straight_drive(2.0), est.gravity());
    let summary = replay(&mut est, &events);
    assert_eq!(summary.predicted, 200);
    assert_eq!(summary.corrected, 3);
    assert_eq!(summary.rejected, 0);

    let history = est.history();
    let found = *history
        .pose_at_time(SECOND_NS + SECOND_NS / 2)
        .found()
        .unwrap();
    assert_approx_eq!(found.pose.translation[0], 1.5, 0.05);
    assert_approx_eq!(found.pose.translation[1], 0.0, 0.05);
    assert_approx_eq!(found.pose.translation[2], 0.0, 0.05);
    assert!(found.cep > 0.0);

    // Halfway between two IMU poses.
    let between = *history
        .pose_at_time(SECOND_NS + SECOND_NS / 2 + 5_000_000)
        .found()
        .unwrap();
    assert!(between.pose.translation[0] > found.pose.translation[0]);
    assert_eq!(history.pose_at_time(3 * SECOND_NS), PoseQuery::NotYet);
}

#[test]
fn noisy_drive_stays_near_truth() {
    let mut est = KalmanEstimator::new(EstimatorConfig {
        noise_from_fix: true,
        history_capacity: 16,
        ..Default::default()
    })
    .unwrap();
    let cfg = ScenarioConfig {
        duration_s: 30.0,
        position_noise_std: 0.5,
        velocity_noise_std: 0.05,
        seed: 11,
        ..straight_drive(30.0)
    };
    let events = build_event_stream(&cfg, est.gravity());
    let summary = replay(&mut est, &events);
    assert_eq!(summary.rejected, 0);
    assert_approx_eq!(est.position()[0], 30.0, 2.0);
    assert_approx_eq!(est.velocity()[0], 1.0, 0.3);
}

#[test]
fn service_thread_serves_poses() {
    init_logger();
    let service = EstimatorService::spawn(EstimatorConfig {
        history_capacity: 512,
        select_timeout_ms: 10,
        ..Default::default()
    })
    .unwrap();
    let history = service.history();
    let events = build_event_stream(&straight_drive(2.0), gpsins::earth::STANDARD_GRAVITY);

    let adapter = service.sender().unwrap();
    let producer = std::thread::spawn(move || {
        for event in events {
            adapter.send(event).unwrap();
        }
    });
    producer.join().unwrap();

    let est = service.shutdown().unwrap();
    assert_approx_eq!(est.position()[0], 2.0, 0.05);
    let found = *history
        .pose_at_time(SECOND_NS + SECOND_NS / 2)
        .found()
        .unwrap();
    assert_approx_eq!(found.pose.translation[0], 1.5, 0.05);
    assert!(matches!(
        est.snapshot().fix_status,
        gpsins::FixStatus::Computed
    ));
}

#[test]
fn reset_event_zeroes_state() {
    let mut est = KalmanEstimator::new(EstimatorConfig::default()).unwrap();
    let events = [
        SensorEvent::Fix(PositionFix::new(0, Vector3::new(3.0, 0.0, 0.0), Vector3::zeros())),
        SensorEvent::Reset,
    ];
    let summary = replay(&mut est, &events);
    assert_eq!(summary.corrected, 1);
    assert_eq!(summary.control, 1);
    assert_eq!(est.position(), Vector3::zeros());
    assert_eq!(est.history().len(), 1);
}
