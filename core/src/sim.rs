//! Synthetic sensor event streams
//!
//! A [`ScenarioConfig`] describes a vehicle driving at constant NED velocity and heading from the
//! origin of the tangent plane. [`build_event_stream`] turns it into the attitude samples and GPS
//! fixes a real vehicle would produce, in arrival order, optionally with seeded Gaussian noise
//! on the fixes. [`replay`] feeds a stream through an estimator without the update thread.

use nalgebra::Vector3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::kalman::KalmanEstimator;
use crate::service::{SensorEvent, apply_event};
use crate::{AttitudeSample, GeodeticOrigin, PositionFix};

fn default_imu_rate_hz() -> f64 {
    100.0
}
fn default_gps_rate_hz() -> f64 {
    1.0
}
fn default_duration_s() -> f64 {
    10.0
}
fn default_seed() -> u64 {
    42
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default = "default_imu_rate_hz")]
    pub imu_rate_hz: f64,
    #[serde(default = "default_gps_rate_hz")]
    pub gps_rate_hz: f64,
    #[serde(default = "default_duration_s")]
    pub duration_s: f64,
    /// Time of the first fix, nanoseconds since the Unix epoch
    #[serde(default)]
    pub start_ns: u64,
    /// Emitted as the first event when set
    #[serde(default)]
    pub origin: Option<GeodeticOrigin>,
    /// NED velocity in m/s
    #[serde(default)]
    pub velocity_ned: [f64; 3],
    /// Heading in degrees
    #[serde(default)]
    pub yaw: f64,
    /// Standard deviation of the noise added to fix positions, meters
    #[serde(default)]
    pub position_noise_std: f64,
    /// Standard deviation of the noise added to fix velocities, m/s
    #[serde(default)]
    pub velocity_noise_std: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}
impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            imu_rate_hz: default_imu_rate_hz(),
            gps_rate_hz: default_gps_rate_hz(),
            duration_s: default_duration_s(),
            start_ns: 0,
            origin: None,
            velocity_ned: [0.0; 3],
            yaw: 0.0,
            position_noise_std: 0.0,
            velocity_noise_std: 0.0,
            seed: default_seed(),
        }
    }
}

/// Counts of what a replay did with each event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub predicted: usize,
    pub corrected: usize,
    /// Origin and reset events
    pub control: usize,
    pub rejected: usize,
}

fn sample_times(rate_hz: f64, duration_s: f64, first: u64) -> impl Iterator<Item = (u64, f64)> {
    let valid = rate_hz.is_finite() && rate_hz > 0.0 && duration_s.is_finite() && duration_s >= 0.0;
    let count = if valid {
        (duration_s * rate_hz + 1e-9).floor() as u64
    } else {
        0
    };
    (first..=count).map(move |k| {
        let t = k as f64 / rate_hz;
        ((t * 1e9).round() as u64, t)
    })
}

fn gaussian(rng: &mut StdRng, std: f64) -> f64 {
    if std > 0.0 {
        Normal::new(0.0, std).map_or(0.0, |n| n.sample(rng))
    } else {
        0.0
    }
}

/// Build the time-ordered event stream of a constant-velocity drive.
///
/// Attitude samples start one IMU period after `start_ns` and carry the specific force of an
/// unaccelerated vehicle under `gravity`. Fixes start at `start_ns`. When an attitude sample
/// and a fix share a timestamp the attitude sample comes first.
pub fn build_event_stream(cfg: &ScenarioConfig, gravity: f64) -> Vec<SensorEvent> {
    let velocity = Vector3::from(cfg.velocity_ned);
    let imu_dt = 1.0 / cfg.imu_rate_hz;
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let mut timed: Vec<(u64, u8, SensorEvent)> = Vec::new();
    for (offset_ns, _) in sample_times(cfg.imu_rate_hz, cfg.duration_s, 1) {
        let sample = AttitudeSample::at_rest(cfg.start_ns + offset_ns, imu_dt, cfg.yaw, gravity);
        timed.push((sample.timestamp_ns, 0, SensorEvent::Attitude(sample)));
    }
    for (offset_ns, t) in sample_times(cfg.gps_rate_hz, cfg.duration_s, 0) {
        let position_noise = Vector3::from_fn(|_, _| gaussian(&mut rng, cfg.position_noise_std));
        let velocity_noise = Vector3::from_fn(|_, _| gaussian(&mut rng, cfg.velocity_noise_std));
        let mut fix = PositionFix::new(
            cfg.start_ns + offset_ns,
            velocity * t + position_noise,
            velocity + velocity_noise,
        );
        if cfg.position_noise_std > 0.0 {
            fix.position_std = Vector3::repeat(cfg.position_noise_std);
        }
        if cfg.velocity_noise_std > 0.0 {
            fix.velocity_std = Vector3::repeat(cfg.velocity_noise_std);
        }
        timed.push((fix.timestamp_ns, 1, SensorEvent::Fix(fix)));
    }
    timed.sort_by_key(|(t, rank, _)| (*t, *rank));

    let mut events = Vec::with_capacity(timed.len() + 1);
    if let Some(origin) = cfg.origin {
        events.push(SensorEvent::Origin(origin));
    }
    events.extend(timed.into_iter().map(|(_, _, event)| event));
    events
}

/// Apply `events` to `estimator` in order, skipping the ones it rejects.
pub fn replay<'a, I>(estimator: &mut KalmanEstimator, events: I) -> ReplaySummary
where
    I: IntoIterator<Item = &'a SensorEvent>,
{
    let mut summary = ReplaySummary::default();
    for event in events {
        if apply_event(estimator, event).is_err() {
            summary.rejected += 1;
            continue;
        }
        match event {
            SensorEvent::Attitude(_) => summary.predicted += 1,
            SensorEvent::Fix(_) => summary.corrected += 1,
            SensorEvent::Origin(_) | SensorEvent::Reset => summary.control += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EstimatorConfig;
    use crate::earth::STANDARD_GRAVITY;
    use assert_approx_eq::assert_approx_eq;

    fn drive() -> ScenarioConfig {
        ScenarioConfig {
            duration_s: 2.0,
            velocity_ned: [1.0, 0.0, 0.0],
            ..Default::default()
        }
    }

    #[test]
    fn stream_is_time_ordered_with_attitude_first() {
        let events = build_event_stream(&drive(), STANDARD_GRAVITY);
        let attitudes = events
            .iter()
            .filter(|e| matches!(e, SensorEvent::Attitude(_)))
            .count();
        let fixes = events
            .iter()
            .filter(|e| matches!(e, SensorEvent::Fix(_)))
            .count();
        assert_eq!(attitudes, 200);
        assert_eq!(fixes, 3);

        let stamps: Vec<u64> = events.iter().filter_map(|e| e.timestamp_ns()).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        assert!(matches!(events[0], SensorEvent::Fix(_)));

        for pair in events.windows(2) {
            if let (SensorEvent::Fix(a), SensorEvent::Attitude(b)) = (&pair[0], &pair[1]) {
                assert_ne!(a.timestamp_ns, b.timestamp_ns);
            }
        }
    }

    #[test]
    fn fixes_follow_the_trajectory() {
        let events = build_event_stream(&drive(), STANDARD_GRAVITY);
        let fixes: Vec<&PositionFix> = events
            .iter()
            .filter_map(|e| match e {
                SensorEvent::Fix(fix) => Some(fix),
                _ => None,
            })
            .collect();
        for (i, fix) in fixes.iter().enumerate() {
            assert_eq!(fix.timestamp_ns, i as u64 * 1_000_000_000);
            assert_approx_eq!(fix.position[0], i as f64, 1e-12);
            assert_approx_eq!(fix.velocity[0], 1.0, 1e-12);
        }
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let cfg = ScenarioConfig {
            position_noise_std: 2.0,
            velocity_noise_std: 0.2,
            origin: Some(GeodeticOrigin::new(40.0, -75.0, 10.0)),
            ..drive()
        };
        let a = build_event_stream(&cfg, STANDARD_GRAVITY);
        let b = build_event_stream(&cfg, STANDARD_GRAVITY);
        assert_eq!(a, b);
        assert!(matches!(a[0], SensorEvent::Origin(_)));

        let other = build_event_stream(
            &ScenarioConfig {
                seed: 7,
                ..cfg.clone()
            },
            STANDARD_GRAVITY,
        );
        assert_ne!(a, other);
        if let SensorEvent::Fix(fix) = a[1] {
            assert_eq!(fix.position_std, Vector3::repeat(2.0));
        }
    }

    #[test]
    fn zero_rate_produces_no_samples() {
        let cfg = ScenarioConfig {
            imu_rate_hz: 0.0,
            ..drive()
        };
        let events = build_event_stream(&cfg, STANDARD_GRAVITY);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn replay_counts_events() {
        let mut est = KalmanEstimator::new(EstimatorConfig {
            history_capacity: 512,
            ..Default::default()
        })
        .unwrap();
        let mut events = build_event_stream(&drive(), est.gravity());
        events.push(SensorEvent::Attitude(AttitudeSample::at_rest(1, 0.01, 0.0, est.gravity())));
        let summary = replay(&mut est, &events);
        assert_eq!(
            summary,
            ReplaySummary {
                predicted: 200,
                corrected: 3,
                control: 0,
                rejected: 1,
            }
        );
        assert_approx_eq!(est.position()[0], 2.0, 0.05);
        assert_approx_eq!(est.velocity()[0], 1.0, 0.05);
    }
}
