//! GPS/INS pose estimation for an autonomous ground vehicle
//!
//! This crate fuses asynchronous attitude samples (from an AHRS or fiber-optic gyro unit) and
//! GPS position/velocity fixes into a single position and velocity estimate, and keeps a short,
//! time-ordered history of the resulting vehicle poses. Consumers that timestamp their own data,
//! such as a terrain mapper associating ranging scans with the vehicle pose, ask the history for
//! the pose at an arbitrary instant and receive an interpolated answer, or learn that the instant
//! is not yet covered or has already aged out.
//!
//! The crate does not read serial ports or parse device messages. Sensor adapters hand it
//! already-decoded, timestamped [`AttitudeSample`]s and [`PositionFix`]es.
//!
//! ## Crate overview
//!
//! - [earth]: WGS84 constants, geodetic/ECEF/tangent-plane conversions, normal gravity and a
//!   standard atmosphere model.
//! - [attitude]: Euler angle, quaternion and direction cosine matrix conversions.
//! - [pose]: rigid-body poses and timestamped poses.
//! - [interpolate]: pose interpolation between two bracketing timestamped poses.
//! - [history]: the bounded, mutex-guarded pose history with "pose at time" queries.
//! - [kalman]: the six-state position/velocity Kalman estimator.
//! - [linalg]: robust symmetric positive-definite solves used by the Kalman gain.
//! - [service]: the single-threaded estimator loop fed by a bounded channel.
//! - [config]: estimator configuration and its JSON/YAML/TOML file round trip.
//! - [diagnostics]: the optional per-cycle CSV log.
//! - [sim]: synthetic sensor event streams for tests and offline replay.
//!
//! ## State and frames
//!
//! The estimator state is
//!
//! $$
//! x = [p_n, p_e, p_d, v_n, v_e, v_d]
//! $$
//!
//! where positions are meters North, East and Down of an externally supplied geodetic origin and
//! velocities are meters per second in the same frame. Attitude is not estimated; it is taken from
//! the latest attitude sample and used to rotate body-frame specific force into NED. Timestamps are
//! unsigned nanoseconds since the Unix epoch throughout.

pub mod attitude;
pub mod config;
pub mod diagnostics;
pub mod earth;
pub mod error;
pub mod history;
pub mod interpolate;
pub mod kalman;
pub mod linalg;
pub mod pose;
pub mod service;
pub mod sim;

pub use config::EstimatorConfig;
pub use error::{EstimatorError, Result};
pub use history::{PoseHistory, PoseQuery};
pub use interpolate::InterpolationStrategy;
pub use kalman::{EstimatorSnapshot, KalmanEstimator};
pub use pose::{Pose, TimestampedPose};
pub use service::{EstimatorService, SensorEvent};

use std::f64::consts::PI;
use std::fmt::{self, Display};

use nalgebra::{Vector3, Vector6};
use serde::{Deserialize, Serialize};

/// One attitude reading from the AHRS/FOG adapter.
///
/// Angles are degrees as the attitude hardware reports them; rates and specific force are SI
/// units in the body frame (x forward, y right, z down). Specific force is what an accelerometer
/// senses, so a level vehicle at rest reads roughly `[0, 0, -g]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AttitudeSample {
    /// Sample time in nanoseconds since the Unix epoch
    pub timestamp_ns: u64,
    /// Integration interval in seconds
    pub dt: f64,
    /// Roll in degrees
    pub roll: f64,
    /// Pitch in degrees
    pub pitch: f64,
    /// Yaw (heading) in degrees
    pub yaw: f64,
    /// Body rates p, q, r in rad/s
    pub rates: Vector3<f64>,
    /// Specific force in m/s^2, body frame
    pub specific_force: Vector3<f64>,
}
impl AttitudeSample {
    /// A level, stationary reading at the given heading: zero rates and `[0, 0, -gravity]`
    /// specific force.
    pub fn at_rest(timestamp_ns: u64, dt: f64, yaw: f64, gravity: f64) -> Self {
        AttitudeSample {
            timestamp_ns,
            dt,
            yaw,
            specific_force: Vector3::new(0.0, 0.0, -gravity),
            ..Default::default()
        }
    }
    /// `[roll, pitch, yaw]` in radians.
    pub fn euler_radians(&self) -> Vector3<f64> {
        Vector3::new(
            self.roll.to_radians(),
            self.pitch.to_radians(),
            self.yaw.to_radians(),
        )
    }
    pub fn is_finite(&self) -> bool {
        self.dt.is_finite()
            && self.roll.is_finite()
            && self.pitch.is_finite()
            && self.yaw.is_finite()
            && self.rates.iter().all(|v| v.is_finite())
            && self.specific_force.iter().all(|v| v.is_finite())
    }
}
impl Display for AttitudeSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AttitudeSample {{ t: {} ns, dt: {:.4} s, rpy: [{:.2}, {:.2}, {:.2}] deg, rates: [{:.4}, {:.4}, {:.4}], f: [{:.4}, {:.4}, {:.4}] }}",
            self.timestamp_ns,
            self.dt,
            self.roll,
            self.pitch,
            self.yaw,
            self.rates[0],
            self.rates[1],
            self.rates[2],
            self.specific_force[0],
            self.specific_force[1],
            self.specific_force[2]
        )
    }
}

/// Receiver solution status. Only [`FixStatus::Computed`] is a usable fix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    Computed,
    #[default]
    InsufficientObservations,
    NoConvergence,
    Singularity,
    CovarianceTrace,
    TestDistance,
    ColdStart,
    VelocityHeightLimit,
    Variance,
    Residuals,
    DeltaPosition,
    NegativeVariance,
    IntegrityWarning,
}
impl FixStatus {
    pub fn is_valid(self) -> bool {
        self == FixStatus::Computed
    }
    /// Map a receiver's numeric solution status to a [`FixStatus`]. Code 12 is reserved by the
    /// receiver and unknown codes yield `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        let status = match code {
            0 => FixStatus::Computed,
            1 => FixStatus::InsufficientObservations,
            2 => FixStatus::NoConvergence,
            3 => FixStatus::Singularity,
            4 => FixStatus::CovarianceTrace,
            5 => FixStatus::TestDistance,
            6 => FixStatus::ColdStart,
            7 => FixStatus::VelocityHeightLimit,
            8 => FixStatus::Variance,
            9 => FixStatus::Residuals,
            10 => FixStatus::DeltaPosition,
            11 => FixStatus::NegativeVariance,
            13 => FixStatus::IntegrityWarning,
            _ => return None,
        };
        Some(status)
    }
}
impl Display for FixStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FixStatus::Computed => "computed",
            FixStatus::InsufficientObservations => "insufficient observations",
            FixStatus::NoConvergence => "no convergence",
            FixStatus::Singularity => "singularity",
            FixStatus::CovarianceTrace => "covariance trace exceeded",
            FixStatus::TestDistance => "test distance exceeded",
            FixStatus::ColdStart => "cold start",
            FixStatus::VelocityHeightLimit => "velocity/height limit",
            FixStatus::Variance => "variance exceeded",
            FixStatus::Residuals => "residuals too large",
            FixStatus::DeltaPosition => "delta position too large",
            FixStatus::NegativeVariance => "negative variance",
            FixStatus::IntegrityWarning => "integrity warning",
        };
        f.write_str(name)
    }
}

/// Externally supplied geodetic basepoint that defines the NED tangent plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeodeticOrigin {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees, normalized to [-180, 180]
    pub longitude: f64,
    /// Height above the WGS84 ellipsoid in meters
    pub height: f64,
}
impl GeodeticOrigin {
    pub fn new(latitude: f64, longitude: f64, height: f64) -> Self {
        GeodeticOrigin {
            latitude,
            longitude: wrap_to_180(longitude),
            height,
        }
    }
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite() && self.height.is_finite()
    }
    pub fn latitude_radians(&self) -> f64 {
        self.latitude.to_radians()
    }
    pub fn longitude_radians(&self) -> f64 {
        self.longitude.to_radians()
    }
    /// The origin in ECEF meters.
    pub fn ecef(&self) -> Vector3<f64> {
        earth::geodetic_to_ecef(self.latitude_radians(), self.longitude_radians(), self.height)
    }
}

/// One GPS fix expressed in the NED tangent plane of the geodetic origin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PositionFix {
    /// Fix time in nanoseconds since the Unix epoch.
    ///
    /// Adapters stamp fixes on arrival. A fix stamped with its (earlier) measurement time is
    /// rejected as out of order once a later attitude sample has been applied.
    pub timestamp_ns: u64,
    /// NED position in meters
    pub position: Vector3<f64>,
    /// NED velocity in m/s
    pub velocity: Vector3<f64>,
    /// Per-axis position standard deviation in meters
    pub position_std: Vector3<f64>,
    /// Per-axis velocity standard deviation in m/s
    pub velocity_std: Vector3<f64>,
    pub status: FixStatus,
}
impl PositionFix {
    /// A computed fix with unit standard deviations.
    pub fn new(timestamp_ns: u64, position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        PositionFix {
            timestamp_ns,
            position,
            velocity,
            position_std: Vector3::repeat(1.0),
            velocity_std: Vector3::repeat(1.0),
            status: FixStatus::Computed,
        }
    }
    /// Build a fix from the receiver's native ECEF solution.
    ///
    /// Position is taken relative to the origin and rotated into its tangent plane; velocity and
    /// both standard deviation vectors are rotated with the same matrix (magnitudes kept positive).
    pub fn from_ecef(
        timestamp_ns: u64,
        position_ecef: &Vector3<f64>,
        velocity_ecef: &Vector3<f64>,
        position_std_ecef: &Vector3<f64>,
        velocity_std_ecef: &Vector3<f64>,
        status: FixStatus,
        origin: &GeodeticOrigin,
    ) -> Self {
        let (lat, lon) = (origin.latitude_radians(), origin.longitude_radians());
        let rotation = earth::ecef_to_tangent_rotation(lat, lon);
        PositionFix {
            timestamp_ns,
            position: earth::ecef_distance(position_ecef, &origin.ecef(), lat, lon),
            velocity: rotation * velocity_ecef,
            position_std: (rotation * position_std_ecef).abs(),
            velocity_std: (rotation * velocity_std_ecef).abs(),
            status,
        }
    }
    /// The measurement vector `[position, velocity]`.
    pub fn measurement(&self) -> Vector6<f64> {
        Vector6::new(
            self.position[0],
            self.position[1],
            self.position[2],
            self.velocity[0],
            self.velocity[1],
            self.velocity[2],
        )
    }
    pub fn is_finite(&self) -> bool {
        self.position
            .iter()
            .chain(self.velocity.iter())
            .chain(self.position_std.iter())
            .chain(self.velocity_std.iter())
            .all(|v| v.is_finite())
    }
}
impl Display for PositionFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PositionFix {{ t: {} ns, ned: [{:.3}, {:.3}, {:.3}] m, vel: [{:.3}, {:.3}, {:.3}] m/s, status: {} }}",
            self.timestamp_ns,
            self.position[0],
            self.position[1],
            self.position[2],
            self.velocity[0],
            self.velocity[1],
            self.velocity[2],
            self.status
        )
    }
}

// --- Miscellaneous functions for wrapping angles ---
/// Wrap an angle in degrees to the range [-180, 180)
///
/// # Example
/// ```rust
/// use gpsins::wrap_to_180;
/// assert_eq!(wrap_to_180(190.0), -170.0);
/// ```
pub fn wrap_to_180(angle: f64) -> f64 {
    (angle + 180.0).rem_euclid(360.0) - 180.0
}
/// Wrap an angle in radians to the range [-π, π)
///
/// # Example
/// ```rust
/// use gpsins::wrap_to_pi;
/// use std::f64::consts::PI;
/// assert!((wrap_to_pi(1.5 * PI) + 0.5 * PI).abs() < 1e-12);
/// ```
pub fn wrap_to_pi(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}
