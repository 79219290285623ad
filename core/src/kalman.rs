//! Six-state position/velocity Kalman estimator
//!
//! The estimator tracks
//!
//! $$
//! x = [p_n, p_e, p_d, v_n, v_e, v_d]
//! $$
//!
//! in the NED tangent plane of an externally supplied geodetic origin. Attitude is not part of
//! the state: each attitude sample supplies roll, pitch and yaw, which rotate the measured
//! body-frame specific force into NED before gravity is removed.
//!
//! # Predictor
//! The continuous model is $\dot{p} = v$, $\dot{v} = a$ with Jacobian
//!
//! $$
//! A = \begin{bmatrix} 0 & I \\\\ 0 & 0 \end{bmatrix}
//! $$
//!
//! Both the state and the covariance are integrated with a single Euler step over the sample
//! interval: $x \leftarrow x + [v, a]\,dt$ and $P \leftarrow P + (A P + P A^T + Q)\,dt$.
//!
//! # Corrector
//! A GPS fix observes the whole state directly ($C = I$). The innovation covariance
//! $S = C P C^T + R$ is solved with [`robust_spd_solve`] to form $K = P C^T S^{-1}$, then
//! $x \leftarrow x + K (z - C x)$ and $P \leftarrow (I - K C) P$.
//!
//! Every accepted predictor or corrector cycle appends the current pose to the shared
//! [`PoseHistory`]. Inputs that are not finite or that arrive out of order are rejected before
//! any state is touched.

use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};

use crate::attitude;
use crate::config::EstimatorConfig;
use crate::diagnostics::{DiagnosticLog, DiagnosticRecord};
use crate::earth;
use crate::error::{EstimatorError, Result};
use crate::history::PoseHistory;
use crate::linalg::{robust_spd_solve, symmetrize};
use crate::pose::Pose;
use crate::{AttitudeSample, FixStatus, GeodeticOrigin, PositionFix};

/// Scale from the sum of the horizontal standard deviations to the circular error probable.
pub const CEP_FACTOR: f64 = 0.589;

/// Copy of the latest fused solution for reporting consumers.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EstimatorSnapshot {
    /// Time of the last accepted cycle, nanoseconds since the Unix epoch
    pub timestamp_ns: u64,
    /// `[latitude deg, longitude deg, height m]` of the last corrected state, once an origin is set
    pub geodetic: Option<Vector3<f64>>,
    /// NED position in meters
    pub position: Vector3<f64>,
    /// Per-axis position standard deviation in meters
    pub position_std: Vector3<f64>,
    /// NED velocity in m/s
    pub velocity: Vector3<f64>,
    /// NED acceleration of the last predictor cycle in m/s^2
    pub acceleration: Vector3<f64>,
    /// `[roll, pitch, yaw]` in degrees
    pub attitude: Vector3<f64>,
    /// Body rates in rad/s
    pub rates: Vector3<f64>,
    pub fix_status: FixStatus,
    pub covariance_trace: f64,
    /// Circular error probable in meters
    pub cep: f64,
}
impl Display for EstimatorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EstimatorSnapshot {{ t: {} ns, ned: [{:.3}, {:.3}, {:.3}] m, vel: [{:.3}, {:.3}, {:.3}] m/s, rpy: [{:.2}, {:.2}, {:.2}] deg, fix: {}, trace: {:.4}, cep: {:.3} m }}",
            self.timestamp_ns,
            self.position[0],
            self.position[1],
            self.position[2],
            self.velocity[0],
            self.velocity[1],
            self.velocity[2],
            self.attitude[0],
            self.attitude[1],
            self.attitude[2],
            self.fix_status,
            self.covariance_trace,
            self.cep
        )
    }
}

pub struct KalmanEstimator {
    config: EstimatorConfig,
    state: Vector6<f64>,
    covariance: Matrix6<f64>,
    process_noise: Matrix6<f64>,
    measurement_noise: Matrix6<f64>,
    acceleration: Vector3<f64>,
    attitude: Option<AttitudeSample>,
    origin: Option<GeodeticOrigin>,
    gravity: f64,
    geodetic: Option<Vector3<f64>>,
    fix_status: FixStatus,
    last_timestamp_ns: Option<u64>,
    history: Arc<PoseHistory>,
    diagnostics: Option<DiagnosticLog>,
}
impl Debug for KalmanEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KalmanEstimator")
            .field("state", &self.state.as_slice())
            .field("covariance_trace", &self.trace())
            .field("origin", &self.origin)
            .field("gravity (m/s^2)", &self.gravity)
            .field("fix_status", &self.fix_status)
            .field("last_timestamp_ns", &self.last_timestamp_ns)
            .field("history_len", &self.history.len())
            .field(
                "diagnostic_log",
                &self.diagnostics.as_ref().map(|log| log.path().to_path_buf()),
            )
            .finish()
    }
}
impl Display for KalmanEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KalmanEstimator {{ ned: [{:.3}, {:.3}, {:.3}] m, vel: [{:.3}, {:.3}, {:.3}] m/s, trace: {:.4} }}",
            self.state[0],
            self.state[1],
            self.state[2],
            self.state[3],
            self.state[4],
            self.state[5],
            self.trace()
        )
    }
}

impl KalmanEstimator {
    /// Build an estimator, its pose history and (if configured) its diagnostic log.
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        config.validate()?;
        let history = Arc::new(PoseHistory::new(
            config.history_capacity,
            config.interpolation,
        ));
        let diagnostics = match &config.diagnostic_log {
            Some(path) => Some(DiagnosticLog::open(path)?),
            None => None,
        };
        let mut estimator = KalmanEstimator {
            state: Vector6::zeros(),
            covariance: Matrix6::identity(),
            process_noise: Matrix6::from_diagonal(&Vector6::from(config.process_noise)),
            measurement_noise: Matrix6::from_diagonal(&Vector6::from(config.measurement_noise)),
            acceleration: Vector3::zeros(),
            attitude: None,
            origin: None,
            gravity: earth::STANDARD_GRAVITY,
            geodetic: None,
            fix_status: FixStatus::default(),
            last_timestamp_ns: None,
            history,
            diagnostics,
            config,
        };
        estimator.reset();
        Ok(estimator)
    }

    /// Zero the state and restore the configured covariance and noise matrices.
    ///
    /// The geodetic origin and the pose history are kept.
    pub fn reset(&mut self) {
        self.state = Vector6::zeros();
        self.covariance = Matrix6::identity() * self.config.initial_covariance;
        self.process_noise = Matrix6::from_diagonal(&Vector6::from(self.config.process_noise));
        self.measurement_noise =
            Matrix6::from_diagonal(&Vector6::from(self.config.measurement_noise));
        self.acceleration = Vector3::zeros();
        self.attitude = None;
        self.geodetic = None;
        self.fix_status = FixStatus::default();
        self.last_timestamp_ns = None;
        info!("estimator reset, trace {:.4}", self.trace());
    }

    /// Set the geodetic basepoint of the NED frame. Gravity is re-evaluated at the origin.
    pub fn set_origin(&mut self, origin: GeodeticOrigin) -> Result<()> {
        if !origin.is_finite() {
            return rejected(EstimatorError::NonFiniteInput("geodetic origin"));
        }
        self.gravity = earth::gravity(origin.latitude_radians(), origin.height);
        self.origin = Some(origin);
        self.geodetic = None;
        info!(
            "origin set to ({:.7}, {:.7}, {:.2}), gravity {:.5} m/s^2",
            origin.latitude, origin.longitude, origin.height, self.gravity
        );
        Ok(())
    }

    /// Propagate the state over one attitude sample.
    pub fn predictor(&mut self, sample: &AttitudeSample) -> Result<()> {
        if !sample.is_finite() {
            return rejected(EstimatorError::NonFiniteInput("attitude sample"));
        }
        if !(sample.dt > 0.0) {
            return rejected(EstimatorError::InvalidInterval(sample.dt));
        }
        if let Err(err) = self.check_timestamp(sample.timestamp_ns) {
            return rejected(err);
        }

        let dt = sample.dt;
        let body_to_ned = attitude::euler_to_dcm(&sample.euler_radians()).transpose();
        let acceleration =
            body_to_ned * sample.specific_force + Vector3::new(0.0, 0.0, self.gravity);

        let mut derivative = Vector6::zeros();
        derivative
            .fixed_rows_mut::<3>(0)
            .copy_from(&self.state.fixed_rows::<3>(3));
        derivative.fixed_rows_mut::<3>(3).copy_from(&acceleration);

        let a = transition_jacobian();
        let p = self.covariance;
        let p_dot = a * p + p * a.transpose() + self.process_noise;

        self.state += derivative * dt;
        self.covariance = symmetrize(&(p + p_dot * dt));
        self.acceleration = acceleration;
        self.attitude = Some(*sample);
        self.last_timestamp_ns = Some(sample.timestamp_ns);

        self.write_diagnostics(sample);
        self.publish(sample.timestamp_ns)
    }

    /// Fuse one GPS fix. Fixes without a computed solution are ignored.
    pub fn corrector(&mut self, fix: &PositionFix) -> Result<()> {
        if !fix.status.is_valid() {
            debug!("ignoring fix at {} ns: {}", fix.timestamp_ns, fix.status);
            self.fix_status = fix.status;
            return Ok(());
        }
        if !fix.is_finite() {
            return rejected(EstimatorError::NonFiniteInput("position fix"));
        }
        if let Err(err) = self.check_timestamp(fix.timestamp_ns) {
            return rejected(err);
        }

        let c = Matrix6::<f64>::identity();
        let r = self.measurement_noise_for(fix);
        let innovation_covariance = c * self.covariance * c.transpose() + r;
        // S is symmetric, so S⁻¹ C P = (P Cᵀ S⁻¹)ᵀ = Kᵀ.
        let Some(gain_t) = robust_spd_solve(&innovation_covariance, &(c * self.covariance)) else {
            return rejected(EstimatorError::SingularInnovation);
        };
        let gain = gain_t.transpose();
        let residual = fix.measurement() - c * self.state;

        self.state += gain * residual;
        self.covariance = symmetrize(&((Matrix6::identity() - gain * c) * self.covariance));
        self.fix_status = fix.status;
        self.last_timestamp_ns = Some(fix.timestamp_ns);
        self.geodetic = self.origin.map(|origin| self.geodetic_position(&origin));

        self.publish(fix.timestamp_ns)
    }

    /// Trace of the state covariance.
    pub fn trace(&self) -> f64 {
        self.covariance.trace()
    }
    pub fn state(&self) -> &Vector6<f64> {
        &self.state
    }
    pub fn covariance(&self) -> &Matrix6<f64> {
        &self.covariance
    }
    pub fn position(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(0).into_owned()
    }
    pub fn velocity(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(3).into_owned()
    }
    pub fn origin(&self) -> Option<GeodeticOrigin> {
        self.origin
    }
    /// Gravity magnitude removed from the specific force, m/s^2.
    pub fn gravity(&self) -> f64 {
        self.gravity
    }
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }
    /// Shared handle to the pose history this estimator writes.
    pub fn history(&self) -> Arc<PoseHistory> {
        Arc::clone(&self.history)
    }

    /// Circular error probable of the horizontal position, meters.
    pub fn cep(&self) -> f64 {
        CEP_FACTOR * (self.covariance[(0, 0)].max(0.0).sqrt() + self.covariance[(1, 1)].max(0.0).sqrt())
    }

    /// Pose of the current state: attitude of the last sample, NED position of the state.
    pub fn pose(&self) -> Pose {
        let rotation = self
            .attitude
            .map(|sample| attitude::euler_to_dcm(&sample.euler_radians()).transpose())
            .unwrap_or_else(Matrix3::identity);
        Pose::new(rotation, self.position())
    }

    pub fn snapshot(&self) -> EstimatorSnapshot {
        let (attitude, rates) = match &self.attitude {
            Some(sample) => (
                Vector3::new(sample.roll, sample.pitch, sample.yaw),
                sample.rates,
            ),
            None => (Vector3::zeros(), Vector3::zeros()),
        };
        EstimatorSnapshot {
            timestamp_ns: self.last_timestamp_ns.unwrap_or_default(),
            geodetic: self.geodetic,
            position: self.position(),
            position_std: Vector3::new(
                self.covariance[(0, 0)].max(0.0).sqrt(),
                self.covariance[(1, 1)].max(0.0).sqrt(),
                self.covariance[(2, 2)].max(0.0).sqrt(),
            ),
            velocity: self.velocity(),
            acceleration: self.acceleration,
            attitude,
            rates,
            fix_status: self.fix_status,
            covariance_trace: self.trace(),
            cep: self.cep(),
        }
    }

    fn check_timestamp(&self, timestamp_ns: u64) -> Result<()> {
        let newest = self
            .last_timestamp_ns
            .into_iter()
            .chain(self.history.latest().map(|pose| pose.timestamp_ns))
            .max();
        match newest {
            Some(newest_ns) if timestamp_ns < newest_ns => Err(EstimatorError::OutOfOrderTimestamp {
                timestamp_ns,
                newest_ns,
            }),
            _ => Ok(()),
        }
    }

    fn measurement_noise_for(&self, fix: &PositionFix) -> Matrix6<f64> {
        if !self.config.noise_from_fix {
            return self.measurement_noise;
        }
        let floor = self.config.min_measurement_std;
        let stds = Vector6::new(
            fix.position_std[0],
            fix.position_std[1],
            fix.position_std[2],
            fix.velocity_std[0],
            fix.velocity_std[1],
            fix.velocity_std[2],
        );
        Matrix6::from_diagonal(&stds.map(|s| s.max(floor).powi(2)))
    }

    /// Geodetic position of the current state in degrees, degrees, meters.
    fn geodetic_position(&self, origin: &GeodeticOrigin) -> Vector3<f64> {
        let (lat, lon) = (origin.latitude_radians(), origin.longitude_radians());
        let ecef = origin.ecef() + earth::tangent_to_ecef(&self.position(), lat, lon);
        let llh = earth::ecef_to_geodetic(&ecef);
        Vector3::new(llh[0].to_degrees(), llh[1].to_degrees(), llh[2])
    }

    fn publish(&mut self, timestamp_ns: u64) -> Result<()> {
        let cep = self.cep();
        if self.config.verbose {
            debug!(
                "t {} ns: ned [{:.3}, {:.3}, {:.3}], trace {:.6}, cep {:.3}",
                timestamp_ns,
                self.state[0],
                self.state[1],
                self.state[2],
                self.trace(),
                cep
            );
        }
        self.history.add_pose(self.pose(), cep, timestamp_ns)
    }

    fn write_diagnostics(&mut self, sample: &AttitudeSample) {
        if self.diagnostics.is_none() {
            return;
        }
        let record = DiagnosticRecord {
            wall_clock: Utc::now(),
            timestamp_ns: sample.timestamp_ns,
            roll_deg: sample.roll,
            pitch_deg: sample.pitch,
            yaw_deg: sample.yaw,
            p_radps: sample.rates[0],
            q_radps: sample.rates[1],
            r_radps: sample.rates[2],
            acc_n_mps2: self.acceleration[0],
            acc_e_mps2: self.acceleration[1],
            acc_d_mps2: self.acceleration[2],
            vel_n_mps: self.state[3],
            vel_e_mps: self.state[4],
            vel_d_mps: self.state[5],
            pos_n_m: self.state[0],
            pos_e_m: self.state[1],
            pos_d_m: self.state[2],
        };
        if let Some(log) = self.diagnostics.as_mut() {
            if let Err(err) = log.write(&record) {
                warn!("diagnostic log {} write failed: {err}", log.path().display());
            }
        }
    }
}

/// Continuous-time Jacobian of `[p, v]` with respect to itself: ∂ṗ/∂v = I, zero elsewhere.
fn transition_jacobian() -> Matrix6<f64> {
    let mut a = Matrix6::zeros();
    a.fixed_view_mut::<3, 3>(0, 3).fill_with_identity();
    a
}

fn rejected(err: EstimatorError) -> Result<()> {
    warn!("rejecting input: {err}");
    Err(err)
}
