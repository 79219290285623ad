//! Pose interpolation between two bracketing timestamped poses
//!
//! Given poses at `prev_time` and `next_time`, produce the pose at `wanted_time`. Both
//! strategies share the same outer rules:
//!
//! 1. A wanted time at or outside either bracket returns the bracket pose closer in time, with
//!    ties going to the newer pose.
//! 2. Two brackets with the same time therefore never interpolate: the wanted time is always on
//!    or outside one of them and rule 1 applies.
//! 3. Otherwise `fraction = (wanted - prev) / (next - prev)` and the translation is linearly
//!    interpolated.
//!
//! The rotation is handled by the selected [`InterpolationStrategy`]:
//!
//! - [`InterpolationStrategy::Slerp`] (default) converts both rotations to unit quaternions and
//!   spherically interpolates them.
//! - [`InterpolationStrategy::RowLerp`] treats each rotation row as a unit vector, linearly
//!   interpolates it and renormalizes it. A row that is (nearly) antiparallel to its partner has
//!   no meaningful interpolation and is copied from the bracket closer in time.
//!
//! In both strategies, a wanted time within [`ALMOST_EQUAL_NS`] of one bracket copies that
//! bracket's rotation unmodified.

use serde::{Deserialize, Serialize};

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use crate::attitude;
use crate::pose::Pose;

/// Times closer than this are treated as the same instant.
pub const ALMOST_EQUAL_NS: u64 = 100;
/// Rows whose dot product is within this of -1 are considered antiparallel.
pub const ANTIPARALLEL_TOLERANCE: f64 = 0.002;
/// Angle (radians) below which the SLERP falls back to the nearer rotation.
const SLERP_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationStrategy {
    /// Quaternion spherical interpolation of the rotation block
    #[default]
    Slerp,
    /// Row-wise linear interpolation with renormalization
    RowLerp,
}

/// Interpolate a pose at `wanted_time` between `prev` (at `prev_time`) and `next` (at
/// `next_time`).
///
/// # Example
/// ```rust
/// use gpsins::interpolate::{interpolate, InterpolationStrategy};
/// use gpsins::Pose;
/// use nalgebra::{Matrix3, Vector3};
/// let prev = Pose::new(Matrix3::identity(), Vector3::new(0.0, 0.0, 0.0));
/// let next = Pose::new(Matrix3::identity(), Vector3::new(2.0, 0.0, 0.0));
/// let mid = interpolate(&prev, 1_000, &next, 3_000, 2_000, InterpolationStrategy::Slerp);
/// assert!((mid.translation[0] - 1.0).abs() < 1e-12);
/// ```
pub fn interpolate(
    prev: &Pose,
    prev_time: u64,
    next: &Pose,
    next_time: u64,
    wanted_time: u64,
    strategy: InterpolationStrategy,
) -> Pose {
    if let Some(saturated) = saturate(prev, prev_time, next, next_time, wanted_time) {
        return saturated;
    }
    let bracket = Bracket::new(prev_time, next_time, wanted_time);
    let rotation = match strategy {
        InterpolationStrategy::Slerp => slerp_rotation(prev, next, &bracket),
        InterpolationStrategy::RowLerp => row_lerp_rotation(prev, next, &bracket),
    };
    let translation =
        prev.translation * (1.0 - bracket.fraction) + next.translation * bracket.fraction;
    Pose::new(rotation, translation)
}

/// Answers that need no interpolation. When this returns `None`,
/// `prev_time < wanted_time < next_time` holds and the span is non-zero.
fn saturate(
    prev: &Pose,
    prev_time: u64,
    next: &Pose,
    next_time: u64,
    wanted_time: u64,
) -> Option<Pose> {
    if wanted_time <= prev_time || wanted_time >= next_time {
        let to_prev = prev_time.abs_diff(wanted_time);
        let to_next = next_time.abs_diff(wanted_time);
        return Some(if to_prev < to_next { *prev } else { *next });
    }
    None
}

/// Position of the wanted time strictly inside `(prev_time, next_time)`.
struct Bracket {
    since_prev: u64,
    until_next: u64,
    fraction: f64,
}
impl Bracket {
    fn new(prev_time: u64, next_time: u64, wanted_time: u64) -> Self {
        let since_prev = wanted_time - prev_time;
        let until_next = next_time - wanted_time;
        Bracket {
            since_prev,
            until_next,
            fraction: since_prev as f64 / (next_time - prev_time) as f64,
        }
    }
    fn near_prev(&self) -> bool {
        self.since_prev < ALMOST_EQUAL_NS
    }
    fn near_next(&self) -> bool {
        self.until_next < ALMOST_EQUAL_NS
    }
    /// Ties go to the older bracket.
    fn prev_is_closer(&self) -> bool {
        self.since_prev <= self.until_next
    }
}

fn slerp_rotation(prev: &Pose, next: &Pose, bracket: &Bracket) -> Matrix3<f64> {
    if bracket.near_prev() {
        return prev.rotation;
    }
    if bracket.near_next() {
        return next.rotation;
    }
    let q_prev: UnitQuaternion<f64> = attitude::rotation_to_quaternion(&prev.rotation);
    let q_next: UnitQuaternion<f64> = attitude::rotation_to_quaternion(&next.rotation);
    match q_prev.try_slerp(&q_next, bracket.fraction, SLERP_EPSILON) {
        Some(q) => q.to_rotation_matrix().into_inner(),
        None if bracket.prev_is_closer() => prev.rotation,
        None => next.rotation,
    }
}

fn row_lerp_rotation(prev: &Pose, next: &Pose, bracket: &Bracket) -> Matrix3<f64> {
    let mut rotation = Matrix3::zeros();
    for i in 0..3 {
        let a: Vector3<f64> = prev.rotation.row(i).transpose();
        let b: Vector3<f64> = next.rotation.row(i).transpose();
        let row = if bracket.near_prev() {
            a
        } else if bracket.near_next() {
            b
        } else if (a.dot(&b) + 1.0).abs() <= ANTIPARALLEL_TOLERANCE {
            if bracket.prev_is_closer() { a } else { b }
        } else {
            let blended = a * (1.0 - bracket.fraction) + b * bracket.fraction;
            blended
                .try_normalize(f64::EPSILON)
                .unwrap_or(if bracket.prev_is_closer() { a } else { b })
        };
        rotation.set_row(i, &row.transpose());
    }
    rotation
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use nalgebra::Rotation3;

    const STRATEGIES: [InterpolationStrategy; 2] =
        [InterpolationStrategy::Slerp, InterpolationStrategy::RowLerp];

    fn yawed(yaw: f64, north: f64) -> Pose {
        Pose::from_euler(&Vector3::new(0.0, 0.0, yaw), Vector3::new(north, 0.0, 0.0))
    }

    #[test]
    fn identity_at_brackets() {
        let prev = yawed(0.1, 1.0);
        let next = yawed(0.5, 4.0);
        for strategy in STRATEGIES {
            assert_eq!(interpolate(&prev, 1_000, &next, 2_000, 1_000, strategy), prev);
            assert_eq!(interpolate(&prev, 1_000, &next, 2_000, 2_000, strategy), next);
        }
    }

    #[test]
    fn saturates_outside_brackets() {
        let prev = yawed(0.1, 1.0);
        let next = yawed(0.5, 4.0);
        for strategy in STRATEGIES {
            assert_eq!(interpolate(&prev, 1_000, &next, 2_000, 0, strategy), prev);
            assert_eq!(interpolate(&prev, 1_000, &next, 2_000, 10_000, strategy), next);
        }
    }

    #[test]
    fn equal_bracket_times_tie_to_next() {
        let prev = yawed(0.1, 1.0);
        let next = yawed(0.5, 4.0);
        for strategy in STRATEGIES {
            assert_eq!(interpolate(&prev, 5_000, &next, 5_000, 5_000, strategy), next);
            assert_eq!(interpolate(&prev, 5_000, &next, 5_000, 4_000, strategy), next);
            assert_eq!(interpolate(&prev, 5_000, &next, 5_000, 9_000, strategy), next);
        }
    }

    #[test]
    fn out_of_bounds_picks_closer_bracket() {
        let prev = yawed(0.1, 1.0);
        let next = yawed(0.5, 4.0);
        // Inverted brackets: 5_200 is at or below prev and closer to next.
        assert_eq!(
            interpolate(&prev, 6_000, &next, 5_000, 5_200, InterpolationStrategy::Slerp),
            next
        );
        assert_eq!(
            interpolate(&prev, 6_000, &next, 5_000, 5_800, InterpolationStrategy::Slerp),
            prev
        );
    }

    #[test]
    fn midpoint_translation_and_rotation() {
        let prev = yawed(0.0, 0.0);
        let next = yawed(0.8, 2.0);
        for strategy in STRATEGIES {
            let mid = interpolate(&prev, 0, &next, 1_000_000, 500_000, strategy);
            assert_approx_eq!(mid.translation[0], 1.0, 1e-12);
            assert_approx_eq!(mid.euler()[2], 0.4, 1e-6);
            assert!(mid.is_orthonormal(1e-9), "{strategy:?} lost orthonormality");
        }
    }

    #[test]
    fn row_lerp_rows_are_unit_length() {
        // Only row length is restored; rows drift slightly off orthogonal.
        let prev = Pose::from_euler(&Vector3::new(0.05, -0.02, 0.3), Vector3::zeros());
        let next = Pose::from_euler(&Vector3::new(0.07, -0.01, 0.35), Vector3::zeros());
        let mid = interpolate(&prev, 0, &next, 10_000_000, 3_000_000, InterpolationStrategy::RowLerp);
        for i in 0..3 {
            assert_approx_eq!(mid.rotation.row(i).norm(), 1.0, 1e-12);
        }
        assert!(!mid.is_orthonormal(1e-9));
        assert!(mid.is_orthonormal(1e-3));
    }

    #[test]
    fn near_time_copies_rotation_verbatim() {
        let prev = yawed(0.2, 0.0);
        let next = yawed(1.0, 1.0);
        for strategy in STRATEGIES {
            let near_prev = interpolate(&prev, 1_000, &next, 1_000_000, 1_050, strategy);
            assert_eq!(near_prev.rotation, prev.rotation);
            let near_next = interpolate(&prev, 1_000, &next, 1_000_000, 999_950, strategy);
            assert_eq!(near_next.rotation, next.rotation);
        }
    }

    #[test]
    fn antiparallel_rows_pick_the_closer_bracket() {
        // A yaw of acos(-0.999) makes rows 0 and 1 nearly antiparallel (dot = -0.999).
        let yaw = (-0.999f64).acos();
        let prev = Pose::identity();
        let next = Pose::new(
            Rotation3::from_axis_angle(&Vector3::z_axis(), yaw).into_inner(),
            Vector3::zeros(),
        );
        let early = interpolate(&prev, 0, &next, 1_000_000, 400_000, InterpolationStrategy::RowLerp);
        for i in 0..2 {
            assert_eq!(early.rotation.row(i), prev.rotation.row(i));
        }
        let late = interpolate(&prev, 0, &next, 1_000_000, 600_000, InterpolationStrategy::RowLerp);
        for i in 0..2 {
            assert_eq!(late.rotation.row(i), next.rotation.row(i));
        }
        // Exactly halfway: ties go to the older pose.
        let tie = interpolate(&prev, 0, &next, 1_000_000, 500_000, InterpolationStrategy::RowLerp);
        assert_eq!(tie.rotation.row(0), prev.rotation.row(0));
        // Row 2 (the shared z axis) is parallel and interpolates normally.
        assert_approx_eq!(tie.rotation[(2, 2)], 1.0, 1e-12);
    }

    #[test]
    fn slerp_handles_half_turn() {
        let prev = Pose::identity();
        let next = Pose::new(
            Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::PI).into_inner(),
            Vector3::zeros(),
        );
        let mid = interpolate(&prev, 0, &next, 1_000, 500, InterpolationStrategy::Slerp);
        assert!(mid.is_orthonormal(1e-9));
        assert!(mid.rotation.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn strategy_serde_names() {
        let json = serde_json::to_string(&InterpolationStrategy::RowLerp).unwrap();
        assert_eq!(json, "\"row_lerp\"");
        assert_eq!(InterpolationStrategy::default(), InterpolationStrategy::Slerp);
    }
}
