//! Rigid-body vehicle poses
//!
//! A [`Pose`] is a rotation block plus a translation, equivalent to a 4×4 homogeneous
//! transform. Poses produced by the estimator map vehicle body coordinates into the local NED
//! frame: the rotation is the body-to-NED DCM (the transpose of
//! [`attitude::euler_to_dcm`]) and the translation is the NED position of the vehicle relative
//! to the geodetic origin.

use std::fmt::{self, Display};

use nalgebra::{Matrix3, Matrix4, Vector3};

use crate::attitude;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    /// Body-to-NED rotation
    pub rotation: Matrix3<f64>,
    /// NED position in meters
    pub translation: Vector3<f64>,
}
impl Default for Pose {
    fn default() -> Self {
        Pose::identity()
    }
}
impl Pose {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Pose {
            rotation,
            translation,
        }
    }
    pub fn identity() -> Self {
        Pose::new(Matrix3::identity(), Vector3::zeros())
    }
    /// Pose from Euler angles `[roll, pitch, yaw]` in radians and a NED position.
    pub fn from_euler(euler: &Vector3<f64>, translation: Vector3<f64>) -> Self {
        Pose::new(attitude::euler_to_dcm(euler).transpose(), translation)
    }
    /// Split a homogeneous transform; the bottom row is ignored.
    pub fn from_homogeneous(matrix: &Matrix4<f64>) -> Self {
        Pose::new(
            matrix.fixed_view::<3, 3>(0, 0).into_owned(),
            matrix.fixed_view::<3, 1>(0, 3).into_owned(),
        )
    }
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut matrix = Matrix4::identity();
        matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        matrix
    }
    /// Euler angles `[roll, pitch, yaw]` in radians of the rotation block.
    pub fn euler(&self) -> Vector3<f64> {
        attitude::dcm_to_euler(&self.rotation.transpose())
    }
    /// Map a point from body coordinates into NED.
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }
    /// True when every row of the rotation block is unit length and mutually orthogonal
    /// within `tolerance`.
    pub fn is_orthonormal(&self, tolerance: f64) -> bool {
        (self.rotation * self.rotation.transpose() - Matrix3::identity())
            .iter()
            .all(|v| v.abs() <= tolerance)
    }
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let euler = self.euler();
        write!(
            f,
            "Pose {{ ned: [{:.3}, {:.3}, {:.3}] m, rpy: [{:.2}, {:.2}, {:.2}] deg }}",
            self.translation[0],
            self.translation[1],
            self.translation[2],
            euler[0].to_degrees(),
            euler[1].to_degrees(),
            euler[2].to_degrees()
        )
    }
}

/// A pose stamped with its time and circular error probable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimestampedPose {
    pub pose: Pose,
    /// Nanoseconds since the Unix epoch
    pub timestamp_ns: u64,
    /// Circular error probable of the horizontal position, meters
    pub cep: f64,
}
impl TimestampedPose {
    pub fn new(pose: Pose, timestamp_ns: u64, cep: f64) -> Self {
        TimestampedPose {
            pose,
            timestamp_ns,
            cep,
        }
    }
}
impl Display for TimestampedPose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} ns (cep {:.3} m)", self.pose, self.timestamp_ns, self.cep)
    }
}
