//! Attitude representations and conversions
//!
//! Aerospace roll-pitch-yaw (Z-Y-X) Euler angles, unit quaternions and direction cosine
//! matrices. All angles are radians and every DCM produced here rotates vectors from the
//! local NED frame into the body frame ($C^b_n$); its transpose takes body-frame vectors to
//! NED. Quaternions use the scalar-first convention $q = [q_0, q_1, q_2, q_3]$ and represent
//! the body-to-NED rotation, which is what [`nalgebra::UnitQuaternion`] stores for
//! `UnitQuaternion::from_euler_angles(roll, pitch, yaw)`.
//!
//! Every `asin` argument is clamped to $[-1, 1]$ so matrices that drift slightly off
//! orthonormal still yield a finite pitch.

use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3};
use std::f64::consts::{FRAC_PI_2, PI};

use crate::wrap_to_pi;

/// Euler angles `[roll, pitch, yaw]` to the NED-to-body DCM
///
/// $$
/// C^b_n = \begin{bmatrix}
/// c\psi c\theta & s\psi c\theta & -s\theta \\\\
/// -s\psi c\phi + c\psi s\theta s\phi & c\psi c\phi + s\psi s\theta s\phi & c\theta s\phi \\\\
/// s\psi s\phi + c\psi s\theta c\phi & -c\psi s\phi + s\psi s\theta c\phi & c\theta c\phi
/// \end{bmatrix}
/// $$
///
/// # Example
/// ```rust
/// use gpsins::attitude;
/// use nalgebra::{Matrix3, Vector3};
/// let dcm = attitude::euler_to_dcm(&Vector3::zeros());
/// assert_eq!(dcm, Matrix3::identity());
/// ```
pub fn euler_to_dcm(euler: &Vector3<f64>) -> Matrix3<f64> {
    let (sphi, cphi) = euler[0].sin_cos();
    let (sth, cth) = euler[1].sin_cos();
    let (spsi, cpsi) = euler[2].sin_cos();

    let mut dcm = Matrix3::zeros();
    dcm[(0, 0)] = cpsi * cth;
    dcm[(0, 1)] = spsi * cth;
    dcm[(0, 2)] = -sth;

    dcm[(1, 0)] = -spsi * cphi + cpsi * sth * sphi;
    dcm[(1, 1)] = cpsi * cphi + spsi * sth * sphi;
    dcm[(1, 2)] = cth * sphi;

    dcm[(2, 0)] = spsi * sphi + cpsi * sth * cphi;
    dcm[(2, 1)] = -cpsi * sphi + spsi * sth * cphi;
    dcm[(2, 2)] = cth * cphi;
    dcm
}

/// NED-to-body DCM back to Euler angles `[roll, pitch, yaw]`.
pub fn dcm_to_euler(dcm: &Matrix3<f64>) -> Vector3<f64> {
    let pitch = (-dcm[(0, 2)]).clamp(-1.0, 1.0).asin();
    let roll = dcm[(1, 2)].atan2(dcm[(2, 2)]);
    let yaw = dcm[(0, 1)].atan2(dcm[(0, 0)]);
    Vector3::new(roll, pitch, yaw)
}

/// Euler angles to the body-to-NED quaternion (half-angle products).
///
/// # Example
/// ```rust
/// use gpsins::attitude;
/// use nalgebra::{UnitQuaternion, Vector3};
/// let q = attitude::euler_to_quaternion(&Vector3::new(0.1, -0.2, 1.3));
/// let reference = UnitQuaternion::from_euler_angles(0.1, -0.2, 1.3);
/// assert!(q.angle_to(&reference) < 1e-12);
/// ```
pub fn euler_to_quaternion(euler: &Vector3<f64>) -> UnitQuaternion<f64> {
    let (sphi, cphi) = (euler[0] / 2.0).sin_cos();
    let (sth, cth) = (euler[1] / 2.0).sin_cos();
    let (spsi, cpsi) = (euler[2] / 2.0).sin_cos();

    let q0 = cphi * cth * cpsi + sphi * sth * spsi;
    let q1 = -cphi * sth * spsi + sphi * cth * cpsi;
    let q2 = cphi * sth * cpsi + sphi * cth * spsi;
    let q3 = cphi * cth * spsi - sphi * sth * cpsi;
    UnitQuaternion::new_normalize(Quaternion::new(q0, q1, q2, q3))
}

/// Body-to-NED quaternion to the NED-to-body DCM.
pub fn quaternion_to_dcm(q: &UnitQuaternion<f64>) -> Matrix3<f64> {
    let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);

    let mut dcm = Matrix3::zeros();
    dcm[(0, 0)] = 1.0 - 2.0 * (q2 * q2 + q3 * q3);
    dcm[(0, 1)] = 2.0 * (q1 * q2 + q0 * q3);
    dcm[(0, 2)] = 2.0 * (q1 * q3 - q0 * q2);

    dcm[(1, 0)] = 2.0 * (q1 * q2 - q0 * q3);
    dcm[(1, 1)] = 1.0 - 2.0 * (q1 * q1 + q3 * q3);
    dcm[(1, 2)] = 2.0 * (q2 * q3 + q0 * q1);

    dcm[(2, 0)] = 2.0 * (q1 * q3 + q0 * q2);
    dcm[(2, 1)] = 2.0 * (q2 * q3 - q0 * q1);
    dcm[(2, 2)] = 1.0 - 2.0 * (q1 * q1 + q2 * q2);
    dcm
}

/// Body-to-NED quaternion to Euler angles `[roll, pitch, yaw]`.
pub fn quaternion_to_euler(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);
    let pitch = -(2.0 * (q1 * q3 - q0 * q2)).clamp(-1.0, 1.0).asin();
    let roll = (2.0 * (q2 * q3 + q0 * q1)).atan2(1.0 - 2.0 * (q1 * q1 + q2 * q2));
    let yaw = (2.0 * (q1 * q2 + q0 * q3)).atan2(1.0 - 2.0 * (q2 * q2 + q3 * q3));
    Vector3::new(roll, pitch, yaw)
}

/// Any rotation matrix (either direction) to the quaternion of the same rotation.
///
/// Used to move pose rotations into quaternion space for SLERP; assumes `rotation` is
/// orthonormal.
pub fn rotation_to_quaternion(rotation: &Matrix3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*rotation))
}

/// Attitude error `command - current`, wrapped so roll and yaw land in $[-\pi, \pi)$ and the
/// pitch error in $[-\pi/2, \pi/2]$.
pub fn euler_difference(command: &Vector3<f64>, current: &Vector3<f64>) -> Vector3<f64> {
    let mut pitch = command[1] - current[1];
    if pitch > FRAC_PI_2 {
        pitch -= PI;
    } else if pitch < -FRAC_PI_2 {
        pitch += PI;
    }
    Vector3::new(
        wrap_to_pi(command[0] - current[0]),
        pitch,
        wrap_to_pi(command[2] - current[2]),
    )
}

/// The cross-product ("omega-cross") matrix of a vector: `skew_symmetric(a) * b == a.cross(&b)`.
pub fn skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
    let mut skew: Matrix3<f64> = Matrix3::zeros();
    skew[(0, 1)] = -v[2];
    skew[(0, 2)] = v[1];
    skew[(1, 0)] = v[2];
    skew[(1, 2)] = -v[0];
    skew[(2, 0)] = -v[1];
    skew[(2, 1)] = v[0];
    skew
}
