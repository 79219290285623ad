//! Earth-related constants and functions
//!
//! This module contains the WGS84 ellipsoid constants and the coordinate conversions the
//! estimator depends on: geodetic (latitude, longitude, height) to and from Earth-centered
//! Earth-fixed (ECEF) Cartesian coordinates, and ECEF offsets to and from the local tangent
//! plane (North, East, Down) at a reference point. Normal gravity is modeled with the
//! Somigliana equation and a free-air correction, and a small standard-atmosphere model is
//! kept for vehicle performance calculations.
//!
//! # Coordinate Systems
//! The ECEF frame is a right-handed Cartesian coordinate system with the origin at the
//! Earth's center, the X axis through the prime meridian on the equator and the Z axis
//! through the north pole. The local tangent plane is a right-handed NED frame whose origin
//! is an externally supplied geodetic basepoint. Unlike the rest of the crate's reporting
//! types, every function in this module takes and returns angles in **radians**.
//!
//! # Geodetic solution
//! The forward conversion is closed form:
//!
//! $$
//! N = \frac{a}{\sqrt{1 - e^2 \sin^2 \phi}}, \quad
//! X = (N + h) \cos \phi \cos \lambda, \quad
//! Y = (N + h) \cos \phi \sin \lambda, \quad
//! Z = (N (1 - e^2) + h) \sin \phi
//! $$
//!
//! The inverse is a fixed-point iteration that recomputes $N$, $h$ and $\phi$ on every pass
//! and stops as soon as successive latitude estimates agree, capped at
//! [`MAX_GEODETIC_ITERATIONS`].

use ::nalgebra::{Matrix3, Vector3};

// Earth constants (WGS84)
/// Earth's equatorial radius in meters ($a$)
pub const EQUATORIAL_RADIUS: f64 = 6378137.0;
/// Earth's polar radius in meters ($b$)
pub const POLAR_RADIUS: f64 = 6356752.31425;
/// Earth's flattening derived from the two radii ($f = (a - b) / a$)
pub const FLATTENING: f64 = (EQUATORIAL_RADIUS - POLAR_RADIUS) / EQUATORIAL_RADIUS;
/// Earth's eccentricity squared ($e^2 = 2f - f^2$)
pub const ECCENTRICITY_SQUARED: f64 = 2.0 * FLATTENING - FLATTENING * FLATTENING;
/// Earth's gravitational acceleration at the equator ($g_e$) in $m/s^2$
pub const GE: f64 = 9.7803253359;
/// Earth's gravitational acceleration at the poles ($g_p$) in $m/s^2$
pub const GP: f64 = 9.8321849378;
/// Somigliana's constant ($K$)
pub const K: f64 = (POLAR_RADIUS * GP - EQUATORIAL_RADIUS * GE) / (EQUATORIAL_RADIUS * GE);
/// Free-air gravity gradient in $m/s^2$ per meter of height
pub const FREE_AIR_GRADIENT: f64 = 3.08e-6;
/// Standard gravity in $m/s^2$, used before a geodetic origin is known
pub const STANDARD_GRAVITY: f64 = 9.80665;
/// Latitude convergence tolerance of the geodetic solve, radians
pub const GEODETIC_TOLERANCE: f64 = 1e-12;
/// Hard cap on the number of fixed-point passes of the geodetic solve
pub const MAX_GEODETIC_ITERATIONS: usize = 50;

/// Radius of curvature in the prime vertical ($N$) at a geodetic latitude in radians.
pub fn prime_vertical_radius(latitude: f64) -> f64 {
    let sin_lat = latitude.sin();
    EQUATORIAL_RADIUS / (1.0 - ECCENTRICITY_SQUARED * sin_lat * sin_lat).sqrt()
}

/// Convert WGS84 geodetic coordinates to ECEF
///
/// # Parameters
/// - `latitude` - geodetic latitude in radians
/// - `longitude` - longitude in radians
/// - `height` - height above the ellipsoid in meters
///
/// # Returns
/// The ECEF position `[X, Y, Z]` in meters.
///
/// # Example
/// ```rust
/// use gpsins::earth;
/// let ecef = earth::geodetic_to_ecef(0.0, 0.0, 0.0);
/// assert!((ecef[0] - earth::EQUATORIAL_RADIUS).abs() < 1e-9);
/// ```
pub fn geodetic_to_ecef(latitude: f64, longitude: f64, height: f64) -> Vector3<f64> {
    let n = prime_vertical_radius(latitude);
    let (sin_lat, cos_lat) = latitude.sin_cos();
    let (sin_lon, cos_lon) = longitude.sin_cos();
    Vector3::new(
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - ECCENTRICITY_SQUARED) + height) * sin_lat,
    )
}

/// Convert an ECEF position to WGS84 geodetic coordinates
///
/// Fixed-point iteration on latitude and height. Each pass recomputes the prime vertical
/// radius from the latest latitude; the loop exits once two successive latitudes differ by
/// less than [`GEODETIC_TOLERANCE`] or after [`MAX_GEODETIC_ITERATIONS`] passes. Points on
/// the polar axis are solved directly.
///
/// # Returns
/// `[latitude (rad), longitude (rad), height (m)]`
///
/// # Example
/// ```rust
/// use gpsins::earth;
/// let ecef = earth::geodetic_to_ecef(0.7, -1.2, 250.0);
/// let llh = earth::ecef_to_geodetic(&ecef);
/// assert!((llh[0] - 0.7).abs() < 1e-9);
/// assert!((llh[2] - 250.0).abs() < 1e-4);
/// ```
pub fn ecef_to_geodetic(ecef: &Vector3<f64>) -> Vector3<f64> {
    let (x, y, z) = (ecef[0], ecef[1], ecef[2]);
    let p = x.hypot(y);
    let longitude = y.atan2(x);
    if p < 1e-9 {
        let latitude = std::f64::consts::FRAC_PI_2.copysign(z);
        return Vector3::new(latitude, longitude, z.abs() - POLAR_RADIUS);
    }

    let mut latitude = 0.0;
    let mut n = EQUATORIAL_RADIUS;
    let mut height = 0.0;
    for _ in 0..MAX_GEODETIC_ITERATIONS {
        let sin_lat = z / (n * (1.0 - ECCENTRICITY_SQUARED) + height);
        let next = ((z + ECCENTRICITY_SQUARED * n * sin_lat) / p).atan();
        n = prime_vertical_radius(next);
        height = p / next.cos() - n;
        let step = (next - latitude).abs();
        latitude = next;
        if step < GEODETIC_TOLERANCE {
            break;
        }
    }
    Vector3::new(latitude, longitude, height)
}

/// Rotation from ECEF to the local NED tangent plane at a geodetic point
///
/// # Parameters
/// - `latitude` - latitude of the tangent point in radians
/// - `longitude` - longitude of the tangent point in radians
///
/// # Returns
/// The 3x3 rotation $C^n_e$ whose rows are the North, East and Down unit vectors expressed
/// in ECEF.
pub fn ecef_to_tangent_rotation(latitude: f64, longitude: f64) -> Matrix3<f64> {
    let (slat, clat) = latitude.sin_cos();
    let (slon, clon) = longitude.sin_cos();
    Matrix3::new(
        -slat * clon, -slat * slon, clat,
        -slon, clon, 0.0,
        -clat * clon, -clat * slon, -slat,
    )
}

/// Rotate an ECEF difference vector into the NED tangent plane at `(latitude, longitude)`.
pub fn ecef_to_tangent(delta: &Vector3<f64>, latitude: f64, longitude: f64) -> Vector3<f64> {
    ecef_to_tangent_rotation(latitude, longitude) * delta
}

/// Rotate a NED vector at `(latitude, longitude)` back into an ECEF difference vector.
pub fn tangent_to_ecef(local: &Vector3<f64>, latitude: f64, longitude: f64) -> Vector3<f64> {
    ecef_to_tangent_rotation(latitude, longitude).transpose() * local
}

/// NED offset of `point` relative to `reference`, both in ECEF, expressed in the tangent plane
/// at `(latitude, longitude)`.
pub fn ecef_distance(
    point: &Vector3<f64>,
    reference: &Vector3<f64>,
    latitude: f64,
    longitude: f64,
) -> Vector3<f64> {
    ecef_to_tangent(&(point - reference), latitude, longitude)
}

/// NED offset from geodetic point `from` to geodetic point `to` (each `[lat rad, lon rad, h m]`),
/// expressed in the tangent plane at `(latitude, longitude)`.
pub fn geodetic_distance(
    from: &Vector3<f64>,
    to: &Vector3<f64>,
    latitude: f64,
    longitude: f64,
) -> Vector3<f64> {
    let start = geodetic_to_ecef(from[0], from[1], from[2]);
    let end = geodetic_to_ecef(to[0], to[1], to[2]);
    ecef_distance(&end, &start, latitude, longitude)
}

/// Calculate the WGS84 gravity scalar
///
/// The [gravity model](https://en.wikipedia.org/wiki/Gravity_of_Earth) is based on the [Somigliana
/// method](https://en.wikipedia.org/wiki/Theoretical_gravity#Somigliana_equation) with a free-air
/// correction for height.
///
/// # Parameters
/// - `latitude` - The WGS84 latitude in radians
/// - `height` - The WGS84 height in meters
///
/// # Returns
/// The magnitude of normal gravity in m/s^2
///
/// # Example
/// ```rust
/// use gpsins::earth;
/// let g = earth::gravity(45f64.to_radians(), 1000.0);
/// assert!(g > 9.80 && g < 9.81);
/// ```
pub fn gravity(latitude: f64, height: f64) -> f64 {
    let sin_lat = latitude.sin();
    let g0 = (GE * (1.0 + K * sin_lat * sin_lat))
        / (1.0 - ECCENTRICITY_SQUARED * sin_lat * sin_lat).sqrt();
    g0 - FREE_AIR_GRADIENT * height
}

/// Standard atmosphere properties at an altitude, English units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Atmosphere {
    /// slug/ft^3
    pub density: f64,
    /// lbf/ft^2
    pub pressure: f64,
    /// degrees Rankine
    pub temperature: f64,
    /// ft/s
    pub speed_of_sound: f64,
}

/// Polynomial standard atmosphere, valid up to roughly 36,000 ft.
///
/// # Parameters
/// - `altitude` - pressure altitude in feet
pub fn atmosphere(altitude: f64) -> Atmosphere {
    let h = altitude * 1e-5;
    let ratio = 1.0 - (0.68753 - 0.003264 * h) * h;
    let density = ratio.powf(4.256) * 0.0023769;
    let theta = 1.0 - 0.687532 * h + 0.003298 * h * h;
    let temperature = theta * 518.69;
    Atmosphere {
        density,
        pressure: density * 1716.5 * temperature,
        temperature,
        speed_of_sound: 1116.45 * theta.sqrt(),
    }
}
