use std::ops::Mul;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Hamilton quaternion `w + xi + yj + zk`.
///
/// Plain serde-friendly storage; the algebra is delegated to nalgebra.
/// Orientation estimates are always kept at unit norm; operations that can
/// drift (integration, composition) are followed by [`Quaternion::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[f64; 4]> for Quaternion {
    fn from(values: [f64; 4]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }
}

impl From<Quaternion> for nalgebra::Quaternion<f64> {
    fn from(q: Quaternion) -> Self {
        nalgebra::Quaternion::new(q.w, q.x, q.y, q.z)
    }
}

impl From<nalgebra::Quaternion<f64>> for Quaternion {
    fn from(q: nalgebra::Quaternion<f64>) -> Self {
        Quaternion::new(q.w, q.i, q.j, q.k)
    }
}

impl From<UnitQuaternion<f64>> for Quaternion {
    fn from(q: UnitQuaternion<f64>) -> Self {
        Quaternion::from(q.into_inner())
    }
}

impl Quaternion {
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// No rotation.
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    #[inline]
    fn to_na(self) -> nalgebra::Quaternion<f64> {
        nalgebra::Quaternion::from(self)
    }

    /// Treat as a rotation without renormalizing.
    #[inline]
    fn to_unit(self) -> UnitQuaternion<f64> {
        UnitQuaternion::new_unchecked(self.to_na())
    }

    #[inline]
    pub fn norm_squared(&self) -> f64 {
        self.to_na().norm_squared()
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        self.to_na().norm()
    }

    /// Scale to unit norm. A zero or non-finite quaternion is returned as-is;
    /// callers check [`Quaternion::is_finite`] before trusting the result.
    pub fn normalize(&self) -> Quaternion {
        let n = self.norm();
        if n == 0.0 || !n.is_finite() {
            return *self;
        }
        Quaternion::from(self.to_na().normalize())
    }

    pub fn conjugate(&self) -> Quaternion {
        Quaternion::from(self.to_na().conjugate())
    }

    pub fn is_finite(&self) -> bool {
        self.w.is_finite() && self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn is_unit(&self, tolerance: f64) -> bool {
        self.is_finite() && (self.norm() - 1.0).abs() <= tolerance
    }

    /// Hamilton product `self ⊗ other`.
    pub fn multiply(&self, other: &Quaternion) -> Quaternion {
        Quaternion::from(self.to_na() * other.to_na())
    }

    /// Rotate a vector from the body frame into the reference frame (`q v q*`).
    /// Assumes unit norm.
    pub fn rotate(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.to_unit().transform_vector(v)
    }

    pub fn to_euler(&self) -> EulerAngles {
        EulerAngles::from(*self)
    }

    pub fn approx_eq(&self, other: &Quaternion, tol: f64) -> bool {
        (self.w - other.w).abs() <= tol
            && (self.x - other.x).abs() <= tol
            && (self.y - other.y).abs() <= tol
            && (self.z - other.z).abs() <= tol
    }
}

impl Mul<Quaternion> for Quaternion {
    type Output = Quaternion;
    fn mul(self, other: Quaternion) -> Quaternion {
        self.multiply(&other)
    }
}

impl Mul<&Quaternion> for &Quaternion {
    type Output = Quaternion;
    fn mul(self, other: &Quaternion) -> Quaternion {
        self.multiply(other)
    }
}

/// Tait-Bryan angles in radians, applied yaw (Z) then pitch (Y) then roll (X).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EulerAngles {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl EulerAngles {
    pub fn new(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self { yaw, pitch, roll }
    }

    pub fn to_degrees(&self) -> EulerAngles {
        EulerAngles::new(self.yaw.to_degrees(), self.pitch.to_degrees(), self.roll.to_degrees())
    }
}

impl From<Quaternion> for EulerAngles {
    fn from(q: Quaternion) -> Self {
        let (roll, pitch, yaw) = q.to_unit().euler_angles();
        EulerAngles { yaw, pitch, roll }
    }
}

impl From<EulerAngles> for Quaternion {
    fn from(e: EulerAngles) -> Self {
        Quaternion::from(UnitQuaternion::from_euler_angles(e.roll, e.pitch, e.yaw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn identity_is_neutral_for_multiplication() {
        let q = Quaternion::from(EulerAngles::new(0.3, -0.2, 0.7));
        assert!((q * Quaternion::identity()).approx_eq(&q, 1e-12));
        assert!((Quaternion::identity() * q).approx_eq(&q, 1e-12));
    }

    #[test]
    fn conjugate_cancels_rotation() {
        let q = Quaternion::from(EulerAngles::new(1.1, 0.4, -0.9));
        let r = q.conjugate() * q;
        assert!(r.approx_eq(&Quaternion::identity(), 1e-12));
    }

    #[test]
    fn normalize_yields_unit_norm() {
        let q = Quaternion::new(2.0, -1.0, 0.5, 3.0).normalize();
        assert_abs_diff_eq!(q.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn normalize_leaves_zero_quaternion_untouched() {
        let q = Quaternion::new(0.0, 0.0, 0.0, 0.0).normalize();
        assert_eq!(q, Quaternion::new(0.0, 0.0, 0.0, 0.0));
        assert!(!q.is_unit(1e-6));
    }

    #[test]
    fn rotate_quarter_turn_about_z() {
        let q = Quaternion::from(EulerAngles::new(FRAC_PI_2, 0.0, 0.0));
        let v = q.rotate(&Vector3::new(1.0, 0.0, 0.0));
        assert_abs_diff_eq!(v.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(v.y, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(v.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn euler_round_trip_away_from_gimbal_lock() {
        let cases = [
            (0.0, 0.0, 0.0),
            (FRAC_PI_4, 0.0, 0.0),
            (0.0, FRAC_PI_4, 0.0),
            (0.0, 0.0, FRAC_PI_4),
            (0.5, -0.3, 1.2),
        ];
        for (yaw, pitch, roll) in cases {
            let e = EulerAngles::from(Quaternion::from(EulerAngles::new(yaw, pitch, roll)));
            assert_abs_diff_eq!(e.yaw, yaw, epsilon = 1e-9);
            assert_abs_diff_eq!(e.pitch, pitch, epsilon = 1e-9);
            assert_abs_diff_eq!(e.roll, roll, epsilon = 1e-9);
        }
    }

    #[test]
    fn product_matches_unit_quaternion_composition() {
        let a = EulerAngles::new(0.4, -0.1, 0.9);
        let b = EulerAngles::new(-1.2, 0.3, 0.2);
        let expected = UnitQuaternion::from_euler_angles(a.roll, a.pitch, a.yaw)
            * UnitQuaternion::from_euler_angles(b.roll, b.pitch, b.yaw);
        let q = Quaternion::from(a) * Quaternion::from(b);
        assert!(q.approx_eq(&Quaternion::from(expected), 1e-12));

        let v = Vector3::new(0.3, -1.0, 2.0);
        let rotated = q.rotate(&v);
        assert_abs_diff_eq!(rotated, expected * v, epsilon = 1e-9);
    }

    #[test]
    fn non_finite_components_are_detected() {
        assert!(!Quaternion::new(f64::NAN, 0.0, 0.0, 0.0).is_finite());
        assert!(Quaternion::identity().is_unit(1e-6));
    }
}
