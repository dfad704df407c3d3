pub mod complementary;
pub mod madgwick;

use nalgebra::Vector3;

use crate::types::{EulerAngles, Quaternion};

/// Common surface of the attitude estimators.
///
/// `gyro` is in deg/s, `accel` in g, `dt` in seconds. Implementations must
/// leave their previous estimate untouched when an update would produce a
/// non-finite orientation.
pub trait AttitudeFilter {
    fn update(&mut self, gyro: &Vector3<f64>, accel: &Vector3<f64>, dt: f64);

    fn orientation(&self) -> Quaternion;

    fn reset(&mut self);

    fn euler(&self) -> EulerAngles {
        self.orientation().to_euler()
    }
}

/// Replace a non-positive, non-finite or over-long interval with the nominal one.
pub fn clamp_dt(dt: f64, nominal: f64, max_gap: f64) -> f64 {
    if !dt.is_finite() || dt <= 0.0 || dt > max_gap {
        nominal
    } else {
        dt
    }
}
