use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::{clamp_dt, AttitudeFilter};
use crate::config::GaitConfig;
use crate::types::{EulerAngles, Quaternion};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplementaryFilterState {
    pub pitch_deg: f64,
    pub roll_deg: f64,
}

/// Lightweight pitch/roll estimator: gyro integration blended with the
/// accelerometer tilt. Yaw is always zero.
#[derive(Clone, Debug)]
pub struct ComplementaryFilter {
    pitch: f64, // degrees
    roll: f64,  // degrees

    // 0.98 = 98% trust integrated gyro
    alpha: f64,

    nominal_dt: f64, // seconds
    max_gap: f64,    // seconds
}

impl ComplementaryFilter {
    pub fn new(alpha: f64, nominal_dt: f64, max_gap: f64) -> Self {
        Self { pitch: 0.0, roll: 0.0, alpha, nominal_dt, max_gap }
    }

    pub fn from_config(config: &GaitConfig) -> Self {
        Self::new(config.complementary_alpha, config.nominal_dt(), config.max_gap_ms / 1000.0)
    }

    /// Tilt implied by the accelerometer alone, in degrees.
    pub fn accel_tilt(accel: &Vector3<f64>) -> (f64, f64) {
        let pitch = accel.x.atan2((accel.y * accel.y + accel.z * accel.z).sqrt()).to_degrees();
        let roll = accel.y.atan2(accel.z).to_degrees();
        (pitch, roll)
    }

    pub fn pitch_deg(&self) -> f64 {
        self.pitch
    }

    pub fn roll_deg(&self) -> f64 {
        self.roll
    }

    pub fn get_state(&self) -> ComplementaryFilterState {
        ComplementaryFilterState { pitch_deg: self.pitch, roll_deg: self.roll }
    }
}

impl AttitudeFilter for ComplementaryFilter {
    fn update(&mut self, gyro: &Vector3<f64>, accel: &Vector3<f64>, dt: f64) {
        let dt = clamp_dt(dt, self.nominal_dt, self.max_gap);
        let (pitch_acc, roll_acc) = Self::accel_tilt(accel);
        let pitch_gyro = self.pitch + gyro.y * dt;
        let roll_gyro = self.roll + gyro.x * dt;

        let pitch = self.alpha * pitch_gyro + (1.0 - self.alpha) * pitch_acc;
        let roll = self.alpha * roll_gyro + (1.0 - self.alpha) * roll_acc;

        if !pitch.is_finite() || !roll.is_finite() {
            log::warn!("Complementary update diverged, keeping previous tilt");
            return;
        }
        self.pitch = pitch;
        self.roll = roll;
    }

    fn orientation(&self) -> Quaternion {
        Quaternion::from(EulerAngles::new(0.0, self.pitch.to_radians(), self.roll.to_radians()))
    }

    fn reset(&mut self) {
        self.pitch = 0.0;
        self.roll = 0.0;
    }
}
