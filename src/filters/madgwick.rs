//! Gradient-descent orientation filter (IMU form, no magnetometer).
//!
//! Yaw is unobservable without a heading reference, so it is pure gyro
//! integration and drifts.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::{clamp_dt, AttitudeFilter};
use crate::config::GaitConfig;
use crate::types::Quaternion;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MadgwickState {
    pub quaternion: Quaternion,
    pub updates: u64,
    pub skipped_updates: u64,
}

#[derive(Clone, Debug)]
pub struct MadgwickFilter {
    q: Quaternion,
    beta: f64,
    nominal_dt: f64,
    max_gap: f64,
    last_timestamp_ms: Option<i64>,
    updates: u64,
    skipped_updates: u64,
}

impl MadgwickFilter {
    /// `nominal_dt` and `max_gap` are in seconds.
    pub fn new(beta: f64, nominal_dt: f64, max_gap: f64) -> Self {
        Self {
            q: Quaternion::identity(),
            beta,
            nominal_dt,
            max_gap,
            last_timestamp_ms: None,
            updates: 0,
            skipped_updates: 0,
        }
    }

    pub fn from_config(config: &GaitConfig) -> Self {
        Self::new(config.madgwick_beta, config.nominal_dt(), config.max_gap_ms / 1000.0)
    }

    /// Update using the sample clock. The interval since the previous call
    /// drives the gyro scaling; the first call uses the nominal interval.
    pub fn update_at(&mut self, gyro: &Vector3<f64>, accel: &Vector3<f64>, timestamp_ms: i64) {
        let dt = match self.last_timestamp_ms {
            Some(prev) => (timestamp_ms - prev) as f64 / 1000.0,
            None => self.nominal_dt,
        };
        self.last_timestamp_ms = Some(timestamp_ms);
        self.update(gyro, accel, dt);
    }

    pub fn get_state(&self) -> MadgwickState {
        MadgwickState {
            quaternion: self.q,
            updates: self.updates,
            skipped_updates: self.skipped_updates,
        }
    }

    /// One fusion step over the nominal interval. `gyro` is already in rad/s.
    fn step(&mut self, gyro: &Vector3<f64>, accel: &Vector3<f64>) {
        let q = self.q;
        let dt = self.nominal_dt;

        // Rate of change from the gyroscope alone
        let q_dot_omega = q.multiply(&Quaternion::new(0.0, gyro.x, gyro.y, gyro.z));
        let mut q_dot = [
            0.5 * q_dot_omega.w,
            0.5 * q_dot_omega.x,
            0.5 * q_dot_omega.y,
            0.5 * q_dot_omega.z,
        ];

        // Accelerometer correction (skipped in free fall)
        let accel_norm = accel.norm();
        if accel_norm > 1e-6 {
            let (ax, ay, az) = (accel.x / accel_norm, accel.y / accel_norm, accel.z / accel_norm);
            let (q0, q1, q2, q3) = (q.w, q.x, q.y, q.z);

            let _2q0 = 2.0 * q0;
            let _2q1 = 2.0 * q1;
            let _2q2 = 2.0 * q2;
            let _2q3 = 2.0 * q3;
            let _4q0 = 4.0 * q0;
            let _4q1 = 4.0 * q1;
            let _4q2 = 4.0 * q2;
            let _8q1 = 8.0 * q1;
            let _8q2 = 8.0 * q2;
            let q0q0 = q0 * q0;
            let q1q1 = q1 * q1;
            let q2q2 = q2 * q2;
            let q3q3 = q3 * q3;

            let s0 = _4q0 * q2q2 + _2q2 * ax + _4q0 * q1q1 - _2q1 * ay;
            let s1 = _4q1 * q3q3 - _2q3 * ax + 4.0 * q0q0 * q1 - _2q0 * ay - _4q1
                + _8q1 * q1q1 + _8q1 * q2q2 + _4q1 * az;
            let s2 = 4.0 * q0q0 * q2 + _2q0 * ax + _4q2 * q3q3 - _2q3 * ay - _4q2
                + _8q2 * q1q1 + _8q2 * q2q2 + _4q2 * az;
            let s3 = 4.0 * q1q1 * q3 - _2q1 * ax + 4.0 * q2q2 * q3 - _2q2 * ay;

            // Zero gradient means the estimate already matches gravity
            let step_norm = (s0 * s0 + s1 * s1 + s2 * s2 + s3 * s3).sqrt();
            if step_norm > 0.0 {
                q_dot[0] -= self.beta * s0 / step_norm;
                q_dot[1] -= self.beta * s1 / step_norm;
                q_dot[2] -= self.beta * s2 / step_norm;
                q_dot[3] -= self.beta * s3 / step_norm;
            }
        }

        let next = Quaternion::new(
            q.w + q_dot[0] * dt,
            q.x + q_dot[1] * dt,
            q.y + q_dot[2] * dt,
            q.z + q_dot[3] * dt,
        )
        .normalize();

        if !next.is_unit(1e-6) {
            self.skipped_updates += 1;
            log::warn!(
                "Attitude update diverged ({:?}), keeping previous orientation ({} skipped)",
                next,
                self.skipped_updates
            );
            return;
        }
        self.q = next;
        self.updates += 1;
    }
}

impl AttitudeFilter for MadgwickFilter {
    /// The interval is clamped to nominal on clock anomalies, then expressed as
    /// a gyro scale factor so each call remains one nominal fusion step.
    fn update(&mut self, gyro: &Vector3<f64>, accel: &Vector3<f64>, dt: f64) {
        let dt = clamp_dt(dt, self.nominal_dt, self.max_gap);
        let scale = dt / self.nominal_dt;
        let gyro_rad = gyro.map(f64::to_radians) * scale;
        self.step(&gyro_rad, accel);
    }

    fn orientation(&self) -> Quaternion {
        self.q
    }

    fn reset(&mut self) {
        self.q = Quaternion::identity();
        self.last_timestamp_ms = None;
        self.updates = 0;
        self.skipped_updates = 0;
    }
}
