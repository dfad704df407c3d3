pub mod quaternion;

pub use quaternion::{EulerAngles, Quaternion};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of forefoot/midfoot pressure sensors per insole (the heel is separate).
pub const FSR_COUNT: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Limb {
    Left,
    Right,
}

impl fmt::Display for Limb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limb::Left => write!(f, "left"),
            Limb::Right => write!(f, "right"),
        }
    }
}

/// One decoded sensor reading.
///
/// Acceleration is in g and angular rate in deg/s. Both are in the body frame
/// (X forward, Y right, Z up) once they have passed through an
/// [`AxisMapping`](crate::axis::AxisMapping).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub limb: Limb,
    #[serde(default)]
    pub device_id: String,
    pub accel: Vector3<f64>,
    pub gyro: Vector3<f64>,
    pub fsr: [f64; FSR_COUNT],
    pub heel: f64,
}

impl Sample {
    /// Total load under the foot: the five FSR channels plus the heel.
    pub fn pressure_sum(&self) -> f64 {
        self.fsr.iter().sum::<f64>() + self.heel
    }

    pub fn forefoot_sum(&self) -> f64 {
        self.fsr.iter().sum()
    }

    pub fn accel_magnitude(&self) -> f64 {
        self.accel.norm()
    }

    pub fn gyro_magnitude(&self) -> f64 {
        self.gyro.norm()
    }

    /// Copy of this sample with replaced inertial triples.
    pub fn with_inertial(&self, accel: Vector3<f64>, gyro: Vector3<f64>) -> Sample {
        Sample { accel, gyro, ..self.clone() }
    }
}

/// A closed stance interval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    pub limb: Limb,
    pub start_ms: i64,
    pub end_ms: i64,
    pub peak_ms: i64,
    pub peak_pressure: f64,
    pub contact_duration_ms: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GaitPhase {
    Stance,
    Swing,
}

/// Per-sample output of the live path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSample {
    pub timestamp_ms: i64,
    pub limb: Limb,
    pub device_id: String,
    pub quaternion: Quaternion,
    /// Radians.
    pub euler: EulerAngles,
    pub is_step: bool,
    pub step_count: u64,
    pub gait_phase: GaitPhase,
}
