//! Synthetic walking data for demos and tests.
//!
//! Each limb follows a fixed cycle: heel strike, mid-stance, toe-off, swing.
//! The right limb runs half a cycle behind the left.

use nalgebra::Vector3;

use crate::types::{Limb, Sample, FSR_COUNT};

const HEEL_STRIKE_END: f64 = 0.2;
const MID_STANCE_END: f64 = 0.5;
const TOE_OFF_END: f64 = 0.7;

/// Forward swing acceleration and pitch rate while the foot is in the air.
const SWING_ACCEL_G: f64 = 0.5;
const SWING_PITCH_RATE_DPS: f64 = 250.0;

#[derive(Clone, Debug)]
pub struct GaitSimulator {
    limb: Limb,
    device_id: String,
    start_ms: i64,
    interval_ms: i64,
    cycle_ms: f64,
    tick: i64,
}

impl GaitSimulator {
    pub fn new(limb: Limb, start_ms: i64) -> Self {
        Self {
            limb,
            device_id: format!("sim_{}", limb),
            start_ms,
            interval_ms: 50,
            cycle_ms: 1200.0,
            tick: 0,
        }
    }

    pub fn with_interval(mut self, interval_ms: i64) -> Self {
        self.interval_ms = interval_ms.max(1);
        self
    }

    pub fn with_cycle(mut self, cycle_ms: f64) -> Self {
        self.cycle_ms = cycle_ms.max(1.0);
        self
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    /// Fraction of the gait cycle (0..1) at a given time.
    pub fn phase_at(&self, timestamp_ms: i64) -> f64 {
        let offset = match self.limb {
            Limb::Left => 0.0,
            Limb::Right => self.cycle_ms / 2.0,
        };
        let elapsed = (timestamp_ms - self.start_ms) as f64 + offset;
        elapsed.rem_euclid(self.cycle_ms) / self.cycle_ms
    }

    pub fn sample_at(&self, timestamp_ms: i64) -> Sample {
        let phase = self.phase_at(timestamp_ms);
        let mut fsr = [0.0; FSR_COUNT];
        let mut heel = 0.0;
        let mut gyro = Vector3::zeros();

        let accel = if phase < HEEL_STRIKE_END {
            heel = 900.0;
            let toe_up = 20f64.to_radians();
            Vector3::new(toe_up.sin(), 0.0, toe_up.cos())
        } else if phase < MID_STANCE_END {
            heel = 200.0;
            fsr[2] = 300.0;
            fsr[3] = 600.0;
            fsr[4] = 600.0;
            Vector3::new(0.0, 0.0, 1.0)
        } else if phase < TOE_OFF_END {
            fsr = [900.0, 800.0, 800.0, 100.0, 100.0];
            let toe_down = (-30f64).to_radians();
            Vector3::new(toe_down.sin(), 0.0, toe_down.cos())
        } else {
            gyro.y = SWING_PITCH_RATE_DPS;
            Vector3::new(SWING_ACCEL_G, 0.0, 1.0)
        };

        Sample {
            timestamp_ms,
            limb: self.limb,
            device_id: self.device_id.clone(),
            accel,
            gyro,
            fsr,
            heel,
        }
    }
}

impl Iterator for GaitSimulator {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        let t = self.start_ms + self.tick * self.interval_ms;
        self.tick += 1;
        Some(self.sample_at(t))
    }
}

/// Both limbs over `duration_ms`, interleaved in time order.
pub fn simulate_session(start_ms: i64, duration_ms: i64, interval_ms: i64) -> Vec<Sample> {
    let left = GaitSimulator::new(Limb::Left, start_ms).with_interval(interval_ms);
    let right = GaitSimulator::new(Limb::Right, start_ms).with_interval(interval_ms);
    let n = (duration_ms / left.interval_ms()).max(0) as usize;
    left.take(n).zip(right.take(n)).flat_map(|(l, r)| [l, r]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsAggregator;
    use crate::stats::Severity;
    use approx::assert_abs_diff_eq;

    #[test]
    fn right_limb_runs_half_a_cycle_behind() {
        let left = GaitSimulator::new(Limb::Left, 0);
        let right = GaitSimulator::new(Limb::Right, 0);
        assert_eq!(left.phase_at(0), 0.0);
        assert_abs_diff_eq!(right.phase_at(0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(left.phase_at(1800), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn stance_phases_load_the_insole() {
        let sim = GaitSimulator::new(Limb::Left, 0);
        assert_eq!(sim.sample_at(0).pressure_sum(), 900.0);
        assert_eq!(sim.sample_at(400).pressure_sum(), 1700.0);
        assert_eq!(sim.sample_at(700).pressure_sum(), 2700.0);
        let swing = sim.sample_at(1000);
        assert_eq!(swing.pressure_sum(), 0.0);
        assert_eq!(swing.gyro.y, SWING_PITCH_RATE_DPS);
    }

    #[test]
    fn iterator_advances_by_interval() {
        let times: Vec<i64> = GaitSimulator::new(Limb::Right, 1000).with_interval(20).take(3).map(|s| s.timestamp_ms).collect();
        assert_eq!(times, vec![1000, 1020, 1040]);
    }

    #[test]
    fn simulated_session_is_symmetric() {
        let samples = simulate_session(0, 12_000, 50);
        assert_eq!(samples.len(), 480);

        let report = MetricsAggregator::default().analyze_session(&samples);
        let left = &report.left;
        let right = &report.right;

        assert!(left.basic.step_count >= 9 && left.basic.step_count <= 10);
        assert!(right.basic.step_count >= 9 && right.basic.step_count <= 10);
        assert!((left.basic.avg_contact_time_ms - 850.0).abs() <= 50.0);
        assert!(left.basic.cadence > 0.0);
        assert!(left.imu.avg_swing_speed > 200.0);
        assert_eq!(report.asymmetry.severity, Severity::Low);
        assert_abs_diff_eq!(report.asymmetry.load_si, 0.0, epsilon = 1e-9);
    }
}
