//! Zero-velocity-aided double integration of forward acceleration.
//!
//! Tilt comes from the complementary filter and yaw is forced to zero, so the
//! "world" frame here is heading-relative: X is the direction the foot points.

use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::Vector3;

use crate::config::GaitConfig;
use crate::error::{GaitError, GaitResult};
use crate::filters::complementary::ComplementaryFilter;
use crate::filters::{clamp_dt, AttitudeFilter};
use crate::types::{Sample, StepEvent};

/// A sample with its tilt and gravity-free world acceleration attached.
#[derive(Clone, Debug)]
pub struct PoseSample<'a> {
    pub sample: &'a Sample,
    /// Seconds since the previous sample, clamped.
    pub dt: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    /// m/s², gravity removed from Z.
    pub world_accel: Vector3<f64>,
    pub zero_velocity: bool,
}

#[derive(Clone, Debug)]
pub struct KinematicIntegrator {
    alpha: f64,
    gravity: f64,
    contact_threshold: f64,
    zupt_gyro_threshold: f64,
    zupt_accel_tolerance: f64,
    damping: f64,
    nominal_dt: f64,
    max_gap: f64,
    check_interval: usize,
}

impl KinematicIntegrator {
    pub fn from_config(config: &GaitConfig) -> Self {
        Self {
            alpha: config.complementary_alpha,
            gravity: config.gravity,
            contact_threshold: config.contact_threshold,
            zupt_gyro_threshold: config.zupt_gyro_threshold_dps,
            zupt_accel_tolerance: config.zupt_accel_tolerance_g,
            damping: config.velocity_damping,
            nominal_dt: config.nominal_dt(),
            max_gap: config.max_gap_ms / 1000.0,
            check_interval: config.cancel_check_interval.max(1),
        }
    }

    /// Rotate a body-frame vector by pitch and roll (radians) with zero yaw.
    pub fn world_acceleration(accel: &Vector3<f64>, pitch: f64, roll: f64) -> Vector3<f64> {
        let (sp, cp) = pitch.sin_cos();
        let (sr, cr) = roll.sin_cos();
        Vector3::new(
            cp * accel.x + sr * sp * accel.y + cr * sp * accel.z,
            cp * accel.y,
            -sp * accel.x + sr * cp * accel.y + cr * cp * accel.z,
        )
    }

    /// Foot is loaded, barely rotating and feeling close to 1 g.
    pub fn is_zero_velocity(&self, sample: &Sample) -> bool {
        sample.pressure_sum() > self.contact_threshold
            && sample.gyro_magnitude() < self.zupt_gyro_threshold
            && (sample.accel_magnitude() - 1.0).abs() < self.zupt_accel_tolerance
    }

    pub fn pose_samples<'a>(&self, samples: &'a [Sample]) -> Vec<PoseSample<'a>> {
        let never = AtomicBool::new(false);
        // Cannot fail without a cancellation request
        self.pose_samples_cancellable(samples, &never).unwrap_or_default()
    }

    pub fn pose_samples_cancellable<'a>(
        &self,
        samples: &'a [Sample],
        cancel: &AtomicBool,
    ) -> GaitResult<Vec<PoseSample<'a>>> {
        let mut filter = ComplementaryFilter::new(self.alpha, self.nominal_dt, self.max_gap);
        let mut poses = Vec::with_capacity(samples.len());
        let mut prev_ms: Option<i64> = None;

        for (i, sample) in samples.iter().enumerate() {
            if i % self.check_interval == 0 && cancel.load(Ordering::Relaxed) {
                return Err(GaitError::Cancelled);
            }

            let dt = match prev_ms {
                Some(prev) => clamp_dt((sample.timestamp_ms - prev) as f64 / 1000.0, self.nominal_dt, self.max_gap),
                None => self.nominal_dt,
            };
            prev_ms = Some(sample.timestamp_ms);

            filter.update(&sample.gyro, &sample.accel, dt);
            let pitch_deg = filter.pitch_deg();
            let roll_deg = filter.roll_deg();

            let mut world = Self::world_acceleration(&sample.accel, pitch_deg.to_radians(), roll_deg.to_radians());
            world.z -= 1.0;

            poses.push(PoseSample {
                sample,
                dt,
                pitch_deg,
                roll_deg,
                world_accel: world * self.gravity,
                zero_velocity: self.is_zero_velocity(sample),
            });
        }
        Ok(poses)
    }

    /// Forward displacement over one contact window `[start_ms, end_ms)`, in
    /// metres. The sample at `end_ms` is already unloaded and belongs to swing.
    ///
    /// Backward net displacement is reported as zero; the integrator has no
    /// heading reference to tell a backward step from drift.
    pub fn step_length(&self, poses: &[PoseSample<'_>], step: &StepEvent) -> f64 {
        let lo = poses.partition_point(|p| p.sample.timestamp_ms < step.start_ms);
        let hi = poses.partition_point(|p| p.sample.timestamp_ms < step.end_ms);
        let window = match poses.get(lo..hi) {
            Some(w) => w,
            None => return 0.0,
        };

        let mut velocity = 0.0;
        let mut displacement = 0.0;
        for pose in window {
            velocity += pose.world_accel.x * pose.dt;
            if pose.zero_velocity {
                velocity = 0.0;
            }
            velocity *= self.damping;
            displacement += velocity * pose.dt;
        }
        displacement.max(0.0)
    }

    pub fn step_lengths(&self, poses: &[PoseSample<'_>], steps: &[StepEvent]) -> Vec<f64> {
        steps.iter().map(|s| self.step_length(poses, s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{loaded, still};
    use crate::types::Limb;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn integrator() -> KinematicIntegrator {
        KinematicIntegrator::from_config(&GaitConfig::default())
    }

    fn step(start_ms: i64, end_ms: i64) -> StepEvent {
        StepEvent {
            limb: Limb::Left,
            start_ms,
            end_ms,
            peak_ms: start_ms,
            peak_pressure: 100.0,
            contact_duration_ms: end_ms - start_ms,
        }
    }

    #[test]
    fn level_rotation_is_identity() {
        let a = Vector3::new(0.1, -0.2, 1.0);
        let w = KinematicIntegrator::world_acceleration(&a, 0.0, 0.0);
        assert_abs_diff_eq!(w, a, epsilon = 1e-12);
    }

    #[test]
    fn quarter_pitch_swaps_x_and_z() {
        let w = KinematicIntegrator::world_acceleration(&Vector3::new(1.0, 0.0, 2.0), FRAC_PI_2, 0.0);
        assert_abs_diff_eq!(w.x, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w.y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w.z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn level_still_sample_has_no_dynamic_acceleration() {
        let samples: Vec<Sample> = (0..10).map(|i| still(i * 10, Limb::Left)).collect();
        let poses = integrator().pose_samples(&samples);
        assert_eq!(poses.len(), 10);
        for p in &poses {
            assert_abs_diff_eq!(p.world_accel.norm(), 0.0, epsilon = 1e-9);
            assert!(!p.zero_velocity);
        }
    }

    #[test]
    fn zero_velocity_requires_load_stillness_and_one_g() {
        let k = integrator();
        assert!(k.is_zero_velocity(&loaded(0, Limb::Left, 200.0)));
        assert!(!k.is_zero_velocity(&loaded(0, Limb::Left, 50.0)));

        let mut spinning = loaded(0, Limb::Left, 200.0);
        spinning.gyro = Vector3::new(0.0, 0.0, 60.0);
        assert!(!k.is_zero_velocity(&spinning));

        let mut jolted = loaded(0, Limb::Left, 200.0);
        jolted.accel = Vector3::new(0.0, 0.0, 1.3);
        assert!(!k.is_zero_velocity(&jolted));
    }

    #[test]
    fn stance_held_still_has_zero_length() {
        let samples: Vec<Sample> = (0..30).map(|i| loaded(i * 10, Limb::Left, 300.0)).collect();
        let k = integrator();
        let poses = k.pose_samples(&samples);
        assert_eq!(k.step_length(&poses, &step(0, 290)), 0.0);
    }

    #[test]
    fn forward_push_without_zupt_moves_forward() {
        let samples: Vec<Sample> = (0..30)
            .map(|i| {
                let mut s = loaded(i * 10, Limb::Left, 300.0);
                s.accel = Vector3::new(0.1, 0.0, 1.0);
                s.gyro = Vector3::new(0.0, 0.0, 60.0);
                s
            })
            .collect();
        let k = integrator();
        let poses = k.pose_samples(&samples);
        assert!(poses.iter().all(|p| !p.zero_velocity));
        assert!(k.step_length(&poses, &step(0, 290)) > 0.0);
    }

    #[test]
    fn backward_displacement_is_clamped_to_zero() {
        let samples: Vec<Sample> = (0..30)
            .map(|i| {
                let mut s = loaded(i * 10, Limb::Left, 300.0);
                s.accel = Vector3::new(-0.1, 0.0, 1.0);
                s.gyro = Vector3::new(0.0, 0.0, 60.0);
                s
            })
            .collect();
        let k = integrator();
        let poses = k.pose_samples(&samples);
        assert_eq!(k.step_length(&poses, &step(0, 290)), 0.0);
    }

    #[test]
    fn lift_off_spike_does_not_move_a_still_stance() {
        let mut samples: Vec<Sample> = (0..30).map(|i| loaded(i * 10, Limb::Left, 300.0)).collect();
        let mut lift_off = still(300, Limb::Left);
        lift_off.accel = Vector3::new(3.0, 0.0, 1.0);
        samples.push(lift_off);

        let k = integrator();
        let poses = k.pose_samples(&samples);
        assert!(!poses[30].zero_velocity);
        assert_eq!(k.step_length(&poses, &step(0, 300)), 0.0);
    }

    #[test]
    fn cancellation_stops_pose_computation() {
        let samples: Vec<Sample> = (0..10).map(|i| still(i * 10, Limb::Left)).collect();
        let cancel = AtomicBool::new(true);
        let result = integrator().pose_samples_cancellable(&samples, &cancel);
        assert!(matches!(result, Err(GaitError::Cancelled)));
    }
}
