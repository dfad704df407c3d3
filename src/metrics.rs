// metrics.rs - Batch gait analytics
//
// Everything here is synchronous and free of shared state: a recorded sample
// array goes in, an AnalyticsMetrics comes out. Two limbs can be analyzed in
// parallel and a long run can be abandoned through a cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use serde::{Deserialize, Serialize};

use crate::config::GaitConfig;
use crate::contact::ContactPhaseDetector;
use crate::error::{GaitError, GaitResult};
use crate::filters::complementary::ComplementaryFilter;
use crate::kinematics::KinematicIntegrator;
use crate::stats::{coefficient_of_variation, mean, min_max, std_dev, symmetry_index, Severity};
use crate::types::{Limb, Sample, StepEvent};

// ─── Output records ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicMetrics {
    pub step_count: usize,
    /// Steps per minute.
    pub cadence: f64,
    pub avg_contact_time_ms: f64,
    pub stance_percent: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadRegion {
    Heel,
    Forefoot,
    #[default]
    Balanced,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadMetrics {
    pub heel_pct: f64,
    pub forefoot_pct: f64,
    pub medial_pct: f64,
    pub lateral_pct: f64,
    pub dominant_region: LoadRegion,
}

/// Degrees.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AngleStats {
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub std_dev: f64,
}

impl AngleStats {
    fn from_values(values: &[f64]) -> Self {
        match min_max(values) {
            Some((min, max)) => Self { min, max, range: max - min, std_dev: std_dev(values) },
            None => Self::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationMetrics {
    pub pitch: AngleStats,
    pub roll: AngleStats,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuMetrics {
    /// Mean per-step peak acceleration magnitude during contact, in g.
    pub avg_peak_shock: f64,
    /// Mean per-swing peak angular rate magnitude, in deg/s.
    pub avg_swing_speed: f64,
    pub peak_shock_cv: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariabilityMetrics {
    pub contact_time_cv: f64,
    pub peak_force_cv: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightSeverity {
    Info,
    Warn,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub label: String,
    pub severity: InsightSeverity,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsMetrics {
    pub basic: BasicMetrics,
    pub load: LoadMetrics,
    pub steps: Vec<StepEvent>,
    pub orientation: OrientationMetrics,
    pub imu: ImuMetrics,
    pub variability: VariabilityMetrics,
    pub insights: Vec<Insight>,
    /// Metres, one per step.
    pub step_lengths: Vec<f64>,
    pub avg_step_length: f64,
    /// Metres per second.
    pub gait_speed: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AsymmetryMetrics {
    /// Right minus left.
    pub step_count_diff: i64,
    pub contact_time_si: f64,
    pub load_si: f64,
    /// Banded on the contact-time SI.
    pub severity: Severity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub left: AnalyticsMetrics,
    pub right: AnalyticsMetrics,
    pub asymmetry: AsymmetryMetrics,
}

// ─── Aggregator ──────────────────────────────────────────────────────────────

/// Samples whose timestamp lies in `[start_ms, end_ms)`. Input must be time-ordered.
fn window(samples: &[Sample], start_ms: i64, end_ms: i64) -> &[Sample] {
    let lo = samples.partition_point(|s| s.timestamp_ms < start_ms);
    let hi = samples.partition_point(|s| s.timestamp_ms < end_ms);
    samples.get(lo..hi).unwrap_or(&[])
}

#[derive(Clone, Debug)]
pub struct MetricsAggregator {
    config: GaitConfig,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(GaitConfig::default())
    }
}

impl MetricsAggregator {
    pub fn new(config: GaitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GaitConfig {
        &self.config
    }

    pub fn basic_metrics(&self, steps: &[StepEvent]) -> BasicMetrics {
        let n = steps.len();
        if n < 2 {
            return BasicMetrics { step_count: n, ..Default::default() };
        }

        let span_ms = (steps[n - 1].peak_ms - steps[0].peak_ms) as f64;
        let durations: Vec<f64> = steps.iter().map(|s| s.contact_duration_ms as f64).collect();
        let avg_contact = mean(&durations);

        let cadence = if span_ms > 0.0 { n as f64 / (span_ms / 60_000.0) } else { 0.0 };
        let mean_interval = span_ms / (n - 1) as f64;
        let stance_percent = if mean_interval > 0.0 { avg_contact / mean_interval * 100.0 } else { 0.0 };

        BasicMetrics {
            step_count: n,
            cadence,
            avg_contact_time_ms: avg_contact,
            stance_percent,
        }
    }

    pub fn load_metrics(&self, samples: &[Sample]) -> LoadMetrics {
        let layout = &self.config.layout;
        let (mut heel, mut forefoot, mut medial, mut lateral) = (0.0, 0.0, 0.0, 0.0);

        for s in samples.iter().filter(|s| s.pressure_sum() > self.config.contact_threshold) {
            heel += s.heel;
            forefoot += s.forefoot_sum();
            medial += layout.medial.iter().map(|&i| s.fsr[i]).sum::<f64>();
            lateral += layout.lateral.iter().map(|&i| s.fsr[i]).sum::<f64>();
        }

        let total = (heel + forefoot).max(1.0);
        let side_total = (medial + lateral).max(1.0);
        let heel_pct = heel / total * 100.0;
        let forefoot_pct = forefoot / total * 100.0;

        let dominant_region = if heel_pct > self.config.dominant_region_pct {
            LoadRegion::Heel
        } else if forefoot_pct > self.config.dominant_region_pct {
            LoadRegion::Forefoot
        } else {
            LoadRegion::Balanced
        };

        LoadMetrics {
            heel_pct,
            forefoot_pct,
            medial_pct: medial / side_total * 100.0,
            lateral_pct: lateral / side_total * 100.0,
            dominant_region,
        }
    }

    /// Tilt from the accelerometer alone, independent of any filter state.
    pub fn orientation_metrics(&self, samples: &[Sample]) -> OrientationMetrics {
        let (pitch, roll): (Vec<f64>, Vec<f64>) =
            samples.iter().map(|s| ComplementaryFilter::accel_tilt(&s.accel)).unzip();
        OrientationMetrics {
            pitch: AngleStats::from_values(&pitch),
            roll: AngleStats::from_values(&roll),
        }
    }

    /// Contact runs from `start_ms` up to, not including, the lift-off sample at
    /// `end_ms`; the swing gap runs from lift-off to the next strike.
    pub fn imu_metrics(&self, samples: &[Sample], steps: &[StepEvent]) -> ImuMetrics {
        let shocks: Vec<f64> = steps
            .iter()
            .filter_map(|step| {
                window(samples, step.start_ms, step.end_ms)
                    .iter()
                    .map(Sample::accel_magnitude)
                    .reduce(f64::max)
            })
            .collect();

        let swings: Vec<f64> = steps
            .windows(2)
            .filter_map(|pair| {
                window(samples, pair[0].end_ms, pair[1].start_ms)
                    .iter()
                    .map(Sample::gyro_magnitude)
                    .reduce(f64::max)
            })
            .collect();

        ImuMetrics {
            avg_peak_shock: mean(&shocks),
            avg_swing_speed: mean(&swings),
            peak_shock_cv: coefficient_of_variation(&shocks),
        }
    }

    pub fn variability(&self, steps: &[StepEvent]) -> VariabilityMetrics {
        let durations: Vec<f64> = steps.iter().map(|s| s.contact_duration_ms as f64).collect();
        let peaks: Vec<f64> = steps.iter().map(|s| s.peak_pressure).collect();
        VariabilityMetrics {
            contact_time_cv: coefficient_of_variation(&durations),
            peak_force_cv: coefficient_of_variation(&peaks),
        }
    }

    pub fn insights(&self, load: &LoadMetrics) -> Vec<Insight> {
        let mut insights = Vec::new();
        let info = |label: &str| Insight { label: label.to_string(), severity: InsightSeverity::Info };
        let warn = |label: &str| Insight { label: label.to_string(), severity: InsightSeverity::Warn };

        if load.heel_pct > self.config.heel_strike_pct {
            insights.push(info("primary heel striker"));
        } else if load.forefoot_pct > self.config.forefoot_strike_pct {
            insights.push(info("primary forefoot striker"));
        }
        if load.medial_pct > self.config.pronation_pct {
            insights.push(warn("pronation tendency"));
        }
        if load.lateral_pct > self.config.supination_pct {
            insights.push(warn("supination tendency"));
        }
        insights
    }

    /// Metres per second from mean step length and steps per minute.
    pub fn gait_speed(avg_step_length: f64, cadence: f64) -> f64 {
        if cadence == 0.0 {
            return 0.0;
        }
        avg_step_length * cadence / 60.0
    }

    pub fn analyze(&self, samples: &[Sample]) -> AnalyticsMetrics {
        let never = AtomicBool::new(false);
        self.analyze_cancellable(samples, &never).unwrap_or_default()
    }

    /// Full batch pass over one limb's time-ordered samples.
    pub fn analyze_cancellable(&self, samples: &[Sample], cancel: &AtomicBool) -> GaitResult<AnalyticsMetrics> {
        let checkpoint = || {
            if cancel.load(Ordering::Relaxed) {
                Err(GaitError::Cancelled)
            } else {
                Ok(())
            }
        };

        checkpoint()?;
        let steps = ContactPhaseDetector::detect_steps(samples, self.config.contact_threshold, self.config.min_contact_ms);
        let basic = self.basic_metrics(&steps);
        let load = self.load_metrics(samples);

        checkpoint()?;
        let orientation = self.orientation_metrics(samples);
        let imu = self.imu_metrics(samples, &steps);

        checkpoint()?;
        let integrator = KinematicIntegrator::from_config(&self.config);
        let poses = integrator.pose_samples_cancellable(samples, cancel)?;
        let step_lengths = integrator.step_lengths(&poses, &steps);
        let avg_step_length = mean(&step_lengths);

        checkpoint()?;
        let variability = self.variability(&steps);
        let insights = self.insights(&load);
        let gait_speed = Self::gait_speed(avg_step_length, basic.cadence);

        log::debug!(
            "Analyzed {} samples: {} steps, cadence {:.1} spm, speed {:.2} m/s",
            samples.len(),
            steps.len(),
            basic.cadence,
            gait_speed
        );

        Ok(AnalyticsMetrics {
            basic,
            load,
            steps,
            orientation,
            imu,
            variability,
            insights,
            step_lengths,
            avg_step_length,
            gait_speed,
        })
    }

    pub fn compare(&self, left: &AnalyticsMetrics, right: &AnalyticsMetrics) -> AsymmetryMetrics {
        let contact_time_si = symmetry_index(left.basic.avg_contact_time_ms, right.basic.avg_contact_time_ms);
        AsymmetryMetrics {
            step_count_diff: right.basic.step_count as i64 - left.basic.step_count as i64,
            contact_time_si,
            load_si: symmetry_index(left.load.heel_pct, right.load.heel_pct),
            severity: Severity::classify(contact_time_si, self.config.si_moderate, self.config.si_high),
        }
    }

    pub fn analyze_session(&self, samples: &[Sample]) -> SessionReport {
        let never = AtomicBool::new(false);
        match self.analyze_session_cancellable(samples, &never) {
            Ok(report) => report,
            Err(_) => SessionReport {
                left: AnalyticsMetrics::default(),
                right: AnalyticsMetrics::default(),
                asymmetry: self.compare(&AnalyticsMetrics::default(), &AnalyticsMetrics::default()),
            },
        }
    }

    /// Split a mixed recording by limb, analyze both limbs on separate threads,
    /// then combine.
    pub fn analyze_session_cancellable(&self, samples: &[Sample], cancel: &AtomicBool) -> GaitResult<SessionReport> {
        let left_samples: Vec<Sample> = samples.iter().filter(|s| s.limb == Limb::Left).cloned().collect();
        let right_samples: Vec<Sample> = samples.iter().filter(|s| s.limb == Limb::Right).cloned().collect();

        let (left, right) = thread::scope(|scope| {
            let left = scope.spawn(|| self.analyze_cancellable(&left_samples, cancel));
            let right = self.analyze_cancellable(&right_samples, cancel);
            (left.join(), right)
        });
        let left = left.unwrap_or_else(|panic| std::panic::resume_unwind(panic))?;
        let right = right?;

        let asymmetry = self.compare(&left, &right);
        log::info!(
            "Session: {} left / {} right steps, contact SI {:.1}% ({:?})",
            left.basic.step_count,
            right.basic.step_count,
            asymmetry.contact_time_si,
            asymmetry.severity
        );
        Ok(SessionReport { left, right, asymmetry })
    }
}
