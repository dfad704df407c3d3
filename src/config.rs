use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GaitError, GaitResult};
use crate::filters::clamp_dt;
use crate::types::FSR_COUNT;

// ─── Sensor layout ───────────────────────────────────────────────────────────

/// Which FSR channels count as the medial and lateral side of the insole.
///
/// Channels in neither set still contribute to the forefoot total.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorLayout {
    pub medial: Vec<usize>,
    pub lateral: Vec<usize>,
}

impl Default for SensorLayout {
    fn default() -> Self {
        Self { medial: vec![0, 2], lateral: vec![1, 3] }
    }
}

impl SensorLayout {
    fn validate(&self) -> GaitResult<()> {
        if self.medial.is_empty() || self.lateral.is_empty() {
            return Err(GaitError::InvalidConfig("medial and lateral groups must be non-empty".into()));
        }
        for &i in self.medial.iter().chain(self.lateral.iter()) {
            if i >= FSR_COUNT {
                return Err(GaitError::InvalidConfig(format!("sensor index {} out of range", i)));
            }
        }
        if self.medial.iter().any(|i| self.lateral.contains(i)) {
            return Err(GaitError::InvalidConfig("medial and lateral groups overlap".into()));
        }
        Ok(())
    }
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaitConfig {
    // ── Contact detection ──
    pub contact_threshold: f64,
    pub min_contact_ms: i64,

    // ── Attitude estimation ──
    pub madgwick_beta: f64,
    pub sample_interval_ms: f64,
    pub max_gap_ms: f64,
    pub complementary_alpha: f64,

    // ── Zero-velocity integration ──
    pub zupt_gyro_threshold_dps: f64,
    pub zupt_accel_tolerance_g: f64,
    pub velocity_damping: f64,
    pub gravity: f64,

    // ── Load distribution ──
    pub layout: SensorLayout,
    pub dominant_region_pct: f64,

    // ── Insights ──
    pub heel_strike_pct: f64,
    pub forefoot_strike_pct: f64,
    pub pronation_pct: f64,
    pub supination_pct: f64,

    // ── Asymmetry severity bands (|SI| in %) ──
    pub si_high: f64,
    pub si_moderate: f64,

    // ── Live pipeline ──
    pub input_queue_capacity: usize,
    pub output_queue_capacity: usize,

    // ── Batch analytics ──
    pub cancel_check_interval: usize,
}

impl Default for GaitConfig {
    fn default() -> Self {
        Self {
            contact_threshold: 50.0,
            min_contact_ms: 100,
            madgwick_beta: 0.1,
            sample_interval_ms: 10.0,
            max_gap_ms: 500.0,
            complementary_alpha: 0.98,
            zupt_gyro_threshold_dps: 50.0,
            zupt_accel_tolerance_g: 0.2,
            velocity_damping: 0.95,
            gravity: 9.81,
            layout: SensorLayout::default(),
            dominant_region_pct: 60.0,
            heel_strike_pct: 65.0,
            forefoot_strike_pct: 65.0,
            pronation_pct: 60.0,
            supination_pct: 60.0,
            si_high: 15.0,
            si_moderate: 8.0,
            input_queue_capacity: 512,
            output_queue_capacity: 256,
            cancel_check_interval: 256,
        }
    }
}

impl GaitConfig {
    /// Load a JSON config file. Missing fields take their default values.
    pub fn from_json_file(path: &Path) -> GaitResult<Self> {
        let text = fs::read_to_string(path)?;
        let config: GaitConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!("Loaded gait config from {}", path.display());
        Ok(config)
    }

    /// Nominal sample interval in seconds.
    pub fn nominal_dt(&self) -> f64 {
        self.sample_interval_ms / 1000.0
    }

    /// Interval between two timestamps in seconds, falling back to the nominal
    /// interval when the clock went backwards or the gap is too long to trust.
    pub fn clamped_dt(&self, prev_ms: i64, now_ms: i64) -> f64 {
        let gap_ms = (now_ms - prev_ms) as f64;
        if gap_ms <= 0.0 || gap_ms > self.max_gap_ms {
            log::debug!("Clock anomaly: {} ms gap, using nominal interval", gap_ms);
        }
        clamp_dt(gap_ms / 1000.0, self.nominal_dt(), self.max_gap_ms / 1000.0)
    }

    pub fn validate(&self) -> GaitResult<()> {
        fn check(ok: bool, what: &str) -> GaitResult<()> {
            if ok {
                Ok(())
            } else {
                Err(GaitError::InvalidConfig(what.to_string()))
            }
        }

        check(self.contact_threshold.is_finite() && self.contact_threshold >= 0.0, "contact_threshold must be >= 0")?;
        check(self.min_contact_ms >= 0, "min_contact_ms must be >= 0")?;
        check(self.madgwick_beta.is_finite() && self.madgwick_beta >= 0.0, "madgwick_beta must be >= 0")?;
        check(self.sample_interval_ms > 0.0, "sample_interval_ms must be > 0")?;
        check(self.max_gap_ms > 0.0, "max_gap_ms must be > 0")?;
        check((0.0..=1.0).contains(&self.complementary_alpha), "complementary_alpha must be in [0, 1]")?;
        check((0.0..=1.0).contains(&self.velocity_damping), "velocity_damping must be in [0, 1]")?;
        check(self.gravity > 0.0, "gravity must be > 0")?;
        check(self.si_moderate <= self.si_high, "si_moderate must not exceed si_high")?;
        check(self.input_queue_capacity > 0 && self.output_queue_capacity > 0, "queue capacities must be > 0")?;
        check(self.cancel_check_interval > 0, "cancel_check_interval must be > 0")?;
        self.layout.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(GaitConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: GaitConfig = serde_json::from_str(r#"{ "contact_threshold": 80.0 }"#).unwrap();
        assert_eq!(config.contact_threshold, 80.0);
        assert_eq!(config.min_contact_ms, 100);
        assert_eq!(config.layout, SensorLayout::default());
    }

    #[test]
    fn overlapping_layout_is_rejected() {
        let config = GaitConfig {
            layout: SensorLayout { medial: vec![0, 1], lateral: vec![1, 3] },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(GaitError::InvalidConfig(_))));
    }

    #[test]
    fn out_of_range_sensor_is_rejected() {
        let config = GaitConfig {
            layout: SensorLayout { medial: vec![0], lateral: vec![5] },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn clamped_dt_falls_back_to_nominal() {
        let config = GaitConfig::default();
        assert!((config.clamped_dt(0, 20) - 0.02).abs() < 1e-12);
        assert!((config.clamped_dt(0, 500) - 0.5).abs() < 1e-12);
        assert!((config.clamped_dt(0, 501) - 0.01).abs() < 1e-12);
        assert!((config.clamped_dt(100, 50) - 0.01).abs() < 1e-12);
        assert!((config.clamped_dt(100, 100) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn from_json_file_reads_and_validates() {
        let path = std::env::temp_dir().join(format!("gait_config_{}.json", std::process::id()));
        fs::write(&path, r#"{ "complementary_alpha": 0.9 }"#).unwrap();
        let config = GaitConfig::from_json_file(&path).unwrap();
        assert_eq!(config.complementary_alpha, 0.9);

        fs::write(&path, r#"{ "complementary_alpha": 1.5 }"#).unwrap();
        assert!(GaitConfig::from_json_file(&path).is_err());
        let _ = fs::remove_file(&path);
    }
}
