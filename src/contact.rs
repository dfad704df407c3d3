//! Stance/swing segmentation from summed insole pressure.

use crate::config::GaitConfig;
use crate::types::{GaitPhase, Sample, StepEvent};

#[derive(Clone, Debug)]
pub struct ContactPhaseDetector {
    threshold: f64,
    min_contact_ms: i64,
    phase: GaitPhase,
    start_ms: i64,
    peak_ms: i64,
    peak_value: f64,
}

impl ContactPhaseDetector {
    pub fn new(threshold: f64, min_contact_ms: i64) -> Self {
        Self {
            threshold,
            min_contact_ms,
            phase: GaitPhase::Swing,
            start_ms: 0,
            peak_ms: 0,
            peak_value: 0.0,
        }
    }

    pub fn from_config(config: &GaitConfig) -> Self {
        Self::new(config.contact_threshold, config.min_contact_ms)
    }

    pub fn phase(&self) -> GaitPhase {
        self.phase
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.threshold, self.min_contact_ms);
    }

    /// Advance by one sample. Returns the step that closed on this sample, if any.
    ///
    /// Contact begins at `sum >= threshold` and ends at `sum < threshold`;
    /// contacts lasting `min_contact_ms` or less are discarded as noise.
    pub fn push(&mut self, sample: &Sample) -> Option<StepEvent> {
        let sum = sample.pressure_sum();
        match self.phase {
            GaitPhase::Swing => {
                if sum >= self.threshold {
                    self.phase = GaitPhase::Stance;
                    self.start_ms = sample.timestamp_ms;
                    self.peak_ms = sample.timestamp_ms;
                    self.peak_value = sum;
                }
                None
            }
            GaitPhase::Stance => {
                if sum < self.threshold {
                    self.phase = GaitPhase::Swing;
                    let duration = sample.timestamp_ms - self.start_ms;
                    if duration > self.min_contact_ms {
                        log::debug!("{} step closed: {} ms contact, peak {:.1}", sample.limb, duration, self.peak_value);
                        return Some(StepEvent {
                            limb: sample.limb,
                            start_ms: self.start_ms,
                            end_ms: sample.timestamp_ms,
                            peak_ms: self.peak_ms,
                            peak_pressure: self.peak_value,
                            contact_duration_ms: duration,
                        });
                    }
                    log::debug!("{} contact of {} ms discarded", sample.limb, duration);
                } else if sum > self.peak_value {
                    self.peak_value = sum;
                    self.peak_ms = sample.timestamp_ms;
                }
                None
            }
        }
    }

    /// Segment a whole recording. Pure: the same input always yields the same steps.
    pub fn detect_steps(samples: &[Sample], threshold: f64, min_contact_ms: i64) -> Vec<StepEvent> {
        let mut detector = Self::new(threshold, min_contact_ms);
        samples.iter().filter_map(|s| detector.push(s)).collect()
    }
}
