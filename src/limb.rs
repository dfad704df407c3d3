// limb.rs - Live per-limb processing
//
// A LimbProcessor owns everything that evolves while one foot streams data:
// axis mapping, attitude filter, zero reference and contact state. Callers
// hold one per limb (or a GaitSession holding both); nothing here is global
// and nothing blocks.

use crate::axis::AxisMapping;
use crate::calibration::CalibrationOffset;
use crate::config::GaitConfig;
use crate::contact::ContactPhaseDetector;
use crate::filters::madgwick::MadgwickFilter;
use crate::filters::AttitudeFilter;
use crate::types::{Limb, ProcessedSample, Quaternion, Sample};

#[derive(Clone, Debug)]
pub struct LimbProcessor {
    limb: Limb,
    mapping: AxisMapping,
    attitude: MadgwickFilter,
    offset: Option<CalibrationOffset>,
    contact: ContactPhaseDetector,
    step_count: u64,
    processed: u64,
}

impl LimbProcessor {
    pub fn new(limb: Limb, config: &GaitConfig) -> Self {
        Self {
            limb,
            mapping: AxisMapping::identity(),
            attitude: MadgwickFilter::from_config(config),
            offset: None,
            contact: ContactPhaseDetector::from_config(config),
            step_count: 0,
            processed: 0,
        }
    }

    pub fn limb(&self) -> Limb {
        self.limb
    }

    pub fn mapping(&self) -> AxisMapping {
        self.mapping
    }

    pub fn offset(&self) -> Option<CalibrationOffset> {
        self.offset
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Install a new mounting. Attitude history and the zero reference were
    /// expressed in the old frame, so both are discarded.
    pub fn set_mapping(&mut self, mapping: AxisMapping) {
        log::info!("{}: axis mapping updated, attitude reset", self.limb);
        self.mapping = mapping;
        self.offset = None;
        self.attitude.reset();
        self.contact.reset();
    }

    /// Restore a previously stored zero reference.
    pub fn set_offset(&mut self, offset: CalibrationOffset) {
        self.offset = Some(offset);
    }

    /// Take the current attitude as the new zero.
    pub fn rezero(&mut self) -> CalibrationOffset {
        let offset = CalibrationOffset::zero_at(&self.attitude.orientation());
        log::info!("{}: re-zeroed at {:?}", self.limb, self.attitude.orientation());
        self.offset = Some(offset);
        offset
    }

    pub fn clear_offset(&mut self) {
        self.offset = None;
    }

    /// Clear attitude, contact state and the running step count. Mapping and
    /// zero reference are kept.
    pub fn reset(&mut self) {
        self.attitude.reset();
        self.contact.reset();
        self.step_count = 0;
        self.processed = 0;
    }

    /// Raw sample expressed in the body frame.
    pub fn normalize(&self, raw: &Sample) -> Sample {
        if self.mapping.is_identity() {
            return raw.clone();
        }
        raw.with_inertial(self.mapping.apply(&raw.accel), self.mapping.apply(&raw.gyro))
    }

    /// Attitude as reported to callers: zero reference applied.
    pub fn orientation(&self) -> Quaternion {
        let q = self.attitude.orientation();
        match &self.offset {
            Some(offset) => offset.apply(&q),
            None => q,
        }
    }

    pub fn process(&mut self, raw: &Sample) -> ProcessedSample {
        if raw.limb != self.limb {
            log::warn!("{} processor received a {} sample", self.limb, raw.limb);
        }
        let sample = self.normalize(raw);

        self.attitude.update_at(&sample.gyro, &sample.accel, sample.timestamp_ms);
        let step = self.contact.push(&sample);
        if step.is_some() {
            self.step_count += 1;
        }
        self.processed += 1;

        let quaternion = self.orientation();
        ProcessedSample {
            timestamp_ms: sample.timestamp_ms,
            limb: sample.limb,
            device_id: sample.device_id,
            quaternion,
            euler: quaternion.to_euler(),
            is_step: step.is_some(),
            step_count: self.step_count,
            gait_phase: self.contact.phase(),
        }
    }
}

/// Both limbs of one wearer.
#[derive(Clone, Debug)]
pub struct GaitSession {
    left: LimbProcessor,
    right: LimbProcessor,
}

impl GaitSession {
    pub fn new(config: &GaitConfig) -> Self {
        Self {
            left: LimbProcessor::new(Limb::Left, config),
            right: LimbProcessor::new(Limb::Right, config),
        }
    }

    pub fn limb(&self, limb: Limb) -> &LimbProcessor {
        match limb {
            Limb::Left => &self.left,
            Limb::Right => &self.right,
        }
    }

    pub fn limb_mut(&mut self, limb: Limb) -> &mut LimbProcessor {
        match limb {
            Limb::Left => &mut self.left,
            Limb::Right => &mut self.right,
        }
    }

    pub fn process(&mut self, sample: &Sample) -> ProcessedSample {
        self.limb_mut(sample.limb).process(sample)
    }

    pub fn into_parts(self) -> (LimbProcessor, LimbProcessor) {
        (self.left, self.right)
    }
}
