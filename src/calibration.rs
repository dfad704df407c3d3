//! Resolving how a sensor is mounted on the foot.
//!
//! Two protocols produce an [`AxisMapping`]: holding the foot in two static
//! poses, or performing three rotation gestures. Both are wrapped in small
//! sequencers that start over from the first step whenever something fails,
//! so a half-finished calibration never leaks out as a mapping.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::axis::{AxisAssignment, AxisMapping, AxisSign};
use crate::error::CalibrationError;
use crate::types::Quaternion;

pub const MIN_GESTURE_SAMPLES: usize = 10;

/// Readings smaller than this carry no usable direction.
const MIN_AXIS_MAGNITUDE: f64 = 1e-6;

// ─── Zero reference ──────────────────────────────────────────────────────────

/// Unit quaternion composed on the left of the live attitude.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Quaternion", into = "Quaternion")]
pub struct CalibrationOffset(Quaternion);

impl Default for CalibrationOffset {
    fn default() -> Self {
        Self(Quaternion::identity())
    }
}

impl TryFrom<Quaternion> for CalibrationOffset {
    type Error = CalibrationError;

    fn try_from(q: Quaternion) -> Result<Self, Self::Error> {
        CalibrationOffset::new(q)
    }
}

impl From<CalibrationOffset> for Quaternion {
    fn from(offset: CalibrationOffset) -> Quaternion {
        offset.0
    }
}

impl CalibrationOffset {
    pub fn new(q: Quaternion) -> Result<Self, CalibrationError> {
        if !q.is_unit(1e-6) {
            return Err(CalibrationError::NonUnitOffset(q.norm()));
        }
        Ok(Self(q))
    }

    /// Offset that makes `current` read as the identity.
    pub fn zero_at(current: &Quaternion) -> Self {
        Self(current.conjugate().normalize())
    }

    pub fn quaternion(&self) -> Quaternion {
        self.0
    }

    /// `offset ⊗ current`
    pub fn apply(&self, current: &Quaternion) -> Quaternion {
        self.0.multiply(current).normalize()
    }
}

// ─── Solvers ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gesture {
    Yaw,
    Pitch,
    Roll,
}

impl Gesture {
    pub const SEQUENCE: [Gesture; 3] = [Gesture::Yaw, Gesture::Pitch, Gesture::Roll];
}

fn argmax_abs(v: &Vector3<f64>, exclude: Option<usize>) -> usize {
    (0..3)
        .filter(|&i| Some(i) != exclude)
        .fold(None, |best: Option<usize>, i| match best {
            Some(b) if v[b].abs() >= v[i].abs() => Some(b),
            _ => Some(i),
        })
        .unwrap_or(0)
}

fn mean_vector(samples: &[Vector3<f64>]) -> Option<Vector3<f64>> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<Vector3<f64>>() / samples.len() as f64)
}

fn unit_axis(index: usize, sign: AxisSign) -> Vector3<f64> {
    let mut v = Vector3::zeros();
    v[index] = sign.factor();
    v
}

/// Two-pose solve from mean accelerometer readings.
///
/// Lying flat, gravity shows up on the raw axis that becomes body Z. Pointing
/// the toe at the ground, the strongest remaining axis becomes body X, with
/// its sign flipped since forward now points down. Y completes a right-handed
/// frame.
pub fn solve_two_pose(flat: &Vector3<f64>, nose_down: &Vector3<f64>) -> Result<AxisMapping, CalibrationError> {
    if !flat.iter().chain(nose_down.iter()).all(|v| v.is_finite()) {
        return Err(CalibrationError::DegeneratePose("non-finite accelerometer reading".into()));
    }

    let z = argmax_abs(flat, None);
    if flat[z].abs() <= MIN_AXIS_MAGNITUDE {
        return Err(CalibrationError::DegeneratePose("flat pose shows no gravity".into()));
    }
    let z_sign = AxisSign::of(flat[z]);

    let x = argmax_abs(nose_down, Some(z));
    if nose_down[x].abs() <= MIN_AXIS_MAGNITUDE {
        return Err(CalibrationError::DegeneratePose("nose-down pose shows no tilt".into()));
    }
    let x_sign = AxisSign::of(nose_down[x]).flipped();

    let y = 3 - x - z;
    let cross = unit_axis(z, z_sign).cross(&unit_axis(x, x_sign));
    if cross[y] == 0.0 {
        return Err(CalibrationError::DegeneratePose("Z and X do not span a frame".into()));
    }

    AxisMapping::new(
        AxisAssignment::new(x, x_sign),
        AxisAssignment::new(y, AxisSign::of(cross[y])),
        AxisAssignment::new(z, z_sign),
    )
}

fn gesture_axis(gesture: Gesture, samples: &[Vector3<f64>]) -> Result<AxisAssignment, CalibrationError> {
    if samples.len() < MIN_GESTURE_SAMPLES {
        return Err(CalibrationError::InsufficientSamples {
            gesture,
            count: samples.len(),
            required: MIN_GESTURE_SAMPLES,
        });
    }
    let sum: Vector3<f64> = samples.iter().sum();
    let index = argmax_abs(&sum, None);
    if !(sum[index].abs() > MIN_AXIS_MAGNITUDE) {
        return Err(CalibrationError::DegeneratePose(format!("{:?} gesture shows no rotation", gesture)));
    }
    Ok(AxisAssignment::new(index, AxisSign::of(sum[index])))
}

/// Gesture solve from raw gyro windows. Each gesture is a rotation in the
/// positive sense about one body axis: yaw about Z, pitch about Y, roll about X.
pub fn solve_gestures(
    yaw: &[Vector3<f64>],
    pitch: &[Vector3<f64>],
    roll: &[Vector3<f64>],
) -> Result<AxisMapping, CalibrationError> {
    let z = gesture_axis(Gesture::Yaw, yaw)?;
    let y = gesture_axis(Gesture::Pitch, pitch)?;
    let x = gesture_axis(Gesture::Roll, roll)?;
    AxisMapping::new(x, y, z)
}

// ─── Sequencers ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TwoPoseStep {
    AwaitingFlat,
    AwaitingNoseDown,
}

#[derive(Clone, Debug, Default)]
pub struct TwoPoseCalibration {
    flat: Option<Vector3<f64>>,
}

impl TwoPoseCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> TwoPoseStep {
        match self.flat {
            None => TwoPoseStep::AwaitingFlat,
            Some(_) => TwoPoseStep::AwaitingNoseDown,
        }
    }

    pub fn reset(&mut self) {
        self.flat = None;
    }

    pub fn capture_flat(&mut self, accel: &[Vector3<f64>]) -> Result<(), CalibrationError> {
        self.reset();
        let mean = mean_vector(accel).ok_or_else(|| CalibrationError::DegeneratePose("no flat samples".into()))?;
        self.flat = Some(mean);
        Ok(())
    }

    /// Completes the sequence. Success or failure, the sequencer is back at
    /// its first step afterwards.
    pub fn capture_nose_down(&mut self, accel: &[Vector3<f64>]) -> Result<AxisMapping, CalibrationError> {
        let flat = self.flat.take().ok_or(CalibrationError::OutOfSequence("nose-down"))?;
        let nose_down =
            mean_vector(accel).ok_or_else(|| CalibrationError::DegeneratePose("no nose-down samples".into()))?;
        let result = solve_two_pose(&flat, &nose_down);
        if let Err(e) = &result {
            log::warn!("Two-pose calibration failed, restarting: {}", e);
        }
        result
    }
}

#[derive(Clone, Debug, Default)]
pub struct GestureCalibration {
    completed: Vec<Vec<Vector3<f64>>>,
    current: Vec<Vector3<f64>>,
}

impl GestureCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gesture currently being recorded.
    pub fn current_gesture(&self) -> Gesture {
        Gesture::SEQUENCE[self.completed.len().min(2)]
    }

    pub fn reset(&mut self) {
        self.completed.clear();
        self.current.clear();
    }

    pub fn record(&mut self, gyro: &Vector3<f64>) {
        self.current.push(*gyro);
    }

    /// Close the current gesture window. Returns the mapping once all three
    /// gestures are in; any failure restarts from the yaw gesture.
    pub fn finish_gesture(&mut self) -> Result<Option<AxisMapping>, CalibrationError> {
        let gesture = self.current_gesture();
        let window = std::mem::take(&mut self.current);
        if window.len() < MIN_GESTURE_SAMPLES {
            self.reset();
            let err = CalibrationError::InsufficientSamples {
                gesture,
                count: window.len(),
                required: MIN_GESTURE_SAMPLES,
            };
            log::warn!("Gesture calibration failed, restarting: {}", err);
            return Err(err);
        }
        self.completed.push(window);
        if self.completed.len() < Gesture::SEQUENCE.len() {
            return Ok(None);
        }

        let windows = std::mem::take(&mut self.completed);
        let result = solve_gestures(&windows[0], &windows[1], &windows[2]);
        if let Err(e) = &result {
            log::warn!("Gesture calibration failed, restarting: {}", e);
        }
        result.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EulerAngles;

    fn repeat(v: Vector3<f64>, n: usize) -> Vec<Vector3<f64>> {
        vec![v; n]
    }

    fn is_permutation(m: &AxisMapping) -> bool {
        let mut s = [m.x().source, m.y().source, m.z().source];
        s.sort_unstable();
        s == [0, 1, 2]
    }

    #[test]
    fn standard_mounting_gives_identity() {
        let mapping = solve_two_pose(&Vector3::new(0.02, -0.01, 0.99), &Vector3::new(-0.97, 0.03, 0.2)).unwrap();
        assert!(mapping.is_identity());
    }

    #[test]
    fn rotated_mounting_is_recovered() {
        // Sensor raw Y points backwards, raw X points right
        let mapping = solve_two_pose(&Vector3::new(0.0, 0.0, 1.0), &Vector3::new(0.0, 1.0, 0.1)).unwrap();
        assert_eq!(mapping.x(), AxisAssignment::new(1, AxisSign::Negative));
        assert_eq!(mapping.y(), AxisAssignment::new(0, AxisSign::Positive));
        assert_eq!(mapping.z(), AxisAssignment::new(2, AxisSign::Positive));
        assert_eq!(mapping.apply(&Vector3::new(1.0, 2.0, 3.0)), Vector3::new(-2.0, 1.0, 3.0));
    }

    #[test]
    fn upside_down_mounting_keeps_right_handed_frame() {
        let mapping = solve_two_pose(&Vector3::new(0.0, 0.0, -1.0), &Vector3::new(-1.0, 0.0, 0.0)).unwrap();
        assert_eq!(mapping.z().sign, AxisSign::Negative);
        assert_eq!(mapping.x().sign, AxisSign::Positive);
        assert_eq!(mapping.y().sign, AxisSign::Negative);
        assert!(is_permutation(&mapping));
    }

    #[test]
    fn zero_readings_are_degenerate() {
        let err = solve_two_pose(&Vector3::zeros(), &Vector3::new(1.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, CalibrationError::DegeneratePose(_)));

        let err = solve_two_pose(&Vector3::new(0.0, 0.0, 1.0), &Vector3::new(0.0, 0.0, 1.0)).unwrap_err();
        assert!(matches!(err, CalibrationError::DegeneratePose(_)));
    }

    #[test]
    fn gestures_resolve_signed_axes() {
        let mapping = solve_gestures(
            &repeat(Vector3::new(0.0, -2.0, 90.0), 20),
            &repeat(Vector3::new(-80.0, 1.0, 0.0), 20),
            &repeat(Vector3::new(0.0, 70.0, -3.0), 20),
        )
        .unwrap();
        assert_eq!(mapping.z(), AxisAssignment::new(2, AxisSign::Positive));
        assert_eq!(mapping.y(), AxisAssignment::new(0, AxisSign::Negative));
        assert_eq!(mapping.x(), AxisAssignment::new(1, AxisSign::Positive));
    }

    #[test]
    fn short_gesture_is_rejected() {
        let err = solve_gestures(
            &repeat(Vector3::new(0.0, 0.0, 90.0), 20),
            &repeat(Vector3::new(0.0, 90.0, 0.0), 9),
            &repeat(Vector3::new(90.0, 0.0, 0.0), 20),
        )
        .unwrap_err();
        assert_eq!(
            err,
            CalibrationError::InsufficientSamples { gesture: Gesture::Pitch, count: 9, required: 10 }
        );
    }

    #[test]
    fn gestures_on_same_axis_are_rejected() {
        let err = solve_gestures(
            &repeat(Vector3::new(0.0, 0.0, 90.0), 20),
            &repeat(Vector3::new(0.0, 0.0, 50.0), 20),
            &repeat(Vector3::new(90.0, 0.0, 0.0), 20),
        )
        .unwrap_err();
        assert_eq!(err, CalibrationError::DuplicateAxis([0, 2, 2]));
    }

    #[test]
    fn two_pose_sequence_restarts_after_failure() {
        let mut cal = TwoPoseCalibration::new();
        assert_eq!(cal.step(), TwoPoseStep::AwaitingFlat);
        assert!(matches!(cal.capture_nose_down(&[Vector3::x()]), Err(CalibrationError::OutOfSequence(_))));

        cal.capture_flat(&[Vector3::new(0.0, 0.0, 1.0)]).unwrap();
        assert_eq!(cal.step(), TwoPoseStep::AwaitingNoseDown);
        assert!(cal.capture_nose_down(&[Vector3::new(0.0, 0.0, 1.0)]).is_err());
        assert_eq!(cal.step(), TwoPoseStep::AwaitingFlat);

        cal.capture_flat(&[Vector3::new(0.0, 0.0, 0.98), Vector3::new(0.0, 0.0, 1.02)]).unwrap();
        let mapping = cal.capture_nose_down(&[Vector3::new(-1.0, 0.0, 0.0)]).unwrap();
        assert!(mapping.is_identity());
        assert_eq!(cal.step(), TwoPoseStep::AwaitingFlat);
    }

    #[test]
    fn gesture_sequence_walks_yaw_pitch_roll() {
        let mut cal = GestureCalibration::new();
        let plan = [
            (Gesture::Yaw, Vector3::new(0.0, 0.0, 90.0)),
            (Gesture::Pitch, Vector3::new(0.0, 90.0, 0.0)),
            (Gesture::Roll, Vector3::new(90.0, 0.0, 0.0)),
        ];
        let mut result = None;
        for (gesture, rate) in plan {
            assert_eq!(cal.current_gesture(), gesture);
            for _ in 0..12 {
                cal.record(&rate);
            }
            result = cal.finish_gesture().unwrap();
        }
        assert!(result.map(|m| m.is_identity()).unwrap_or(false));
        assert_eq!(cal.current_gesture(), Gesture::Yaw);
    }

    #[test]
    fn gesture_sequence_restarts_on_short_window() {
        let mut cal = GestureCalibration::new();
        for _ in 0..12 {
            cal.record(&Vector3::new(0.0, 0.0, 90.0));
        }
        assert_eq!(cal.finish_gesture(), Ok(None));
        assert_eq!(cal.current_gesture(), Gesture::Pitch);

        cal.record(&Vector3::new(0.0, 90.0, 0.0));
        assert!(cal.finish_gesture().is_err());
        assert_eq!(cal.current_gesture(), Gesture::Yaw);
    }

    #[test]
    fn offset_zeroes_current_orientation() {
        let current = Quaternion::from(EulerAngles::new(0.4, -0.2, 0.9));
        let offset = CalibrationOffset::zero_at(&current);
        assert!(offset.apply(&current).approx_eq(&Quaternion::identity(), 1e-9));
        assert!(offset.quaternion().is_unit(1e-9));
    }

    #[test]
    fn non_unit_offset_is_rejected() {
        assert!(matches!(
            CalibrationOffset::new(Quaternion::new(2.0, 0.0, 0.0, 0.0)),
            Err(CalibrationError::NonUnitOffset(_))
        ));
        assert!(serde_json::from_str::<CalibrationOffset>(r#"{"w":0.5,"x":0.0,"y":0.0,"z":0.0}"#).is_err());
        let ok: CalibrationOffset = serde_json::from_str(r#"{"w":1.0,"x":0.0,"y":0.0,"z":0.0}"#).unwrap();
        assert_eq!(ok, CalibrationOffset::default());
    }
}
