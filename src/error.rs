use thiserror::Error;

use crate::calibration::Gesture;
use crate::types::Limb;

/// Failures raised while resolving an axis mapping or a zero reference.
///
/// All of these are recoverable: the calibration sequence restarts from its
/// first step and the previously active mapping stays in force.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("{gesture:?} gesture recorded {count} samples, need at least {required}")]
    InsufficientSamples {
        gesture: Gesture,
        count: usize,
        required: usize,
    },

    #[error("Axis sources {0:?} are not a permutation of [0, 1, 2]")]
    DuplicateAxis([usize; 3]),

    #[error("Axis source index {0} is out of range")]
    AxisOutOfRange(usize),

    #[error("Axis sign must be 1 or -1, got {0}")]
    InvalidSign(i8),

    #[error("Degenerate pose: {0}")]
    DegeneratePose(String),

    #[error("Calibration offset is not a unit quaternion (norm {0:.6})")]
    NonUnitOffset(f64),

    #[error("Calibration step {0} is out of sequence")]
    OutOfSequence(&'static str),
}

#[derive(Error, Debug)]
pub enum GaitError {
    #[error("Calibration failed: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("{0} limb pipeline is closed")]
    PipelineClosed(Limb),

    #[error("Limb task failed: {0}")]
    TaskFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type GaitResult<T> = Result<T, GaitError>;
