//! Signed-permutation remapping from sensor axes to the body frame
//! (X forward, Y right, Z up).

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum AxisSign {
    Positive,
    Negative,
}

impl AxisSign {
    /// Positive for `value > 0`, negative otherwise.
    pub fn of(value: f64) -> Self {
        if value > 0.0 {
            AxisSign::Positive
        } else {
            AxisSign::Negative
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            AxisSign::Positive => AxisSign::Negative,
            AxisSign::Negative => AxisSign::Positive,
        }
    }

    pub fn factor(self) -> f64 {
        match self {
            AxisSign::Positive => 1.0,
            AxisSign::Negative => -1.0,
        }
    }
}

impl From<AxisSign> for i8 {
    fn from(sign: AxisSign) -> i8 {
        match sign {
            AxisSign::Positive => 1,
            AxisSign::Negative => -1,
        }
    }
}

impl TryFrom<i8> for AxisSign {
    type Error = CalibrationError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AxisSign::Positive),
            -1 => Ok(AxisSign::Negative),
            other => Err(CalibrationError::InvalidSign(other)),
        }
    }
}

/// Where one body axis reads its value from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisAssignment {
    pub source: usize,
    pub sign: AxisSign,
}

impl AxisAssignment {
    pub fn new(source: usize, sign: AxisSign) -> Self {
        Self { source, sign }
    }
}

#[derive(Deserialize)]
struct RawAxisMapping {
    x: AxisAssignment,
    y: AxisAssignment,
    z: AxisAssignment,
}

/// Validated signed permutation. The three sources are always a permutation
/// of `[0, 1, 2]`, so [`AxisMapping::apply`] cannot index out of range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAxisMapping")]
pub struct AxisMapping {
    x: AxisAssignment,
    y: AxisAssignment,
    z: AxisAssignment,
}

impl Default for AxisMapping {
    fn default() -> Self {
        Self::identity()
    }
}

impl TryFrom<RawAxisMapping> for AxisMapping {
    type Error = CalibrationError;

    fn try_from(raw: RawAxisMapping) -> Result<Self, Self::Error> {
        AxisMapping::new(raw.x, raw.y, raw.z)
    }
}

impl AxisMapping {
    pub fn new(x: AxisAssignment, y: AxisAssignment, z: AxisAssignment) -> Result<Self, CalibrationError> {
        let sources = [x.source, y.source, z.source];
        if let Some(&bad) = sources.iter().find(|&&s| s > 2) {
            return Err(CalibrationError::AxisOutOfRange(bad));
        }
        let mut seen = [false; 3];
        for &s in &sources {
            if seen[s] {
                return Err(CalibrationError::DuplicateAxis(sources));
            }
            seen[s] = true;
        }
        Ok(Self { x, y, z })
    }

    pub fn identity() -> Self {
        Self {
            x: AxisAssignment::new(0, AxisSign::Positive),
            y: AxisAssignment::new(1, AxisSign::Positive),
            z: AxisAssignment::new(2, AxisSign::Positive),
        }
    }

    pub fn x(&self) -> AxisAssignment {
        self.x
    }

    pub fn y(&self) -> AxisAssignment {
        self.y
    }

    pub fn z(&self) -> AxisAssignment {
        self.z
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// `out[k] = raw[map[k].source] * map[k].sign` for each body axis k.
    pub fn apply(&self, raw: &Vector3<f64>) -> Vector3<f64> {
        Vector3::new(
            raw[self.x.source] * self.x.sign.factor(),
            raw[self.y.source] * self.y.sign.factor(),
            raw[self.z.source] * self.z.sign.factor(),
        )
    }
}
