use serde::{Deserialize, Serialize};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by n).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Coefficient of variation in percent. Zero for fewer than two values or a zero mean.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    if m == 0.0 {
        return 0.0;
    }
    std_dev(values) / m * 100.0
}

/// Symmetry index `100·(b − a) / ((a + b) / 2)`; zero when both sides are zero.
pub fn symmetry_index(a: f64, b: f64) -> f64 {
    let avg = (a + b) / 2.0;
    if avg.abs() < f64::EPSILON {
        return 0.0;
    }
    100.0 * (b - a) / avg
}

pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
}

impl Severity {
    pub fn classify(si: f64, moderate: f64, high: f64) -> Self {
        let magnitude = si.abs();
        if magnitude > high {
            Severity::High
        } else if magnitude > moderate {
            Severity::Moderate
        } else {
            Severity::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cv_of_degenerate_inputs_is_zero() {
        assert_eq!(coefficient_of_variation(&[]), 0.0);
        assert_eq!(coefficient_of_variation(&[42.0]), 0.0);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn cv_uses_population_std() {
        // mean 5, population std 2
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(std_dev(&values), 2.0, epsilon = 1e-12);
        assert_relative_eq!(coefficient_of_variation(&values), 40.0, epsilon = 1e-9);
    }

    #[test]
    fn symmetry_index_is_antisymmetric() {
        for (a, b) in [(600.0, 650.0), (70.0, 50.0), (0.0, 10.0), (3.0, 3.0)] {
            assert_relative_eq!(symmetry_index(a, b), -symmetry_index(b, a));
        }
        assert_eq!(symmetry_index(0.0, 0.0), 0.0);
        assert_relative_eq!(symmetry_index(70.0, 50.0), -100.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn severity_bands_are_exclusive_at_boundaries() {
        assert_eq!(Severity::classify(15.0, 8.0, 15.0), Severity::Moderate);
        assert_eq!(Severity::classify(-15.1, 8.0, 15.0), Severity::High);
        assert_eq!(Severity::classify(8.0, 8.0, 15.0), Severity::Low);
        assert_eq!(Severity::classify(8.5, 8.0, 15.0), Severity::Moderate);
    }

    #[test]
    fn min_max_of_empty_is_none() {
        assert_eq!(min_max(&[]), None);
        assert_eq!(min_max(&[3.0, -1.0, 2.0]), Some((-1.0, 3.0)));
    }
}
