//! Generative-Ensemble-Fusion Score: the six-component quality rating
//! attached to every entry.
//!
//! Weights and letter-grade bands are pinned from the original
//! `registry_engine.py` source rather than invented here.

use serde::{Deserialize, Serialize};

/// Weight applied to the `quality` component.
pub const WEIGHT_QUALITY: f64 = 0.25;
/// Weight applied to the `reliability` component.
pub const WEIGHT_RELIABILITY: f64 = 0.20;
/// Weight applied to the `performance` component.
pub const WEIGHT_PERFORMANCE: f64 = 0.20;
/// Weight applied to the `security` component.
pub const WEIGHT_SECURITY: f64 = 0.15;
/// Weight applied to the `compatibility` component.
pub const WEIGHT_COMPATIBILITY: f64 = 0.10;
/// Weight applied to the `documentation` component.
pub const WEIGHT_DOCUMENTATION: f64 = 0.10;

/// The six GEFS component scores, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gefs {
    /// Overall implementation quality.
    pub quality: f64,
    /// Historical reliability / failure rate.
    pub reliability: f64,
    /// Runtime performance characteristics.
    pub performance: f64,
    /// Security posture.
    pub security: f64,
    /// Compatibility with the rest of the platform.
    pub compatibility: f64,
    /// Documentation completeness.
    pub documentation: f64,
}

impl Default for Gefs {
    fn default() -> Self {
        Self {
            quality: 0.0,
            reliability: 0.0,
            performance: 0.0,
            security: 0.0,
            compatibility: 0.0,
            documentation: 0.0,
        }
    }
}

/// Letter grade bands, ordered from highest to lowest threshold.
const GRADE_BANDS: &[(f64, &str)] = &[
    (95.0, "A+"),
    (90.0, "A"),
    (85.0, "A-"),
    (80.0, "B+"),
    (75.0, "B"),
    (70.0, "B-"),
    (65.0, "C+"),
    (60.0, "C"),
];

impl Gefs {
    /// Weighted overall score: `Σ (score_i × weight_i)`.
    pub fn overall(&self) -> f64 {
        self.quality * WEIGHT_QUALITY
            + self.reliability * WEIGHT_RELIABILITY
            + self.performance * WEIGHT_PERFORMANCE
            + self.security * WEIGHT_SECURITY
            + self.compatibility * WEIGHT_COMPATIBILITY
            + self.documentation * WEIGHT_DOCUMENTATION
    }

    /// Letter grade for the overall score (`A+` down to `F`).
    pub fn grade(&self) -> &'static str {
        let overall = self.overall();
        GRADE_BANDS
            .iter()
            .find(|(threshold, _)| overall >= *threshold)
            .map(|(_, grade)| *grade)
            .unwrap_or("F")
    }

    /// Whether every component is within the valid `[0, 100]` range.
    pub fn is_valid(&self) -> bool {
        [
            self.quality,
            self.reliability,
            self.performance,
            self.security,
            self.compatibility,
            self.documentation,
        ]
        .iter()
        .all(|v| (0.0..=100.0).contains(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_is_weighted_sum() {
        let gefs = Gefs {
            quality: 100.0,
            reliability: 100.0,
            performance: 100.0,
            security: 100.0,
            compatibility: 100.0,
            documentation: 100.0,
        };
        assert!((gefs.overall() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn grade_bands_match_thresholds() {
        let make = |overall: f64| Gefs {
            quality: overall,
            reliability: overall,
            performance: overall,
            security: overall,
            compatibility: overall,
            documentation: overall,
        };
        assert_eq!(make(95.0).grade(), "A+");
        assert_eq!(make(90.0).grade(), "A");
        assert_eq!(make(85.0).grade(), "A-");
        assert_eq!(make(80.0).grade(), "B+");
        assert_eq!(make(75.0).grade(), "B");
        assert_eq!(make(70.0).grade(), "B-");
        assert_eq!(make(65.0).grade(), "C+");
        assert_eq!(make(60.0).grade(), "C");
        assert_eq!(make(10.0).grade(), "F");
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let gefs = Gefs {
            quality: 150.0,
            ..Gefs::default()
        };
        assert!(!gefs.is_valid());
    }
}
