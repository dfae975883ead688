use serde::{Deserialize, Serialize};

use super::error::InspectionError;
use crate::config::QualityThresholds;
use crate::job::Verdict;

/// Result of analyzing a captured artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Quality score in [0, 100].
    pub score: f64,
    pub verdict: Verdict,
}

impl QualityReport {
    /// Build a report, deriving the verdict from `thresholds`.
    pub fn from_score(score: f64, thresholds: &QualityThresholds) -> Result<Self, InspectionError> {
        check_score(score)?;
        Ok(Self {
            score,
            verdict: Verdict::from_score(score, thresholds),
        })
    }

    /// Parse analysis output.
    ///
    /// Accepts a JSON object `{"score": 93.5, "verdict": "good"}` (verdict
    /// optional) or a bare number on the last non-empty line.
    pub fn parse(output: &str, thresholds: &QualityThresholds) -> Result<Self, InspectionError> {
        #[derive(Deserialize)]
        struct Raw {
            score: f64,
            #[serde(default)]
            verdict: Option<String>,
        }

        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Err(InspectionError::invalid_report("empty output"));
        }

        if let Ok(raw) = serde_json::from_str::<Raw>(trimmed) {
            return match raw.verdict {
                Some(v) => {
                    check_score(raw.score)?;
                    let verdict = v.parse().map_err(InspectionError::invalid_report)?;
                    Ok(Self {
                        score: raw.score,
                        verdict,
                    })
                }
                None => Self::from_score(raw.score, thresholds),
            };
        }

        let last = trimmed.lines().map(str::trim).rfind(|l| !l.is_empty()).unwrap_or(trimmed);
        let score: f64 = last
            .parse()
            .map_err(|_| InspectionError::invalid_report(format!("not a score: {:?}", last)))?;
        Self::from_score(score, thresholds)
    }
}

fn check_score(score: f64) -> Result<(), InspectionError> {
    if score.is_finite() && (0.0..=100.0).contains(&score) {
        Ok(())
    } else {
        Err(InspectionError::ScoreOutOfRange { score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_with_verdict() {
        let report =
            QualityReport::parse(r#"{"score": 72.5, "verdict": "GOOD"}"#, &QualityThresholds::default())
                .unwrap();
        assert_eq!(report.score, 72.5);
        assert_eq!(report.verdict, Verdict::Good);
    }

    #[test]
    fn test_parse_json_derives_verdict() {
        let report =
            QualityReport::parse(r#"{"score": 95}"#, &QualityThresholds::default()).unwrap();
        assert_eq!(report.verdict, Verdict::Good);
    }

    #[test]
    fn test_parse_bare_number_after_log_lines() {
        let output = "loading model\nscanning\n65.0\n";
        let report = QualityReport::parse(output, &QualityThresholds::default()).unwrap();
        assert_eq!(report.score, 65.0);
        assert_eq!(report.verdict, Verdict::Bad);
    }

    #[test]
    fn test_parse_uncertain_band() {
        let report = QualityReport::parse("80", &QualityThresholds::default()).unwrap();
        assert_eq!(report.verdict, Verdict::Uncertain);
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        let thresholds = QualityThresholds::default();
        assert!(matches!(
            QualityReport::parse("101", &thresholds),
            Err(InspectionError::ScoreOutOfRange { .. })
        ));
        assert!(matches!(
            QualityReport::parse(r#"{"score": -1, "verdict": "bad"}"#, &thresholds),
            Err(InspectionError::ScoreOutOfRange { .. })
        ));
        assert!(QualityReport::parse("NaN", &thresholds).is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let thresholds = QualityThresholds::default();
        assert!(matches!(
            QualityReport::parse("", &thresholds),
            Err(InspectionError::InvalidReport { .. })
        ));
        assert!(matches!(
            QualityReport::parse("looks fine to me", &thresholds),
            Err(InspectionError::InvalidReport { .. })
        ));
        assert!(matches!(
            QualityReport::parse(r#"{"score": 90, "verdict": "meh"}"#, &thresholds),
            Err(InspectionError::InvalidReport { .. })
        ));
    }
}
