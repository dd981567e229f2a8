//! Scoring a threshold policy against hand-labeled recorded responses.

use crate::config::ThresholdConfig;
use crate::provider::ProviderError;
use crate::rules;
use crate::types::FaceAttributesResponse;
use crate::vendor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegressionError {
    #[error("invalid case file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A recorded vendor response plus the human judgement of the image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledCase {
    pub source: String,
    /// Whether a reviewer considers the image an acceptable avatar.
    pub expected_valid: bool,
    /// Raw vendor response body.
    pub response: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseResult {
    pub source: String,
    pub expected_valid: bool,
    /// `None` when the recorded response could not be evaluated.
    pub actual_valid: Option<bool>,
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseResult {
    pub fn agrees(&self) -> bool {
        self.actual_valid == Some(self.expected_valid)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegressionReport {
    pub cases: Vec<CaseResult>,
    pub true_accept: usize,
    pub false_accept: usize,
    pub true_reject: usize,
    pub false_reject: usize,
    pub not_evaluable: usize,
}

impl RegressionReport {
    pub fn evaluated(&self) -> usize {
        self.true_accept + self.false_accept + self.true_reject + self.false_reject
    }

    /// Fraction of evaluated cases where the verdict matched the label.
    pub fn agreement(&self) -> f64 {
        let evaluated = self.evaluated();
        if evaluated == 0 {
            return 0.0;
        }
        (self.true_accept + self.true_reject) as f64 / evaluated as f64
    }

    pub fn disagreements(&self) -> impl Iterator<Item = &CaseResult> {
        self.cases
            .iter()
            .filter(|c| c.actual_valid.is_some() && !c.agrees())
    }
}

pub fn load_cases(src: &str) -> Result<Vec<LabeledCase>, RegressionError> {
    Ok(serde_json::from_str(src)?)
}

/// Evaluate every case under `config` and tally agreement with the labels.
pub fn score(cases: &[LabeledCase], config: &ThresholdConfig) -> RegressionReport {
    let mut report = RegressionReport::default();

    for case in cases {
        let decoded = match vendor::decode_value(&case.response) {
            // A faceless image is a reject, not a missing verdict.
            Err(ProviderError::NoFace) => Ok(FaceAttributesResponse::default()),
            other => other,
        };
        let result = match decoded {
            Ok(payload) => {
                let verdict = rules::evaluate(&payload, config);
                match (case.expected_valid, verdict.is_valid) {
                    (true, true) => report.true_accept += 1,
                    (false, true) => report.false_accept += 1,
                    (false, false) => report.true_reject += 1,
                    (true, false) => report.false_reject += 1,
                }
                CaseResult {
                    source: case.source.clone(),
                    expected_valid: case.expected_valid,
                    actual_valid: Some(verdict.is_valid),
                    reasons: verdict.reasons,
                    error: None,
                }
            }
            Err(err) => {
                report.not_evaluable += 1;
                CaseResult {
                    source: case.source.clone(),
                    expected_valid: case.expected_valid,
                    actual_valid: None,
                    reasons: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        };
        report.cases.push(result);
    }

    tracing::info!(
        cases = cases.len(),
        agreement = report.agreement(),
        false_accept = report.false_accept,
        false_reject = report.false_reject,
        not_evaluable = report.not_evaluable,
        "regression scored"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(pitch: i64, mask: i64) -> serde_json::Value {
        json!({
            "FaceDetailInfos": [{
                "FaceRect": {"X": 12, "Y": 20, "Width": 150, "Height": 180},
                "FaceDetailAttributesInfo": {
                    "HeadPose": {"Pitch": pitch, "Yaw": 0, "Roll": 0},
                    "Mask": {"Type": mask},
                    "Eye": {"Glass": {"Type": 0}, "EyeOpen": {"Type": 0}}
                }
            }]
        })
    }

    fn case(source: &str, expected_valid: bool, response: serde_json::Value) -> LabeledCase {
        LabeledCase {
            source: source.into(),
            expected_valid,
            response,
        }
    }

    #[test]
    fn test_score_tallies_confusion_counts() {
        let cases = vec![
            case("frontal.jpg", true, response(2, 0)),
            case("tilted.jpg", true, response(14, 0)),
            case("masked.jpg", false, response(0, 4)),
            case("looks-fine.jpg", false, response(0, 0)),
            case("error.jpg", false, json!({"Response": {"Error": {"Code": "AuthFailure", "Message": ""}}})),
        ];

        let report = score(&cases, &ThresholdConfig::vendor_default());
        assert_eq!(report.true_accept, 1);
        assert_eq!(report.false_reject, 1);
        assert_eq!(report.true_reject, 1);
        assert_eq!(report.false_accept, 1);
        assert_eq!(report.not_evaluable, 1);
        assert_eq!(report.evaluated(), 4);
        assert!((report.agreement() - 0.5).abs() < 1e-9);

        let misses: Vec<&str> = report.disagreements().map(|c| c.source.as_str()).collect();
        assert_eq!(misses, vec!["tilted.jpg", "looks-fine.jpg"]);
        assert_eq!(report.cases[1].reasons, vec!["pitch out of range: 14 not in [-10,10]"]);
        assert!(report.cases[4].error.is_some());
    }

    #[test]
    fn test_no_face_response_scores_as_reject() {
        let no_face = json!({"Response": {"Error": {
            "Code": "InvalidParameterValue.NoFaceInPhoto", "Message": "no face"}}});
        let cases = vec![
            case("empty.jpg", false, no_face.clone()),
            case("mislabeled.jpg", true, no_face),
        ];
        let report = score(&cases, &ThresholdConfig::vendor_default());
        assert_eq!(report.true_reject, 1);
        assert_eq!(report.false_reject, 1);
        assert_eq!(report.not_evaluable, 0);
        assert_eq!(report.cases[0].actual_valid, Some(false));
        assert_eq!(report.cases[0].reasons, vec!["no face detected"]);
        assert!(report.cases[0].error.is_none());
    }

    #[test]
    fn test_relaxing_pitch_fixes_false_reject() {
        let cases = vec![case("tilted.jpg", true, response(14, 0))];
        let strict = score(&cases, &ThresholdConfig::vendor_default());
        let relaxed = score(&cases, &ThresholdConfig::relaxed());
        assert_eq!(strict.agreement(), 0.0);
        assert_eq!(relaxed.agreement(), 1.0);
    }

    #[test]
    fn test_empty_report() {
        let report = score(&[], &ThresholdConfig::vendor_default());
        assert_eq!(report.evaluated(), 0);
        assert_eq!(report.agreement(), 0.0);
    }

    #[test]
    fn test_contrib_sample_cases() {
        let src = include_str!("../../../contrib/cases/sample-cases.json");
        let cases = load_cases(src).unwrap();
        let report = score(&cases, &ThresholdConfig::vendor_default());
        assert_eq!(report.true_accept, 1);
        assert_eq!(report.true_reject, 2);
        assert_eq!(report.false_reject, 1);
        assert_eq!(report.not_evaluable, 0);
        assert_eq!(report.cases[2].reasons, vec!["no face detected"]);
        assert_eq!(report.cases[3].reasons, vec!["pitch out of range: 13 not in [-10,10]"]);

        let relaxed = score(&cases, &ThresholdConfig::relaxed());
        assert_eq!(relaxed.agreement(), 1.0);
    }

    #[test]
    fn test_load_cases() {
        let src = r#"[{"source": "a.jpg", "expected_valid": true, "response": {"FaceDetailInfos": []}}]"#;
        let cases = load_cases(src).unwrap();
        assert_eq!(cases.len(), 1);
        assert!(cases[0].expected_valid);
        assert!(load_cases("{}").is_err());
    }
}
