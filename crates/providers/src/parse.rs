//! Turning free-form model output into a structured assessment.
//!
//! Malformed output is never an error: anything that does not contain a
//! JSON object becomes a conservative default assessment.

use serde_json::{Map, Value};

use ht_domain::triage::{DifferentialDiagnosis, InferenceMode, Severity, TriageResultData};

use crate::wire::SaveResultRequest;

const DEFAULT_CONFIDENCE: f64 = 0.5;
const UNPARSED_DIAGNOSIS: &str = "Unable to parse diagnosis";
const GENERIC_DIAGNOSIS: &str = "AI analysis completed. Please consult a healthcare professional.";
const GENERIC_RECOMMENDATION: &str = "Consult a healthcare professional for evaluation";

/// A parsed local assessment, before it is tied to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub diagnosis: String,
    pub severity: Severity,
    pub confidence_score: f64,
    pub recommendations: Vec<String>,
    pub differential_diagnoses: Vec<DifferentialDiagnosis>,
    pub explainability: Map<String, Value>,
}

impl Assessment {
    /// Conservative assessment for output that carried no usable JSON.
    pub fn fallback(raw: &str) -> Self {
        let diagnosis = if raw.is_empty() {
            GENERIC_DIAGNOSIS.to_string()
        } else {
            raw.to_string()
        };
        let mut explainability = Map::new();
        explainability.insert("raw_response".into(), Value::String(raw.to_string()));

        Self {
            diagnosis,
            severity: Severity::Medium,
            confidence_score: DEFAULT_CONFIDENCE,
            recommendations: vec![GENERIC_RECOMMENDATION.to_string()],
            differential_diagnoses: Vec::new(),
            explainability,
        }
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        let diagnosis = obj
            .get("diagnosis")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNPARSED_DIAGNOSIS)
            .to_string();

        let confidence_score = obj
            .get("confidence_score")
            .and_then(number)
            .filter(|c| *c != 0.0 && !c.is_nan())
            .unwrap_or(DEFAULT_CONFIDENCE);

        let recommendations = obj
            .get("recommendations")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let differential_diagnoses = obj
            .get("differential_diagnoses")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(differential).collect())
            .unwrap_or_default();

        let explainability = obj
            .get("explainability")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Self {
            diagnosis,
            severity: Severity::normalize(obj.get("severity").and_then(Value::as_str)),
            confidence_score,
            recommendations,
            differential_diagnoses,
            explainability,
        }
    }

    /// The canonical result for `session_id`. Confidences are clamped here.
    pub fn into_result(self, session_id: &str, mode: InferenceMode) -> TriageResultData {
        TriageResultData::new(
            session_id,
            self.diagnosis,
            self.severity,
            self.confidence_score,
            self.recommendations,
            self.differential_diagnoses,
            self.explainability,
            mode,
        )
    }

    /// Body for saving this assessment against its audit session.
    pub fn to_save_request(&self, session_id: &str, raw: &str) -> SaveResultRequest {
        let clamped = self.clone().into_result(session_id, InferenceMode::Client);
        SaveResultRequest {
            session_id: session_id.to_string(),
            diagnosis: clamped.diagnosis,
            severity: clamped.severity,
            confidence_score: clamped.confidence_score,
            recommendations: clamped.recommendations,
            differential_diagnoses: clamped.differential_diagnoses,
            explainability: clamped.explainability,
            raw_model_output: raw.to_string(),
        }
    }
}

/// Parse raw model output. Takes the span from the first `{` to the last
/// `}` and decodes it; on any failure returns [`Assessment::fallback`].
pub fn parse_model_response(raw: &str) -> Assessment {
    let parsed = json_span(raw).and_then(|span| serde_json::from_str::<Value>(span).ok());
    match parsed {
        Some(Value::Object(obj)) => Assessment::from_object(&obj),
        _ => {
            tracing::debug!(len = raw.len(), "model output had no JSON object, using default assessment");
            Assessment::fallback(raw)
        }
    }
}

fn json_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn differential(v: &Value) -> Option<DifferentialDiagnosis> {
    let obj = v.as_object()?;
    let condition = obj.get("condition")?.as_str()?.to_string();
    let confidence = obj.get("confidence").and_then(number).unwrap_or(0.0);
    Some(DifferentialDiagnosis {
        condition,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_wrapped_in_prose() {
        let raw = r#"Here is my assessment:
```json
{"diagnosis":"Tension headache","severity":"low","confidence_score":1.4,
 "recommendations":["Rest","Hydrate"],
 "differential_diagnoses":[{"condition":"Migraine","confidence":0.3}],
 "explainability":{"reasoning":"bilateral pressure"}}
```"#;
        let a = parse_model_response(raw);
        assert_eq!(a.diagnosis, "Tension headache");
        assert_eq!(a.severity, Severity::Low);
        assert_eq!(a.recommendations, ["Rest", "Hydrate"]);
        assert_eq!(a.differential_diagnoses[0].condition, "Migraine");

        let result = a.into_result("s1", InferenceMode::Client);
        assert_eq!(result.confidence_score, 1.0);
        assert_eq!(result.inference_mode, InferenceMode::Client);
    }

    #[test]
    fn prose_without_json_uses_default() {
        let raw = "You should probably see a doctor about this.";
        let a = parse_model_response(raw);
        assert_eq!(a.severity, Severity::Medium);
        assert_eq!(a.confidence_score, 0.5);
        assert_eq!(a.recommendations, [GENERIC_RECOMMENDATION]);
        assert!(a.differential_diagnoses.is_empty());
        assert_eq!(a.diagnosis, raw);
        assert_eq!(a.explainability["raw_response"], raw);
    }

    #[test]
    fn empty_output_gets_generic_diagnosis() {
        let a = parse_model_response("");
        assert_eq!(a.diagnosis, GENERIC_DIAGNOSIS);
        assert_eq!(a.explainability["raw_response"], "");
    }

    #[test]
    fn broken_json_uses_default() {
        let a = parse_model_response(r#"{"diagnosis": "Flu", "severity": }"#);
        assert_eq!(a.recommendations, [GENERIC_RECOMMENDATION]);
        assert_eq!(a.confidence_score, 0.5);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let a = parse_model_response(r#"{"severity":"urgent","confidence_score":0}"#);
        assert_eq!(a.diagnosis, UNPARSED_DIAGNOSIS);
        assert_eq!(a.severity, Severity::Medium);
        assert_eq!(a.confidence_score, 0.5);
        assert!(a.recommendations.is_empty());
        assert!(a.explainability.is_empty());
    }

    #[test]
    fn severity_any_case_is_upper_cased() {
        for (raw, want) in [
            ("low", Severity::Low),
            ("Medium", Severity::Medium),
            ("HIGH", Severity::High),
            ("cRiTiCaL", Severity::Critical),
            ("severe", Severity::Medium),
            ("", Severity::Medium),
        ] {
            let a = parse_model_response(&format!(r#"{{"severity":"{raw}"}}"#));
            assert_eq!(a.severity, want, "severity {raw:?}");
        }
    }

    #[test]
    fn negative_confidence_is_clamped() {
        let a = parse_model_response(r#"{"confidence_score":-3}"#);
        let req = a.to_save_request("s1", "raw");
        assert_eq!(req.confidence_score, 0.0);
        assert_eq!(req.raw_model_output, "raw");
    }
}
