//! Triage input and the canonical result type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Input
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where the symptom description came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriageSource {
    Text,
    Image,
    Multimodal,
}

impl TriageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriageSource::Text => "TEXT",
            TriageSource::Image => "IMAGE",
            TriageSource::Multimodal => "MULTIMODAL",
        }
    }
}

impl std::fmt::Display for TriageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image attached to a triage submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub filename: String,
    /// MIME type, e.g. `image/jpeg`.
    pub content_type: String,
}

impl ImageBlob {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
            content_type: content_type.into(),
        }
    }
}

/// One triage submission. Transient and owned by the caller.
#[derive(Debug, Clone)]
pub struct TriageInput {
    pub symptoms_text: Option<String>,
    pub image: Option<ImageBlob>,
    pub source: TriageSource,
}

impl TriageInput {
    pub fn text(symptoms: impl Into<String>) -> Self {
        Self {
            symptoms_text: Some(symptoms.into()),
            image: None,
            source: TriageSource::Text,
        }
    }

    pub fn image(symptoms: Option<String>, image: ImageBlob) -> Self {
        Self {
            symptoms_text: symptoms,
            image: Some(image),
            source: TriageSource::Image,
        }
    }

    pub fn multimodal(symptoms: impl Into<String>, image: ImageBlob) -> Self {
        Self {
            symptoms_text: Some(symptoms.into()),
            image: Some(image),
            source: TriageSource::Multimodal,
        }
    }

    /// Symptom text, or the empty string when none was given.
    pub fn symptoms(&self) -> &str {
        self.symptoms_text.as_deref().unwrap_or("")
    }

    /// Check that the fields required by `source` are present.
    ///
    /// TEXT needs symptoms, IMAGE needs an image, MULTIMODAL needs both.
    pub fn validate(&self) -> Result<()> {
        let has_text = self
            .symptoms_text
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        let has_image = self.image.is_some();

        let ok = match self.source {
            TriageSource::Text => has_text,
            TriageSource::Image => has_image,
            TriageSource::Multimodal => has_text && has_image,
        };

        if ok {
            Ok(())
        } else {
            Err(Error::InvalidInput("Invalid triage input".into()))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Canonical result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Case-insensitive parse; anything unrecognized becomes `Medium`.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("LOW") => Severity::Low,
            Some("MEDIUM") => Severity::Medium,
            Some("HIGH") => Severity::High,
            Some("CRITICAL") => Severity::Critical,
            _ => Severity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InferenceMode {
    Client,
    Server,
}

impl InferenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceMode::Client => "CLIENT",
            InferenceMode::Server => "SERVER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialDiagnosis {
    pub condition: String,
    pub confidence: f64,
}

/// The single result shape every inference path is normalized into.
///
/// Build through [`TriageResultData::new`] so the confidence and severity
/// invariants hold; the value is never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageResultData {
    pub session_id: String,
    pub diagnosis: String,
    pub severity: Severity,
    pub confidence_score: f64,
    pub recommendations: Vec<String>,
    pub differential_diagnoses: Vec<DifferentialDiagnosis>,
    pub explainability: Map<String, Value>,
    pub inference_mode: InferenceMode,
}

impl TriageResultData {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        diagnosis: impl Into<String>,
        severity: Severity,
        confidence_score: f64,
        recommendations: Vec<String>,
        differential_diagnoses: Vec<DifferentialDiagnosis>,
        explainability: Map<String, Value>,
        inference_mode: InferenceMode,
    ) -> Self {
        let differential_diagnoses = differential_diagnoses
            .into_iter()
            .map(|d| DifferentialDiagnosis {
                condition: d.condition,
                confidence: clamp_unit(d.confidence),
            })
            .collect();

        Self {
            session_id: session_id.into(),
            diagnosis: diagnosis.into(),
            severity,
            confidence_score: clamp_unit(confidence_score),
            recommendations,
            differential_diagnoses,
            explainability,
            inference_mode,
        }
    }
}

/// Clamp into `[0, 1]`. NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_case_insensitive() {
        assert_eq!(Severity::normalize(Some("low")), Severity::Low);
        assert_eq!(Severity::normalize(Some("High")), Severity::High);
        assert_eq!(Severity::normalize(Some("CRITICAL")), Severity::Critical);
        assert_eq!(Severity::normalize(Some(" medium ")), Severity::Medium);
    }

    #[test]
    fn unknown_severity_coerces_to_medium() {
        for raw in ["severe", "", "urgent", "lowish"] {
            assert_eq!(Severity::normalize(Some(raw)), Severity::Medium, "{raw}");
        }
        assert_eq!(Severity::normalize(None), Severity::Medium);
    }

    #[test]
    fn confidence_is_clamped() {
        let r = TriageResultData::new(
            "s1",
            "x",
            Severity::Low,
            1.4,
            vec![],
            vec![DifferentialDiagnosis {
                condition: "y".into(),
                confidence: -0.2,
            }],
            Map::new(),
            InferenceMode::Client,
        );
        assert_eq!(r.confidence_score, 1.0);
        assert_eq!(r.differential_diagnoses[0].confidence, 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
    }

    #[test]
    fn input_validation() {
        assert!(TriageInput::text("headache").validate().is_ok());
        assert!(TriageInput::text("   ").validate().is_err());

        let img = ImageBlob::new(vec![1, 2, 3], "rash.jpg", "image/jpeg");
        assert!(TriageInput::image(None, img.clone()).validate().is_ok());
        assert!(TriageInput::multimodal("itchy", img).validate().is_ok());

        let missing_image = TriageInput {
            symptoms_text: Some("itchy".into()),
            image: None,
            source: TriageSource::Multimodal,
        };
        let err = missing_image.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid triage input"));
    }

    #[test]
    fn result_serializes_camel_case() {
        let r = TriageResultData::new(
            "abc",
            "Tension headache",
            Severity::Low,
            0.8,
            vec!["Rest".into()],
            vec![],
            Map::new(),
            InferenceMode::Server,
        );
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["sessionId"], "abc");
        assert_eq!(json["confidenceScore"], 0.8);
        assert_eq!(json["severity"], "LOW");
        assert_eq!(json["inferenceMode"], "SERVER");
    }
}
