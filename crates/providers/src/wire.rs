//! Request and response bodies of the remote triage API.
//!
//! Responses are decoded leniently at the field level (missing or null
//! fields fall back to defaults) but must still be JSON objects of the
//! right shape; anything else is a typed decode error.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use ht_domain::triage::{
    DifferentialDiagnosis, InferenceMode, Severity, TriageResultData, TriageSource,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Requests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Describes the device that ran a local inference, for the audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub accelerator: bool,
    pub runtime: String,
    pub os: String,
    pub arch: String,
}

impl DeviceInfo {
    pub fn current(runtime: impl Into<String>) -> Self {
        Self {
            accelerator: true,
            runtime: runtime.into(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// `POST /triage/sessions/`
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    pub symptoms_text: String,
    pub source: TriageSource,
    pub inference_mode: InferenceMode,
    pub model_version: String,
    pub device_info: DeviceInfo,
}

/// `POST /triage/inference/`
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    pub symptoms_text: String,
    pub source: TriageSource,
}

/// `POST /triage/results/`
#[derive(Debug, Clone, Serialize)]
pub struct SaveResultRequest {
    pub session_id: String,
    pub diagnosis: String,
    pub severity: Severity,
    pub confidence_score: f64,
    pub recommendations: Vec<String>,
    pub differential_diagnoses: Vec<DifferentialDiagnosis>,
    pub explainability: Map<String, Value>,
    pub raw_model_output: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `GET /records/context/`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextPayload {
    #[serde(default)]
    pub context: Option<String>,
}

/// A triage session as returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionPayload {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub result: Option<ResultPayload>,
}

/// The assessment attached to a session, once one exists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultPayload {
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub recommendations: Option<Vec<String>>,
    #[serde(default)]
    pub differential_diagnoses: Option<Vec<DifferentialPayload>>,
    #[serde(default)]
    pub explainability: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DifferentialPayload {
    #[serde(default)]
    pub condition: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
}

impl SessionPayload {
    /// Map onto the canonical result. A session without a result yet maps
    /// to "Pending analysis" with zero confidence.
    pub fn into_result(self, mode: InferenceMode) -> TriageResultData {
        let result = self.result.unwrap_or_default();

        let diagnosis = result
            .diagnosis
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "Pending analysis".to_string());

        let differentials = result
            .differential_diagnoses
            .unwrap_or_default()
            .into_iter()
            .map(|d| DifferentialDiagnosis {
                condition: d.condition,
                confidence: d.confidence.unwrap_or(0.0),
            })
            .collect();

        TriageResultData::new(
            self.id,
            diagnosis,
            Severity::normalize(result.severity.as_deref()),
            result.confidence_score.unwrap_or(0.0),
            result.recommendations.unwrap_or_default(),
            differentials,
            result.explainability.unwrap_or_default(),
            mode,
        )
    }
}

/// Session ids arrive as UUID strings, but accept integer keys as well.
fn id_string<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(de)? {
        Value::String(s) if !s.is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a session id, got {other}"
        ))),
    }
}

/// Decimal fields may be serialized as strings by the backend.
fn lenient_f64<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(de)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
