//! Prompt text for on-device assessments.

/// System prompt for the local model. Asks for a single JSON object in the
/// shape `parse::parse_model_response` understands.
pub const TRIAGE_SYSTEM_PROMPT: &str = r#"You are a clinical triage assistant. Read the patient's symptoms and return a structured assessment.

You do not replace a clinician. Every assessment must advise the patient to see a healthcare professional.

When a medical history section is present, take it into account: note interactions, contraindications, and how existing conditions could explain or worsen the current symptoms.

Reply with one JSON object and nothing else, using exactly these keys:
{
  "diagnosis": "short summary of the most likely explanation",
  "severity": "LOW" | "MEDIUM" | "HIGH" | "CRITICAL",
  "confidence_score": number between 0.0 and 1.0,
  "recommendations": ["next step", "next step"],
  "differential_diagnoses": [
    {"condition": "alternative", "confidence": number between 0.0 and 1.0}
  ],
  "explainability": {
    "contributing_factors": ["factor", "factor"],
    "reasoning": "short clinical reasoning"
  }
}"#;

/// Attach the patient's medical history to the symptoms. Returns the
/// symptoms unchanged when there is no history.
pub fn enrich_symptoms(symptoms: &str, context: &str) -> String {
    if context.is_empty() {
        symptoms.to_string()
    } else {
        format!("Patient symptoms: {symptoms}\n\n--- Patient Medical History ---\n{context}")
    }
}

/// The user turn sent to the local model.
pub fn user_message(symptoms: &str) -> String {
    format!("Patient symptoms: {symptoms}\n\nProvide your clinical assessment as JSON.")
}
