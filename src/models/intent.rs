use serde::{Deserialize, Serialize};

/// Generic intents the orchestrator acts on. Anything else the matcher
/// labels comes through as Unknown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Affirmative,
    Negative,
    #[serde(other)]
    Unknown,
}

/// Matcher verdict for one free-text utterance. Only the entity keys a
/// step explicitly trusts are modeled; the rest of the payload is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedIntent {
    pub intent: Intent,
    #[serde(default, rename = "patientType")]
    pub patient_type: Option<String>,
    #[serde(default, rename = "appointmentType")]
    pub appointment_type: Option<String>,
    #[serde(default)]
    pub observation: Option<String>,
}

impl ExtractedIntent {
    pub fn bare(intent: Intent) -> Self {
        ExtractedIntent {
            intent,
            patient_type: None,
            appointment_type: None,
            observation: None,
        }
    }
}
