use serde::{Deserialize, Serialize};

/// Attention regime the hospital bills the appointment under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatientType {
    Pagante,
    Sis,
    Soat,
}

impl PatientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientType::Pagante => "PAGANTE",
            PatientType::Sis => "SIS",
            PatientType::Soat => "SOAT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PAGANTE" => Some(PatientType::Pagante),
            "SIS" => Some(PatientType::Sis),
            "SOAT" => Some(PatientType::Soat),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PatientType::Pagante => "Particular (pagante)",
            PatientType::Sis => "Asegurado SIS",
            PatientType::Soat => "Cobertura SOAT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppointmentKind {
    Citado,
    Interconsulta,
    Tramite,
}

impl AppointmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentKind::Citado => "CITADO",
            AppointmentKind::Interconsulta => "INTERCONSULTA",
            AppointmentKind::Tramite => "TRAMITE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CITADO" => Some(AppointmentKind::Citado),
            "INTERCONSULTA" => Some(AppointmentKind::Interconsulta),
            "TRAMITE" => Some(AppointmentKind::Tramite),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AppointmentKind::Citado => "Cita médica",
            AppointmentKind::Interconsulta => "Interconsulta (con referencia)",
            AppointmentKind::Tramite => "Trámite administrativo",
        }
    }
}

/// Raw identity form exactly as the portal posts it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientForm {
    pub full_name: String,
    pub phone: String,
    pub document_type: String,
    pub document_number: String,
    #[serde(default)]
    pub verification_digit: Option<String>,
    pub email: String,
}

/// Validated identity data. Immutable once captured, except the two
/// classification fields which later steps fill in.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientData {
    pub full_name: String,
    pub phone: String,
    pub document_type: String,
    pub document_number: String,
    pub verification_digit: Option<String>,
    pub email: String,
    pub patient_type: Option<PatientType>,
    pub appointment_kind: Option<AppointmentKind>,
    pub referring_specialty: Option<String>,
}

impl PatientData {
    /// Attention type the booking backend is billed under. A TRAMITE is
    /// always billed as PAGANTE no matter what the patient selected.
    pub fn effective_patient_type(&self) -> Option<PatientType> {
        match self.appointment_kind {
            Some(AppointmentKind::Tramite) => Some(PatientType::Pagante),
            _ => self.patient_type,
        }
    }

    pub fn first_name(&self) -> &str {
        self.full_name.split_whitespace().next().unwrap_or(&self.full_name)
    }
}
