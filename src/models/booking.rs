use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::appointment::AppointmentData;
use super::patient::PatientData;

/// Flattened submission body the booking backend expects. One flat object,
/// Spanish field names, dates as YYYY-MM-DD and times as HH:MM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    #[serde(rename = "tipoDocumento")]
    pub document_type: String,
    #[serde(rename = "numeroDocumento")]
    pub document_number: String,
    #[serde(rename = "digitoVerificacion", skip_serializing_if = "Option::is_none")]
    pub verification_digit: Option<String>,
    #[serde(rename = "nombre")]
    pub full_name: String,
    #[serde(rename = "telefono")]
    pub phone: String,
    #[serde(rename = "correo")]
    pub email: String,
    #[serde(rename = "tipoAtencion")]
    pub attention_type: String,
    #[serde(rename = "tipoCita")]
    pub appointment_kind: String,
    #[serde(rename = "especialidadReferencia", skip_serializing_if = "Option::is_none")]
    pub referring_specialty: Option<String>,
    #[serde(rename = "especialidad")]
    pub specialty_code: String,
    #[serde(rename = "nombreEspecialidad")]
    pub specialty_name: String,
    #[serde(rename = "medico")]
    pub doctor_code: String,
    #[serde(rename = "nombreMedico")]
    pub doctor_name: String,
    #[serde(rename = "fecha")]
    pub date: NaiveDate,
    #[serde(rename = "hora")]
    pub time: String,
    #[serde(rename = "turno")]
    pub shift: String,
    #[serde(rename = "consultorio")]
    pub room: String,
    #[serde(rename = "idCupo")]
    pub slot_id: String,
    #[serde(rename = "lugar")]
    pub site_code: String,
    #[serde(rename = "observacion")]
    pub observation: String,
}

impl BookingRequest {
    /// Builds the submission body from the captured conversation data.
    /// Returns None while any required selection is still missing.
    pub fn build(patient: &PatientData, appt: &AppointmentData, observation: &str) -> Option<Self> {
        if !appt.ready_for_submission() {
            return None;
        }
        let attention_type = patient.effective_patient_type()?.as_str().to_string();
        let appointment_kind = patient.appointment_kind?.as_str().to_string();
        Some(BookingRequest {
            document_type: patient.document_type.clone(),
            document_number: patient.document_number.clone(),
            verification_digit: patient.verification_digit.clone(),
            full_name: patient.full_name.clone(),
            phone: patient.phone.clone(),
            email: patient.email.clone(),
            attention_type,
            appointment_kind,
            referring_specialty: patient.referring_specialty.clone(),
            specialty_code: appt.specialty_id.clone()?,
            specialty_name: appt.specialty_name.clone().unwrap_or_default(),
            doctor_code: appt.doctor_code.clone()?,
            doctor_name: appt.doctor_name.clone().unwrap_or_default(),
            date: appt.date?,
            time: appt.time.clone()?,
            shift: appt.shift.map(|s| s.code().to_string()).unwrap_or_default(),
            room: appt.room.clone().unwrap_or_default(),
            slot_id: appt.slot_id.clone()?,
            site_code: appt.site_code.clone().unwrap_or_default(),
            observation: observation.to_string(),
        })
    }
}

/// Acknowledgment from the booking backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingReceipt {
    #[serde(rename = "codigo")]
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::appointment::Shift;
    use crate::models::patient::{AppointmentKind, PatientType};

    fn patient() -> PatientData {
        PatientData {
            full_name: "Juan Carlos Paredes".to_string(),
            phone: "987654321".to_string(),
            document_type: "DNI".to_string(),
            document_number: "45678912".to_string(),
            verification_digit: None,
            email: "juan@example.com".to_string(),
            patient_type: Some(PatientType::Sis),
            appointment_kind: Some(AppointmentKind::Citado),
            referring_specialty: None,
        }
    }

    fn appointment() -> AppointmentData {
        AppointmentData {
            specialty_id: Some("0019".to_string()),
            specialty_name: Some("Cardiología".to_string()),
            doctor_code: Some("ABC".to_string()),
            doctor_name: Some("Dra. Vega".to_string()),
            shift: Some(Shift::Morning),
            date: NaiveDate::from_ymd_opt(2025, 10, 15),
            time: Some("09:00".to_string()),
            room: Some("C-204".to_string()),
            slot_id: Some("CUP-881".to_string()),
            site_code: Some("1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_requires_complete_selection() {
        let mut appt = appointment();
        appt.slot_id = None;
        assert!(BookingRequest::build(&patient(), &appt, "").is_none());
    }

    #[test]
    fn test_wire_field_names_and_formats() {
        let req = BookingRequest::build(&patient(), &appointment(), "control anual").unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["tipoAtencion"], "SIS");
        assert_eq!(json["tipoCita"], "CITADO");
        assert_eq!(json["medico"], "ABC");
        assert_eq!(json["fecha"], "2025-10-15");
        assert_eq!(json["hora"], "09:00");
        assert_eq!(json["turno"], "M");
        assert_eq!(json["observacion"], "control anual");
        // optional fields stay off the wire when unset
        assert!(json.get("digitoVerificacion").is_none());
        assert!(json.get("especialidadReferencia").is_none());
    }

    #[test]
    fn test_tramite_overrides_attention_type() {
        let mut p = patient();
        p.appointment_kind = Some(AppointmentKind::Tramite);
        let req = BookingRequest::build(&p, &appointment(), "constancia").unwrap();
        assert_eq!(req.attention_type, "PAGANTE");
        assert_eq!(req.appointment_kind, "TRAMITE");
    }

    #[test]
    fn test_referral_rides_along_for_interconsulta() {
        let mut p = patient();
        p.appointment_kind = Some(AppointmentKind::Interconsulta);
        p.referring_specialty = Some("Medicina General".to_string());
        let req = BookingRequest::build(&p, &appointment(), "").unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["especialidadReferencia"], "Medicina General");
    }
}
