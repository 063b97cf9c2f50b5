use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Wire records from the hospital catalog service. Field names follow the
/// backend contract, which is Spanish throughout.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentType {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "descripcion")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specialty {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "descripcion")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "nombre")]
    pub name: String,
}

/// One calendar date the specialty holds consultations on. Dates the
/// specialty does not work at all are simply absent from the list, so a
/// listed date is either open or exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateEntry {
    #[serde(rename = "fecha")]
    pub date: NaiveDate,
    #[serde(rename = "cupos")]
    pub remaining: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStatus {
    Open { remaining: Option<u32> },
    Exhausted,
}

impl DateEntry {
    // The backend omits the count on some responses. The upstream system
    // treats a missing count as bookable, so we keep that reading in one
    // place until the contract is confirmed.
    pub fn status(&self) -> DateStatus {
        match self.remaining {
            Some(0) => DateStatus::Exhausted,
            Some(n) => DateStatus::Open { remaining: Some(n) },
            None => DateStatus::Open { remaining: None },
        }
    }
}

/// Slot availability states that count as bookable.
const BOOKABLE_STATES: [&str; 2] = ["D", "L"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    #[serde(rename = "idCupo")]
    pub slot_id: String,
    #[serde(rename = "medico")]
    pub doctor_code: String,
    #[serde(rename = "nombreMedico")]
    pub doctor_name: String,
    #[serde(rename = "hora")]
    pub time: String,
    #[serde(rename = "consultorio")]
    pub room: String,
    #[serde(rename = "estado")]
    pub state: String,
    #[serde(rename = "solicitado", default)]
    pub already_requested: bool,
    #[serde(rename = "lugar")]
    pub site_code: String,
}

impl SlotRecord {
    pub fn is_bookable(&self) -> bool {
        BOOKABLE_STATES.contains(&self.state.as_str()) && !self.already_requested
    }

    /// Times come as "HH:MM" strings on the wire.
    pub fn parsed_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.time, "%H:%M").ok()
    }
}

/// Bookable slots for one doctor, in the order the backend returned them.
#[derive(Debug, Clone, PartialEq)]
pub struct DoctorSlots {
    pub code: String,
    pub name: String,
    pub slots: Vec<SlotRecord>,
}

/// Shapes raw slot records for presentation: drops non-bookable and
/// already-requested entries, groups the rest per doctor keeping backend
/// order inside each group, and orders groups by display name. Running it
/// twice over the same input gives the same output.
pub fn group_by_doctor(records: &[SlotRecord]) -> Vec<DoctorSlots> {
    let mut groups: Vec<DoctorSlots> = Vec::new();
    for rec in records.iter().filter(|r| r.is_bookable()) {
        match groups.iter_mut().find(|g| g.code == rec.doctor_code) {
            Some(group) => group.slots.push(rec.clone()),
            None => groups.push(DoctorSlots {
                code: rec.doctor_code.clone(),
                name: rec.doctor_name.clone(),
                slots: vec![rec.clone()],
            }),
        }
    }
    groups.sort_by(|a, b| a.name.cmp(&b.name));
    groups
}

/// Orders a doctor roster by display name and drops duplicate codes.
pub fn dedupe_doctors(mut doctors: Vec<Doctor>) -> Vec<Doctor> {
    doctors.sort_by(|a, b| a.name.cmp(&b.name));
    let mut seen: Vec<String> = Vec::new();
    doctors.retain(|d| {
        if seen.contains(&d.code) {
            false
        } else {
            seen.push(d.code.clone());
            true
        }
    });
    doctors
}

/// Site codes and street addresses for the two consultation buildings.
pub fn site_address(code: &str) -> Option<&'static str> {
    match code {
        "1" => Some("Sede central, Av. Grau 800, Cercado"),
        "2" => Some("Consultorios externos, Jr. Cangallo 450"),
        _ => None,
    }
}
