use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::appointment::AppointmentData;
use super::catalog::{DateEntry, Doctor, DocumentType, SlotRecord, Specialty};
use super::patient::PatientData;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Greeting,
    RequestingData,
    SelectingPatientType,
    SelectingAppointmentType,
    SelectingReferral,
    SelectingSpecialty,
    SelectingSearchMethod,
    SelectingDoctor,
    SelectingShift,
    SelectingDatetime,
    SelectingDoctorAfterDatetime,
    ShowingSummary,
    RequestingObservations,
    FinalConfirmation,
    AppointmentConfirmed,
    Failed,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Greeting => "greeting",
            Step::RequestingData => "requesting-data",
            Step::SelectingPatientType => "selecting-patient-type",
            Step::SelectingAppointmentType => "selecting-appointment-type",
            Step::SelectingReferral => "selecting-referral",
            Step::SelectingSpecialty => "selecting-specialty",
            Step::SelectingSearchMethod => "selecting-search-method",
            Step::SelectingDoctor => "selecting-doctor",
            Step::SelectingShift => "selecting-shift",
            Step::SelectingDatetime => "selecting-datetime",
            Step::SelectingDoctorAfterDatetime => "selecting-doctor-after-datetime",
            Step::ShowingSummary => "showing-summary",
            Step::RequestingObservations => "requesting-observations",
            Step::FinalConfirmation => "final-confirmation",
            Step::AppointmentConfirmed => "appointment-confirmed",
            Step::Failed => "failed",
        }
    }

    /// Terminal steps accept no further flow input.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::AppointmentConfirmed | Step::Failed)
    }
}

/// Option lists loaded from the catalog for the step currently on screen.
/// Chosen values are resolved against these, never trusted raw.
#[derive(Debug, Clone, Default)]
pub struct OfferedOptions {
    pub document_types: Vec<DocumentType>,
    pub specialties: Vec<Specialty>,
    pub doctors: Vec<Doctor>,
    pub dates: Vec<DateEntry>,
    pub slots: Vec<SlotRecord>,
}

/// Full server-side state of one conversation. Lives in memory only; the
/// portal gets a projection of it, never the struct itself.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: Uuid,
    pub step: Step,
    pub patient: Option<PatientData>,
    pub appointment: AppointmentData,
    pub observation: String,
    pub awaiting_observation: bool,
    pub awaiting_confirmation: bool,
    pub nlp_attempted: bool,
    /// Bumped on every reset. Completions issued under an older epoch are
    /// dropped when they arrive.
    pub epoch: u64,
    pub notice: Option<String>,
    pub booking_code: Option<String>,
    pub offered: OfferedOptions,
    pub last_activity: NaiveDateTime,
}

impl Conversation {
    pub fn new(id: Uuid) -> Self {
        Conversation {
            id,
            step: Step::Greeting,
            patient: None,
            appointment: AppointmentData::default(),
            observation: String::new(),
            awaiting_observation: false,
            awaiting_confirmation: false,
            nlp_attempted: false,
            epoch: 0,
            notice: None,
            booking_code: None,
            offered: OfferedOptions::default(),
            last_activity: Utc::now().naive_utc(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now().naive_utc();
    }

    /// What kind of input the current step expects from the portal.
    pub fn expects(&self) -> ExpectedInput {
        if self.step == Step::RequestingData {
            ExpectedInput::Form
        } else if self.awaiting_observation {
            ExpectedInput::Text
        } else if self.step.is_terminal() {
            ExpectedInput::Nothing
        } else {
            ExpectedInput::Options
        }
    }

    pub fn view(&self) -> StepView {
        StepView {
            step: self.step,
            expects: self.expects(),
            document_types: if self.step == Step::RequestingData {
                self.offered.document_types.clone()
            } else {
                Vec::new()
            },
            can_attach: self.step == Step::AppointmentConfirmed && self.booking_code.is_some(),
            booking_code: self.booking_code.clone(),
            notice: self.notice.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedInput {
    Form,
    Options,
    Text,
    Nothing,
}

/// Client-facing projection of the conversation.
#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub step: Step,
    pub expects: ExpectedInput,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub document_types: Vec<DocumentType>,
    pub can_attach: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}
