use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::appointment::{HourRange, Shift};
use super::booking::{BookingReceipt, BookingRequest};
use super::catalog::{DateEntry, Doctor, DocumentType, SlotRecord, Specialty};
use super::conversation::Step;
use super::intent::ExtractedIntent;
use super::patient::PatientForm;

/// Button actions the portal can post back. Every option the bot offers
/// carries one of these plus an opaque value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Start,
    PatientType,
    AppointmentType,
    Referral,
    Specialty,
    SearchMethod,
    Doctor,
    Shift,
    Date,
    HourRange,
    Slot,
    Continue,
    Yes,
    No,
    Retry,
    Restart,
    Abandon,
}

/// Inbound conversation events, tagged on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    FormSubmitted { fields: PatientForm },
    OptionChosen { action: Action, value: String },
    FreeTextEntered { text: String },
    FileAttached { filename: String, content_base64: String },
}

/// Everything the transition function reacts to: user input plus the
/// completions of previously issued effects. Completions carry the epoch
/// that was current when their effect was issued; on mismatch the
/// conversation was reset in between and the completion is dropped.
#[derive(Debug, Clone)]
pub enum Event {
    Ui(UiEvent),
    DocumentTypesLoaded { epoch: u64, list: Vec<DocumentType> },
    SpecialtiesLoaded { epoch: u64, list: Vec<Specialty> },
    DoctorsLoaded { epoch: u64, list: Vec<Doctor> },
    DatesLoaded { epoch: u64, list: Vec<DateEntry> },
    SlotsLoaded { epoch: u64, list: Vec<SlotRecord> },
    CatalogFailed { epoch: u64, what: &'static str },
    SessionReady { epoch: u64 },
    SessionFailed { epoch: u64 },
    SubmitAccepted { epoch: u64, receipt: BookingReceipt },
    SubmitRejected { epoch: u64, reason: Option<String> },
    IntentResolved { epoch: u64, extracted: ExtractedIntent },
    IntentUnavailable { epoch: u64 },
    SessionExpired,
}

/// Side effects the transition function asks the runner to perform. The
/// function itself never touches the network or the session timer.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    LoadDocumentTypes,
    LoadSpecialties,
    LoadDoctors {
        specialty: String,
    },
    LoadDates {
        specialty: String,
        shift: Shift,
    },
    LoadSlots {
        specialty: String,
        date: NaiveDate,
        shift: Shift,
        doctor: Option<String>,
        hour_range: Option<HourRange>,
    },
    ExtractIntent {
        text: String,
        step: Step,
    },
    RefreshSession,
    CancelSession,
    Submit {
        request: Box<BookingRequest>,
    },
    AttachReference {
        booking_code: String,
        filename: String,
        content_base64: String,
    },
}

/// One quick-reply button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub action: Action,
    pub value: String,
    pub label: String,
}

impl Choice {
    pub fn new(action: Action, value: impl Into<String>, label: impl Into<String>) -> Self {
        Choice {
            action,
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Outbound bot message, optionally with quick-reply options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Choice>,
}

impl BotMessage {
    pub fn text(text: impl Into<String>) -> Self {
        BotMessage {
            text: text.into(),
            options: Vec::new(),
        }
    }

    pub fn with_options(text: impl Into<String>, options: Vec<Choice>) -> Self {
        BotMessage {
            text: text.into(),
            options,
        }
    }
}
