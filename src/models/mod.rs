pub mod appointment;
pub mod booking;
pub mod catalog;
pub mod conversation;
pub mod event;
pub mod intent;
pub mod patient;

pub use appointment::{AppointmentData, HourRange, SearchMethod, Shift};
pub use booking::{BookingReceipt, BookingRequest};
pub use catalog::{DateEntry, DateStatus, Doctor, DoctorSlots, DocumentType, SlotRecord, Specialty};
pub use conversation::{Conversation, ExpectedInput, OfferedOptions, Step, StepView};
pub use event::{Action, BotMessage, Choice, Effect, Event, UiEvent};
pub use intent::{ExtractedIntent, Intent};
pub use patient::{AppointmentKind, PatientData, PatientForm, PatientType};
