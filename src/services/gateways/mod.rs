pub mod http;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::BookingWindow;
use crate::models::{
    BookingReceipt, BookingRequest, DateEntry, Doctor, DocumentType, ExtractedIntent, HourRange,
    Shift, SlotRecord, Specialty, Step,
};

/// Read-only hospital catalog: document types, specialties, doctors and
/// their availability inside the configured booking window.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn document_types(&self) -> anyhow::Result<Vec<DocumentType>>;

    async fn specialties(&self, window: &BookingWindow) -> anyhow::Result<Vec<Specialty>>;

    async fn doctors(&self, specialty: &str, window: &BookingWindow)
        -> anyhow::Result<Vec<Doctor>>;

    async fn dates(
        &self,
        specialty: &str,
        shift: Shift,
        window: &BookingWindow,
    ) -> anyhow::Result<Vec<DateEntry>>;

    async fn slots(
        &self,
        specialty: &str,
        date: NaiveDate,
        shift: Shift,
        doctor: Option<&str>,
        hour_range: Option<HourRange>,
    ) -> anyhow::Result<Vec<SlotRecord>>;
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The backend refused the request and said why.
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Booking backend. The session token is a credential for submission, not
/// part of the request body.
#[async_trait]
pub trait BookingGateway: Send + Sync {
    async fn issue_token(&self) -> anyhow::Result<String>;

    async fn submit(
        &self,
        request: &BookingRequest,
        token: &str,
    ) -> Result<BookingReceipt, SubmitError>;

    async fn attach_reference(
        &self,
        booking_code: &str,
        filename: &str,
        content_base64: &str,
    ) -> anyhow::Result<()>;
}

/// External text classifier consulted when structured input fails.
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn extract(&self, text: &str, step: Step) -> anyhow::Result<ExtractedIntent>;
}
