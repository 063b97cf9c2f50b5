use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;

use super::{BookingGateway, CatalogGateway, IntentExtractor, SubmitError};
use crate::config::BookingWindow;
use crate::models::{
    BookingReceipt, BookingRequest, DateEntry, Doctor, DocumentType, ExtractedIntent, HourRange,
    Shift, SlotRecord, Specialty, Step,
};

pub struct HttpCatalogGateway {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCatalogGateway {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CatalogGateway for HttpCatalogGateway {
    async fn document_types(&self) -> anyhow::Result<Vec<DocumentType>> {
        let resp = self
            .client
            .get(format!("{}/tipos-documento", self.base_url))
            .send()
            .await
            .context("failed to call catalog service")?
            .error_for_status()
            .context("catalog service rejected document type query")?;

        resp.json().await.context("failed to parse document types")
    }

    async fn specialties(&self, window: &BookingWindow) -> anyhow::Result<Vec<Specialty>> {
        let resp = self
            .client
            .get(format!("{}/especialidades", self.base_url))
            .query(&[
                ("inicio", window.start.to_string()),
                ("fin", window.end.to_string()),
            ])
            .send()
            .await
            .context("failed to call catalog service")?
            .error_for_status()
            .context("catalog service rejected specialty query")?;

        resp.json().await.context("failed to parse specialties")
    }

    async fn doctors(
        &self,
        specialty: &str,
        window: &BookingWindow,
    ) -> anyhow::Result<Vec<Doctor>> {
        let resp = self
            .client
            .get(format!("{}/medicos", self.base_url))
            .query(&[
                ("especialidad", specialty.to_string()),
                ("inicio", window.start.to_string()),
                ("fin", window.end.to_string()),
            ])
            .send()
            .await
            .context("failed to call catalog service")?
            .error_for_status()
            .context("catalog service rejected doctor query")?;

        resp.json().await.context("failed to parse doctors")
    }

    async fn dates(
        &self,
        specialty: &str,
        shift: Shift,
        window: &BookingWindow,
    ) -> anyhow::Result<Vec<DateEntry>> {
        let resp = self
            .client
            .get(format!("{}/fechas", self.base_url))
            .query(&[
                ("especialidad", specialty.to_string()),
                ("turno", shift.code().to_string()),
                ("inicio", window.start.to_string()),
                ("fin", window.end.to_string()),
            ])
            .send()
            .await
            .context("failed to call catalog service")?
            .error_for_status()
            .context("catalog service rejected date query")?;

        resp.json().await.context("failed to parse dates")
    }

    async fn slots(
        &self,
        specialty: &str,
        date: NaiveDate,
        shift: Shift,
        doctor: Option<&str>,
        hour_range: Option<HourRange>,
    ) -> anyhow::Result<Vec<SlotRecord>> {
        let mut query = vec![
            ("especialidad", specialty.to_string()),
            ("fecha", date.to_string()),
            ("turno", shift.code().to_string()),
        ];
        if let Some(doctor) = doctor {
            query.push(("medico", doctor.to_string()));
        }
        if let Some(range) = hour_range {
            query.push(("desde", range.from.format("%H:%M").to_string()));
            query.push(("hasta", range.to.format("%H:%M").to_string()));
        }

        let resp = self
            .client
            .get(format!("{}/cupos", self.base_url))
            .query(&query)
            .send()
            .await
            .context("failed to call catalog service")?
            .error_for_status()
            .context("catalog service rejected slot query")?;

        resp.json().await.context("failed to parse slots")
    }
}

pub struct HttpBookingGateway {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBookingGateway {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(serde::Deserialize)]
struct TokenGrant {
    token: String,
}

#[async_trait]
impl BookingGateway for HttpBookingGateway {
    async fn issue_token(&self) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(format!("{}/sesiones", self.base_url))
            .send()
            .await
            .context("failed to call booking service")?
            .error_for_status()
            .context("booking service refused to open a session")?;

        let grant: TokenGrant = resp
            .json()
            .await
            .context("failed to parse session token")?;
        Ok(grant.token)
    }

    async fn submit(
        &self,
        request: &BookingRequest,
        token: &str,
    ) -> Result<BookingReceipt, SubmitError> {
        let resp = self
            .client
            .post(format!("{}/solicitudes", self.base_url))
            .query(&[("token", token)])
            .json(request)
            .send()
            .await
            .context("failed to call booking service")?;

        let status = resp.status();
        if status.is_success() {
            let receipt = resp
                .json()
                .await
                .context("failed to parse booking receipt")?;
            return Ok(receipt);
        }

        // the backend explains refusals in a "mensaje" field when it can
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        match body["mensaje"].as_str() {
            Some(reason) => Err(SubmitError::Rejected(reason.to_string())),
            None => Err(SubmitError::Transport(anyhow::anyhow!(
                "booking service returned {status}"
            ))),
        }
    }

    async fn attach_reference(
        &self,
        booking_code: &str,
        filename: &str,
        content_base64: &str,
    ) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/solicitudes/{}/adjuntos", self.base_url, booking_code))
            .json(&json!({
                "nombre": filename,
                "contenido": content_base64,
            }))
            .send()
            .await
            .context("failed to call booking service")?
            .error_for_status()
            .context("booking service rejected the attachment")?;
        Ok(())
    }
}

pub struct HttpIntentExtractor {
    base_url: String,
    client: reqwest::Client,
}

impl HttpIntentExtractor {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IntentExtractor for HttpIntentExtractor {
    async fn extract(&self, text: &str, step: Step) -> anyhow::Result<ExtractedIntent> {
        let resp = self
            .client
            .post(format!("{}/clasificar", self.base_url))
            .json(&json!({
                "texto": text,
                "paso": step.as_str(),
            }))
            .send()
            .await
            .context("failed to call intent service")?
            .error_for_status()
            .context("intent service rejected the utterance")?;

        resp.json().await.context("failed to parse intent verdict")
    }
}
