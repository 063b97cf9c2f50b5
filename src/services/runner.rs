//! Executes the effects the transition core requests and feeds their
//! completions back in as events, until an event produces no further
//! effects. Everything async lives here; the core stays synchronous.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::models::{BotMessage, Effect, Event, UiEvent};
use crate::services::engine;
use crate::services::gateways::SubmitError;
use crate::services::validation::FieldErrors;
use crate::state::{AppState, SessionHandle};

/// Runs one user event to quiescence under the conversation's flow lock,
/// so concurrent posts to the same conversation are handled one at a time.
///
/// The epoch is read under the same lock as the transition itself. If the
/// session expires while an effect is in flight, the expiry bumps the epoch
/// and the completion below arrives stale and gets dropped by the core.
pub async fn dispatch(
    state: &AppState,
    handle: &Arc<SessionHandle>,
    ui: UiEvent,
) -> (Vec<BotMessage>, Option<FieldErrors>) {
    let _flow = handle.flow_lock.lock().await;

    let mut messages = Vec::new();
    let mut field_errors = None;
    let mut queue: VecDeque<Event> = VecDeque::new();
    queue.push_back(Event::Ui(ui));

    while let Some(event) = queue.pop_front() {
        let (outcome, epoch) = {
            let mut conv = handle.conversation.lock().unwrap();
            conv.touch();
            let outcome = engine::handle(&mut conv, event, &state.config);
            (outcome, conv.epoch)
        };
        messages.extend(outcome.messages);
        if outcome.field_errors.is_some() {
            field_errors = outcome.field_errors;
        }
        for effect in outcome.effects {
            if let Some(completion) = run_effect(state, handle, effect, epoch).await {
                queue.push_back(completion);
            }
        }
    }

    (messages, field_errors)
}

async fn run_effect(
    state: &AppState,
    handle: &Arc<SessionHandle>,
    effect: Effect,
    epoch: u64,
) -> Option<Event> {
    let window = &state.config.window;
    match effect {
        Effect::LoadDocumentTypes => match state.catalog.document_types().await {
            Ok(list) => Some(Event::DocumentTypesLoaded { epoch, list }),
            Err(error) => catalog_failed(epoch, "los tipos de documento", error),
        },
        Effect::LoadSpecialties => match state.catalog.specialties(window).await {
            Ok(list) => Some(Event::SpecialtiesLoaded { epoch, list }),
            Err(error) => catalog_failed(epoch, "las especialidades", error),
        },
        Effect::LoadDoctors { specialty } => match state.catalog.doctors(&specialty, window).await {
            Ok(list) => Some(Event::DoctorsLoaded { epoch, list }),
            Err(error) => catalog_failed(epoch, "los médicos", error),
        },
        Effect::LoadDates { specialty, shift } => {
            match state.catalog.dates(&specialty, shift, window).await {
                Ok(list) => Some(Event::DatesLoaded { epoch, list }),
                Err(error) => catalog_failed(epoch, "las fechas disponibles", error),
            }
        }
        Effect::LoadSlots { specialty, date, shift, doctor, hour_range } => {
            match state
                .catalog
                .slots(&specialty, date, shift, doctor.as_deref(), hour_range)
                .await
            {
                Ok(list) => Some(Event::SlotsLoaded { epoch, list }),
                Err(error) => catalog_failed(epoch, "los horarios", error),
            }
        }
        Effect::ExtractIntent { text, step } => match state.intents.extract(&text, step).await {
            Ok(extracted) => Some(Event::IntentResolved { epoch, extracted }),
            Err(error) => {
                tracing::warn!(%error, "intent matcher unavailable");
                Some(Event::IntentUnavailable { epoch })
            }
        },
        Effect::RefreshSession => match state.booking.issue_token().await {
            Ok(token) => {
                handle.timer.start(token);
                Some(Event::SessionReady { epoch })
            }
            Err(error) => {
                tracing::error!(%error, "could not open a booking session");
                Some(Event::SessionFailed { epoch })
            }
        },
        Effect::CancelSession => {
            handle.timer.cancel();
            None
        }
        Effect::Submit { request } => {
            // the token is a credential, never part of the body
            let Some(token) = handle.timer.token() else {
                tracing::error!("submission requested without an active session token");
                return Some(Event::SessionFailed { epoch });
            };
            match state.booking.submit(&request, &token).await {
                Ok(receipt) => Some(Event::SubmitAccepted { epoch, receipt }),
                Err(SubmitError::Rejected(reason)) => {
                    tracing::warn!(%reason, "booking backend rejected the request");
                    Some(Event::SubmitRejected { epoch, reason: Some(reason) })
                }
                Err(SubmitError::Transport(error)) => {
                    tracing::error!(%error, "booking submission failed");
                    Some(Event::SubmitRejected { epoch, reason: None })
                }
            }
        }
        Effect::AttachReference { booking_code, filename, content_base64 } => {
            // best effort: the request itself is already registered
            if let Err(error) = state
                .booking
                .attach_reference(&booking_code, &filename, &content_base64)
                .await
            {
                tracing::warn!(%error, %booking_code, "could not forward the reference sheet");
            }
            None
        }
    }
}

fn catalog_failed(epoch: u64, what: &'static str, error: anyhow::Error) -> Option<Event> {
    tracing::error!(%error, what, "catalog request failed");
    Some(Event::CatalogFailed { epoch, what })
}
