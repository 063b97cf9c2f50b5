use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{BotMessage, StepView, UiEvent};
use crate::services::validation::FieldErrors;
use crate::services::{engine, runner};
use crate::state::AppState;

/// Decoded attachments are capped at 1 MB; base64 text is a third larger.
/// Oversized bodies are refused before they reach the flow.
const ATTACHMENT_MAX_BASE64_BYTES: usize = 1_400_000;
/// Free text goes to the intent matcher, which has no business reading
/// more than a short utterance.
const FREE_TEXT_MAX_CHARS: usize = 1000;

#[derive(Serialize)]
pub struct ConversationCreated {
    pub id: Uuid,
    pub messages: Vec<BotMessage>,
    pub view: StepView,
}

#[derive(Serialize)]
pub struct EventResponse {
    pub messages: Vec<BotMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<FieldErrors>,
    pub view: StepView,
}

// POST /api/conversations
pub async fn create_conversation(State(state): State<Arc<AppState>>) -> Json<ConversationCreated> {
    let (id, handle) = state.sessions.create();
    tracing::info!(conversation = %id, "conversation opened");
    let view = handle.conversation.lock().unwrap().view();
    Json(ConversationCreated {
        id,
        messages: engine::greet(),
        view,
    })
}

// POST /api/conversations/:id/events
pub async fn post_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(event): Json<UiEvent>,
) -> Result<Json<EventResponse>, AppError> {
    let handle = state
        .sessions
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("conversation {id}")))?;

    match &event {
        UiEvent::FileAttached { content_base64, .. }
            if content_base64.len() > ATTACHMENT_MAX_BASE64_BYTES =>
        {
            return Err(AppError::PayloadTooLarge(
                "attachments are limited to 1 MB".to_string(),
            ));
        }
        UiEvent::FreeTextEntered { text } if text.chars().count() > FREE_TEXT_MAX_CHARS => {
            return Err(AppError::BadRequest(
                format!("messages are limited to {FREE_TEXT_MAX_CHARS} characters"),
            ));
        }
        _ => {}
    }

    let (messages, field_errors) = runner::dispatch(&state, &handle, event).await;

    let view = {
        let mut conv = handle.conversation.lock().unwrap();
        let mut view = conv.view();
        // a pending notice rides along once, on the next response
        view.notice = conv.notice.take();
        view
    };
    Ok(Json(EventResponse { messages, field_errors, view }))
}

// GET /api/conversations/:id
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<EventResponse>, AppError> {
    let handle = state
        .sessions
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("conversation {id}")))?;
    // read-only resync: rebuild the current prompt, leave the notice alone
    let (messages, view) = {
        let conv = handle.conversation.lock().unwrap();
        (engine::reprompt(&conv, &state.config), conv.view())
    };
    Ok(Json(EventResponse {
        messages,
        field_errors: None,
        view,
    }))
}

// DELETE /api/conversations/:id
pub async fn cancel_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .sessions
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("conversation {id}")))?;
    tracing::info!(conversation = %id, "conversation cancelled");
    Ok(Json(serde_json::json!({"cancelled": true})))
}
