use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::Conversation;
use crate::services::engine;
use crate::services::gateways::{BookingGateway, CatalogGateway, IntentExtractor};
use crate::services::session::SessionTimer;

/// Conversations idle this long get dropped on the next create.
const STALE_AFTER_MINS: i64 = 60;

pub struct AppState {
    pub config: AppConfig,
    pub catalog: Box<dyn CatalogGateway>,
    pub booking: Box<dyn BookingGateway>,
    pub intents: Box<dyn IntentExtractor>,
    pub sessions: SessionStore,
}

/// One live conversation with its serialization lock and token timer.
///
/// `flow_lock` is held across a whole event dispatch, awaits included, so
/// user events are handled one at a time. `conversation` is only ever
/// locked for the synchronous transition call, which lets the expiry
/// callback cut in between an effect being issued and its completion
/// arriving.
pub struct SessionHandle {
    pub conversation: Mutex<Conversation>,
    pub flow_lock: tokio::sync::Mutex<()>,
    pub timer: Arc<SessionTimer>,
}

impl SessionHandle {
    pub fn new(id: Uuid) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<SessionHandle>| {
            let weak = weak.clone();
            SessionHandle {
                conversation: Mutex::new(Conversation::new(id)),
                flow_lock: tokio::sync::Mutex::new(()),
                timer: SessionTimer::new(move || {
                    if let Some(handle) = weak.upgrade() {
                        let mut conv = handle.conversation.lock().unwrap();
                        engine::expire(&mut conv);
                    }
                }),
            }
        })
    }
}

#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<Uuid, Arc<SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh conversation, dropping any that went idle for an
    /// hour first.
    pub fn create(&self) -> (Uuid, Arc<SessionHandle>) {
        let id = Uuid::new_v4();
        let handle = SessionHandle::new(id);
        let mut inner = self.inner.lock().unwrap();
        Self::sweep(&mut inner);
        inner.insert(id, Arc::clone(&handle));
        (id, handle)
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<SessionHandle>> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<SessionHandle>> {
        let handle = self.inner.lock().unwrap().remove(id);
        if let Some(handle) = &handle {
            handle.timer.cancel();
        }
        handle
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    fn sweep(inner: &mut HashMap<Uuid, Arc<SessionHandle>>) {
        let cutoff = Utc::now().naive_utc() - Duration::minutes(STALE_AFTER_MINS);
        inner.retain(|id, handle| {
            let last_activity = handle.conversation.lock().unwrap().last_activity;
            if last_activity < cutoff {
                tracing::info!(conversation = %id, "dropping idle conversation");
                handle.timer.cancel();
                false
            } else {
                true
            }
        });
    }
}
