use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Seconds a booking session token stays valid.
pub const SESSION_TTL_SECS: i64 = 300;

type ExpiryCallback = Box<dyn Fn() + Send + Sync>;

struct TimerInner {
    token: Option<String>,
    remaining: i64,
    /// Bumped by start() and cancel(). A ticker loop from a superseded
    /// generation can never decrement the countdown or fire expiry.
    generation: u64,
    running: bool,
}

/// Countdown tied to one conversation's booking token. The registered
/// callback fires exactly once per countdown, only when the TTL runs out;
/// cancel() clears everything without notifying.
pub struct SessionTimer {
    inner: Mutex<TimerInner>,
    on_expiry: ExpiryCallback,
}

impl SessionTimer {
    pub fn new(on_expiry: impl Fn() + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(SessionTimer {
            inner: Mutex::new(TimerInner {
                token: None,
                remaining: 0,
                generation: 0,
                running: false,
            }),
            on_expiry: Box::new(on_expiry),
        })
    }

    /// Stores a fresh token and restarts the countdown at the full TTL,
    /// superseding any countdown already running.
    pub fn start(self: &Arc<Self>, token: String) {
        let generation = {
            let mut inner = self.inner.lock().unwrap();
            inner.token = Some(token);
            inner.remaining = SESSION_TTL_SECS;
            inner.generation += 1;
            inner.running = true;
            inner.generation
        };
        let timer = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            // the first tick resolves immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !timer.tick(generation) {
                    break;
                }
            }
        });
    }

    /// One countdown second. Returns false once this generation is done,
    /// either because it hit zero or because it was superseded.
    pub fn tick(&self, generation: u64) -> bool {
        let expired = {
            let mut inner = self.inner.lock().unwrap();
            if inner.generation != generation || !inner.running {
                return false;
            }
            inner.remaining -= 1;
            inner.remaining <= 0
        };
        if expired {
            self.end();
            return false;
        }
        true
    }

    /// Clears the token and countdown and notifies the expiry callback.
    /// A timer that is not running has nothing to end.
    pub fn end(&self) {
        let fire = {
            let mut inner = self.inner.lock().unwrap();
            if inner.running {
                inner.token = None;
                inner.remaining = 0;
                inner.running = false;
                true
            } else {
                false
            }
        };
        if fire {
            (self.on_expiry)();
        }
    }

    /// Clears the token and countdown without notifying anyone. Used when
    /// the token was consumed by a submission or the user walked away.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.token = None;
        inner.remaining = 0;
        inner.running = false;
        inner.generation += 1;
    }

    pub fn token(&self) -> Option<String> {
        self.inner.lock().unwrap().token.clone()
    }

    pub fn remaining_secs(&self) -> i64 {
        self.inner.lock().unwrap().remaining
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().running
    }

    fn current_generation(&self) -> u64 {
        self.inner.lock().unwrap().generation
    }
}
