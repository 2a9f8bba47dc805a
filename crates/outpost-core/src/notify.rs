//! Transient, self-dismissing sync notifications.
//!
//! One message is visible at a time. Showing a new message replaces the old
//! one and restarts the hide timer for a full duration; messages never queue.
//! Hosts render by polling `message()` or by watching `subscribe()`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::sync::{SyncObserver, SyncOutcome};

/// How long a notification stays visible unless the caller says otherwise.
pub const DEFAULT_DURATION: Duration = Duration::from_millis(2500);

/// Stand-in expiry for durations too long to represent.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub expires_at: Instant,
}

#[derive(Default)]
struct NotifierState {
    current: Option<Notification>,
    hide_timer: Option<JoinHandle<()>>,
    /// Bumped on every show; a hide timer only clears its own message.
    seq: u64,
}

struct Shared {
    state: Mutex<NotifierState>,
    updates: watch::Sender<Option<String>>,
}

/// Clone is cheap; clones share the visible message.
#[derive(Clone)]
pub struct Notifier {
    shared: Arc<Shared>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(NotifierState::default()),
                updates,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NotifierState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn show(&self, message: impl Into<String>) {
        self.show_for(message, DEFAULT_DURATION);
    }

    /// Show `message` for `duration`, superseding whatever is visible.
    ///
    /// Outside a tokio runtime no hide timer is started; the message still
    /// stops being reported once it expires.
    pub fn show_for(&self, message: impl Into<String>, duration: Duration) {
        let message = message.into();
        let mut state = self.lock();

        if let Some(timer) = state.hide_timer.take() {
            timer.abort();
        }
        state.seq += 1;
        let seq = state.seq;
        let now = Instant::now();
        let expires_at = now
            .checked_add(duration)
            .unwrap_or_else(|| now + FAR_FUTURE);
        state.current = Some(Notification {
            message: message.clone(),
            expires_at,
        });

        if tokio::runtime::Handle::try_current().is_ok() {
            let notifier = self.clone();
            state.hide_timer = Some(tokio::spawn(async move {
                tokio::time::sleep_until(expires_at).await;
                notifier.expire(seq);
            }));
        }
        drop(state);

        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        debug!(message = %message, duration_ms = duration_ms, "Notification shown");
        self.shared.updates.send_replace(Some(message));
    }

    fn expire(&self, seq: u64) {
        let mut state = self.lock();
        if state.seq != seq {
            return;
        }
        state.current = None;
        state.hide_timer = None;
        drop(state);
        self.shared.updates.send_replace(None);
    }

    /// The visible notification, if any has not yet expired.
    pub fn current(&self) -> Option<Notification> {
        let state = self.lock();
        state
            .current
            .as_ref()
            .filter(|n| Instant::now() < n.expires_at)
            .cloned()
    }

    pub fn message(&self) -> Option<String> {
        self.current().map(|n| n.message)
    }

    /// Receive the visible message each time it changes (`None` once hidden).
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.shared.updates.subscribe()
    }

    /// Hide immediately and cancel any pending hide timer.
    pub fn unmount(&self) {
        let mut state = self.lock();
        if let Some(timer) = state.hide_timer.take() {
            timer.abort();
        }
        state.seq += 1;
        let had_message = state.current.take().is_some();
        drop(state);
        if had_message {
            self.shared.updates.send_replace(None);
        }
    }

    #[cfg(test)]
    fn has_pending_timer(&self) -> bool {
        self.lock().hide_timer.is_some()
    }
}

impl SyncObserver for Notifier {
    fn on_outcome(&self, outcome: &SyncOutcome) {
        self.show(outcome.message());
    }
}
