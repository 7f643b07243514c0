//! Process-wide state shared by every session.

use crate::events::EventLog;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Polling intervals used by the engine and the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Wait before retrying when no transition could be selected.
    pub selection_retry: Duration,
    /// Poll interval while the pause flag is set.
    pub pause_poll: Duration,
    /// Poll interval of [`EventLog::wait_for_event`].
    pub event_poll: Duration,
}

impl Timing {
    pub const DEFAULT_SELECTION_RETRY: Duration = Duration::from_millis(100);
    pub const DEFAULT_PAUSE_POLL: Duration = Duration::from_millis(500);
    pub const DEFAULT_EVENT_POLL: Duration = Duration::from_millis(250);
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            selection_retry: Self::DEFAULT_SELECTION_RETRY,
            pause_poll: Self::DEFAULT_PAUSE_POLL,
            event_poll: Self::DEFAULT_EVENT_POLL,
        }
    }
}

/// Pause flag any hook can set or clear.
///
/// Checked by engines before running a hook; a hook already running is not
/// interrupted.
#[derive(Debug, Default)]
pub struct PauseFlag {
    paused: AtomicBool,
}

impl PauseFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        tracing::info!("pause requested for all sessions");
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        tracing::info!("resume requested for all sessions");
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Sleeps in `interval` steps until the flag is cleared or `cancelled`
    /// returns true. Returns false if it gave up because of cancellation.
    pub fn wait_while_paused(&self, interval: Duration, cancelled: impl Fn() -> bool) -> bool {
        while self.is_paused() {
            if cancelled() {
                return false;
            }
            std::thread::sleep(interval);
        }
        true
    }
}

/// Shared objects handed to every engine.
#[derive(Debug, Default)]
pub struct Shared {
    transition_lock: Mutex<()>,
    pub events: EventLog,
    pub pause: PauseFlag,
    pub timing: Timing,
}

impl Shared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_timing(timing: Timing) -> Arc<Self> {
        Arc::new(Self {
            transition_lock: Mutex::new(()),
            events: EventLog::with_poll_interval(timing.event_poll),
            pause: PauseFlag::new(),
            timing,
        })
    }

    /// Serializes guard evaluation, selection and the action hook across
    /// sessions.
    pub fn lock_transition(&self) -> MutexGuard<'_, ()> {
        self.transition_lock.lock()
    }
}
