//! Remote session tracking for the external-presence override

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};
use log::{debug, info};

use crate::activity::{ActivitySignal, ActivitySource};

/// Sessions expire after this much silence.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(300);
/// Expired sessions are pruned at this interval.
pub const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

const MAX_SESSIONS: usize = 8;

#[derive(Debug, Clone, Copy)]
struct Session {
    client: u32,
    last_seen: Instant,
}

/// Tracks recently active remote clients.
///
/// While any session is live the power controller holds presence-honouring
/// domains awake.
pub struct SessionTracker<M: RawMutex> {
    sessions: Mutex<M, RefCell<heapless::Vec<Session, MAX_SESSIONS>>>,
    timeout: Duration,
}

impl<M: RawMutex> SessionTracker<M> {
    pub const fn new(timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(RefCell::new(heapless::Vec::new())),
            timeout,
        }
    }

    /// Record an access from `client` and report it as activity.
    pub fn register_access(&self, client: u32, now: Instant, activity: &ActivitySignal<M>) {
        let is_new = self.sessions.lock(|sessions| {
            let mut sessions = sessions.borrow_mut();
            if let Some(session) = sessions.iter_mut().find(|s| s.client == client) {
                session.last_seen = now;
                return false;
            }
            let session = Session {
                client,
                last_seen: now,
            };
            if sessions.push(session).is_err() {
                // Full: replace the least recently seen client.
                if let Some(oldest) = sessions.iter_mut().min_by_key(|s| s.last_seen) {
                    *oldest = session;
                }
            }
            true
        });

        if is_new {
            info!(" Session: new client {:08x}", client);
        }
        activity.touch_at(now, ActivitySource::NetworkSession);
    }

    /// Drop expired sessions, returning how many were removed.
    pub fn prune(&self, now: Instant) -> usize {
        let removed = self.sessions.lock(|sessions| {
            let mut sessions = sessions.borrow_mut();
            let before = sessions.len();
            sessions.retain(|s| now.saturating_duration_since(s.last_seen) <= self.timeout);
            before - sessions.len()
        });
        if removed > 0 {
            debug!(" Session: pruned {} expired", removed);
        }
        removed
    }

    /// Whether any session is still live at `now`.
    pub fn has_active(&self, now: Instant) -> bool {
        self.sessions.lock(|sessions| {
            sessions
                .borrow()
                .iter()
                .any(|s| now.saturating_duration_since(s.last_seen) <= self.timeout)
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.lock(|sessions| sessions.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
