//! In-memory session store with bounded length and bounded age.
//!
//! Sessions live in a sharded concurrent map. Every mutation goes through the
//! map's per-key entry lock, so a read-modify-write on one session is atomic
//! with respect to any other operation on that session, and operations on
//! different sessions proceed in parallel.

use chrono::{Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{Pagination, Session, SessionPage, SessionStats, Turn};
use crate::message::{ContextMessage, Role};

/// Default maximum turns kept per session.
pub const DEFAULT_MAX_TURNS: usize = 50;

/// Default maximum idle age of a session, in seconds (24h).
pub const DEFAULT_MAX_AGE_SECS: i64 = 24 * 60 * 60;

/// Default number of turns sent to a provider as context.
pub const DEFAULT_CONTEXT_WINDOW: usize = 20;

/// Default page size for session listings.
const DEFAULT_PAGE_LIMIT: usize = 10;

/// Length of the random component of generated session ids.
const SESSION_ID_RANDOM_CHARS: usize = 12;

/// Limits applied by a [`SessionStore`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionLimits {
    /// Maximum turns per session; older turns are discarded beyond this
    pub max_turns: usize,
    /// Idle age after which a session is expired
    pub max_age: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            max_age: Duration::seconds(DEFAULT_MAX_AGE_SECS),
        }
    }
}

impl SessionLimits {
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

/// Process-lifetime store of per-session turn history.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    limits: SessionLimits,
}

impl SessionStore {
    /// Create a store with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with custom limits.
    pub fn with_limits(limits: SessionLimits) -> Self {
        Self {
            sessions: DashMap::new(),
            limits,
        }
    }

    /// Lock the entry for `id`, replacing it with a fresh session if absent or expired.
    fn live_entry(&self, id: &str) -> RefMut<'_, String, Session> {
        let now = Utc::now();
        let mut entry = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id));

        if entry.is_expired_at(now, self.limits.max_age) {
            debug!(session_id = %id, "Replacing expired session");
            *entry = Session::new(id);
        }

        entry
    }

    /// Run `f` against a live session without creating one.
    ///
    /// An expired entry is removed and reported as absent.
    fn read<T>(&self, id: &str, f: impl FnOnce(&Session) -> T) -> Option<T> {
        let now = Utc::now();
        {
            let session = self.sessions.get(id)?;
            if !session.is_expired_at(now, self.limits.max_age) {
                return Some(f(session.value()));
            }
        }

        self.sessions
            .remove_if(id, |_, s| s.is_expired_at(now, self.limits.max_age));
        None
    }

    /// Return the live session for `id`, creating an empty one if needed.
    ///
    /// An expired session is discarded and a fresh one substituted.
    pub fn get_or_create(&self, id: &str) -> Session {
        self.live_entry(id).value().clone()
    }

    /// Return the live session for `id` without creating one.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.read(id, Session::clone)
    }

    /// Whether a live session exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.read(id, |_| ()).is_some()
    }

    /// Append a turn and return the updated session.
    pub fn append(&self, id: &str, role: Role, content: impl Into<String>) -> Session {
        let mut entry = self.live_entry(id);
        entry.push(Turn::new(role, content), self.limits.max_turns);
        entry.value().clone()
    }

    /// Append a turn and return the context window of the turns that preceded it.
    ///
    /// Both steps happen under the same per-session lock.
    pub fn append_with_context(
        &self,
        id: &str,
        role: Role,
        content: impl Into<String>,
        window: usize,
    ) -> Vec<ContextMessage> {
        let mut entry = self.live_entry(id);
        let context = entry.context(window);
        entry.push(Turn::new(role, content), self.limits.max_turns);
        context
    }

    /// The most recent `window` turns of a session, role and content only.
    pub fn context_window(&self, id: &str, window: usize) -> Vec<ContextMessage> {
        self.read(id, |s| s.context(window)).unwrap_or_default()
    }

    /// Remove every expired session. Returns the number removed.
    ///
    /// The cutoff is computed once up front; each entry is re-checked under its
    /// shard lock, so a session touched after the cutoff survives.
    pub fn expire_sweep(&self) -> usize {
        let now = Utc::now();
        let max_age = self.limits.max_age;
        let mut removed = 0;

        self.sessions.retain(|id, session| {
            if session.is_expired_at(now, max_age) {
                info!(session_id = %id, "Cleaned up expired session");
                removed += 1;
                false
            } else {
                true
            }
        });

        removed
    }

    /// Delete a session. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Insert a session loaded from elsewhere, re-applying the turn bound.
    ///
    /// Returns `false` (and stores nothing) if the session is already expired
    /// or a live session already holds its id.
    pub fn restore(&self, mut session: Session) -> bool {
        let now = Utc::now();
        if session.is_expired_at(now, self.limits.max_age) {
            debug!(session_id = %session.id, "Ignoring expired session on restore");
            return false;
        }

        session.enforce_bound(self.limits.max_turns);
        match self.sessions.entry(session.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
            Entry::Occupied(mut slot) => {
                if !slot.get().is_expired_at(now, self.limits.max_age) {
                    debug!(session_id = %session.id, "Live session kept over snapshot");
                    return false;
                }
                slot.insert(session);
                true
            }
        }
    }

    /// Aggregate statistics over live sessions.
    pub fn stats(&self) -> SessionStats {
        let now = Utc::now();
        let (total_sessions, total_turns) = self
            .sessions
            .iter()
            .filter(|s| !s.is_expired_at(now, self.limits.max_age))
            .fold((0usize, 0usize), |(count, turns), s| (count + 1, turns + s.len()));

        let average_turns_per_session = if total_sessions > 0 {
            total_turns as f64 / total_sessions as f64
        } else {
            0.0
        };

        SessionStats {
            total_sessions,
            total_turns,
            average_turns_per_session,
        }
    }

    /// Page through live sessions, most recently active first.
    ///
    /// `page` is 1-based; zero values fall back to page 1 and a limit of 10.
    pub fn list(&self, page: usize, limit: usize) -> SessionPage {
        let page = page.max(1);
        let limit = if limit == 0 { DEFAULT_PAGE_LIMIT } else { limit };
        let now = Utc::now();

        let mut summaries: Vec<_> = self
            .sessions
            .iter()
            .filter(|s| !s.is_expired_at(now, self.limits.max_age))
            .map(|s| s.summary())
            .collect();
        summaries.sort_by(|a, b| b.last_active.cmp(&a.last_active));

        let total = summaries.len();
        let sessions = summaries
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        SessionPage {
            sessions,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages: total.div_ceil(limit),
            },
        }
    }

    /// Number of stored sessions, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Generate a session id from a caller-supplied seed such as a client address.
///
/// Format: `{seed}_{unix_millis}_{random}`, with every non-alphanumeric seed
/// character replaced by `_`.
pub fn generate_session_id(seed: &str) -> String {
    let seed = if seed.is_empty() { "anonymous" } else { seed };
    let sanitized: String = seed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    let random: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SESSION_ID_RANDOM_CHARS)
        .collect();

    format!("{}_{}_{}", sanitized, Utc::now().timestamp_millis(), random)
}
