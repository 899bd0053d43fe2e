//! Per-session conversation history.
//!
//! The store keeps an ordered, bounded list of turns for each session id and
//! forgets sessions that have been idle for too long:
//!
//! ```rust,ignore
//! use llm_relay::session::{SessionStore, SessionLimits};
//! use llm_relay::Role;
//!
//! let store = SessionStore::with_limits(SessionLimits::default().with_max_turns(2));
//! store.append("s2", Role::User, "a");
//! store.append("s2", Role::User, "b");
//! store.append("s2", Role::User, "c");
//!
//! // "a" was evicted
//! let context = store.context_window("s2", 20);
//! assert_eq!(context.len(), 2);
//! ```
//!
//! Expired sessions are dropped lazily on access and in bulk by
//! [`SessionSweeper`]. [`SnapshotStore`] is an optional best-effort
//! persistence hook.

mod snapshot;
mod store;
mod sweeper;
mod types;

pub use snapshot::{JsonFileSnapshots, SnapshotStore};
pub use store::{
    generate_session_id, SessionLimits, SessionStore, DEFAULT_CONTEXT_WINDOW,
    DEFAULT_MAX_AGE_SECS, DEFAULT_MAX_TURNS,
};
pub use sweeper::{SessionSweeper, SweeperHandle, DEFAULT_SWEEP_INTERVAL};
pub use types::{Pagination, Session, SessionPage, SessionStats, SessionSummary, Turn};
