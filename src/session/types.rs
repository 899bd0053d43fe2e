//! Session and turn types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{ContextMessage, Role};

/// Length of the last-turn preview shown in session listings.
const PREVIEW_CHARS: usize = 100;

/// One role-tagged message in a session. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Strip the timestamp.
    pub fn to_context(&self) -> ContextMessage {
        ContextMessage::new(self.role, self.content.clone())
    }
}

/// Ordered, bounded history of turns for one session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Session {
    /// Create an empty session.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            turns: Vec::new(),
            created_at: now,
            last_active: now,
        }
    }

    /// Whether the session had no activity for longer than `max_age` as of `now`.
    ///
    /// A session touched after `now` is never expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.last_active > max_age
    }

    /// Append a turn, then drop the oldest turns until at most `max_turns` remain.
    ///
    /// The just-appended turn is always kept.
    pub fn push(&mut self, turn: Turn, max_turns: usize) {
        self.last_active = turn.timestamp;
        self.turns.push(turn);
        self.enforce_bound(max_turns);
    }

    /// Drop the oldest turns beyond `max_turns`.
    pub fn enforce_bound(&mut self, max_turns: usize) {
        let max_turns = max_turns.max(1);
        if self.turns.len() > max_turns {
            let excess = self.turns.len() - max_turns;
            self.turns.drain(..excess);
        }
    }

    /// The most recent `window` turns in chronological order, timestamps stripped.
    pub fn context(&self, window: usize) -> Vec<ContextMessage> {
        let start = self.turns.len().saturating_sub(window);
        self.turns[start..].iter().map(Turn::to_context).collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Listing row for this session.
    pub fn summary(&self) -> SessionSummary {
        let preview = match self.turns.last() {
            Some(turn) => {
                let head: String = turn.content.chars().take(PREVIEW_CHARS).collect();
                format!("{}...", head)
            }
            None => "No messages".to_string(),
        };

        SessionSummary {
            id: self.id.clone(),
            message_count: self.turns.len(),
            created_at: self.created_at,
            last_active: self.last_active,
            preview,
        }
    }
}

/// Aggregate statistics over live sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_sessions: usize,
    pub total_turns: usize,
    pub average_turns_per_session: f64,
}

/// One row of a session listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub preview: String,
}

/// Pagination metadata for a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// A page of session summaries, most recently active first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPage {
    #[serde(rename = "conversations")]
    pub sessions: Vec<SessionSummary>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_trims_oldest_first() {
        let mut session = Session::new("s");
        for content in ["a", "b", "c"] {
            session.push(Turn::new(Role::User, content), 2);
        }

        let contents: Vec<_> = session.turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "c"]);
    }

    #[test]
    fn test_push_updates_last_active() {
        let mut session = Session::new("s");
        let turn = Turn::new(Role::User, "hi");
        let stamp = turn.timestamp;
        session.push(turn, 50);
        assert_eq!(session.last_active, stamp);
    }

    #[test]
    fn test_context_takes_most_recent() {
        let mut session = Session::new("s");
        session.push(Turn::new(Role::User, "one"), 50);
        session.push(Turn::new(Role::Assistant, "two"), 50);
        session.push(Turn::new(Role::User, "three"), 50);

        assert_eq!(
            session.context(2),
            vec![
                ContextMessage::assistant("two"),
                ContextMessage::user("three"),
            ]
        );
        assert_eq!(session.context(10).len(), 3);
        assert!(session.context(0).is_empty());
    }

    #[test]
    fn test_expiry_boundary() {
        let session = Session::new("s");
        let max_age = Duration::hours(24);

        assert!(!session.is_expired_at(session.last_active + max_age, max_age));
        assert!(session.is_expired_at(
            session.last_active + max_age + Duration::milliseconds(1),
            max_age
        ));
        // Activity newer than the reference instant is never expired
        assert!(!session.is_expired_at(session.last_active - Duration::hours(1), Duration::zero()));
    }

    #[test]
    fn test_summary_preview() {
        let mut session = Session::new("s");
        assert_eq!(session.summary().preview, "No messages");

        session.push(Turn::new(Role::Assistant, "x".repeat(150)), 50);
        let summary = session.summary();
        assert_eq!(summary.message_count, 1);
        assert_eq!(summary.preview, format!("{}...", "x".repeat(100)));
    }
}
