// ── Backup sessions ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One continuous interval during which the backup path carried traffic.
///
/// Owned exclusively by the engine; the usage accumulator and
/// presentation layer only ever read copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    /// `None` while the session is still active.
    pub ended_at: Option<DateTime<Utc>>,
    /// Whether the engine opened this session on its own (auto-activation)
    /// rather than on a user command.
    pub triggered_automatically: bool,
}

impl BackupSession {
    /// Open a new session starting now.
    pub fn open(triggered_automatically: bool) -> Self {
        Self::open_at(Utc::now(), triggered_automatically)
    }

    /// Open a new session at an explicit instant.
    pub fn open_at(started_at: DateTime<Utc>, triggered_automatically: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            ended_at: None,
            triggered_automatically,
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Close the session at `at`. Closing an already-closed session keeps
    /// the original end.
    pub fn close(&mut self, at: DateTime<Utc>) {
        if self.ended_at.is_none() {
            self.ended_at = Some(at);
        }
    }

    /// Duration of a closed session; `None` while still open.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn open_session_has_no_duration() {
        let session = BackupSession::open(true);
        assert!(session.is_open());
        assert_eq!(session.duration(), None);
    }

    #[test]
    fn closed_session_reports_duration() {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap();
        let mut session = BackupSession::open_at(start, false);
        session.close(start + chrono::Duration::minutes(30));

        assert!(!session.is_open());
        assert_eq!(session.duration(), Some(chrono::Duration::minutes(30)));
    }

    #[test]
    fn double_close_keeps_first_end() {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap();
        let mut session = BackupSession::open_at(start, true);
        session.close(start + chrono::Duration::minutes(10));
        session.close(start + chrono::Duration::minutes(45));

        assert_eq!(session.duration(), Some(chrono::Duration::minutes(10)));
    }
}
