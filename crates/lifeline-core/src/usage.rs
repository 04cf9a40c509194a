// ── Backup usage accounting ──
//
// Pure bookkeeping over session open/close edges, for the billing
// display. Counters cover one calendar month; a session spanning the
// boundary is attributed wholly to the month it closes in.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::model::BackupSession;

/// Aggregated backup usage for the current calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Total hours of closed backup sessions this month.
    pub monthly_hours: f64,
    /// Number of closed backup sessions this month.
    pub monthly_usages: u32,
    /// First day of the month the counters cover. `None` until a session
    /// has been accounted.
    pub period: Option<NaiveDate>,
}

impl UsageSummary {
    fn empty() -> Self {
        Self {
            monthly_hours: 0.0,
            monthly_usages: 0,
            period: None,
        }
    }
}

impl Default for UsageSummary {
    fn default() -> Self {
        Self::empty()
    }
}

/// Accumulates session durations into monthly counters and publishes the
/// running summary through a `watch` channel.
pub struct UsageAccumulator {
    summary: UsageSummary,
    /// Start of the currently-open session, if any. Exposed so a
    /// dashboard can render live session time; not counted until close.
    open_session_started: Option<DateTime<Utc>>,
    publisher: Option<watch::Sender<UsageSummary>>,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self {
            summary: UsageSummary::empty(),
            open_session_started: None,
            publisher: None,
        }
    }

    /// Publish every summary change through `tx`.
    pub fn with_publisher(tx: watch::Sender<UsageSummary>) -> Self {
        Self {
            publisher: Some(tx),
            ..Self::new()
        }
    }

    pub fn summary(&self) -> &UsageSummary {
        &self.summary
    }

    /// Start of the currently-open session, if any.
    pub fn open_session_started(&self) -> Option<DateTime<Utc>> {
        self.open_session_started
    }

    /// A session opened. No counters move until it closes.
    pub fn on_session_opened(&mut self, session: &BackupSession) {
        self.open_session_started = Some(session.started_at);
    }

    /// A session closed: attribute it to the month of `ended_at`,
    /// resetting the counters when that month is newer than the current
    /// period.
    pub fn on_session_closed(&mut self, session: &BackupSession) {
        self.open_session_started = None;

        let Some(ended_at) = session.ended_at else {
            warn!(session = %session.id, "session closed without an end timestamp");
            return;
        };
        let Some(duration) = session.duration() else {
            return;
        };

        let period = month_of(ended_at);
        match self.summary.period {
            None => self.summary.period = Some(period),
            Some(current) if period > current => {
                debug!(%period, "monthly usage counters reset");
                self.summary = UsageSummary {
                    period: Some(period),
                    ..UsageSummary::empty()
                };
            }
            Some(current) if period < current => {
                // Late-arriving close from a previous month; count it
                // against the current period rather than losing it.
                warn!(%period, %current, "session closed in a past month");
            }
            Some(_) => {}
        }

        self.summary.monthly_hours += duration.num_seconds() as f64 / 3600.0;
        self.summary.monthly_usages += 1;
        debug!(
            hours = self.summary.monthly_hours,
            usages = self.summary.monthly_usages,
            "backup usage updated"
        );

        if let Some(ref tx) = self.publisher {
            tx.send_replace(self.summary.clone());
        }
    }
}

impl Default for UsageAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// First day of the month containing `at`.
fn month_of(at: DateTime<Utc>) -> NaiveDate {
    let date = at.date_naive();
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn closed_session(
        (y, mo, d, h, mi): (i32, u32, u32, u32, u32),
        minutes: i64,
    ) -> BackupSession {
        let start = Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap();
        let mut session = BackupSession::open_at(start, true);
        session.close(start + chrono::Duration::minutes(minutes));
        session
    }

    #[test]
    fn two_sessions_in_one_month_accumulate() {
        let mut usage = UsageAccumulator::new();

        let first = closed_session((2025, 3, 10, 10, 0), 30);
        let second = closed_session((2025, 3, 10, 10, 45), 15);

        usage.on_session_opened(&first);
        usage.on_session_closed(&first);
        usage.on_session_opened(&second);
        usage.on_session_closed(&second);

        assert_eq!(usage.summary().monthly_hours, 0.75);
        assert_eq!(usage.summary().monthly_usages, 2);
        assert_eq!(
            usage.summary().period,
            Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
        );
    }

    #[test]
    fn counters_reset_on_month_rollover() {
        let mut usage = UsageAccumulator::new();

        usage.on_session_closed(&closed_session((2025, 1, 20, 9, 0), 60));
        assert_eq!(usage.summary().monthly_usages, 1);

        usage.on_session_closed(&closed_session((2025, 2, 2, 9, 0), 30));
        assert_eq!(usage.summary().monthly_hours, 0.5);
        assert_eq!(usage.summary().monthly_usages, 1);
        assert_eq!(
            usage.summary().period,
            Some(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap())
        );
    }

    #[test]
    fn boundary_spanning_session_counts_toward_closing_month() {
        let mut usage = UsageAccumulator::new();

        // Some January usage first.
        usage.on_session_closed(&closed_session((2025, 1, 30, 12, 0), 60));

        // Opens Jan 31 23:30, closes Feb 1 00:30 -- belongs to February,
        // and the January counters are gone.
        let start = Utc.with_ymd_and_hms(2025, 1, 31, 23, 30, 0).unwrap();
        let mut spanning = BackupSession::open_at(start, false);
        spanning.close(start + chrono::Duration::hours(1));
        usage.on_session_closed(&spanning);

        assert_eq!(usage.summary().monthly_hours, 1.0);
        assert_eq!(usage.summary().monthly_usages, 1);
        assert_eq!(
            usage.summary().period,
            Some(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap())
        );
    }

    #[test]
    fn open_session_moves_no_counters() {
        let mut usage = UsageAccumulator::new();
        let session = BackupSession::open(true);
        usage.on_session_opened(&session);

        assert_eq!(usage.summary().monthly_usages, 0);
        assert_eq!(usage.summary().monthly_hours, 0.0);
        assert_eq!(usage.open_session_started(), Some(session.started_at));
    }

    #[test]
    fn publisher_sees_every_update() {
        let (tx, rx) = watch::channel(UsageSummary::default());
        let mut usage = UsageAccumulator::with_publisher(tx);

        usage.on_session_closed(&closed_session((2025, 5, 1, 8, 0), 90));

        assert_eq!(rx.borrow().monthly_hours, 1.5);
        assert_eq!(rx.borrow().monthly_usages, 1);
    }
}
