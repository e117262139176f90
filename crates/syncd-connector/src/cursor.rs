use chrono::{DateTime, Local, TimeZone, Utc};

/// Cursor state for the log-table ingestor (§4.2.1).
///
/// Starts in *time mode*, anchored at local midnight of the moment the
/// process started — recomputed only on (re)start, never refreshed daily, so
/// a long-running process never silently widens its time-mode window. The
/// first log query that returns any row flips the cursor permanently to *id
/// mode*, where it polls `id > last_committed_id`.
///
/// Holds a *pending* value separate from the *committed* value: a poll
/// computes the pending advance but only [`Cursor::commit`]s it once the
/// batch is fully processed, and [`Cursor::rollback`]s it (discarding the
/// pending value, keeping the last committed one) on unrecoverable failure.
#[derive(Debug, Clone)]
pub enum Cursor {
    Time { last_check_time: DateTime<Utc>, pending: Option<DateTime<Utc>> },
    Id { last_log_id: i64, pending: Option<i64> },
}

impl Cursor {
    /// A fresh cursor anchored at local midnight of `now`.
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        let local_midnight = Local::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time");
        let anchor = Local
            .from_local_datetime(&local_midnight)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now);
        Cursor::Time { last_check_time: anchor, pending: None }
    }

    /// The committed low-water mark used to build the next poll's query.
    pub fn committed_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Cursor::Time { last_check_time, .. } => Some(*last_check_time),
            Cursor::Id { .. } => None,
        }
    }

    pub fn committed_id(&self) -> Option<i64> {
        match self {
            Cursor::Id { last_log_id, .. } => Some(*last_log_id),
            Cursor::Time { .. } => None,
        }
    }

    pub fn is_id_mode(&self) -> bool {
        matches!(self, Cursor::Id { .. })
    }

    /// Prepares a pending advance from a batch of (log_id, log_timestamp)
    /// rows. In time mode, seeing any row flips the cursor to id mode for
    /// good — the log table assigns monotonic ids from here on.
    pub fn prepare(&mut self, rows: &[(i64, DateTime<Utc>)]) {
        if rows.is_empty() {
            return;
        }
        let max_id = rows.iter().map(|(id, _)| *id).max().expect("non-empty");
        match self {
            Cursor::Time { .. } => {
                *self = Cursor::Id { last_log_id: 0, pending: Some(max_id) };
            }
            Cursor::Id { pending, .. } => {
                *pending = Some(pending.map_or(max_id, |p| p.max(max_id)));
            }
        }
    }

    /// Commits the pending advance prepared by [`Cursor::prepare`]. A no-op
    /// when nothing was prepared (e.g. time mode saw zero rows this poll —
    /// `last_check_time` must not advance until a row is seen).
    pub fn commit(&mut self) {
        if let Cursor::Id { last_log_id, pending } = self {
            if let Some(p) = pending.take() {
                *last_log_id = p;
            }
        }
    }

    /// Discards the pending advance, keeping the last committed value. Used
    /// when the detail fetch for a batch exhausts its retries — the batch
    /// will be re-seen on the next poll (dead-letter behavior).
    pub fn rollback(&mut self) {
        match self {
            Cursor::Time { pending, .. } => *pending = None,
            Cursor::Id { pending, .. } => *pending = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn time_mode_does_not_advance_without_rows() {
        let mut c = Cursor::starting_at(Utc::now());
        let before = c.committed_time();
        c.prepare(&[]);
        c.commit();
        assert_eq!(c.committed_time(), before);
        assert!(!c.is_id_mode());
    }

    #[test]
    fn first_batch_flips_to_id_mode() {
        let mut c = Cursor::starting_at(Utc::now());
        c.prepare(&[(1, Utc::now())]);
        assert!(c.is_id_mode());
        // Not committed yet.
        assert_eq!(c.committed_id(), Some(0));
        c.commit();
        assert_eq!(c.committed_id(), Some(1));
    }

    #[test]
    fn id_mode_advances_to_max_of_batch() {
        let mut c = Cursor::starting_at(Utc::now());
        c.prepare(&[(1, Utc::now())]);
        c.commit();
        c.prepare(&[(2, Utc::now()), (3, Utc::now() - Duration::seconds(1))]);
        c.commit();
        assert_eq!(c.committed_id(), Some(3));
    }

    #[test]
    fn rollback_discards_pending_keeps_committed() {
        let mut c = Cursor::starting_at(Utc::now());
        c.prepare(&[(1, Utc::now())]);
        c.commit();
        c.prepare(&[(5, Utc::now())]);
        c.rollback();
        assert_eq!(c.committed_id(), Some(1));
    }
}
