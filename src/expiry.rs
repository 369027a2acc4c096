//! Expiration policy for cached values

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Seconds since the epoch used as the deadline of [`Expiry::Never`].
///
/// A concrete far-future timestamp rather than "infinity" so the deadline
/// can be written to file metadata and mapped back to `Never` on reload.
const NEVER_EPOCH_SECS: i64 = 60 * 60 * 24 * 365 * 68;

/// When a cached value stops being valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// Never expires
    #[default]
    Never,

    /// Expires the given duration after "now"
    ///
    /// The deadline is recomputed on every call to [`Expiry::deadline`];
    /// use [`Expiry::pinned`] to fix it to an absolute timestamp.
    After(Duration),

    /// Expires at an absolute timestamp
    At(DateTime<Utc>),
}

impl Expiry {
    /// Never expires
    pub fn never() -> Self {
        Expiry::Never
    }

    /// Expires `duration` from now
    pub fn after(duration: Duration) -> Self {
        Expiry::After(duration)
    }

    /// Expires `secs` seconds from now
    pub fn after_secs(secs: u64) -> Self {
        Expiry::After(Duration::from_secs(secs))
    }

    /// Expires at `deadline`
    pub fn at(deadline: DateTime<Utc>) -> Self {
        Expiry::At(deadline)
    }

    /// The sentinel deadline that stands for [`Expiry::Never`]
    pub fn never_deadline() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(NEVER_EPOCH_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Rebuild an expiry from a stored absolute deadline.
    ///
    /// The sentinel maps back to `Never`, anything else to `At`.
    pub fn from_deadline(deadline: DateTime<Utc>) -> Self {
        if deadline == Self::never_deadline() {
            Expiry::Never
        } else {
            Expiry::At(deadline)
        }
    }

    /// Absolute deadline, resolved against the current clock
    pub fn deadline(&self) -> DateTime<Utc> {
        match self {
            Expiry::Never => Self::never_deadline(),
            Expiry::After(duration) => chrono::Duration::from_std(*duration)
                .ok()
                .and_then(|offset| Utc::now().checked_add_signed(offset))
                .unwrap_or_else(Self::never_deadline),
            Expiry::At(deadline) => *deadline,
        }
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.deadline() < Utc::now()
    }

    /// Resolve a relative expiry to the absolute deadline it has right now.
    ///
    /// `Never` and `At` are returned unchanged.
    pub fn pinned(self) -> Self {
        match self {
            Expiry::After(_) => Expiry::At(self.deadline()),
            other => other,
        }
    }

    /// Time left before the deadline, `None` once it has passed
    pub fn remaining(&self) -> Option<Duration> {
        (self.deadline() - Utc::now()).to_std().ok()
    }
}

impl From<Duration> for Expiry {
    fn from(duration: Duration) -> Self {
        Expiry::After(duration)
    }
}

impl From<DateTime<Utc>> for Expiry {
    fn from(deadline: DateTime<Utc>) -> Self {
        Expiry::At(deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_never_round_trips_through_deadline() {
        let deadline = Expiry::Never.deadline();
        assert_eq!(deadline, Expiry::never_deadline());
        assert_eq!(Expiry::from_deadline(deadline), Expiry::Never);
        assert!(!Expiry::Never.is_expired());
    }

    #[test]
    fn test_absolute_deadline_round_trips_as_at() {
        let deadline = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(Expiry::from_deadline(deadline), Expiry::At(deadline));
    }

    #[test]
    fn test_after_is_recomputed_on_each_call() {
        let expiry = Expiry::after(Duration::from_secs(60));
        let first = expiry.deadline();
        sleep(Duration::from_millis(5));
        let second = expiry.deadline();
        assert!(second > first);
        assert!(!expiry.is_expired());
    }

    #[test]
    fn test_pinned_after_expires() {
        let expiry = Expiry::after(Duration::from_millis(20)).pinned();
        assert!(matches!(expiry, Expiry::At(_)));
        assert!(!expiry.is_expired());

        sleep(Duration::from_millis(40));
        assert!(expiry.is_expired());
        assert!(expiry.remaining().is_none());
    }

    #[test]
    fn test_past_timestamp_is_expired() {
        let expiry = Expiry::at(Utc::now() - chrono::Duration::seconds(1));
        assert!(expiry.is_expired());
    }

    #[test]
    fn test_remaining() {
        let expiry = Expiry::after_secs(3600).pinned();
        let left = expiry.remaining().unwrap();
        assert!(left <= Duration::from_secs(3600));
        assert!(left > Duration::from_secs(3590));
    }
}
