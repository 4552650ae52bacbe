//! Types for dealing with time.

use chrono::{TimeZone, Utc};

/// Seconds since the unix epoch. Governance epochs, creation times and vote
/// timestamps are all kept in this unit.
pub type EpochSecs = i64;

/// Proposals whose end epoch lies further in the past than this may be pruned
/// locally.
pub const PROPOSAL_RETENTION_SECS: EpochSecs = 86400 * 30;

/// The current time as unix seconds.
pub fn now_epoch() -> EpochSecs {
    Utc::now().timestamp()
}

/// Render unix seconds as an RFC 3339 string, for logs.
pub fn to_rfc3339(secs: EpochSecs) -> String {
    match Utc.timestamp_opt(secs, 0).single() {
        Some(dt) => dt.to_rfc3339(),
        None => secs.to_string(),
    }
}

/// Check if more than `duration` has elapsed between `start` and `current`.
pub fn elapsed_more_than(
    current: EpochSecs,
    start: EpochSecs,
    duration: EpochSecs,
) -> bool {
    start < current.saturating_sub(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_is_exclusive() {
        let now = 1_700_000_000;
        let start = now - PROPOSAL_RETENTION_SECS;
        assert!(!elapsed_more_than(now, start, PROPOSAL_RETENTION_SECS));
        assert!(elapsed_more_than(now, start - 1, PROPOSAL_RETENTION_SECS));
    }

    #[test]
    fn test_rfc3339() {
        assert_eq!(to_rfc3339(0), "1970-01-01T00:00:00+00:00");
    }
}
