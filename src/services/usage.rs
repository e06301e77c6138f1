use chrono::{DateTime, Datelike, Utc};

use crate::models::user::{SubscriptionTier, UsageSnapshot};

/// Outcome of a quota check, carrying the numbers the 429 payload needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadDecision {
    pub allowed: bool,
    pub current_usage: i64,
    pub limit: i64,
}

/// True when `now` falls in a different calendar month (or year) than
/// the snapshot's last reset.
fn month_rolled_over(snapshot: &UsageSnapshot, now: DateTime<Utc>) -> bool {
    now.month() != snapshot.last_month_reset.month()
        || now.year() != snapshot.last_month_reset.year()
}

/// Apply the month rollover if due, returning the effective snapshot.
pub fn rolled_over(snapshot: UsageSnapshot, now: DateTime<Utc>) -> UsageSnapshot {
    if month_rolled_over(&snapshot, now) {
        UsageSnapshot { monthly_uploads: 0, last_month_reset: now, ..snapshot }
    } else {
        snapshot
    }
}

/// Decide whether one more upload fits the tier's monthly quota.
pub fn can_upload(snapshot: UsageSnapshot, tier: SubscriptionTier, now: DateTime<Utc>) -> UploadDecision {
    let effective = rolled_over(snapshot, now);
    let limit = tier.monthly_limit();
    UploadDecision {
        allowed: effective.monthly_uploads < limit,
        current_usage: effective.monthly_uploads,
        limit,
    }
}

/// Count one completed upload, rolling the month first when due.
pub fn record_upload(snapshot: UsageSnapshot, now: DateTime<Utc>) -> UsageSnapshot {
    let effective = rolled_over(snapshot, now);
    UsageSnapshot {
        total_uploads: effective.total_uploads + 1,
        monthly_uploads: effective.monthly_uploads + 1,
        last_month_reset: effective.last_month_reset,
    }
}

/// Uploads left this month, floored at zero.
pub fn remaining_uploads(snapshot: UsageSnapshot, tier: SubscriptionTier, now: DateTime<Utc>) -> i64 {
    let decision = can_upload(snapshot, tier, now);
    (decision.limit - decision.current_usage).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(monthly: i64, total: i64, reset: DateTime<Utc>) -> UsageSnapshot {
        UsageSnapshot { total_uploads: total, monthly_uploads: monthly, last_month_reset: reset }
    }

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn free_tier_allows_under_limit() {
        let d = can_upload(snapshot(9, 9, at(2025, 6, 1)), SubscriptionTier::Free, at(2025, 6, 15));
        assert!(d.allowed);
        assert_eq!(d.current_usage, 9);
        assert_eq!(d.limit, 10);
    }

    #[test]
    fn free_tier_blocks_at_limit() {
        let d = can_upload(snapshot(10, 10, at(2025, 6, 1)), SubscriptionTier::Free, at(2025, 6, 15));
        assert!(!d.allowed);
        assert_eq!(d.current_usage, 10);
        assert_eq!(d.limit, 10);
    }

    #[test]
    fn new_month_resets_monthly_counter() {
        let d = can_upload(snapshot(10, 10, at(2025, 6, 1)), SubscriptionTier::Free, at(2025, 7, 1));
        assert!(d.allowed);
        assert_eq!(d.current_usage, 0);
    }

    #[test]
    fn year_boundary_counts_as_rollover() {
        // Same month number, different year.
        let d = can_upload(
            snapshot(10, 120, at(2024, 12, 31)),
            SubscriptionTier::Free,
            at(2025, 12, 1),
        );
        assert!(d.allowed);
        assert_eq!(d.current_usage, 0);
    }

    #[test]
    fn record_upload_increments_both_counters() {
        let next = record_upload(snapshot(3, 40, at(2025, 6, 1)), at(2025, 6, 15));
        assert_eq!(next.monthly_uploads, 4);
        assert_eq!(next.total_uploads, 41);
        assert_eq!(next.last_month_reset, at(2025, 6, 1));
    }

    #[test]
    fn record_upload_across_rollover_starts_at_one() {
        let next = record_upload(snapshot(10, 40, at(2025, 6, 1)), at(2025, 7, 2));
        assert_eq!(next.monthly_uploads, 1);
        assert_eq!(next.total_uploads, 41);
        assert_eq!(next.last_month_reset, at(2025, 7, 2));
    }

    #[test]
    fn remaining_never_negative() {
        // Counter overshot the limit (e.g. after a tier downgrade).
        let left = remaining_uploads(snapshot(150, 150, at(2025, 6, 1)), SubscriptionTier::Basic, at(2025, 6, 20));
        assert_eq!(left, 0);
    }

    #[test]
    fn premium_limit_applies() {
        let d = can_upload(snapshot(999, 999, at(2025, 6, 1)), SubscriptionTier::Premium, at(2025, 6, 15));
        assert!(d.allowed);
        let d = can_upload(snapshot(1000, 1000, at(2025, 6, 1)), SubscriptionTier::Premium, at(2025, 6, 15));
        assert!(!d.allowed);
    }
}
