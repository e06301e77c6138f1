use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Account role. Admins may read and delete any receipt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

/// Subscription tier, which determines the monthly upload quota and
/// whether jobs are enqueued at high priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Basic,
    Premium,
}

impl SubscriptionTier {
    /// Uploads allowed per calendar month.
    pub fn monthly_limit(self) -> i64 {
        match self {
            SubscriptionTier::Free => 10,
            SubscriptionTier::Basic => 100,
            SubscriptionTier::Premium => 1000,
        }
    }

    /// Premium uploads jump the queue.
    pub fn is_priority(self) -> bool {
        matches!(self, SubscriptionTier::Premium)
    }
}

/// A registered shopkeeper account.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,

    pub shop_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,

    pub subscription_tier: String,
    pub total_uploads: i64,
    pub monthly_uploads: i64,
    pub last_month_reset: DateTime<Utc>,

    pub last_login: Option<DateTime<Utc>>,
    pub login_count: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> UserRole {
        self.role.parse().unwrap_or(UserRole::User)
    }

    pub fn tier(&self) -> SubscriptionTier {
        self.subscription_tier.parse().unwrap_or(SubscriptionTier::Free)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == UserRole::Admin
    }

    /// Immutable view of the usage counters, for the pure quota logic.
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            total_uploads: self.total_uploads,
            monthly_uploads: self.monthly_uploads,
            last_month_reset: self.last_month_reset,
        }
    }
}

/// Snapshot of a user's upload counters. The quota and month-rollover
/// logic operates on this value and returns a new one; persistence is a
/// separate single-row update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub total_uploads: i64,
    pub monthly_uploads: i64,
    pub last_month_reset: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_limits() {
        assert_eq!(SubscriptionTier::Free.monthly_limit(), 10);
        assert_eq!(SubscriptionTier::Basic.monthly_limit(), 100);
        assert_eq!(SubscriptionTier::Premium.monthly_limit(), 1000);
    }

    #[test]
    fn only_premium_is_priority() {
        assert!(!SubscriptionTier::Free.is_priority());
        assert!(!SubscriptionTier::Basic.is_priority());
        assert!(SubscriptionTier::Premium.is_priority());
    }

    #[test]
    fn tier_round_trips_through_text() {
        let tier: SubscriptionTier = "premium".parse().unwrap();
        assert_eq!(tier, SubscriptionTier::Premium);
        assert_eq!(tier.to_string(), "premium");
    }
}
