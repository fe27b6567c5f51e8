//! Loyalty ledger domain types: accounts, ledger transactions, rewards.
//!
//! Accounts aggregate a balance that is always reconcilable against the
//! append-only transaction ledger; rewards are catalog entries whose only
//! field mutated by this engine is the redemption counter.

use crate::tiers::LoyaltyTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Accounts ───────────────────────────────────────────────────────────────

/// One loyalty account per registered user, created lazily on first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyAccount {
    pub id: Uuid,
    pub user_id: String,
    /// Spendable balance. Never negative.
    pub current_points: i64,
    /// All points ever earned. Never decreases; drives tier derivation.
    pub lifetime_points: i64,
    pub tier: LoyaltyTier,
    /// Cached earning multiplier for the current tier.
    pub points_multiplier: f64,
    /// Lifetime points needed for the next tier. `None` at the top tier.
    pub next_tier_threshold: Option<i64>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl LoyaltyAccount {
    /// Fresh account at the entry tier, before any transaction is applied.
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        let tier = LoyaltyTier::Bronze;
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            current_points: 0,
            lifetime_points: 0,
            tier,
            points_multiplier: tier.earn_multiplier(),
            next_tier_threshold: tier.next().map(|t| t.threshold()),
            last_activity: now,
            is_active: true,
            created_at: now,
        }
    }
}

// ─── Ledger Transactions ────────────────────────────────────────────────────

/// The four kinds of ledger entry. Only `Earned` entries carry an expiry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Earned,
    Redeemed,
    Expired,
    Adjusted,
}

/// Why points were earned. Set only on `Earned` entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EarnReason {
    Purchase,
    Booking,
    Review,
    Referral,
    Birthday,
    SignupBonus,
    AdminAdjustment,
}

/// Why points were redeemed. Set only on `Redeemed` entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RedeemReason {
    DiscountPercentage,
    DiscountFixed,
    FreeShipping,
    FreeProduct,
    ClassDiscount,
    Other,
}

/// A signed point delta in an account's ledger.
///
/// Entries are append-only; `is_expired` is the single mutable field and
/// flips false → true exactly once when an expiry sweep compensates the entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: TransactionKind,
    /// Positive for earned/credit adjustments, negative for
    /// redeemed/expired/debit adjustments.
    pub points: i64,
    pub earn_reason: Option<EarnReason>,
    pub redeem_reason: Option<RedeemReason>,
    pub description: String,
    /// Opaque link to an order, booking, or reward. Not deduplicated here.
    pub reference_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    pub created_at: DateTime<Utc>,
}

// ─── Rewards ────────────────────────────────────────────────────────────────

/// What a reward grants when redeemed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    DiscountPercentage,
    DiscountFixed,
    FreeShipping,
    FreeProduct,
    ClassDiscount,
}

impl RewardKind {
    /// Ledger redeem reason recorded when this reward is redeemed.
    pub fn redeem_reason(self) -> RedeemReason {
        match self {
            RewardKind::DiscountPercentage => RedeemReason::DiscountPercentage,
            RewardKind::DiscountFixed => RedeemReason::DiscountFixed,
            RewardKind::FreeShipping => RedeemReason::FreeShipping,
            RewardKind::FreeProduct => RedeemReason::FreeProduct,
            RewardKind::ClassDiscount => RedeemReason::ClassDiscount,
        }
    }
}

/// Optional constraints an administrator can attach to a reward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardConditions {
    pub min_order_amount: Option<f64>,
    pub applicable_categories: Vec<String>,
    /// Empty = no restriction; otherwise the account's tier must be listed.
    pub tier_restriction: Vec<LoyaltyTier>,
}

/// A redeemable catalog entry. Created and edited by an administrative
/// collaborator; this engine only increments `current_redemptions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyReward {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub kind: RewardKind,
    pub points_cost: i64,
    /// Monetary value of the reward (percentage or currency, per kind).
    pub value: f64,
    pub product_id: Option<String>,
    /// `None` = unlimited.
    pub max_redemptions: Option<u32>,
    pub current_redemptions: u32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub conditions: Option<RewardConditions>,
}

impl LoyaltyReward {
    /// Active, inside the validity window, and under the redemption cap.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if self.valid_from.map(|from| now < from).unwrap_or(false) {
            return false;
        }
        if self.valid_until.map(|until| now > until).unwrap_or(false) {
            return false;
        }
        match self.max_redemptions {
            Some(max) => self.current_redemptions < max,
            None => true,
        }
    }

    /// Whether an account at `tier` may redeem this reward.
    pub fn allows_tier(&self, tier: LoyaltyTier) -> bool {
        match &self.conditions {
            Some(c) if !c.tier_restriction.is_empty() => c.tier_restriction.contains(&tier),
            _ => true,
        }
    }
}

// ─── Pagination ─────────────────────────────────────────────────────────────

/// One page of a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_reward() -> LoyaltyReward {
        LoyaltyReward {
            id: Uuid::new_v4(),
            name: "Free shipping".to_string(),
            description: "Free shipping on your next order".to_string(),
            kind: RewardKind::FreeShipping,
            points_cost: 250,
            value: 7.50,
            product_id: None,
            max_redemptions: None,
            current_redemptions: 0,
            valid_from: None,
            valid_until: None,
            is_active: true,
            conditions: None,
        }
    }

    #[test]
    fn test_new_account_defaults() {
        let account = LoyaltyAccount::new("user-1");
        assert_eq!(account.current_points, 0);
        assert_eq!(account.lifetime_points, 0);
        assert_eq!(account.tier, LoyaltyTier::Bronze);
        assert_eq!(account.points_multiplier, 1.0);
        assert_eq!(account.next_tier_threshold, Some(500));
        assert!(account.is_active);
    }

    #[test]
    fn test_reward_availability_window() {
        let now = Utc::now();
        let mut reward = base_reward();
        assert!(reward.is_available(now));

        reward.valid_from = Some(now + Duration::days(1));
        assert!(!reward.is_available(now));

        reward.valid_from = Some(now - Duration::days(2));
        reward.valid_until = Some(now - Duration::days(1));
        assert!(!reward.is_available(now));

        reward.valid_until = Some(now + Duration::days(1));
        assert!(reward.is_available(now));
    }

    #[test]
    fn test_reward_availability_cap_and_active_flag() {
        let now = Utc::now();
        let mut reward = base_reward();
        reward.max_redemptions = Some(1);
        assert!(reward.is_available(now));

        reward.current_redemptions = 1;
        assert!(!reward.is_available(now));

        reward.max_redemptions = None;
        assert!(reward.is_available(now));

        reward.is_active = false;
        assert!(!reward.is_available(now));
    }

    #[test]
    fn test_reward_tier_restriction() {
        let mut reward = base_reward();
        assert!(reward.allows_tier(LoyaltyTier::Bronze));

        reward.conditions = Some(RewardConditions {
            tier_restriction: vec![LoyaltyTier::Gold, LoyaltyTier::Platinum],
            ..Default::default()
        });
        assert!(!reward.allows_tier(LoyaltyTier::Silver));
        assert!(reward.allows_tier(LoyaltyTier::Gold));

        // Empty restriction list means open to everyone.
        reward.conditions = Some(RewardConditions::default());
        assert!(reward.allows_tier(LoyaltyTier::Bronze));
    }
}
