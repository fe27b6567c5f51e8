//! Tier system: ordered loyalty tiers derived from lifetime points.
//!
//! Thresholds, earning multipliers, and upgrade bonuses live in one static
//! table indexed by tier rank, so "highest tier whose threshold is met" is a
//! plain scan with no dynamic dispatch.

use crate::types::LoyaltyAccount;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Loyalty tier levels with escalating benefits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyTier {
    /// Entry level. 1x earn rate.
    Bronze,
    /// 500 lifetime points. 1.25x earn rate.
    Silver,
    /// 1500 lifetime points. 1.5x earn rate.
    Gold,
    /// 3000 lifetime points. 2x earn rate.
    Platinum,
}

impl Default for LoyaltyTier {
    fn default() -> Self {
        LoyaltyTier::Bronze
    }
}

struct TierRow {
    tier: LoyaltyTier,
    threshold: i64,
    multiplier: f64,
    upgrade_bonus: i64,
}

/// Ordered by rank; thresholds must be strictly increasing.
const TIER_TABLE: [TierRow; 4] = [
    TierRow { tier: LoyaltyTier::Bronze, threshold: 0, multiplier: 1.0, upgrade_bonus: 0 },
    TierRow { tier: LoyaltyTier::Silver, threshold: 500, multiplier: 1.25, upgrade_bonus: 100 },
    TierRow { tier: LoyaltyTier::Gold, threshold: 1500, multiplier: 1.5, upgrade_bonus: 250 },
    TierRow { tier: LoyaltyTier::Platinum, threshold: 3000, multiplier: 2.0, upgrade_bonus: 500 },
];

impl LoyaltyTier {
    fn rank(self) -> usize {
        match self {
            LoyaltyTier::Bronze => 0,
            LoyaltyTier::Silver => 1,
            LoyaltyTier::Gold => 2,
            LoyaltyTier::Platinum => 3,
        }
    }

    /// Lifetime points required to hold this tier.
    pub fn threshold(self) -> i64 {
        TIER_TABLE[self.rank()].threshold
    }

    /// Points multiplier applied to awards while at this tier.
    pub fn earn_multiplier(self) -> f64 {
        TIER_TABLE[self.rank()].multiplier
    }

    /// One-time bonus granted on upgrading into this tier.
    pub fn upgrade_bonus(self) -> i64 {
        TIER_TABLE[self.rank()].upgrade_bonus
    }

    /// The tier one rank above, or `None` at the top.
    pub fn next(self) -> Option<LoyaltyTier> {
        TIER_TABLE.get(self.rank() + 1).map(|row| row.tier)
    }

    /// Highest tier whose threshold is met by `lifetime_points`.
    pub fn for_lifetime_points(lifetime_points: i64) -> LoyaltyTier {
        TIER_TABLE
            .iter()
            .rev()
            .find(|row| lifetime_points >= row.threshold)
            .map(|row| row.tier)
            .unwrap_or(LoyaltyTier::Bronze)
    }
}

/// Result of a tier upgrade: the tier entered and its one-time bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierUpgrade {
    pub tier: LoyaltyTier,
    pub bonus: i64,
}

/// Derives tiers from lifetime points. Pure computation, no I/O.
pub struct TierEngine;

impl TierEngine {
    pub fn new() -> Self {
        debug_assert!(
            TIER_TABLE.windows(2).all(|w| w[0].threshold < w[1].threshold),
            "tier thresholds must be strictly increasing"
        );
        Self
    }

    /// Advance `account` one tier if its lifetime points have outgrown the
    /// current one. Returns the upgrade bonus for the tier entered; the caller
    /// cascades by awarding the bonus and recomputing again. A recompute at an
    /// unchanged lifetime total that already settled is a no-op.
    pub fn recompute(&self, account: &mut LoyaltyAccount) -> Option<TierUpgrade> {
        let target = LoyaltyTier::for_lifetime_points(account.lifetime_points);
        if target <= account.tier {
            return None;
        }
        let old_tier = account.tier;
        let new_tier = account.tier.next()?;

        account.tier = new_tier;
        account.points_multiplier = new_tier.earn_multiplier();
        account.next_tier_threshold = new_tier.next().map(|t| t.threshold());

        metrics::counter!("loyalty.tier_upgrades").increment(1);
        info!(
            account_id = %account.id,
            old = ?old_tier,
            new = ?new_tier,
            lifetime_points = account.lifetime_points,
            "Tier upgrade"
        );

        Some(TierUpgrade {
            tier: new_tier,
            bonus: new_tier.upgrade_bonus(),
        })
    }
}

impl Default for TierEngine {
    fn default() -> Self {
        Self::new()
    }
}
