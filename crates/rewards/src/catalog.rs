//! Reward catalog: redeemable perks with costs, validity windows, and
//! redemption caps.
//!
//! Balance mutation is delegated to the account manager; the only reward
//! field this engine mutates is `current_redemptions`, and the reward's map
//! entry guard is held across the whole check-redeem-increment sequence so a
//! cap can never be over-run by concurrent redemptions.

use chrono::Utc;
use dashmap::DashMap;
use loyalty_core::error::{LoyaltyError, LoyaltyResult};
use loyalty_core::tiers::LoyaltyTier;
use loyalty_core::types::{LoyaltyReward, LoyaltyTransaction, RewardConditions, RewardKind};
use loyalty_ledger::AccountManager;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Thread-safe reward catalog backed by `DashMap`.
pub struct RewardCatalog {
    rewards: DashMap<Uuid, LoyaltyReward>,
    accounts: Arc<AccountManager>,
}

impl RewardCatalog {
    pub fn new(accounts: Arc<AccountManager>) -> Self {
        Self {
            rewards: DashMap::new(),
            accounts,
        }
    }

    // ─── Administrative surface ─────────────────────────────────────────────

    pub fn upsert(&self, reward: LoyaltyReward) {
        self.rewards.insert(reward.id, reward);
    }

    pub fn get(&self, reward_id: Uuid) -> Option<LoyaltyReward> {
        self.rewards.get(&reward_id).map(|r| r.value().clone())
    }

    // ─── Listing ────────────────────────────────────────────────────────────

    /// Currently available rewards, cheapest first. With a tier given, only
    /// rewards open to that tier are returned.
    pub fn list_available(&self, tier: Option<LoyaltyTier>) -> Vec<LoyaltyReward> {
        let now = Utc::now();
        let mut rewards: Vec<LoyaltyReward> = self
            .rewards
            .iter()
            .filter(|r| r.value().is_available(now))
            .filter(|r| tier.map(|t| r.value().allows_tier(t)).unwrap_or(true))
            .map(|r| r.value().clone())
            .collect();
        rewards.sort_by_key(|r| r.points_cost);
        rewards
    }

    // ─── Redemption ─────────────────────────────────────────────────────────

    /// Redeem a reward for an account: checks availability and tier, deducts
    /// the point cost through the account manager, and increments the
    /// redemption counter only on success.
    pub fn redeem(
        &self,
        account_id: Uuid,
        reward_id: Uuid,
    ) -> LoyaltyResult<(LoyaltyTransaction, LoyaltyReward)> {
        let mut entry = self
            .rewards
            .get_mut(&reward_id)
            .ok_or_else(|| LoyaltyError::NotFound(format!("reward {reward_id}")))?;
        let reward = entry.value_mut();

        if !reward.is_available(Utc::now()) {
            return Err(LoyaltyError::RewardUnavailable(reward.name.clone()));
        }

        let account = self.accounts.get_account(account_id)?;
        if !reward.allows_tier(account.tier) {
            let required = reward
                .conditions
                .as_ref()
                .map(|c| c.tier_restriction.clone())
                .unwrap_or_default();
            return Err(LoyaltyError::TierRestricted {
                required,
                actual: account.tier,
            });
        }

        let txn = self.accounts.redeem_points(
            account_id,
            reward.points_cost,
            reward.kind.redeem_reason(),
            Some(&format!("Redeemed: {}", reward.name)),
            Some(&reward_id.to_string()),
        )?;
        reward.current_redemptions += 1;

        metrics::counter!("loyalty.reward_redemptions").increment(1);
        info!(
            account_id = %account_id,
            reward_id = %reward_id,
            reward = %reward.name,
            points_cost = reward.points_cost,
            "Reward redeemed"
        );
        Ok((txn, reward.clone()))
    }

    // ─── Demo Data ──────────────────────────────────────────────────────────

    /// Seed a small demo catalog for development.
    pub fn seed_demo_rewards(&self) {
        let rewards = [
            ("5% off next order", RewardKind::DiscountPercentage, 200, 5.0, None),
            ("$10 off", RewardKind::DiscountFixed, 500, 10.0, None),
            ("Free shipping", RewardKind::FreeShipping, 250, 7.50, None),
            ("Free tasting box", RewardKind::FreeProduct, 1200, 24.0, None),
            (
                "Cooking class discount",
                RewardKind::ClassDiscount,
                800,
                20.0,
                Some(vec![LoyaltyTier::Gold, LoyaltyTier::Platinum]),
            ),
        ];
        for (name, kind, cost, value, restriction) in rewards {
            self.upsert(LoyaltyReward {
                id: Uuid::new_v4(),
                name: name.to_string(),
                description: format!("{name} (demo reward)"),
                kind,
                points_cost: cost,
                value,
                product_id: None,
                max_redemptions: None,
                current_redemptions: 0,
                valid_from: None,
                valid_until: None,
                is_active: true,
                conditions: restriction.map(|tiers| RewardConditions {
                    tier_restriction: tiers,
                    ..Default::default()
                }),
            });
        }
        info!(count = self.rewards.len(), "Seeded demo rewards");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_core::config::LedgerConfig;
    use loyalty_core::types::EarnReason;

    fn catalog() -> (Arc<AccountManager>, RewardCatalog) {
        let accounts = Arc::new(AccountManager::new(&LedgerConfig::default()));
        let catalog = RewardCatalog::new(accounts.clone());
        (accounts, catalog)
    }

    fn reward(name: &str, cost: i64) -> LoyaltyReward {
        LoyaltyReward {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: name.to_string(),
            kind: RewardKind::DiscountFixed,
            points_cost: cost,
            value: 10.0,
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
    fn test_list_available_sorted_and_filtered() {
        let (_, catalog) = catalog();
        catalog.upsert(reward("Expensive", 900));
        catalog.upsert(reward("Cheap", 100));
        let mut inactive = reward("Inactive", 50);
        inactive.is_active = false;
        catalog.upsert(inactive);
        let mut gold_only = reward("Gold only", 400);
        gold_only.conditions = Some(RewardConditions {
            tier_restriction: vec![LoyaltyTier::Gold],
            ..Default::default()
        });
        catalog.upsert(gold_only);

        let all = catalog.list_available(None);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].points_cost, 100);
        assert_eq!(all[2].points_cost, 900);

        let bronze = catalog.list_available(Some(LoyaltyTier::Bronze));
        assert_eq!(bronze.len(), 2);
        assert!(bronze.iter().all(|r| r.name != "Gold only"));

        let gold = catalog.list_available(Some(LoyaltyTier::Gold));
        assert_eq!(gold.len(), 3);
    }

    #[test]
    fn test_redeem_success_increments_counter() {
        let (accounts, catalog) = catalog();
        let account = accounts.get_or_create_account("user-1").unwrap();
        accounts
            .award_points(account.id, 500, EarnReason::Purchase, None, None)
            .unwrap();

        let r = reward("Free shipping", 250);
        let reward_id = r.id;
        catalog.upsert(r);

        let (txn, redeemed) = catalog.redeem(account.id, reward_id).unwrap();
        assert_eq!(txn.points, -250);
        assert_eq!(txn.description, "Redeemed: Free shipping");
        assert_eq!(txn.reference_id, Some(reward_id.to_string()));
        assert_eq!(redeemed.current_redemptions, 1);

        let snapshot = accounts.get_account(account.id).unwrap();
        // 100 signup + 500 award + 100 silver bonus - 250
        assert_eq!(snapshot.current_points, 450);
    }

    #[test]
    fn test_redeem_exhausted_cap_is_unavailable() {
        let (accounts, catalog) = catalog();
        let account = accounts.get_or_create_account("user-1").unwrap();
        accounts
            .award_points(account.id, 5000, EarnReason::Purchase, None, None)
            .unwrap();

        let mut r = reward("Limited", 100);
        r.max_redemptions = Some(1);
        r.current_redemptions = 1;
        let reward_id = r.id;
        catalog.upsert(r);

        let err = catalog.redeem(account.id, reward_id).unwrap_err();
        assert!(matches!(err, LoyaltyError::RewardUnavailable(_)));
        // Balance untouched by the failed redemption.
        let snapshot = accounts.get_account(account.id).unwrap();
        assert_eq!(snapshot.current_points, 5950);
    }

    #[test]
    fn test_redeem_cap_enforced_on_last_slot() {
        let (accounts, catalog) = catalog();
        let account = accounts.get_or_create_account("user-1").unwrap();
        accounts
            .award_points(account.id, 5000, EarnReason::Purchase, None, None)
            .unwrap();

        let mut r = reward("Limited", 100);
        r.max_redemptions = Some(2);
        r.current_redemptions = 1;
        let reward_id = r.id;
        catalog.upsert(r);

        assert!(catalog.redeem(account.id, reward_id).is_ok());
        let err = catalog.redeem(account.id, reward_id).unwrap_err();
        assert!(matches!(err, LoyaltyError::RewardUnavailable(_)));
        assert_eq!(catalog.get(reward_id).unwrap().current_redemptions, 2);
    }

    #[test]
    fn test_concurrent_redemptions_cannot_overrun_cap() {
        let (accounts, catalog) = catalog();
        let catalog = Arc::new(catalog);

        // Two well-funded accounts racing for a reward with one slot left.
        let first = accounts.get_or_create_account("user-1").unwrap();
        let second = accounts.get_or_create_account("user-2").unwrap();
        for account_id in [first.id, second.id] {
            accounts
                .award_points(account_id, 1000, EarnReason::Purchase, None, None)
                .unwrap();
        }

        let mut r = reward("Last slot", 100);
        r.max_redemptions = Some(1);
        let reward_id = r.id;
        catalog.upsert(r);

        let handles: Vec<_> = [first.id, second.id]
            .into_iter()
            .map(|account_id| {
                let catalog = catalog.clone();
                std::thread::spawn(move || catalog.redeem(account_id, reward_id))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(LoyaltyError::RewardUnavailable(_)))));
        assert_eq!(catalog.get(reward_id).unwrap().current_redemptions, 1);
    }

    #[test]
    fn test_redeem_tier_restricted() {
        let (accounts, catalog) = catalog();
        let account = accounts.get_or_create_account("user-1").unwrap();
        accounts
            .award_points(account.id, 1000, EarnReason::Purchase, None, None)
            .unwrap();

        let mut r = reward("Platinum perk", 100);
        r.conditions = Some(RewardConditions {
            tier_restriction: vec![LoyaltyTier::Platinum],
            ..Default::default()
        });
        let reward_id = r.id;
        catalog.upsert(r);

        let err = catalog.redeem(account.id, reward_id).unwrap_err();
        assert!(matches!(
            err,
            LoyaltyError::TierRestricted {
                actual: LoyaltyTier::Silver,
                ..
            }
        ));
    }

    #[test]
    fn test_redeem_propagates_insufficient_points() {
        let (accounts, catalog) = catalog();
        let account = accounts.get_or_create_account("user-1").unwrap();

        let r = reward("Big ticket", 10_000);
        let reward_id = r.id;
        catalog.upsert(r);

        let err = catalog.redeem(account.id, reward_id).unwrap_err();
        assert!(matches!(
            err,
            LoyaltyError::InsufficientPoints {
                needed: 10_000,
                available: 100
            }
        ));
        // Counter only moves on success.
        assert_eq!(catalog.get(reward_id).unwrap().current_redemptions, 0);
    }

    #[test]
    fn test_redeem_unknown_reward_or_account() {
        let (accounts, catalog) = catalog();
        let account = accounts.get_or_create_account("user-1").unwrap();

        let err = catalog.redeem(account.id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, LoyaltyError::NotFound(_)));

        let r = reward("Orphan", 100);
        let reward_id = r.id;
        catalog.upsert(r);
        let err = catalog.redeem(Uuid::new_v4(), reward_id).unwrap_err();
        assert!(matches!(err, LoyaltyError::NotFound(_)));
    }

    #[test]
    fn test_seed_demo_rewards() {
        let (_, catalog) = catalog();
        catalog.seed_demo_rewards();
        let available = catalog.list_available(None);
        assert_eq!(available.len(), 5);
        assert!(available.windows(2).all(|w| w[0].points_cost <= w[1].points_cost));
    }
}
