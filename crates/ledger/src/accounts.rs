//! Account manager: owns loyalty accounts and orchestrates every
//! balance-affecting operation against the ledger.
//!
//! Each account row is guarded by its own `parking_lot::Mutex`; a ledger
//! append and the matching aggregate update always happen inside the same
//! critical section, so a reader never observes one without the other.

use chrono::{Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use loyalty_core::config::LedgerConfig;
use loyalty_core::error::{LoyaltyError, LoyaltyResult};
use loyalty_core::tiers::TierEngine;
use loyalty_core::types::{
    EarnReason, LoyaltyAccount, LoyaltyTransaction, Page, RedeemReason, TransactionKind,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ledger::TransactionLedger;

/// Thread-safe account store with per-account row locking.
pub struct AccountManager {
    accounts: DashMap<Uuid, Arc<Mutex<LoyaltyAccount>>>,
    /// user_id → account id. The entry API on this index is the uniqueness
    /// guard against concurrent first-time account creation.
    by_user: DashMap<String, Uuid>,
    ledger: Arc<TransactionLedger>,
    tiers: TierEngine,
    config: LedgerConfig,
}

impl AccountManager {
    pub fn new(config: &LedgerConfig) -> Self {
        info!(
            signup_bonus = config.signup_bonus_points,
            expiry_days = config.points_expiry_days,
            "Account manager initialized"
        );
        Self {
            accounts: DashMap::new(),
            by_user: DashMap::new(),
            ledger: Arc::new(TransactionLedger::new()),
            tiers: TierEngine::new(),
            config: config.clone(),
        }
    }

    /// The ledger backing this manager, shared with the expiry scanner.
    pub fn ledger(&self) -> Arc<TransactionLedger> {
        self.ledger.clone()
    }

    // ─── Account lifecycle ──────────────────────────────────────────────────

    /// Return the user's account, creating it with the signup bonus on first
    /// call. Concurrent first-time calls for one user create exactly one
    /// account and grant the bonus exactly once.
    pub fn get_or_create_account(&self, user_id: &str) -> LoyaltyResult<LoyaltyAccount> {
        if let Some(id) = self.by_user.get(user_id).map(|r| *r.value()) {
            return self.get_account(id);
        }

        let account_id = match self.by_user.entry(user_id.to_string()) {
            // Lost the creation race; the winner already granted the bonus.
            Entry::Occupied(existing) => *existing.get(),
            Entry::Vacant(slot) => {
                let account = LoyaltyAccount::new(user_id);
                let id = account.id;
                self.accounts.insert(id, Arc::new(Mutex::new(account)));
                // The bonus lands before the user index entry is published;
                // no caller can observe the account without it.
                self.award_points(
                    id,
                    self.config.signup_bonus_points,
                    EarnReason::SignupBonus,
                    Some("Signup bonus"),
                    None,
                )?;
                slot.insert(id);
                metrics::counter!("loyalty.accounts_created").increment(1);
                info!(user_id, account_id = %id, "Loyalty account created");
                id
            }
        };
        self.get_account(account_id)
    }

    /// Snapshot of an account's current state.
    pub fn get_account(&self, account_id: Uuid) -> LoyaltyResult<LoyaltyAccount> {
        let cell = self.account_cell(account_id)?;
        let account = cell.lock();
        Ok(account.clone())
    }

    // ─── Award / redeem / adjust ────────────────────────────────────────────

    /// Credit `base_points * multiplier-at-call` (floored) to the account and
    /// append the earn entry. Tier upgrades triggered by the new lifetime
    /// total cascade their bonuses as further earn entries, terminating at
    /// the top tier.
    pub fn award_points(
        &self,
        account_id: Uuid,
        base_points: i64,
        reason: EarnReason,
        description: Option<&str>,
        reference_id: Option<&str>,
    ) -> LoyaltyResult<LoyaltyTransaction> {
        if base_points <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "award amount must be positive, got {base_points}"
            )));
        }
        let cell = self.account_cell(account_id)?;
        let mut account = cell.lock();
        let multiplier = account.points_multiplier;
        let txn = self.apply_award(
            &mut account,
            base_points,
            multiplier,
            reason,
            description.unwrap_or("Points earned"),
            reference_id,
        );
        Ok(txn)
    }

    /// Deduct points from the balance and append the redemption entry.
    /// Lifetime points are unaffected. No state changes on failure.
    pub fn redeem_points(
        &self,
        account_id: Uuid,
        points: i64,
        reason: RedeemReason,
        description: Option<&str>,
        reference_id: Option<&str>,
    ) -> LoyaltyResult<LoyaltyTransaction> {
        if points <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "redeem amount must be positive, got {points}"
            )));
        }
        let cell = self.account_cell(account_id)?;
        let mut account = cell.lock();
        if account.current_points < points {
            return Err(LoyaltyError::InsufficientPoints {
                needed: points,
                available: account.current_points,
            });
        }

        let now = Utc::now();
        let txn = LoyaltyTransaction {
            id: Uuid::new_v4(),
            account_id,
            kind: TransactionKind::Redeemed,
            points: -points,
            earn_reason: None,
            redeem_reason: Some(reason),
            description: description.unwrap_or("Points redeemed").to_string(),
            reference_id: reference_id.map(|r| r.to_string()),
            expires_at: None,
            is_expired: false,
            created_at: now,
        };
        self.ledger.append(txn.clone());
        account.current_points -= points;
        account.last_activity = now;

        metrics::counter!("loyalty.points_redeemed").increment(points as u64);
        info!(
            account_id = %account_id,
            points,
            new_balance = account.current_points,
            reason = ?reason,
            "Points redeemed"
        );
        Ok(txn)
    }

    /// Administrative correction. Credits raise lifetime points (and can
    /// trigger tier upgrades); debits only reduce the balance and may not
    /// take it below zero.
    pub fn adjust_points(
        &self,
        account_id: Uuid,
        delta: i64,
        description: &str,
    ) -> LoyaltyResult<LoyaltyTransaction> {
        if delta == 0 {
            return Err(LoyaltyError::Validation(
                "adjustment delta must be non-zero".to_string(),
            ));
        }
        let cell = self.account_cell(account_id)?;
        let mut account = cell.lock();
        if delta < 0 && account.current_points < -delta {
            return Err(LoyaltyError::InsufficientPoints {
                needed: -delta,
                available: account.current_points,
            });
        }

        let now = Utc::now();
        let multiplier = account.points_multiplier;
        let txn = LoyaltyTransaction {
            id: Uuid::new_v4(),
            account_id,
            kind: TransactionKind::Adjusted,
            points: delta,
            earn_reason: None,
            redeem_reason: None,
            description: description.to_string(),
            reference_id: None,
            expires_at: None,
            is_expired: false,
            created_at: now,
        };
        self.ledger.append(txn.clone());
        account.current_points += delta;
        if delta > 0 {
            account.lifetime_points += delta;
        }
        account.last_activity = now;

        info!(account_id = %account_id, delta, new_balance = account.current_points, "Points adjusted");

        if delta > 0 {
            if let Some(upgrade) = self.tiers.recompute(&mut account) {
                self.apply_award(
                    &mut account,
                    upgrade.bonus,
                    multiplier,
                    EarnReason::AdminAdjustment,
                    "Tier upgrade bonus",
                    None,
                );
            }
        }
        Ok(txn)
    }

    /// One page of the account's ledger, newest first.
    pub fn list_transactions(
        &self,
        account_id: Uuid,
        page: u32,
        limit: u32,
    ) -> LoyaltyResult<Page<LoyaltyTransaction>> {
        self.account_cell(account_id)?;
        let limit = limit.clamp(1, self.config.max_page_limit);
        Ok(self.ledger.page(account_id, page, limit))
    }

    // ─── Expiry (called by the sweep) ───────────────────────────────────────

    /// Convert one aged earn entry into a compensating expired entry under
    /// the account's row lock. Returns `Ok(false)` when the entry was already
    /// swept, which makes re-runs no-ops per entry.
    pub fn expire_entry(&self, account_id: Uuid, transaction_id: Uuid) -> LoyaltyResult<bool> {
        let cell = self.account_cell(account_id)?;
        let mut account = cell.lock();
        let Some(points) = self.ledger.mark_expired(account_id, transaction_id) else {
            return Ok(false);
        };

        let now = Utc::now();
        self.ledger.append(LoyaltyTransaction {
            id: Uuid::new_v4(),
            account_id,
            kind: TransactionKind::Expired,
            points: -points,
            earn_reason: None,
            redeem_reason: None,
            description: "Points expired".to_string(),
            reference_id: Some(transaction_id.to_string()),
            expires_at: None,
            is_expired: false,
            created_at: now,
        });
        account.current_points = (account.current_points - points).max(0);

        metrics::counter!("loyalty.points_expired").increment(points as u64);
        debug!(
            account_id = %account_id,
            transaction_id = %transaction_id,
            points,
            new_balance = account.current_points,
            "Earn entry expired"
        );
        Ok(true)
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    fn account_cell(&self, account_id: Uuid) -> LoyaltyResult<Arc<Mutex<LoyaltyAccount>>> {
        self.accounts
            .get(&account_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| LoyaltyError::NotFound(format!("account {account_id}")))
    }

    /// Append an earn entry and update the aggregates, then cascade tier
    /// upgrade bonuses. The bonus credits at the multiplier captured when the
    /// triggering award began; recursion terminates at the top tier because
    /// each call advances at most one strictly-ordered tier.
    fn apply_award(
        &self,
        account: &mut LoyaltyAccount,
        base_points: i64,
        multiplier: f64,
        reason: EarnReason,
        description: &str,
        reference_id: Option<&str>,
    ) -> LoyaltyTransaction {
        let credited = (base_points as f64 * multiplier).floor() as i64;
        let now = Utc::now();
        let txn = LoyaltyTransaction {
            id: Uuid::new_v4(),
            account_id: account.id,
            kind: TransactionKind::Earned,
            points: credited,
            earn_reason: Some(reason),
            redeem_reason: None,
            description: description.to_string(),
            reference_id: reference_id.map(|r| r.to_string()),
            expires_at: Some(now + Duration::days(self.config.points_expiry_days)),
            is_expired: false,
            created_at: now,
        };
        self.ledger.append(txn.clone());
        account.current_points += credited;
        account.lifetime_points += credited;
        account.last_activity = now;

        metrics::counter!("loyalty.points_earned").increment(credited as u64);
        debug!(
            account_id = %account.id,
            base_points,
            credited,
            multiplier,
            balance = account.current_points,
            lifetime = account.lifetime_points,
            reason = ?reason,
            "Points earned"
        );

        if let Some(upgrade) = self.tiers.recompute(account) {
            self.apply_award(
                account,
                upgrade.bonus,
                multiplier,
                EarnReason::AdminAdjustment,
                "Tier upgrade bonus",
                None,
            );
        }
        txn
    }
}
