//! Expiry scanner: batch job that converts aged earn entries into
//! compensating expired entries.
//!
//! The sweep shares the account manager's row locks with live traffic, so a
//! sweep and a concurrent award/redeem on the same account serialize. Each
//! entry is gated on its `is_expired` flag, which makes a re-run a no-op.

use chrono::Utc;
use loyalty_ledger::{AccountManager, TransactionLedger};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one sweep: entries expired and per-entry failures skipped over.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub expired_count: u64,
    pub failed_count: u64,
}

/// Periodic batch scanner over the shared ledger.
pub struct ExpiryScanner {
    accounts: Arc<AccountManager>,
    ledger: Arc<TransactionLedger>,
}

impl ExpiryScanner {
    pub fn new(accounts: Arc<AccountManager>) -> Self {
        let ledger = accounts.ledger();
        Self { accounts, ledger }
    }

    /// Expire every aged earn entry. A failure on one entry is recorded and
    /// the sweep continues; the report summarizes both counts for the
    /// operator.
    pub fn sweep(&self) -> SweepReport {
        let due = self.ledger.expirable(Utc::now());
        let mut report = SweepReport::default();

        for entry in due {
            match self
                .accounts
                .expire_entry(entry.account_id, entry.transaction_id)
            {
                Ok(true) => report.expired_count += 1,
                // Swept by a concurrent run between scan and lock; nothing to do.
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        account_id = %entry.account_id,
                        transaction_id = %entry.transaction_id,
                        error = %e,
                        "Failed to expire earn entry"
                    );
                    report.failed_count += 1;
                }
            }
        }

        info!(
            expired = report.expired_count,
            failed = report.failed_count,
            "Expiry sweep finished"
        );
        report
    }

    /// Spawn the recurring sweep task. Runs until the handle is aborted.
    pub fn spawn(self: Arc<Self>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use loyalty_core::config::LedgerConfig;
    use loyalty_core::types::{EarnReason, LoyaltyTransaction, RedeemReason, TransactionKind};
    use uuid::Uuid;

    /// Manager whose earn entries are already expired when created.
    fn expired_manager() -> Arc<AccountManager> {
        Arc::new(AccountManager::new(&LedgerConfig {
            points_expiry_days: -1,
            ..Default::default()
        }))
    }

    #[test]
    fn test_sweep_expires_and_is_idempotent() {
        let accounts = expired_manager();
        let scanner = ExpiryScanner::new(accounts.clone());
        let account = accounts.get_or_create_account("user-1").unwrap();

        let report = scanner.sweep();
        assert_eq!(report.expired_count, 1);
        assert_eq!(report.failed_count, 0);

        let snapshot = accounts.get_account(account.id).unwrap();
        assert_eq!(snapshot.current_points, 0);
        // Lifetime points survive expiry.
        assert_eq!(snapshot.lifetime_points, 100);

        let entries = accounts.ledger().for_account(account.id);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_expired);
        assert_eq!(entries[1].kind, TransactionKind::Expired);
        assert_eq!(entries[1].points, -100);
        assert_eq!(entries[1].reference_id, Some(entries[0].id.to_string()));

        // Second run with no elapsed time expires nothing new.
        let report = scanner.sweep();
        assert_eq!(report.expired_count, 0);
        assert_eq!(report.failed_count, 0);
        assert_eq!(accounts.ledger().for_account(account.id).len(), 2);
    }

    #[test]
    fn test_sweep_clamps_balance_at_zero() {
        let accounts = expired_manager();
        let scanner = ExpiryScanner::new(accounts.clone());
        let account = accounts.get_or_create_account("user-1").unwrap();
        accounts
            .award_points(account.id, 50, EarnReason::Purchase, None, None)
            .unwrap();
        accounts
            .redeem_points(account.id, 120, RedeemReason::Other, None, None)
            .unwrap();

        let report = scanner.sweep();
        assert_eq!(report.expired_count, 2);

        let snapshot = accounts.get_account(account.id).unwrap();
        assert_eq!(snapshot.current_points, 0);
    }

    #[test]
    fn test_sweep_skips_unexpired_entries() {
        let accounts = Arc::new(AccountManager::new(&LedgerConfig::default()));
        let scanner = ExpiryScanner::new(accounts.clone());
        let account = accounts.get_or_create_account("user-1").unwrap();
        accounts
            .award_points(account.id, 200, EarnReason::Purchase, None, None)
            .unwrap();

        let report = scanner.sweep();
        assert_eq!(report.expired_count, 0);
        let snapshot = accounts.get_account(account.id).unwrap();
        assert_eq!(snapshot.current_points, 300);
    }

    #[test]
    fn test_sweep_counts_per_entry_failures_and_continues() {
        let accounts = expired_manager();
        let scanner = ExpiryScanner::new(accounts.clone());
        let account = accounts.get_or_create_account("user-1").unwrap();

        // An orphaned earn entry whose account was never registered: the
        // sweep records the failure and still processes the healthy entry.
        let now = Utc::now();
        accounts.ledger().append(LoyaltyTransaction {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            kind: TransactionKind::Earned,
            points: 40,
            earn_reason: Some(EarnReason::Purchase),
            redeem_reason: None,
            description: "Orphaned".to_string(),
            reference_id: None,
            expires_at: Some(now - Duration::days(1)),
            is_expired: false,
            created_at: now,
        });

        let report = scanner.sweep();
        assert_eq!(report.expired_count, 1);
        assert_eq!(report.failed_count, 1);

        let snapshot = accounts.get_account(account.id).unwrap();
        assert_eq!(snapshot.current_points, 0);
    }
}
