//! Append-only transaction ledger — the source of truth for every balance.
//!
//! Entries are grouped per account in insertion order. Nothing is ever
//! deleted; the only mutation is flipping an earn entry's `is_expired` flag,
//! which happens exactly once per entry.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use loyalty_core::types::{LoyaltyTransaction, Page, TransactionKind};
use uuid::Uuid;

/// An earn entry due for expiry, located by account and transaction id.
#[derive(Debug, Clone, Copy)]
pub struct ExpirableEntry {
    pub account_id: Uuid,
    pub transaction_id: Uuid,
    pub points: i64,
}

/// Thread-safe in-memory ledger backed by `DashMap`.
pub struct TransactionLedger {
    entries: DashMap<Uuid, Vec<LoyaltyTransaction>>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Append one entry to its account's ledger. Callers serialize appends
    /// for an account by holding that account's row lock.
    pub fn append(&self, transaction: LoyaltyTransaction) {
        self.entries
            .entry(transaction.account_id)
            .or_default()
            .push(transaction);
    }

    /// All entries for an account in insertion order.
    pub fn for_account(&self, account_id: Uuid) -> Vec<LoyaltyTransaction> {
        self.entries
            .get(&account_id)
            .map(|recs| recs.value().clone())
            .unwrap_or_default()
    }

    /// Signed sum of every entry for the account. Reconciles against the
    /// account's cached `current_points`.
    pub fn balance(&self, account_id: Uuid) -> i64 {
        self.entries
            .get(&account_id)
            .map(|recs| recs.iter().map(|t| t.points).sum())
            .unwrap_or(0)
    }

    /// One page of an account's entries, newest first. `page` is 1-based.
    pub fn page(&self, account_id: Uuid, page: u32, limit: u32) -> Page<LoyaltyTransaction> {
        let page = page.max(1);
        let all = self.for_account(account_id);
        let total = all.len() as u64;
        let skip = (page as usize - 1).saturating_mul(limit as usize);
        let items = all
            .into_iter()
            .rev()
            .skip(skip)
            .take(limit as usize)
            .collect();
        Page {
            items,
            page,
            limit,
            total,
        }
    }

    /// Earn entries whose expiry has passed and that have not been swept yet.
    pub fn expirable(&self, now: DateTime<Utc>) -> Vec<ExpirableEntry> {
        let mut due = Vec::new();
        for recs in self.entries.iter() {
            for t in recs.value() {
                if t.kind == TransactionKind::Earned
                    && !t.is_expired
                    && t.expires_at.map(|at| at <= now).unwrap_or(false)
                {
                    due.push(ExpirableEntry {
                        account_id: t.account_id,
                        transaction_id: t.id,
                        points: t.points,
                    });
                }
            }
        }
        due
    }

    /// Flip an earn entry's `is_expired` flag, returning its points, or
    /// `None` if the entry is missing or was already swept. The flag gate
    /// makes a re-run of the sweep a no-op per entry. Callers hold the
    /// owning account's row lock.
    pub fn mark_expired(&self, account_id: Uuid, transaction_id: Uuid) -> Option<i64> {
        let mut recs = self.entries.get_mut(&account_id)?;
        let entry = recs
            .iter_mut()
            .find(|t| t.id == transaction_id && t.kind == TransactionKind::Earned)?;
        if entry.is_expired {
            return None;
        }
        entry.is_expired = true;
        Some(entry.points)
    }
}

impl Default for TransactionLedger {
    fn default() -> Self {
        Self::new()
    }
}
