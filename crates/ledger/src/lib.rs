pub mod accounts;
pub mod ledger;

pub use accounts::AccountManager;
pub use ledger::{ExpirableEntry, TransactionLedger};
