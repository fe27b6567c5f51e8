pub mod config;
pub mod error;
pub mod tiers;
pub mod types;

pub use config::AppConfig;
pub use error::{LoyaltyError, LoyaltyResult};
pub use tiers::{LoyaltyTier, TierEngine, TierUpgrade};
