pub mod catalog;

pub use catalog::RewardCatalog;
