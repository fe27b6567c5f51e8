pub mod scanner;

pub use scanner::{ExpiryScanner, SweepReport};
