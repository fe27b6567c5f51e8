use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `LOYALTY_EXPRESS__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub expiry: ExpiryConfig,
}

/// Earning and pagination knobs for the points ledger.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// One-time earn granted when an account is first created.
    #[serde(default = "default_signup_bonus_points")]
    pub signup_bonus_points: i64,
    /// How long earned points live before the expiry sweep reclaims them.
    #[serde(default = "default_points_expiry_days")]
    pub points_expiry_days: i64,
    /// Hard ceiling on `list_transactions` page size.
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: u32,
}

/// Scheduling for the background expiry sweep.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpiryConfig {
    #[serde(default = "default_expiry_enabled")]
    pub enabled: bool,
    /// Seconds between sweeps. Default is nightly.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_node_id() -> String {
    "ledger-01".to_string()
}
fn default_signup_bonus_points() -> i64 {
    100
}
fn default_points_expiry_days() -> i64 {
    365
}
fn default_max_page_limit() -> u32 {
    100
}
fn default_expiry_enabled() -> bool {
    true
}
fn default_sweep_interval_secs() -> u64 {
    86_400
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            ledger: LedgerConfig::default(),
            expiry: ExpiryConfig::default(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            signup_bonus_points: default_signup_bonus_points(),
            points_expiry_days: default_points_expiry_days(),
            max_page_limit: default_max_page_limit(),
        }
    }
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            enabled: default_expiry_enabled(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("LOYALTY_EXPRESS")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
