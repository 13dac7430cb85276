//! Configuration loading.
//!
//! Sources, later ones winning:
//! 1. compiled defaults
//! 2. an optional `config/depot.{toml,yaml,json}` file
//! 3. `DEPOT__*` environment variables, e.g. `DEPOT__LEDGER__NEAR_EXPIRY_DAYS=14`

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use depot_inventory::{ClassificationRules, DEFAULT_NEAR_EXPIRY_DAYS};
use depot_orders::OrderKind;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DepotConfig {
    pub ledger: LedgerSettings,
    pub numbering: NumberingSettings,
    pub observability: ObservabilitySettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LedgerSettings {
    /// Days before expiry at which a row counts as near expiry.
    pub near_expiry_days: u64,
    /// Multiplier on `maxStock` above which a row counts as HIGH.
    pub high_stock_buffer: Decimal,
}

/// Order number prefixes per kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NumberingSettings {
    pub inbound: String,
    pub outbound: String,
    pub transfer: String,
    pub stocktake: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObservabilitySettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub json: bool,
}

impl DepotConfig {
    /// Load configuration from defaults, the optional file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/depot")
    }

    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = config::Config::builder()
            .set_default("ledger.near_expiry_days", defaults.ledger.near_expiry_days)?
            .set_default(
                "ledger.high_stock_buffer",
                defaults.ledger.high_stock_buffer.to_string(),
            )?
            .set_default("numbering.inbound", defaults.numbering.inbound)?
            .set_default("numbering.outbound", defaults.numbering.outbound)?
            .set_default("numbering.transfer", defaults.numbering.transfer)?
            .set_default("numbering.stocktake", defaults.numbering.stocktake)?
            .set_default("observability.log_filter", defaults.observability.log_filter)?
            .set_default("observability.json", defaults.observability.json)?
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("DEPOT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerSettings::default(),
            numbering: NumberingSettings::default(),
            observability: ObservabilitySettings::default(),
        }
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        let rules = ClassificationRules::default();
        Self {
            near_expiry_days: DEFAULT_NEAR_EXPIRY_DAYS,
            high_stock_buffer: rules.high_stock_buffer,
        }
    }
}

impl LedgerSettings {
    pub fn rules(&self) -> ClassificationRules {
        ClassificationRules {
            high_stock_buffer: self.high_stock_buffer,
            near_expiry_days: self.near_expiry_days,
        }
    }
}

impl Default for NumberingSettings {
    fn default() -> Self {
        Self {
            inbound: OrderKind::Inbound.default_prefix().to_string(),
            outbound: OrderKind::Outbound.default_prefix().to_string(),
            transfer: OrderKind::Transfer.default_prefix().to_string(),
            stocktake: OrderKind::Stocktake.default_prefix().to_string(),
        }
    }
}

impl NumberingSettings {
    pub fn prefix(&self, kind: OrderKind) -> &str {
        match kind {
            OrderKind::Inbound => &self.inbound,
            OrderKind::Outbound => &self.outbound,
            OrderKind::Transfer => &self.transfer,
            OrderKind::Stocktake => &self.stocktake,
        }
    }
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            json: true,
        }
    }
}
