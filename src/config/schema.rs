//! Configuration document schema.
//!
//! This module defines the document shared by every worker in the trading
//! stack. The control plane never patches individual fields: the whole
//! document is read, replaced, and persisted as one value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration document consumed by the scanner and orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct StackConfig {
    /// Upstream broker connection (TWS / gateway).
    pub broker: BrokerConfig,

    /// Trade execution limits.
    pub trading: TradingConfig,

    /// Per-strategy parameters keyed by strategy name.
    pub strategies: BTreeMap<String, StrategyConfig>,

    /// Option contract selection filters.
    pub options: OptionsConfig,

    /// Greek exposure limits.
    pub greeks: GreeksConfig,

    /// Market scanner service settings.
    pub scanner: ScannerConfig,

    /// Tradable universe filters.
    pub universe: UniverseConfig,

    /// Trading session schedule.
    pub scheduling: SchedulingConfig,

    /// Worker-side logging settings.
    pub logging: LoggingConfig,

    /// Alert routing.
    pub alerts: AlertsConfig,

    /// Top-level tables this crate does not model. Kept so that a save
    /// never drops sections an operator added by hand.
    #[serde(flatten)]
    pub extra: toml::Table,
}

/// Broker connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    /// Gateway host (e.g., "127.0.0.1").
    pub host: String,

    /// Gateway API port.
    pub port: u16,

    /// Client ID used by the trading connection.
    pub client_id: u32,

    /// Account code; empty means "first managed account".
    pub account: String,

    /// Read-only API mode.
    pub read_only: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7497,
            client_id: 1,
            account: String::new(),
            read_only: false,
        }
    }
}

impl BrokerConfig {
    /// `host:port` string used for reachability probes.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Trade execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TradingConfig {
    /// "paper" or "live".
    pub mode: String,

    /// Maximum concurrently open positions.
    pub max_positions: u32,

    /// Maximum new trades per session.
    pub max_daily_trades: u32,

    /// Percentage of account equity risked per trade.
    pub risk_per_trade_pct: f64,

    /// Portfolio-level emergency stop, in percent.
    pub max_loss_pct: f64,

    /// Allow entries in the last hour of the session.
    pub allow_late_day_entry: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            mode: "paper".to_string(),
            max_positions: 10,
            max_daily_trades: 5,
            risk_per_trade_pct: 1.0,
            max_loss_pct: 5.0,
            allow_late_day_entry: false,
        }
    }
}

/// Parameters for a single strategy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    pub active: bool,
    pub min_rsi: f64,
    pub max_atr_ratio: f64,
    pub min_iv_rank: f64,
    pub target_profit_pct: f64,
    pub stop_loss_pct: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            active: true,
            min_rsi: 50.0,
            max_atr_ratio: 1.0,
            min_iv_rank: 25.0,
            target_profit_pct: 50.0,
            stop_loss_pct: 100.0,
        }
    }
}

/// Option selection filters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OptionsConfig {
    /// Minimum days to expiration.
    pub min_dte: u32,

    /// Maximum days to expiration.
    pub max_dte: u32,

    pub min_delta: f64,
    pub max_delta: f64,

    /// Minimum open interest for a contract to be considered.
    pub min_open_interest: u32,

    /// Maximum bid/ask spread as a percentage of mark.
    pub max_bid_ask_spread_pct: f64,

    pub min_iv_rank: f64,
    pub max_iv_rank: f64,

    /// Minimum probability of profit, in percent.
    pub min_prob_of_profit: f64,

    /// Strike width of the vertical spread.
    pub spread_width: u32,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            min_dte: 7,
            max_dte: 90,
            min_delta: 0.20,
            max_delta: 0.50,
            min_open_interest: 500,
            max_bid_ask_spread_pct: 0.6,
            min_iv_rank: 25.0,
            max_iv_rank: 75.0,
            min_prob_of_profit: 55.0,
            spread_width: 5,
        }
    }
}

/// Greek exposure limits per position.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GreeksConfig {
    pub enabled: bool,
    pub max_abs_delta: f64,
    pub max_abs_gamma: f64,
    pub max_abs_vega: f64,
    pub min_theta: f64,
}

impl Default for GreeksConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_abs_delta: 0.50,
            max_abs_gamma: 0.05,
            max_abs_vega: 10.0,
            min_theta: 0.10,
        }
    }
}

/// Market scanner service configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    pub host: String,
    pub port: u16,
    pub max_concurrency: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            host: "scanner".to_string(),
            port: 50051,
            max_concurrency: 8,
        }
    }
}

/// Universe filters applied before scanning.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UniverseConfig {
    pub min_market_cap: u64,
    pub min_price: f64,
    pub min_volume: u64,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            min_market_cap: 10_000_000_000,
            min_price: 20.0,
            min_volume: 1_000_000,
        }
    }
}

/// Trading session schedule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Session start, "HH:MM" in `timezone`.
    pub start_time: String,

    /// Session stop, "HH:MM" in `timezone`.
    pub stop_time: String,

    pub timezone: String,
    pub weekend_trading: bool,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            start_time: "09:30".to_string(),
            stop_time: "16:00".to_string(),
            timezone: "America/New_York".to_string(),
            weekend_trading: false,
        }
    }
}

/// Worker-side logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: String,
    pub max_size_mb: u32,
    pub backup_count: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "logs/trader.log".to_string(),
            max_size_mb: 10,
            backup_count: 5,
        }
    }
}

/// Alert routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct AlertsConfig {
    pub email_enabled: bool,
    pub email_address: String,
    pub webhook_enabled: bool,
    pub webhook_url: String,
    pub alert_on_trade: bool,
    pub alert_on_error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_document_uses_defaults() {
        let cfg: StackConfig = toml::from_str("[broker]\nport = 4002\n").unwrap();
        assert_eq!(cfg.broker.port, 4002);
        assert_eq!(cfg.broker.host, "127.0.0.1");
        assert_eq!(cfg.trading, TradingConfig::default());
    }

    #[test]
    fn test_unknown_sections_survive_round_trip() {
        let text = "[broker]\nport = 7497\n\n[custom]\nflag = true\n";
        let cfg: StackConfig = toml::from_str(text).unwrap();
        assert!(cfg.extra.contains_key("custom"));

        let written = toml::to_string_pretty(&cfg).unwrap();
        let reread: StackConfig = toml::from_str(&written).unwrap();
        assert_eq!(reread, cfg);
    }
}
