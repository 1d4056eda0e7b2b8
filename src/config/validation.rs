//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, percentages, risk limits)
//! - Check ordered pairs (min <= max) and schedule time formats
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: StackConfig → Result<(), Vec<ValidationError>>
//! - Runs before an edit touches any worker, and before a watcher reload is
//!   accepted into the store

use std::fmt;

use serde::Serialize;

use crate::config::schema::StackConfig;

/// A single semantic violation, keyed by dotted field path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

const TRADING_MODES: [&str; 2] = ["paper", "live"];

/// Validate a configuration document.
pub fn validate_config(config: &StackConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.broker.host.trim().is_empty() {
        errors.push(ValidationError::new("broker.host", "must not be empty"));
    }
    if config.broker.port == 0 {
        errors.push(ValidationError::new("broker.port", "must be between 1 and 65535"));
    }
    if config.broker.client_id == 0 {
        errors.push(ValidationError::new("broker.client_id", "must be at least 1"));
    }

    if !TRADING_MODES.contains(&config.trading.mode.as_str()) {
        errors.push(ValidationError::new(
            "trading.mode",
            format!("must be one of {:?}, got {:?}", TRADING_MODES, config.trading.mode),
        ));
    }
    if config.trading.max_positions == 0 {
        errors.push(ValidationError::new("trading.max_positions", "must be at least 1"));
    }
    check_range(&mut errors, "trading.risk_per_trade_pct", config.trading.risk_per_trade_pct, 0.1, 5.0);
    check_range(&mut errors, "trading.max_loss_pct", config.trading.max_loss_pct, 1.0, 20.0);

    for (name, strategy) in &config.strategies {
        check_range(&mut errors, &format!("strategies.{name}.min_rsi"), strategy.min_rsi, 0.0, 100.0);
        check_range(&mut errors, &format!("strategies.{name}.min_iv_rank"), strategy.min_iv_rank, 0.0, 100.0);
    }

    let options = &config.options;
    if options.min_dte > options.max_dte {
        errors.push(ValidationError::new(
            "options.min_dte",
            format!("must not exceed options.max_dte ({})", options.max_dte),
        ));
    }
    check_range(&mut errors, "options.min_delta", options.min_delta, 0.0, 1.0);
    check_range(&mut errors, "options.max_delta", options.max_delta, 0.0, 1.0);
    if options.min_delta > options.max_delta {
        errors.push(ValidationError::new("options.min_delta", "must not exceed options.max_delta"));
    }
    check_range(&mut errors, "options.max_bid_ask_spread_pct", options.max_bid_ask_spread_pct, 0.0, 5.0);
    check_range(&mut errors, "options.min_iv_rank", options.min_iv_rank, 0.0, 100.0);
    check_range(&mut errors, "options.max_iv_rank", options.max_iv_rank, 0.0, 100.0);
    if options.min_iv_rank > options.max_iv_rank {
        errors.push(ValidationError::new("options.min_iv_rank", "must not exceed options.max_iv_rank"));
    }
    check_range(&mut errors, "options.min_prob_of_profit", options.min_prob_of_profit, 0.0, 100.0);

    if config.scanner.port == 0 {
        errors.push(ValidationError::new("scanner.port", "must be between 1 and 65535"));
    }
    if config.scanner.max_concurrency == 0 {
        errors.push(ValidationError::new("scanner.max_concurrency", "must be at least 1"));
    }

    let start = parse_hh_mm(&config.scheduling.start_time);
    let stop = parse_hh_mm(&config.scheduling.stop_time);
    if start.is_none() {
        errors.push(ValidationError::new("scheduling.start_time", "must use HH:MM 24-hour format"));
    }
    if stop.is_none() {
        errors.push(ValidationError::new("scheduling.stop_time", "must use HH:MM 24-hour format"));
    }
    if let (Some(start), Some(stop)) = (start, stop) {
        if start >= stop {
            errors.push(ValidationError::new("scheduling.start_time", "must be before scheduling.stop_time"));
        }
    }

    if config.alerts.webhook_enabled && config.alerts.webhook_url.trim().is_empty() {
        errors.push(ValidationError::new("alerts.webhook_url", "required when webhooks are enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_range(errors: &mut Vec<ValidationError>, field: &str, value: f64, min: f64, max: f64) {
    if !(min..=max).contains(&value) {
        errors.push(ValidationError::new(
            field,
            format!("must be between {min} and {max}, got {value}"),
        ));
    }
}

/// Parse "HH:MM" into minutes since midnight.
fn parse_hh_mm(value: &str) -> Option<u32> {
    let (h, m) = value.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    (h < 24 && m < 60).then_some(h * 60 + m)
}
