//! Service configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then environment
//! variables (`INVOICER__FX__TTL_SECS=600`).

use crate::constants::{
    DEFAULT_BASE_CURRENCY, DEFAULT_FEED_URL, DEFAULT_INVOICE_PREFIX, DEFAULT_NUMBER_PAD_WIDTH,
    DEFAULT_PAYMENT_TERMS_DAYS, DEFAULT_PIVOT_CURRENCY, DEFAULT_QUOTE_PREFIX,
    DEFAULT_QUOTE_VALIDITY_DAYS, DEFAULT_RATE_TTL_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, ENV_PREFIX,
    ENV_SEPARATOR, MAX_NUMBER_PAD_WIDTH,
};
use crate::errors::{ServiceError, ServiceResult};
use common::Currency;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Reporting currency for dashboard KPIs
    pub base_currency: Currency,
    /// Exchange-rate resolution
    pub fx: FxConfig,
    /// Document numbering
    pub numbering: NumberingConfig,
    /// Days until an issued invoice falls due
    pub payment_terms_days: u32,
    /// Days a sent quote stays open
    pub quote_validity_days: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_currency: Currency::parse(DEFAULT_BASE_CURRENCY).unwrap_or(Currency::EUR),
            fx: FxConfig::default(),
            numbering: NumberingConfig::default(),
            payment_terms_days: DEFAULT_PAYMENT_TERMS_DAYS,
            quote_validity_days: DEFAULT_QUOTE_VALIDITY_DAYS,
        }
    }
}

/// Exchange-rate feed and cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    /// Currency every feed quote is expressed against
    pub pivot_currency: Currency,
    /// Base URL of a Frankfurter-compatible endpoint
    pub feed_url: String,
    /// Lifetime of a fetched snapshot
    pub ttl_secs: u64,
    /// Per-request timeout against the feed
    pub request_timeout_secs: u64,
    /// Offline quotes against the pivot, used instead of the feed when set
    pub static_rates: FxHashMap<Currency, f64>,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            pivot_currency: Currency::parse(DEFAULT_PIVOT_CURRENCY).unwrap_or(Currency::EUR),
            feed_url: DEFAULT_FEED_URL.to_string(),
            ttl_secs: DEFAULT_RATE_TTL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            static_rates: FxHashMap::default(),
        }
    }
}

impl FxConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Document number formatting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingConfig {
    pub invoice_prefix: String,
    pub quote_prefix: String,
    /// Zero padding of the sequence part
    pub pad_width: usize,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            invoice_prefix: DEFAULT_INVOICE_PREFIX.to_string(),
            quote_prefix: DEFAULT_QUOTE_PREFIX.to_string(),
            pad_width: DEFAULT_NUMBER_PAD_WIDTH,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> ServiceResult<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        let cfg: Self = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        tracing::debug!(
            base = %cfg.base_currency,
            pivot = %cfg.fx.pivot_currency,
            ttl_secs = cfg.fx.ttl_secs,
            offline = !cfg.fx.static_rates.is_empty(),
            "Configuration loaded"
        );
        Ok(cfg)
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml(contents: &str) -> ServiceResult<Self> {
        let cfg: Self = ::config::Config::builder()
            .add_source(::config::File::from_str(
                contents,
                ::config::FileFormat::Toml,
            ))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the services cannot run with
    pub fn validate(&self) -> ServiceResult<()> {
        let invalid = |msg: String| Err(ServiceError::Configuration(msg));

        if self.fx.ttl_secs == 0 {
            return invalid("fx.ttl_secs must be positive".to_string());
        }
        if self.fx.request_timeout_secs == 0 {
            return invalid("fx.request_timeout_secs must be positive".to_string());
        }
        if self.fx.static_rates.is_empty()
            && !(self.fx.feed_url.starts_with("http://") || self.fx.feed_url.starts_with("https://"))
        {
            return invalid(format!("fx.feed_url is not an http(s) URL: {:?}", self.fx.feed_url));
        }
        if let Some((ccy, rate)) = self
            .fx
            .static_rates
            .iter()
            .find(|(_, rate)| !(rate.is_finite() && **rate > 0.0))
        {
            return invalid(format!("fx.static_rates.{ccy} must be positive, got {rate}"));
        }
        if self.numbering.pad_width == 0 || self.numbering.pad_width > MAX_NUMBER_PAD_WIDTH {
            return invalid(format!(
                "numbering.pad_width must be within 1..={MAX_NUMBER_PAD_WIDTH}"
            ));
        }
        if self.numbering.invoice_prefix.trim().is_empty()
            || self.numbering.quote_prefix.trim().is_empty()
        {
            return invalid("numbering prefixes must not be empty".to_string());
        }
        if self.numbering.invoice_prefix == self.numbering.quote_prefix {
            return invalid("invoice and quote prefixes must differ".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.base_currency, Currency::EUR);
        assert_eq!(cfg.fx.ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut cfg = AppConfig::default();
        cfg.fx.ttl_secs = 0;
        assert!(matches!(cfg.validate(), Err(ServiceError::Configuration(_))));
    }
}
