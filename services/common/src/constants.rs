//! Defaults shared across services
//!
//! Single source of truth for configuration fallbacks.

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "INVOICER";
/// Separator between nested keys in environment overrides
pub const ENV_SEPARATOR: &str = "__";

/// Reporting currency when none is configured
pub const DEFAULT_BASE_CURRENCY: &str = "EUR";
/// The ECB publishes every reference rate against the euro
pub const DEFAULT_PIVOT_CURRENCY: &str = "EUR";
/// Frankfurter serves the ECB reference rates as JSON
pub const DEFAULT_FEED_URL: &str = "https://api.frankfurter.app";

// Rate cache
pub const DEFAULT_RATE_TTL_SECS: u64 = 3600;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

// Document numbering
pub const DEFAULT_INVOICE_PREFIX: &str = "INV";
pub const DEFAULT_QUOTE_PREFIX: &str = "QUO";
pub const DEFAULT_NUMBER_PAD_WIDTH: usize = 4;
pub const MAX_NUMBER_PAD_WIDTH: usize = 9;

/// Days between issue and due date
pub const DEFAULT_PAYMENT_TERMS_DAYS: u32 = 30;
/// Days a sent quote stays valid
pub const DEFAULT_QUOTE_VALIDITY_DAYS: u32 = 30;
