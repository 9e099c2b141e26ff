//! Fixed-point scales shared by every crate
//!
//! Single source of truth for the implied decimals of each value type.

/// Money scale (4 decimal places, 1 unit = 0.0001)
pub const MONEY_SCALE: i64 = 10_000;
/// Number of implied decimals in `Money`
pub const MONEY_DECIMALS: u32 = 4;

/// Quantity scale (4 decimal places)
pub const QTY_SCALE: i64 = 10_000;

/// Percent scale: 1_000_000 = 100%, so 10_000 = 1% and 100 = 1 basis point
pub const PERCENT_SCALE: i64 = 1_000_000;
/// One percent in `Percent` units
pub const ONE_PERCENT: i64 = PERCENT_SCALE / 100;

/// Exchange-rate scale (10 decimal places)
pub const RATE_SCALE: i64 = 10_000_000_000;
/// Number of implied decimals in `Rate`
pub const RATE_DECIMALS: u32 = 10;

// Time constants
pub const NANOS_PER_SEC: u64 = 1_000_000_000;
pub const NANOS_PER_MILLI: u64 = 1_000_000;
pub const SECS_PER_DAY: u64 = 86_400;
