//! Core value types for Invoicer
//!
//! Every type wraps an `i64` with a fixed number of implied decimals. Products
//! and quotients go through `i128` and round half away from zero.

use crate::constants::{MONEY_SCALE, PERCENT_SCALE, QTY_SCALE, RATE_SCALE};
use crate::currency::Currency;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while building or combining value types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// Not a three-letter ISO code
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// Not a decimal number
    #[error("Invalid number: {0:?}")]
    InvalidNumber(String),

    /// More fractional digits than the type can hold
    #[error("{input:?} has more than {decimals} decimal places")]
    TooPrecise {
        /// Offending input
        input: String,
        /// Decimals supported by the target type
        decimals: u32,
    },

    /// Exchange rates must be strictly positive
    #[error("Exchange rate must be positive")]
    NonPositiveRate,

    /// Result does not fit in 64 bits
    #[error("Arithmetic overflow")]
    Overflow,
}

/// Divide rounding half away from zero. `d` must be positive.
#[inline]
fn div_round(n: i128, d: i128) -> i128 {
    let q = n / d;
    let r = n % d;
    if r.abs() * 2 >= d { q + n.signum() } else { q }
}

#[inline]
fn narrow(v: i128) -> Result<i64, ValueError> {
    i64::try_from(v).map_err(|_| ValueError::Overflow)
}

const fn pow10(exp: u32) -> i64 {
    10_i64.pow(exp)
}

/// Parse a plain decimal string ("-12.5", "+3", ".25") into a scaled integer
fn parse_fixed(input: &str, decimals: u32) -> Result<i64, ValueError> {
    let s = input.trim();
    let invalid = || ValueError::InvalidNumber(input.to_string());
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(invalid());
    }
    let frac_len = u32::try_from(frac_part.len()).map_err(|_| invalid())?;
    if frac_len > decimals {
        return Err(ValueError::TooPrecise {
            input: input.to_string(),
            decimals,
        });
    }
    let int: i128 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| invalid())?
    };
    let frac: i128 = if frac_part.is_empty() {
        0
    } else {
        frac_part.parse::<i128>().map_err(|_| invalid())? * i128::from(pow10(decimals - frac_len))
    };
    let scaled = int
        .checked_mul(i128::from(pow10(decimals)))
        .and_then(|v| v.checked_add(frac))
        .ok_or(ValueError::Overflow)?;
    narrow(if negative { -scaled } else { scaled })
}

/// Units of 1e-4 in one minor unit of `currency`
fn minor_step(currency: Currency) -> i128 {
    i128::from(pow10(
        crate::constants::MONEY_DECIMALS - currency.minor_exponent(),
    ))
}

/// Render a scaled integer with exactly `decimals` fractional digits
fn format_fixed(f: &mut fmt::Formatter<'_>, raw: i128, decimals: u32) -> fmt::Result {
    let scale = u128::from(pow10(decimals).unsigned_abs());
    let abs = raw.unsigned_abs();
    let sign = if raw < 0 { "-" } else { "" };
    if decimals == 0 {
        write!(f, "{sign}{abs}")
    } else {
        write!(
            f,
            "{sign}{}.{:0width$}",
            abs / scale,
            abs % scale,
            width = decimals as usize
        )
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn scaled_from_f64(value: f64, scale: i64) -> Result<i64, ValueError> {
    let scaled = (value * scale as f64).round();
    if !scaled.is_finite() || scaled >= i64::MAX as f64 || scaled <= i64::MIN as f64 {
        return Err(ValueError::Overflow);
    }
    Ok(scaled as i64)
}

/// Monetary amount (stored as i64 units, 4 decimal places).
///
/// A `Money` carries no currency of its own; callers keep the currency
/// alongside it (documents, prices, totals).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64); // Internal: 1 unit = 0.0001

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from raw units
    #[must_use]
    pub const fn from_i64(units: i64) -> Self {
        Self(units)
    }

    /// Raw units
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Create from a float amount (rounded to 4 decimals)
    pub fn from_f64(value: f64) -> Result<Self, ValueError> {
        scaled_from_f64(value, MONEY_SCALE).map(Self)
    }

    /// Create from an integer count of minor units of `currency` (cents for EUR)
    pub fn from_minor(minor: i64, currency: Currency) -> Result<Self, ValueError> {
        let step = pow10(crate::constants::MONEY_DECIMALS - currency.minor_exponent());
        minor.checked_mul(step).map(Self).ok_or(ValueError::Overflow)
    }

    /// Amount as f64, for display and statistics only
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / MONEY_SCALE as f64
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// `self × qty`, rounded to 4 decimals
    #[must_use]
    pub fn checked_mul_qty(self, qty: Qty) -> Option<Self> {
        let product = i128::from(self.0) * i128::from(qty.0);
        i64::try_from(div_round(product, i128::from(QTY_SCALE)))
            .ok()
            .map(Self)
    }

    /// Round to the minor unit of `currency`, half away from zero.
    /// `None` when rounding up leaves the i64 range.
    #[must_use]
    pub fn round_to_minor(self, currency: Currency) -> Option<Self> {
        let step = minor_step(currency);
        i64::try_from(div_round(i128::from(self.0), step) * step)
            .ok()
            .map(Self)
    }

    /// Sum a sequence, failing on overflow
    pub fn checked_sum<I: IntoIterator<Item = Self>>(items: I) -> Option<Self> {
        items
            .into_iter()
            .try_fold(Self::ZERO, |acc, m| acc.checked_add(m))
    }

    /// Display rounded to the currency's minor unit, e.g. `1234.50 EUR`
    #[must_use]
    pub fn display_in(self, currency: Currency) -> String {
        let minor = div_round(i128::from(self.0), minor_step(currency));
        format!("{} {currency}", FixedDisplay(minor, currency.minor_exponent()))
    }
}

struct FixedDisplay(i128, u32);

impl fmt::Display for FixedDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_fixed(f, self.0, self.1)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_fixed(f, i128::from(self.0), crate::constants::MONEY_DECIMALS)
    }
}

impl FromStr for Money {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed(s, crate::constants::MONEY_DECIMALS).map(Self)
    }
}

/// Quantity on a line item (stored as i64 units, 4 decimal places)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Qty(i64);

impl Qty {
    /// Zero quantity
    pub const ZERO: Self = Self(0);
    /// One unit
    pub const ONE: Self = Self(QTY_SCALE);

    #[must_use]
    pub const fn from_i64(units: i64) -> Self {
        Self(units)
    }

    /// Whole units
    pub fn from_units(units: i64) -> Result<Self, ValueError> {
        units.checked_mul(QTY_SCALE).map(Self).ok_or(ValueError::Overflow)
    }

    pub fn from_f64(value: f64) -> Result<Self, ValueError> {
        scaled_from_f64(value, QTY_SCALE).map(Self)
    }

    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / QTY_SCALE as f64
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_fixed(f, i128::from(self.0), 4)
    }
}

impl FromStr for Qty {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed(s, 4).map(Self)
    }
}

/// Percentage (1_000_000 = 100%, 4 decimals of a percent)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Percent(i64);

impl Percent {
    pub const ZERO: Self = Self(0);
    pub const HUNDRED: Self = Self(PERCENT_SCALE);

    #[must_use]
    pub const fn from_i64(raw: i64) -> Self {
        Self(raw)
    }

    /// From basis points (100 bps = 1%)
    #[must_use]
    pub const fn from_bps(bps: i64) -> Option<Self> {
        match bps.checked_mul(100) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// From a float percentage: `19.0` is 19%
    pub fn from_f64(percent: f64) -> Result<Self, ValueError> {
        scaled_from_f64(percent, crate::constants::ONE_PERCENT).map(Self)
    }

    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / crate::constants::ONE_PERCENT as f64
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Within 0%..=100%
    #[must_use]
    pub const fn is_fraction(&self) -> bool {
        self.0 >= 0 && self.0 <= PERCENT_SCALE
    }

    /// This percentage of `amount`, rounded to 4 decimals
    #[must_use]
    pub fn apply(self, amount: Money) -> Option<Money> {
        let product = i128::from(amount.0) * i128::from(self.0);
        i64::try_from(div_round(product, i128::from(PERCENT_SCALE)))
            .ok()
            .map(Money)
    }

    /// `part / whole` as a percentage; `None` when `whole` is zero
    #[must_use]
    pub fn ratio(part: i64, whole: i64) -> Option<Self> {
        if whole == 0 {
            return None;
        }
        let scaled = div_round(
            i128::from(part) * i128::from(PERCENT_SCALE),
            i128::from(whole).abs(),
        ) * i128::from(whole.signum());
        i64::try_from(scaled).ok().map(Self)
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_fixed(f, i128::from(self.0), 4)?;
        f.write_str("%")
    }
}

impl FromStr for Percent {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed(s.trim().trim_end_matches('%'), 4).map(Self)
    }
}

/// Multiplicative exchange rate (10 decimal places, always positive).
///
/// `amount_in_quote = amount_in_base × rate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rate(i64);

impl Rate {
    /// Identity rate
    pub const ONE: Self = Self(RATE_SCALE);

    /// Create from raw units
    pub const fn from_raw(raw: i64) -> Result<Self, ValueError> {
        if raw <= 0 {
            Err(ValueError::NonPositiveRate)
        } else {
            Ok(Self(raw))
        }
    }

    /// Create from a float quote as published by a rate feed
    pub fn from_f64(value: f64) -> Result<Self, ValueError> {
        if !(value.is_finite() && value > 0.0) {
            return Err(ValueError::NonPositiveRate);
        }
        Self::from_raw(scaled_from_f64(value, RATE_SCALE)?)
    }

    #[must_use]
    pub const fn as_raw(&self) -> i64 {
        self.0
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / RATE_SCALE as f64
    }

    #[must_use]
    pub const fn is_one(&self) -> bool {
        self.0 == RATE_SCALE
    }

    /// `1 / self`
    pub fn inverse(self) -> Result<Self, ValueError> {
        let scale = i128::from(RATE_SCALE);
        Self::from_raw(narrow(div_round(scale * scale, i128::from(self.0)))?)
    }

    /// `self / other`, the cross rate of two quotes against a common base
    pub fn divide(self, other: Self) -> Result<Self, ValueError> {
        let numerator = i128::from(self.0) * i128::from(RATE_SCALE);
        Self::from_raw(narrow(div_round(numerator, i128::from(other.0)))?)
    }

    /// Convert `amount` with this rate, rounded to 4 decimals
    pub fn convert(self, amount: Money) -> Result<Money, ValueError> {
        let product = i128::from(amount.0) * i128::from(self.0);
        narrow(div_round(product, i128::from(RATE_SCALE))).map(Money)
    }
}

impl TryFrom<i64> for Rate {
    type Error = ValueError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

impl From<Rate> for i64 {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_fixed(f, i128::from(self.0), crate::constants::RATE_DECIMALS)
    }
}

impl FromStr for Rate {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_raw(parse_fixed(s, crate::constants::RATE_DECIMALS)?)
    }
}

/// Timestamp in nanoseconds since UNIX epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ts(pub u64);

impl Ts {
    /// Get current timestamp
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| std::time::Duration::from_secs(0))
            .as_nanos() as u64;
        Self(nanos)
    }

    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(crate::constants::NANOS_PER_SEC))
    }

    #[must_use]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0 / crate::constants::NANOS_PER_SEC
    }

    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0 / crate::constants::NANOS_PER_MILLI
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future
    #[must_use]
    pub const fn since(&self, earlier: Self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// This timestamp moved forward by `duration`
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn add(&self, duration: std::time::Duration) -> Self {
        Self(self.0.saturating_add(duration.as_nanos() as u64))
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}
