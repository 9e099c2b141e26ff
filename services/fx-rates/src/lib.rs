//! Exchange-rate resolution
//!
//! Rate feeds publish every currency against a single pivot (the ECB quotes
//! everything in euros). The resolver caches those pivot quotes per
//! observation date and derives any `(from, to)` rate from them:
//!
//! - `from == to` is the identity and never touches the feed
//! - `from == pivot` is the published quote for `to`
//! - `to == pivot` is the inverse of the published quote for `from`
//! - anything else is the cross rate `quote(to) / quote(from)`

pub mod clock;
pub mod error;
pub mod frankfurter;
pub mod resolver;
pub mod static_source;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{Currency, Rate};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{FxError, FxResult};
pub use frankfurter::FrankfurterSource;
pub use resolver::{ExchangeRateResolver, ResolverStats};
pub use static_source::StaticSource;

/// Which publication of the feed a rate comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RateDate {
    /// Most recent publication
    Latest,
    /// Publication for a given day (feeds fall back to the previous business day)
    On(NaiveDate),
}

impl fmt::Display for RateDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::On(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl From<Option<NaiveDate>> for RateDate {
    fn from(date: Option<NaiveDate>) -> Self {
        date.map_or(Self::Latest, Self::On)
    }
}

/// One publication of pivot quotes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    /// Currency every quote is expressed against
    pub pivot: Currency,
    /// Date the feed says these quotes were published
    pub observed: NaiveDate,
    /// Units of currency per one unit of pivot
    pub rates: FxHashMap<Currency, Rate>,
}

impl RateSnapshot {
    /// Quote for `currency`; the pivot quotes itself at one
    #[must_use]
    pub fn quote(&self, currency: Currency) -> Option<Rate> {
        if currency == self.pivot {
            Some(Rate::ONE)
        } else {
            self.rates.get(&currency).copied()
        }
    }

    /// Currencies in the snapshot, sorted by code
    #[must_use]
    pub fn currencies(&self) -> Vec<Currency> {
        let mut list: Vec<Currency> = self.rates.keys().copied().collect();
        list.sort();
        list
    }
}

/// Upstream provider of pivot quotes
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Fetch the publication for `date`
    async fn fetch(&self, date: RateDate) -> FxResult<RateSnapshot>;

    /// Short name for logs
    fn name(&self) -> &str;
}
