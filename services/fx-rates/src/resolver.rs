//! Cached exchange-rate resolver with pivot triangulation

use crate::clock::{Clock, SystemClock};
use crate::error::{FxError, FxResult};
use crate::frankfurter::FrankfurterSource;
use crate::static_source::StaticSource;
use crate::{RateDate, RateSnapshot, RateSource};
use chrono::NaiveDate;
use common::{Currency, Money, Rate, Ts};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::FxConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cache key: one pivot/currency pair of one publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PairKey {
    date: RateDate,
    currency: Currency,
}

#[derive(Debug, Clone, Copy)]
struct CachedQuote {
    rate: Rate,
    observed: NaiveDate,
    fetched_at: Ts,
}

/// One side of a conversion, relative to the pivot
#[derive(Debug, Clone, Copy)]
enum Leg {
    Pivot,
    Quote(Rate),
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverStats {
    /// Lookups answered without a source call (identity included)
    pub hits: u64,
    /// Lookups that required a refresh
    pub misses: u64,
    /// Successful source fetches
    pub fetches: u64,
    /// Failed source fetches
    pub fetch_errors: u64,
    /// Pairs currently cached, expired or not
    pub cached_pairs: usize,
}

/// Resolves `(from, to)` into a multiplicative rate
pub struct ExchangeRateResolver {
    source: Arc<dyn RateSource>,
    clock: Arc<dyn Clock>,
    pivot: Currency,
    ttl: Duration,
    cache: RwLock<FxHashMap<PairKey, CachedQuote>>,
    /// Serialises refreshes so concurrent misses share one fetch
    refresh_lock: tokio::sync::Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    fetch_errors: AtomicU64,
}

impl std::fmt::Debug for ExchangeRateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeRateResolver")
            .field("source", &self.source.name())
            .field("pivot", &self.pivot)
            .field("ttl", &self.ttl)
            .field("cached_pairs", &self.cache.read().len())
            .finish_non_exhaustive()
    }
}

impl ExchangeRateResolver {
    /// Create a resolver over `source`, which must quote against `pivot`
    pub fn new(source: Arc<dyn RateSource>, pivot: Currency, ttl: Duration) -> Self {
        Self {
            source,
            clock: Arc::new(SystemClock),
            pivot,
            ttl,
            cache: RwLock::new(FxHashMap::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
            fetch_errors: AtomicU64::new(0),
        }
    }

    /// Build from configuration: static quotes when configured, else the HTTP feed
    pub fn from_config(config: &FxConfig) -> FxResult<Self> {
        if config.ttl_secs == 0 {
            return Err(FxError::Configuration("fx.ttl_secs must be positive".to_string()));
        }
        let source: Arc<dyn RateSource> = if config.static_rates.is_empty() {
            Arc::new(FrankfurterSource::from_config(config)?)
        } else {
            Arc::new(StaticSource::from_config(config)?)
        };
        info!(
            source = source.name(),
            pivot = %config.pivot_currency,
            ttl_secs = config.ttl_secs,
            "Exchange-rate resolver ready"
        );
        Ok(Self::new(source, config.pivot_currency, config.ttl()))
    }

    /// Replace the time source
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn pivot(&self) -> Currency {
        self.pivot
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Rate such that `amount_in_to = amount_in_from × rate`
    pub async fn rate(&self, from: Currency, to: Currency, date: RateDate) -> FxResult<Rate> {
        if from == to {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Rate::ONE);
        }

        if let Some(legs) = self.fresh_legs(from, to, date) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(%from, %to, %date, "Rate served from cache");
            return Self::triangulate(legs);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let _guard = self.refresh_lock.lock().await;
        // Another task may have refreshed while we waited
        if let Some(legs) = self.fresh_legs(from, to, date) {
            return Self::triangulate(legs);
        }
        let snapshot = self.refresh(date).await?;
        let legs = (
            self.snapshot_leg(&snapshot, from, date)?,
            self.snapshot_leg(&snapshot, to, date)?,
        );
        Self::triangulate(legs)
    }

    /// Convert `amount` from one currency to another
    pub async fn convert(
        &self,
        amount: Money,
        from: Currency,
        to: Currency,
        date: RateDate,
    ) -> FxResult<Money> {
        let rate = self.rate(from, to, date).await?;
        Ok(rate.convert(amount)?)
    }

    /// Fetch `date` now, replacing whatever is cached for it
    pub async fn prefetch(&self, date: RateDate) -> FxResult<RateSnapshot> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh(date).await
    }

    /// Drop every cached pair of one publication
    pub fn invalidate(&self, date: RateDate) -> usize {
        let mut cache = self.cache.write();
        let before = cache.len();
        cache.retain(|key, _| key.date != date);
        before - cache.len()
    }

    /// Drop everything
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Publications with at least one cached pair, sorted
    #[must_use]
    pub fn cached_dates(&self) -> Vec<RateDate> {
        let mut dates: Vec<RateDate> = self.cache.read().keys().map(|key| key.date).collect();
        dates.sort();
        dates.dedup();
        dates
    }

    /// Observation date behind the cached quotes of `date`, if any are fresh
    #[must_use]
    pub fn observed_date(&self, date: RateDate) -> Option<NaiveDate> {
        let now = self.clock.now();
        self.cache
            .read()
            .iter()
            .find(|(key, quote)| key.date == date && self.is_fresh(quote, now))
            .map(|(_, quote)| quote.observed)
    }

    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            cached_pairs: self.cache.read().len(),
        }
    }

    fn is_fresh(&self, quote: &CachedQuote, now: Ts) -> bool {
        now.since(quote.fetched_at) < self.ttl
    }

    /// Both legs from cache, or `None` if either is missing or expired
    fn fresh_legs(&self, from: Currency, to: Currency, date: RateDate) -> Option<(Leg, Leg)> {
        let now = self.clock.now();
        let cache = self.cache.read();
        let leg = |currency: Currency| -> Option<Leg> {
            if currency == self.pivot {
                return Some(Leg::Pivot);
            }
            cache
                .get(&PairKey { date, currency })
                .filter(|quote| self.is_fresh(quote, now))
                .map(|quote| Leg::Quote(quote.rate))
        };
        Some((leg(from)?, leg(to)?))
    }

    fn snapshot_leg(&self, snapshot: &RateSnapshot, currency: Currency, date: RateDate) -> FxResult<Leg> {
        if currency == self.pivot {
            return Ok(Leg::Pivot);
        }
        snapshot
            .rates
            .get(&currency)
            .map(|rate| Leg::Quote(*rate))
            .ok_or(FxError::UnknownCurrency { currency, date })
    }

    /// Combine two pivot legs. A pivot side contributes nothing, so at most
    /// one inversion or one division is applied.
    fn triangulate((from, to): (Leg, Leg)) -> FxResult<Rate> {
        let rate = match (from, to) {
            (Leg::Pivot, Leg::Pivot) => Rate::ONE,
            (Leg::Pivot, Leg::Quote(to)) => to,
            (Leg::Quote(from), Leg::Pivot) => from.inverse()?,
            (Leg::Quote(from), Leg::Quote(to)) => to.divide(from)?,
        };
        Ok(rate)
    }

    /// Fetch one publication and replace its cached pairs. Must be called
    /// with `refresh_lock` held. On failure the cache is left untouched.
    async fn refresh(&self, date: RateDate) -> FxResult<RateSnapshot> {
        let snapshot = match self.source.fetch(date).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.fetch_errors.fetch_add(1, Ordering::Relaxed);
                warn!(source = self.source.name(), %date, error = %e, "Rate refresh failed");
                return Err(e);
            }
        };
        if snapshot.pivot != self.pivot {
            self.fetch_errors.fetch_add(1, Ordering::Relaxed);
            return Err(FxError::PivotMismatch {
                expected: self.pivot,
                actual: snapshot.pivot,
            });
        }
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let fetched_at = self.clock.now();
        {
            let mut cache = self.cache.write();
            cache.retain(|key, _| key.date != date);
            for (currency, rate) in &snapshot.rates {
                if *currency == self.pivot {
                    continue;
                }
                cache.insert(
                    PairKey {
                        date,
                        currency: *currency,
                    },
                    CachedQuote {
                        rate: *rate,
                        observed: snapshot.observed,
                        fetched_at,
                    },
                );
            }
        }
        info!(
            source = self.source.name(),
            %date,
            observed = %snapshot.observed,
            currencies = snapshot.rates.len(),
            "Reference rates refreshed"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(s: &str) -> Rate {
        s.parse().expect("valid rate")
    }

    #[test]
    fn test_triangulate_pivot_cases() {
        let usd = rate("1.25");
        let gbp = rate("0.8");
        assert_eq!(
            ExchangeRateResolver::triangulate((Leg::Pivot, Leg::Quote(usd))).ok(),
            Some(usd)
        );
        assert_eq!(
            ExchangeRateResolver::triangulate((Leg::Quote(usd), Leg::Pivot)).ok(),
            Some(rate("0.8"))
        );
        assert_eq!(
            ExchangeRateResolver::triangulate((Leg::Quote(usd), Leg::Quote(gbp))).ok(),
            Some(rate("0.64"))
        );
        assert_eq!(
            ExchangeRateResolver::triangulate((Leg::Pivot, Leg::Pivot)).ok(),
            Some(Rate::ONE)
        );
    }
}
