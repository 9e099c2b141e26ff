//! Fixed quote table, for offline use

use crate::error::{FxError, FxResult};
use crate::{RateDate, RateSnapshot, RateSource};
use async_trait::async_trait;
use common::{Currency, Rate};
use rustc_hash::FxHashMap;
use services_common::FxConfig;

/// Serves the same quotes for every date
#[derive(Debug, Clone)]
pub struct StaticSource {
    pivot: Currency,
    rates: FxHashMap<Currency, Rate>,
}

impl StaticSource {
    #[must_use]
    pub fn new(pivot: Currency, rates: FxHashMap<Currency, Rate>) -> Self {
        Self { pivot, rates }
    }

    /// Build from `fx.static_rates`
    pub fn from_config(config: &FxConfig) -> FxResult<Self> {
        if config.static_rates.is_empty() {
            return Err(FxError::Configuration("fx.static_rates is empty".to_string()));
        }
        let rates = config
            .static_rates
            .iter()
            .filter(|(currency, _)| **currency != config.pivot_currency)
            .map(|(currency, value)| Ok((*currency, Rate::from_f64(*value)?)))
            .collect::<FxResult<FxHashMap<_, _>>>()?;
        Ok(Self::new(config.pivot_currency, rates))
    }

    /// Add or replace a quote
    #[must_use]
    pub fn with_rate(mut self, currency: Currency, rate: Rate) -> Self {
        self.rates.insert(currency, rate);
        self
    }
}

#[async_trait]
impl RateSource for StaticSource {
    async fn fetch(&self, date: RateDate) -> FxResult<RateSnapshot> {
        let observed = match date {
            RateDate::On(day) => day,
            RateDate::Latest => chrono::Utc::now().date_naive(),
        };
        Ok(RateSnapshot {
            pivot: self.pivot,
            observed,
            rates: self.rates.clone(),
        })
    }

    fn name(&self) -> &str {
        "static"
    }
}
