//! Product catalogue with multi-currency pricing

use crate::error::{BillingError, BillingResult, OrOverflow};
use crate::store::{Record, RecordMeta};
use common::{Currency, Money};
use fx_rates::{ExchangeRateResolver, RateDate};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sellable product or service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub meta: RecordMeta,
    pub name: String,
    pub sku: Option<String>,
    /// Unit of measure shown on documents ("hour", "licence")
    pub unit: String,
    pub description: Option<String>,
    /// Reference price
    pub base_price: Money,
    pub base_currency: Currency,
    /// Explicit prices that override conversion of the base price
    #[serde(default)]
    pub prices: FxHashMap<Currency, Money>,
}

impl Product {
    pub fn new(
        name: impl Into<String>,
        base_price: Money,
        base_currency: Currency,
    ) -> BillingResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BillingError::validation("product name must not be empty"));
        }
        Self::check_price(base_price)?;
        Ok(Self {
            meta: RecordMeta::new(),
            name,
            sku: None,
            unit: "unit".to_string(),
            description: None,
            base_price: base_price
                .round_to_minor(base_currency)
                .or_overflow("base price")?,
            base_currency,
            prices: FxHashMap::default(),
        })
    }

    fn check_price(price: Money) -> BillingResult<()> {
        if price.is_negative() {
            return Err(BillingError::validation(format!(
                "price must not be negative, got {price}"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Pin the price in `currency`; pinning the base currency moves the base price
    pub fn set_price(&mut self, currency: Currency, price: Money) -> BillingResult<()> {
        Self::check_price(price)?;
        let price = price.round_to_minor(currency).or_overflow("price")?;
        if currency == self.base_currency {
            self.base_price = price;
        } else {
            self.prices.insert(currency, price);
        }
        Ok(())
    }

    /// Unpin a price so it follows the base price again
    pub fn clear_price(&mut self, currency: Currency) -> Option<Money> {
        self.prices.remove(&currency)
    }

    /// Price without conversion, if one is defined for `currency`
    #[must_use]
    pub fn explicit_price(&self, currency: Currency) -> Option<Money> {
        if currency == self.base_currency {
            Some(self.base_price)
        } else {
            self.prices.get(&currency).copied()
        }
    }

    /// Price in `currency`: pinned when available, else the converted base price
    pub async fn price_in(
        &self,
        currency: Currency,
        resolver: &ExchangeRateResolver,
        date: RateDate,
    ) -> BillingResult<Money> {
        if let Some(price) = self.explicit_price(currency) {
            return Ok(price);
        }
        let converted = resolver
            .convert(self.base_price, self.base_currency, currency, date)
            .await?
            .round_to_minor(currency)
            .or_overflow("converted price")?;
        debug!(
            product = %self.meta.id,
            from = %self.base_currency,
            to = %currency,
            %converted,
            "Product price converted"
        );
        Ok(converted)
    }
}

impl Record for Product {
    const KIND: &'static str = "product";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}
