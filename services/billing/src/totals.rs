//! Line items and document totals
//!
//! Every intermediate amount is rounded to the document currency's minor
//! unit, so the printed figures always add up:
//!
//! ```text
//! subtotal = Σ round(qty × unit_price)
//! discount = Σ round(line_total × line_discount) + document discount
//! taxable  = subtotal − discount
//! tax      = round(taxable × tax_rate)
//! total    = taxable + tax
//! ```

use crate::error::{BillingError, BillingResult, OrOverflow};
use common::{Currency, Money, Percent, Qty, Rate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One product/quantity/price row of a quote or invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Catalogue product this line was priced from, if any
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: Qty,
    /// In the document's currency
    pub unit_price: Money,
    /// Line-level discount
    #[serde(default)]
    pub discount: Percent,
}

impl LineItem {
    #[must_use]
    pub fn new(description: impl Into<String>, quantity: Qty, unit_price: Money) -> Self {
        Self {
            product_id: None,
            description: description.into(),
            quantity,
            unit_price,
            discount: Percent::ZERO,
        }
    }

    #[must_use]
    pub const fn with_discount(mut self, discount: Percent) -> Self {
        self.discount = discount;
        self
    }

    #[must_use]
    pub const fn with_product(mut self, product_id: Uuid) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn validate(&self) -> BillingResult<()> {
        if self.description.trim().is_empty() {
            return Err(BillingError::validation("line description must not be empty"));
        }
        if !self.quantity.is_positive() {
            return Err(BillingError::validation(format!(
                "line {:?}: quantity must be positive, got {}",
                self.description, self.quantity
            )));
        }
        if self.unit_price.is_negative() {
            return Err(BillingError::validation(format!(
                "line {:?}: unit price must not be negative, got {}",
                self.description, self.unit_price
            )));
        }
        if !self.discount.is_fraction() {
            return Err(BillingError::validation(format!(
                "line {:?}: discount {} is outside 0%..100%",
                self.description, self.discount
            )));
        }
        Ok(())
    }

    /// `round(quantity × unit_price)`
    pub fn line_total(&self, currency: Currency) -> BillingResult<Money> {
        Ok(self
            .unit_price
            .checked_mul_qty(self.quantity)
            .or_overflow("line total")?
            .round_to_minor(currency)
            .or_overflow("line total")?)
    }

    /// `round(line_total × discount)`
    pub fn line_discount(&self, currency: Currency) -> BillingResult<Money> {
        Ok(self
            .discount
            .apply(self.line_total(currency)?)
            .or_overflow("line discount")?
            .round_to_minor(currency)
            .or_overflow("line discount")?)
    }
}

/// Document-level discount, applied after line discounts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    #[default]
    None,
    Percent(Percent),
    /// Fixed amount in the document currency, capped at the discountable amount
    Fixed(Money),
}

impl Discount {
    pub fn validate(&self) -> BillingResult<()> {
        match self {
            Self::None => Ok(()),
            Self::Percent(p) if p.is_fraction() => Ok(()),
            Self::Percent(p) => Err(BillingError::validation(format!(
                "document discount {p} is outside 0%..100%"
            ))),
            Self::Fixed(m) if !m.is_negative() => Ok(()),
            Self::Fixed(m) => Err(BillingError::validation(format!(
                "document discount must not be negative, got {m}"
            ))),
        }
    }

    /// Discount taken from `base`, rounded, never more than `base`
    fn amount(self, base: Money, currency: Currency) -> BillingResult<Money> {
        Ok(match self {
            Self::None => Money::ZERO,
            Self::Percent(p) => p
                .apply(base)
                .or_overflow("document discount")?
                .round_to_minor(currency)
                .or_overflow("document discount")?,
            Self::Fixed(m) => m
                .round_to_minor(currency)
                .or_overflow("document discount")?
                .min(base),
        })
    }
}

/// Computed figures of a quote or invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub currency: Currency,
    pub subtotal: Money,
    pub discount: Money,
    pub taxable: Money,
    pub tax: Money,
    pub total: Money,
}

impl DocumentTotals {
    #[must_use]
    pub const fn zero(currency: Currency) -> Self {
        Self {
            currency,
            subtotal: Money::ZERO,
            discount: Money::ZERO,
            taxable: Money::ZERO,
            tax: Money::ZERO,
            total: Money::ZERO,
        }
    }

    /// Compute totals for `items` in `currency`
    pub fn compute(
        currency: Currency,
        items: &[LineItem],
        discount: Discount,
        tax_rate: Percent,
    ) -> BillingResult<Self> {
        if !tax_rate.is_fraction() {
            return Err(BillingError::validation(format!(
                "tax rate {tax_rate} is outside 0%..100%"
            )));
        }
        discount.validate()?;

        let mut subtotal = Money::ZERO;
        let mut line_discounts = Money::ZERO;
        for item in items {
            item.validate()?;
            subtotal = subtotal
                .checked_add(item.line_total(currency)?)
                .or_overflow("subtotal")?;
            line_discounts = line_discounts
                .checked_add(item.line_discount(currency)?)
                .or_overflow("discount")?;
        }

        let discountable = subtotal.checked_sub(line_discounts).or_overflow("discount")?;
        let discount = line_discounts
            .checked_add(discount.amount(discountable, currency)?)
            .or_overflow("discount")?;
        let taxable = subtotal.checked_sub(discount).or_overflow("taxable amount")?;
        let tax = tax_rate
            .apply(taxable)
            .or_overflow("tax")?
            .round_to_minor(currency)
            .or_overflow("tax")?;
        let total = taxable.checked_add(tax).or_overflow("total")?;

        Ok(Self {
            currency,
            subtotal,
            discount,
            taxable,
            tax,
            total,
        })
    }

    /// Express these totals in `target` using `rate` (document → target).
    ///
    /// Subtotal, discount and tax are converted and rounded individually;
    /// taxable and total are re-derived so they still add up in `target`.
    pub fn convert(&self, rate: Rate, target: Currency) -> BillingResult<Self> {
        if self.currency == target && rate.is_one() {
            return Ok(*self);
        }
        let convert = |amount: Money| -> BillingResult<Money> {
            rate.convert(amount)?
                .round_to_minor(target)
                .or_overflow("converted amount")
        };
        let subtotal = convert(self.subtotal)?;
        let discount = convert(self.discount)?;
        let tax = convert(self.tax)?;
        let taxable = subtotal.checked_sub(discount).or_overflow("taxable amount")?;
        let total = taxable.checked_add(tax).or_overflow("total")?;
        Ok(Self {
            currency: target,
            subtotal,
            discount,
            taxable,
            tax,
            total,
        })
    }
}
