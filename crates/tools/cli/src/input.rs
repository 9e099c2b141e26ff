//! JSON input files
//!
//! Hand-written documents use plain decimals (`"quantity": 2.5` or
//! `"unit_price": "95.00"`) rather than the fixed-point wire form of the
//! library types.

use anyhow::{Context, Result, bail};
use billing::{Customer, Discount, DocumentContent, Invoice, LineItem, Quote};
use chrono::NaiveDate;
use common::{Currency, Percent};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// A decimal written either as a JSON number or a string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Decimal {
    Number(serde_json::Number),
    Text(String),
}

impl Decimal {
    fn parse<T>(&self, field: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let text = match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        };
        text.trim()
            .parse()
            .with_context(|| format!("invalid {field}: {text:?}"))
    }
}

#[derive(Debug, Deserialize)]
pub struct LineInput {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Percent, e.g. `10` for 10%
    pub discount: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiscountInput {
    pub percent: Option<Decimal>,
    pub fixed: Option<Decimal>,
}

/// A quote or invoice to price
#[derive(Debug, Deserialize)]
pub struct DocumentInput {
    pub currency: Currency,
    /// Issue date; rates for the base conversion are taken from this day
    pub date: Option<NaiveDate>,
    pub items: Vec<LineInput>,
    #[serde(default)]
    pub discount: DiscountInput,
    /// Percent, e.g. `20` for 20%
    pub tax_rate: Option<Decimal>,
}

impl DocumentInput {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn content(&self) -> Result<DocumentContent> {
        let tax_rate = match &self.tax_rate {
            Some(rate) => rate.parse::<Percent>("tax_rate")?,
            None => Percent::ZERO,
        };
        let mut content = DocumentContent::new(self.currency, Percent::ZERO);
        content.set_tax_rate(tax_rate)?;
        for (index, line) in self.items.iter().enumerate() {
            let mut item = LineItem::new(
                line.description.clone(),
                line.quantity.parse("quantity")?,
                line.unit_price.parse("unit_price")?,
            );
            if let Some(discount) = &line.discount {
                item = item.with_discount(discount.parse("line discount")?);
            }
            content
                .add_item(item)
                .with_context(|| format!("line {}", index + 1))?;
        }
        content.set_discount(self.discount.resolve()?)?;
        Ok(content)
    }
}

impl DiscountInput {
    fn resolve(&self) -> Result<Discount> {
        match (&self.percent, &self.fixed) {
            (None, None) => Ok(Discount::None),
            (Some(p), None) => Ok(Discount::Percent(p.parse("discount.percent")?)),
            (None, Some(m)) => Ok(Discount::Fixed(m.parse("discount.fixed")?)),
            (Some(_), Some(_)) => bail!("discount takes either percent or fixed, not both"),
        }
    }
}

/// Exported records for the dashboard
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BookInput {
    pub customers: Vec<Customer>,
    pub quotes: Vec<Quote>,
    pub invoices: Vec<Invoice>,
}

impl BookInput {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }
}
