//! Dashboard KPIs normalised into the base currency
//!
//! Only active records count: soft-deleted documents, draft quotes and
//! invoices, and cancelled invoices are left out. Amounts are converted with
//! the rate frozen on the document when it went out; documents without one
//! fall back to the resolver's rate for their issue date.

use crate::document::{BaseRate, Document, Invoice, Quote, QuoteStatus};
use crate::error::{BillingResult, OrOverflow};
use crate::entities::Customer;
use crate::store::Record;
use chrono::NaiveDate;
use common::{Currency, Money, Percent, Rate};
use fx_rates::{ExchangeRateResolver, RateDate};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Customers listed in `top_customers`
pub const TOP_CUSTOMERS: usize = 5;

/// Invoiced amount for one customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRevenue {
    pub customer_id: Uuid,
    pub name: String,
    pub invoiced: Money,
}

/// Headline figures, all in `base_currency`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardKpis {
    pub base_currency: Currency,
    /// Issued, partially paid and paid invoices
    pub invoice_count: usize,
    pub total_invoiced: Money,
    pub total_paid: Money,
    /// `total_invoiced − total_paid`
    pub outstanding: Money,
    pub overdue_amount: Money,
    pub overdue_count: usize,
    /// Sent quotes still within their validity
    pub open_quotes_value: Money,
    pub open_quotes_count: usize,
    /// Accepted or converted quotes over all decided quotes
    pub quote_conversion_rate: Option<Percent>,
    /// `YYYY-MM` of the issue date → invoiced amount
    pub revenue_by_month: BTreeMap<String, Money>,
    /// Highest invoiced amount first
    pub top_customers: Vec<CustomerRevenue>,
}

impl DashboardKpis {
    fn empty(base_currency: Currency) -> Self {
        Self {
            base_currency,
            invoice_count: 0,
            total_invoiced: Money::ZERO,
            total_paid: Money::ZERO,
            outstanding: Money::ZERO,
            overdue_amount: Money::ZERO,
            overdue_count: 0,
            open_quotes_value: Money::ZERO,
            open_quotes_count: 0,
            quote_conversion_rate: None,
            revenue_by_month: BTreeMap::new(),
            top_customers: Vec::new(),
        }
    }

    /// Compute KPIs as of `today`
    pub async fn compute(
        invoices: &[Invoice],
        quotes: &[Quote],
        customers: &[Customer],
        resolver: &ExchangeRateResolver,
        base: Currency,
        today: NaiveDate,
    ) -> BillingResult<Self> {
        let mut kpis = Self::empty(base);
        let mut rates = RateMemo::new(resolver, base);
        let mut by_customer: FxHashMap<Uuid, Money> = FxHashMap::default();

        for invoice in invoices
            .iter()
            .filter(|inv| inv.is_active() && inv.status.is_billed())
        {
            let rate = rates.for_document(invoice, invoice.issue_date).await?;
            let currency = invoice.content.currency;
            let total = to_base(rate, invoice.total()?, base)?;
            let paid = to_base(rate, invoice.amount_paid()?, base)?;
            let open = total.checked_sub(paid).or_overflow("outstanding")?;

            kpis.invoice_count += 1;
            kpis.total_invoiced = kpis.total_invoiced.checked_add(total).or_overflow("total invoiced")?;
            kpis.total_paid = kpis.total_paid.checked_add(paid).or_overflow("total paid")?;
            if invoice.is_overdue_on(today) {
                kpis.overdue_count += 1;
                kpis.overdue_amount = kpis.overdue_amount.checked_add(open).or_overflow("overdue")?;
            }
            if let Some(issued) = invoice.issue_date {
                let month = kpis
                    .revenue_by_month
                    .entry(issued.format("%Y-%m").to_string())
                    .or_insert(Money::ZERO);
                *month = month.checked_add(total).or_overflow("monthly revenue")?;
            }
            let customer = by_customer.entry(invoice.customer_id).or_insert(Money::ZERO);
            *customer = customer.checked_add(total).or_overflow("customer revenue")?;
            debug!(invoice = %invoice.meta.id, %currency, %total, "Invoice counted");
        }
        kpis.outstanding = kpis
            .total_invoiced
            .checked_sub(kpis.total_paid)
            .or_overflow("outstanding")?;

        let mut won = 0_i64;
        let mut decided = 0_i64;
        for quote in quotes.iter().filter(|q| q.is_active()) {
            let lapsed = quote.is_lapsed_on(today);
            if quote.status == QuoteStatus::Sent && !lapsed {
                let rate = rates.for_document(quote, quote.issue_date).await?;
                let value = to_base(rate, quote.content.totals()?.total, base)?;
                kpis.open_quotes_count += 1;
                kpis.open_quotes_value = kpis
                    .open_quotes_value
                    .checked_add(value)
                    .or_overflow("open quotes")?;
            }
            if quote.status.is_decided() || lapsed {
                decided += 1;
            }
            if matches!(quote.status, QuoteStatus::Accepted | QuoteStatus::Converted) {
                won += 1;
            }
        }
        kpis.quote_conversion_rate = Percent::ratio(won, decided);

        let names: FxHashMap<Uuid, &str> = customers
            .iter()
            .map(|c| (c.meta.id, c.name.as_str()))
            .collect();
        let mut top: Vec<CustomerRevenue> = by_customer
            .into_iter()
            .map(|(customer_id, invoiced)| CustomerRevenue {
                customer_id,
                name: names
                    .get(&customer_id)
                    .map_or_else(|| customer_id.to_string(), |name| (*name).to_string()),
                invoiced,
            })
            .collect();
        top.sort_by(|a, b| b.invoiced.cmp(&a.invoiced).then_with(|| a.name.cmp(&b.name)));
        top.truncate(TOP_CUSTOMERS);
        kpis.top_customers = top;

        Ok(kpis)
    }
}

fn to_base(rate: Rate, amount: Money, base: Currency) -> BillingResult<Money> {
    rate.convert(amount)?
        .round_to_minor(base)
        .or_overflow("base amount")
}

/// Rates already looked up during one computation
struct RateMemo<'a> {
    resolver: &'a ExchangeRateResolver,
    base: Currency,
    seen: FxHashMap<(Currency, RateDate), Rate>,
}

impl<'a> RateMemo<'a> {
    fn new(resolver: &'a ExchangeRateResolver, base: Currency) -> Self {
        Self {
            resolver,
            base,
            seen: FxHashMap::default(),
        }
    }

    /// Frozen rate when it targets `base`, else the rate on the issue date
    async fn for_document(
        &mut self,
        document: &impl Document,
        issued: Option<NaiveDate>,
    ) -> BillingResult<Rate> {
        let currency = document.content().currency;
        match document.base_rate() {
            Some(BaseRate { currency: target, rate }) if target == self.base => return Ok(rate),
            _ if currency == self.base => return Ok(Rate::ONE),
            _ => {}
        }
        let date = RateDate::from(issued);
        if let Some(rate) = self.seen.get(&(currency, date)) {
            return Ok(*rate);
        }
        let rate = self.resolver.rate(currency, self.base, date).await?;
        self.seen.insert((currency, date), rate);
        Ok(rate)
    }
}
