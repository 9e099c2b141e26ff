//! Billing service facade
//!
//! Owns the record tables, the document numberer and a shared exchange-rate
//! resolver, and enforces the cross-record rules: a document belongs to an
//! active issuing entity and customer, payment sources belong to the
//! invoice's issuer, and numbers plus base-currency rates are fixed when a
//! document goes out.

use crate::catalog::Product;
use crate::dashboard::DashboardKpis;
use crate::document::{
    BaseRate, Document, DocumentContent, Invoice, InvoiceStatus, Payment, Quote, QuoteStatus,
};
use crate::entities::{Customer, IssuingEntity, PaymentSource};
use crate::error::{BillingError, BillingResult};
use crate::numbering::{DocumentKind, DocumentNumberer};
use crate::store::{Record, Table};
use crate::totals::{Discount, DocumentTotals, LineItem};
use chrono::{Datelike, Days, NaiveDate};
use common::{Currency, Percent, Qty};
use fx_rates::{ExchangeRateResolver, RateDate};
use serde::{Deserialize, Serialize};
use services_common::AppConfig;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// A quote or an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DocumentRef {
    Quote(Uuid),
    Invoice(Uuid),
}

/// Entry point for every billing operation
#[derive(Debug)]
pub struct BillingService {
    config: AppConfig,
    resolver: Arc<ExchangeRateResolver>,
    numberer: DocumentNumberer,
    customers: Table<Customer>,
    products: Table<Product>,
    entities: Table<IssuingEntity>,
    payment_sources: Table<PaymentSource>,
    quotes: Table<Quote>,
    invoices: Table<Invoice>,
}

impl BillingService {
    #[must_use]
    pub fn new(config: AppConfig, resolver: Arc<ExchangeRateResolver>) -> Self {
        let numberer = DocumentNumberer::new(config.numbering.clone());
        info!(
            base_currency = %config.base_currency,
            payment_terms_days = config.payment_terms_days,
            "Billing service ready"
        );
        Self {
            config,
            resolver,
            numberer,
            customers: Table::new(),
            products: Table::new(),
            entities: Table::new(),
            payment_sources: Table::new(),
            quotes: Table::new(),
            invoices: Table::new(),
        }
    }

    #[must_use]
    pub const fn base_currency(&self) -> Currency {
        self.config.base_currency
    }

    #[must_use]
    pub fn resolver(&self) -> &ExchangeRateResolver {
        &self.resolver
    }

    #[must_use]
    pub const fn numberer(&self) -> &DocumentNumberer {
        &self.numberer
    }

    #[must_use]
    pub const fn customers(&self) -> &Table<Customer> {
        &self.customers
    }

    #[must_use]
    pub const fn products(&self) -> &Table<Product> {
        &self.products
    }

    #[must_use]
    pub const fn issuing_entities(&self) -> &Table<IssuingEntity> {
        &self.entities
    }

    #[must_use]
    pub const fn payment_sources(&self) -> &Table<PaymentSource> {
        &self.payment_sources
    }

    #[must_use]
    pub const fn quotes(&self) -> &Table<Quote> {
        &self.quotes
    }

    #[must_use]
    pub const fn invoices(&self) -> &Table<Invoice> {
        &self.invoices
    }

    /// Register a payment source under an active issuing entity
    pub fn add_payment_source(&self, source: PaymentSource) -> BillingResult<Uuid> {
        self.entities.get(source.issuing_entity_id)?;
        self.payment_sources.insert(source)
    }

    /// Currency and tax rate a new document starts with
    fn new_content(
        &self,
        entity_id: Uuid,
        customer_id: Uuid,
        currency: Option<Currency>,
    ) -> BillingResult<DocumentContent> {
        let entity = self.entities.get(entity_id)?;
        let customer = self.customers.get(customer_id)?;
        let currency = currency
            .or(customer.preferred_currency)
            .unwrap_or(entity.default_currency);
        Ok(DocumentContent::new(currency, entity.default_tax_rate))
    }

    /// Start a draft quote; the currency defaults to the customer's, then the issuer's
    pub fn create_quote(
        &self,
        entity_id: Uuid,
        customer_id: Uuid,
        currency: Option<Currency>,
    ) -> BillingResult<Uuid> {
        let content = self.new_content(entity_id, customer_id, currency)?;
        self.quotes.insert(Quote::new(entity_id, customer_id, content))
    }

    /// Start a draft invoice; the currency defaults to the customer's, then the issuer's
    pub fn create_invoice(
        &self,
        entity_id: Uuid,
        customer_id: Uuid,
        currency: Option<Currency>,
    ) -> BillingResult<Uuid> {
        let content = self.new_content(entity_id, customer_id, currency)?;
        self.invoices.insert(Invoice::new(entity_id, customer_id, content))
    }

    fn content_of(&self, doc: DocumentRef) -> BillingResult<DocumentContent> {
        Ok(match doc {
            DocumentRef::Quote(id) => self.quotes.get(id)?.content,
            DocumentRef::Invoice(id) => self.invoices.get(id)?.content,
        })
    }

    /// Apply `edit` to a draft document's content
    fn edit<R>(
        &self,
        doc: DocumentRef,
        edit: impl FnOnce(&mut DocumentContent) -> BillingResult<R>,
    ) -> BillingResult<R> {
        fn apply<T: Document, R>(
            table: &Table<T>,
            id: Uuid,
            edit: impl FnOnce(&mut DocumentContent) -> BillingResult<R>,
        ) -> BillingResult<R> {
            table.update(id, |document| edit(document.editable_content()?))
        }

        match doc {
            DocumentRef::Quote(id) => apply(&self.quotes, id, edit),
            DocumentRef::Invoice(id) => apply(&self.invoices, id, edit),
        }
    }

    /// Add a line priced from the catalogue in the document's currency
    pub async fn add_product_line(
        &self,
        doc: DocumentRef,
        product_id: Uuid,
        quantity: Qty,
        discount: Percent,
    ) -> BillingResult<usize> {
        let currency = self.content_of(doc)?.currency;
        let product = self.products.get(product_id)?;
        let unit_price = product
            .price_in(currency, &self.resolver, RateDate::Latest)
            .await?;
        let item = LineItem::new(product.name.clone(), quantity, unit_price)
            .with_product(product_id)
            .with_discount(discount);
        self.add_line(doc, item)
    }

    pub fn add_line(&self, doc: DocumentRef, item: LineItem) -> BillingResult<usize> {
        self.edit(doc, |content| content.add_item(item))
    }

    pub fn remove_line(&self, doc: DocumentRef, index: usize) -> BillingResult<LineItem> {
        self.edit(doc, |content| content.remove_item(index))
    }

    pub fn set_discount(&self, doc: DocumentRef, discount: Discount) -> BillingResult<()> {
        self.edit(doc, |content| content.set_discount(discount))
    }

    pub fn set_tax_rate(&self, doc: DocumentRef, tax_rate: Percent) -> BillingResult<()> {
        self.edit(doc, |content| content.set_tax_rate(tax_rate))
    }

    /// Totals in the document's own currency
    pub fn totals(&self, doc: DocumentRef) -> BillingResult<DocumentTotals> {
        self.content_of(doc)?.totals()
    }

    /// Totals in the base currency, using the frozen rate when there is one
    pub async fn totals_in_base(&self, doc: DocumentRef) -> BillingResult<DocumentTotals> {
        let (content, frozen, issued) = match doc {
            DocumentRef::Quote(id) => {
                let quote = self.quotes.get(id)?;
                (quote.content, quote.exchange_rate_to_base, quote.issue_date)
            }
            DocumentRef::Invoice(id) => {
                let invoice = self.invoices.get(id)?;
                (invoice.content, invoice.exchange_rate_to_base, invoice.issue_date)
            }
        };
        let base = self.base_currency();
        let rate = match frozen {
            Some(frozen) if frozen.currency == base => frozen.rate,
            _ => {
                self.resolver
                    .rate(content.currency, base, RateDate::from(issued))
                    .await?
            }
        };
        content.totals()?.convert(rate, base)
    }

    /// Rate into the base currency as published on `date`
    async fn base_rate_on(&self, currency: Currency, date: NaiveDate) -> BillingResult<BaseRate> {
        let base = self.base_currency();
        let rate = self.resolver.rate(currency, base, RateDate::On(date)).await?;
        Ok(BaseRate {
            currency: base,
            rate,
        })
    }

    fn add_days(date: NaiveDate, days: u32) -> BillingResult<NaiveDate> {
        date.checked_add_days(Days::new(u64::from(days)))
            .ok_or_else(|| BillingError::validation(format!("{date} + {days} days is out of range")))
    }

    /// Number, date and send a draft quote
    pub async fn send_quote(&self, id: Uuid, date: NaiveDate) -> BillingResult<String> {
        let quote = self.quotes.get(id)?;
        if quote.status != QuoteStatus::Draft {
            return Err(BillingError::InvalidTransition {
                kind: Quote::KIND,
                from: quote.status.to_string(),
                to: QuoteStatus::Sent.to_string(),
            });
        }
        if quote.content.items.is_empty() {
            return Err(BillingError::validation("cannot send a quote without lines"));
        }
        quote.content.totals()?;
        let valid_until = Self::add_days(date, self.config.quote_validity_days)?;
        let rate = self.base_rate_on(quote.content.currency, date).await?;
        let number = self
            .numberer
            .next(quote.issuing_entity_id, DocumentKind::Quote, date.year());
        self.quotes
            .update(id, |q| q.send(number.clone(), date, valid_until, rate))?;
        info!(quote = %id, %number, %valid_until, "Quote sent");
        Ok(number)
    }

    pub fn accept_quote(&self, id: Uuid, date: NaiveDate) -> BillingResult<()> {
        // A lapsed quote is marked expired even though acceptance fails
        let mut outcome = Ok(());
        self.quotes.update(id, |q| {
            outcome = q.accept(date);
            Ok(())
        })?;
        outcome
    }

    pub fn reject_quote(&self, id: Uuid) -> BillingResult<()> {
        self.quotes.update(id, Quote::reject)
    }

    /// Expire every sent quote past its validity; returns how many changed
    pub fn expire_quotes(&self, today: NaiveDate) -> BillingResult<usize> {
        let mut expired = 0;
        for quote in self.quotes.list_active() {
            if quote.is_lapsed_on(today) {
                self.quotes.update(quote.id(), Quote::expire)?;
                expired += 1;
            }
        }
        if expired > 0 {
            info!(expired, %today, "Lapsed quotes expired");
        }
        Ok(expired)
    }

    /// Create a draft invoice from an accepted quote
    pub fn convert_quote_to_invoice(&self, quote_id: Uuid) -> BillingResult<Uuid> {
        self.entities.get(self.quotes.get(quote_id)?.issuing_entity_id)?;
        let invoice = self.quotes.update(quote_id, |quote| {
            let invoice = Invoice::from_quote(quote)?;
            quote.mark_converted(invoice.id())?;
            Ok(invoice)
        })?;
        let invoice_id = self.invoices.insert(invoice)?;
        info!(quote = %quote_id, invoice = %invoice_id, "Quote converted to invoice");
        Ok(invoice_id)
    }

    /// Active payment source usable for `invoice`
    fn check_payment_source(&self, invoice: &Invoice, source_id: Uuid) -> BillingResult<()> {
        let source = self.payment_sources.get(source_id)?;
        if source.issuing_entity_id != invoice.issuing_entity_id {
            return Err(BillingError::validation(format!(
                "payment source {source_id} belongs to another issuing entity"
            )));
        }
        match source.currency {
            Some(expected) if !source.accepts(invoice.content.currency) => {
                Err(BillingError::CurrencyMismatch {
                    expected,
                    actual: invoice.content.currency,
                })
            }
            _ => Ok(()),
        }
    }

    /// Number and issue a draft invoice, due after the configured payment terms
    pub async fn issue_invoice(
        &self,
        id: Uuid,
        date: NaiveDate,
        payment_source: Option<Uuid>,
    ) -> BillingResult<String> {
        let invoice = self.invoices.get(id)?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(BillingError::InvalidTransition {
                kind: Invoice::KIND,
                from: invoice.status.to_string(),
                to: InvoiceStatus::Issued.to_string(),
            });
        }
        self.entities.get(invoice.issuing_entity_id)?;
        if let Some(source_id) = payment_source {
            self.check_payment_source(&invoice, source_id)?;
        }
        if invoice.content.items.is_empty() {
            return Err(BillingError::validation("cannot issue an invoice without lines"));
        }
        invoice.content.totals()?;
        let due_date = Self::add_days(date, self.config.payment_terms_days)?;
        let rate = self.base_rate_on(invoice.content.currency, date).await?;
        let number = self
            .numberer
            .next(invoice.issuing_entity_id, DocumentKind::Invoice, date.year());
        self.invoices.update(id, |inv| {
            inv.payment_source_id = payment_source.or(inv.payment_source_id);
            inv.issue(number.clone(), date, due_date, rate)
        })?;
        info!(invoice = %id, %number, %due_date, "Invoice issued");
        Ok(number)
    }

    /// Record money received; returns the invoice's new status
    pub fn record_payment(&self, invoice_id: Uuid, payment: Payment) -> BillingResult<InvoiceStatus> {
        let invoice = self.invoices.get(invoice_id)?;
        if let Some(source_id) = payment.payment_source_id {
            self.check_payment_source(&invoice, source_id)?;
        }
        let amount = payment.amount;
        let status = self
            .invoices
            .update(invoice_id, |inv| inv.record_payment(payment))
            .inspect_err(|e| warn!(invoice = %invoice_id, %amount, error = %e, "Payment rejected"))?;
        info!(invoice = %invoice_id, %amount, %status, "Payment recorded");
        Ok(status)
    }

    pub fn cancel_invoice(&self, id: Uuid) -> BillingResult<()> {
        self.invoices.update(id, Invoice::cancel)
    }

    pub fn delete_document(&self, doc: DocumentRef) -> BillingResult<bool> {
        match doc {
            DocumentRef::Quote(id) => self.quotes.soft_delete(id),
            DocumentRef::Invoice(id) => self.invoices.soft_delete(id),
        }
    }

    pub fn restore_document(&self, doc: DocumentRef) -> BillingResult<bool> {
        match doc {
            DocumentRef::Quote(id) => self.quotes.restore(id),
            DocumentRef::Invoice(id) => self.invoices.restore(id),
        }
    }

    /// KPIs in the base currency as of `today`
    pub async fn dashboard(&self, today: NaiveDate) -> BillingResult<DashboardKpis> {
        DashboardKpis::compute(
            &self.invoices.list_active(),
            &self.quotes.list_active(),
            &self.customers.list_all(),
            &self.resolver,
            self.base_currency(),
            today,
        )
        .await
    }
}
