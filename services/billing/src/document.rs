//! Quotes and invoices
//!
//! Quote lifecycle:
//!
//! ```text
//! Draft ──send──▶ Sent ──accept──▶ Accepted ──invoice──▶ Converted
//!                  │ ├──reject──▶ Rejected
//!                  │ └──expire──▶ Expired
//! ```
//!
//! Invoice lifecycle:
//!
//! ```text
//! Draft ──issue──▶ Issued ──pay──▶ PartiallyPaid ──pay──▶ Paid
//!   └──cancel──▶ Cancelled ◀──cancel── (Issued, nothing paid)
//! ```
//!
//! Overdue is not a stored status; it is derived from the due date.
//! An invoice that totals zero goes straight to paid when issued.

use crate::error::{BillingError, BillingResult, OrOverflow};
use crate::store::{Record, RecordMeta};
use crate::totals::{Discount, DocumentTotals, LineItem};
use chrono::NaiveDate;
use common::{Currency, Money, Percent, Rate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;
use uuid::Uuid;

/// Exchange rate into the reporting currency, frozen when a document goes out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRate {
    pub currency: Currency,
    pub rate: Rate,
}

/// The priced part shared by quotes and invoices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContent {
    pub currency: Currency,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub discount: Discount,
    pub tax_rate: Percent,
}

impl DocumentContent {
    #[must_use]
    pub const fn new(currency: Currency, tax_rate: Percent) -> Self {
        Self {
            currency,
            items: Vec::new(),
            discount: Discount::None,
            tax_rate,
        }
    }

    pub fn totals(&self) -> BillingResult<DocumentTotals> {
        DocumentTotals::compute(self.currency, &self.items, self.discount, self.tax_rate)
    }

    /// Append a validated line, returning its index
    pub fn add_item(&mut self, item: LineItem) -> BillingResult<usize> {
        item.validate()?;
        self.items.push(item);
        Ok(self.items.len() - 1)
    }

    pub fn remove_item(&mut self, index: usize) -> BillingResult<LineItem> {
        if index >= self.items.len() {
            return Err(BillingError::validation(format!(
                "line {index} does not exist ({} lines)",
                self.items.len()
            )));
        }
        Ok(self.items.remove(index))
    }

    pub fn set_discount(&mut self, discount: Discount) -> BillingResult<()> {
        discount.validate()?;
        self.discount = discount;
        Ok(())
    }

    pub fn set_tax_rate(&mut self, tax_rate: Percent) -> BillingResult<()> {
        if !tax_rate.is_fraction() {
            return Err(BillingError::validation(format!(
                "tax rate {tax_rate} is outside 0%..100%"
            )));
        }
        self.tax_rate = tax_rate;
        Ok(())
    }
}

/// Shared access to quotes and invoices
pub trait Document: Record {
    fn content(&self) -> &DocumentContent;
    fn content_mut(&mut self) -> &mut DocumentContent;
    fn issuing_entity_id(&self) -> Uuid;
    fn customer_id(&self) -> Uuid;
    fn base_rate(&self) -> Option<BaseRate>;
    fn status_label(&self) -> String;
    /// Only drafts may change content
    fn is_editable(&self) -> bool;

    /// Mutable content, or an error naming the current status
    fn editable_content(&mut self) -> BillingResult<&mut DocumentContent> {
        if !self.is_editable() {
            return Err(BillingError::NotEditable {
                kind: Self::KIND,
                id: self.id(),
                status: self.status_label(),
            });
        }
        Ok(self.content_mut())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
    Expired,
    Converted,
}

impl QuoteStatus {
    #[must_use]
    pub const fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Draft, Self::Sent)
                | (Self::Sent, Self::Accepted | Self::Rejected | Self::Expired)
                | (Self::Accepted, Self::Converted)
        )
    }

    /// Accepted, rejected or lapsed
    #[must_use]
    pub const fn is_decided(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Rejected | Self::Expired | Self::Converted
        )
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Converted => "converted",
        };
        f.write_str(label)
    }
}

/// Priced offer to a customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub meta: RecordMeta,
    pub issuing_entity_id: Uuid,
    pub customer_id: Uuid,
    pub number: Option<String>,
    pub status: QuoteStatus,
    pub content: DocumentContent,
    pub issue_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub exchange_rate_to_base: Option<BaseRate>,
    /// Invoice created from this quote
    pub invoice_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl Quote {
    #[must_use]
    pub fn new(issuing_entity_id: Uuid, customer_id: Uuid, content: DocumentContent) -> Self {
        Self {
            meta: RecordMeta::new(),
            issuing_entity_id,
            customer_id,
            number: None,
            status: QuoteStatus::Draft,
            content,
            issue_date: None,
            valid_until: None,
            exchange_rate_to_base: None,
            invoice_id: None,
            notes: None,
        }
    }

    fn transition(&mut self, to: QuoteStatus) -> BillingResult<()> {
        if !self.status.can_transition(to) {
            return Err(BillingError::InvalidTransition {
                kind: Self::KIND,
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        info!(quote = %self.meta.id, from = %self.status, %to, "Quote status changed");
        self.status = to;
        Ok(())
    }

    /// Number the quote and send it to the customer
    pub fn send(
        &mut self,
        number: String,
        issue_date: NaiveDate,
        valid_until: NaiveDate,
        base_rate: BaseRate,
    ) -> BillingResult<()> {
        if self.content.items.is_empty() {
            return Err(BillingError::validation("cannot send a quote without lines"));
        }
        if valid_until < issue_date {
            return Err(BillingError::validation(format!(
                "quote valid until {valid_until} is before its issue date {issue_date}"
            )));
        }
        self.content.totals()?;
        self.transition(QuoteStatus::Sent)?;
        self.number = Some(number);
        self.issue_date = Some(issue_date);
        self.valid_until = Some(valid_until);
        self.exchange_rate_to_base = Some(base_rate);
        Ok(())
    }

    /// Accept on `date`; a lapsed quote cannot be accepted
    pub fn accept(&mut self, date: NaiveDate) -> BillingResult<()> {
        if self.is_lapsed_on(date) {
            self.transition(QuoteStatus::Expired)?;
            return Err(BillingError::validation(format!(
                "quote expired on {}",
                self.valid_until.map_or_else(String::new, |d| d.to_string())
            )));
        }
        self.transition(QuoteStatus::Accepted)
    }

    pub fn reject(&mut self) -> BillingResult<()> {
        self.transition(QuoteStatus::Rejected)
    }

    pub fn expire(&mut self) -> BillingResult<()> {
        self.transition(QuoteStatus::Expired)
    }

    pub fn mark_converted(&mut self, invoice_id: Uuid) -> BillingResult<()> {
        self.transition(QuoteStatus::Converted)?;
        self.invoice_id = Some(invoice_id);
        Ok(())
    }

    /// Sent and past its validity date
    #[must_use]
    pub fn is_lapsed_on(&self, date: NaiveDate) -> bool {
        self.status == QuoteStatus::Sent && self.valid_until.is_some_and(|until| date > until)
    }
}

impl Record for Quote {
    const KIND: &'static str = "quote";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

impl Document for Quote {
    fn content(&self) -> &DocumentContent {
        &self.content
    }

    fn content_mut(&mut self) -> &mut DocumentContent {
        &mut self.content
    }

    fn issuing_entity_id(&self) -> Uuid {
        self.issuing_entity_id
    }

    fn customer_id(&self) -> Uuid {
        self.customer_id
    }

    fn base_rate(&self) -> Option<BaseRate> {
        self.exchange_rate_to_base
    }

    fn status_label(&self) -> String {
        self.status.to_string()
    }

    fn is_editable(&self) -> bool {
        self.status == QuoteStatus::Draft
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    #[must_use]
    pub const fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Draft, Self::Issued | Self::Cancelled)
                | (Self::Issued, Self::PartiallyPaid | Self::Paid | Self::Cancelled)
                | (Self::PartiallyPaid, Self::PartiallyPaid | Self::Paid)
        )
    }

    /// Issued and not yet settled
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Issued | Self::PartiallyPaid)
    }

    /// Counts towards invoiced revenue
    #[must_use]
    pub const fn is_billed(self) -> bool {
        matches!(self, Self::Issued | Self::PartiallyPaid | Self::Paid)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Draft => "draft",
            Self::Issued => "issued",
            Self::PartiallyPaid => "partially paid",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Money received against an invoice, in the invoice currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub amount: Money,
    pub date: NaiveDate,
    pub payment_source_id: Option<Uuid>,
    pub reference: Option<String>,
}

impl Payment {
    #[must_use]
    pub fn new(amount: Money, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            date,
            payment_source_id: None,
            reference: None,
        }
    }

    #[must_use]
    pub const fn via(mut self, payment_source_id: Uuid) -> Self {
        self.payment_source_id = Some(payment_source_id);
        self
    }

    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Request for payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub meta: RecordMeta,
    pub issuing_entity_id: Uuid,
    pub customer_id: Uuid,
    /// Quote this invoice was created from
    pub quote_id: Option<Uuid>,
    pub number: Option<String>,
    pub status: InvoiceStatus,
    pub content: DocumentContent,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub payment_source_id: Option<Uuid>,
    pub exchange_rate_to_base: Option<BaseRate>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    pub notes: Option<String>,
}

impl Invoice {
    #[must_use]
    pub fn new(issuing_entity_id: Uuid, customer_id: Uuid, content: DocumentContent) -> Self {
        Self {
            meta: RecordMeta::new(),
            issuing_entity_id,
            customer_id,
            quote_id: None,
            number: None,
            status: InvoiceStatus::Draft,
            content,
            issue_date: None,
            due_date: None,
            payment_source_id: None,
            exchange_rate_to_base: None,
            payments: Vec::new(),
            notes: None,
        }
    }

    /// Draft invoice carrying over an accepted quote's lines, discount and tax
    pub fn from_quote(quote: &Quote) -> BillingResult<Self> {
        if quote.status != QuoteStatus::Accepted {
            return Err(BillingError::InvalidTransition {
                kind: Quote::KIND,
                from: quote.status.to_string(),
                to: QuoteStatus::Converted.to_string(),
            });
        }
        let mut invoice = Self::new(
            quote.issuing_entity_id,
            quote.customer_id,
            quote.content.clone(),
        );
        invoice.quote_id = Some(quote.meta.id);
        invoice.notes = quote.notes.clone();
        Ok(invoice)
    }

    fn transition(&mut self, to: InvoiceStatus) -> BillingResult<()> {
        if !self.status.can_transition(to) {
            return Err(BillingError::InvalidTransition {
                kind: Self::KIND,
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        if self.status != to {
            info!(invoice = %self.meta.id, from = %self.status, %to, "Invoice status changed");
        }
        self.status = to;
        Ok(())
    }

    /// Number the invoice and freeze its rate into the reporting currency
    pub fn issue(
        &mut self,
        number: String,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        base_rate: BaseRate,
    ) -> BillingResult<()> {
        if self.content.items.is_empty() {
            return Err(BillingError::validation("cannot issue an invoice without lines"));
        }
        if due_date < issue_date {
            return Err(BillingError::validation(format!(
                "due date {due_date} is before issue date {issue_date}"
            )));
        }
        let total = self.content.totals()?.total;
        self.transition(InvoiceStatus::Issued)?;
        // Nothing to collect
        if total.is_zero() {
            self.transition(InvoiceStatus::Paid)?;
        }
        self.number = Some(number);
        self.issue_date = Some(issue_date);
        self.due_date = Some(due_date);
        self.exchange_rate_to_base = Some(base_rate);
        Ok(())
    }

    pub fn cancel(&mut self) -> BillingResult<()> {
        if !self.payments.is_empty() {
            return Err(BillingError::InvalidTransition {
                kind: Self::KIND,
                from: format!("{} with payments", self.status),
                to: InvoiceStatus::Cancelled.to_string(),
            });
        }
        self.transition(InvoiceStatus::Cancelled)
    }

    pub fn total(&self) -> BillingResult<Money> {
        Ok(self.content.totals()?.total)
    }

    pub fn amount_paid(&self) -> BillingResult<Money> {
        Money::checked_sum(self.payments.iter().map(|p| p.amount)).or_overflow("amount paid")
    }

    /// Total minus payments received
    pub fn balance_due(&self) -> BillingResult<Money> {
        self.total()?
            .checked_sub(self.amount_paid()?)
            .or_overflow("balance due")
    }

    /// Apply a payment and move to partially paid or paid
    pub fn record_payment(&mut self, payment: Payment) -> BillingResult<InvoiceStatus> {
        if !self.status.is_open() {
            return Err(BillingError::InvalidTransition {
                kind: Self::KIND,
                from: self.status.to_string(),
                to: InvoiceStatus::Paid.to_string(),
            });
        }
        let currency = self.content.currency;
        let amount = payment
            .amount
            .round_to_minor(currency)
            .or_overflow("payment")?;
        if amount.is_negative() || amount.is_zero() {
            return Err(BillingError::validation(format!(
                "payment amount must be at least one minor unit of {currency}, got {}",
                payment.amount
            )));
        }
        let payment = Payment { amount, ..payment };
        let balance = self.balance_due()?;
        if payment.amount > balance {
            return Err(BillingError::Overpayment {
                balance,
                attempted: payment.amount,
            });
        }
        let next = if payment.amount == balance {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::PartiallyPaid
        };
        self.transition(next)?;
        self.payments.push(payment);
        Ok(next)
    }

    /// Open, with a balance left and a due date before `today`
    #[must_use]
    pub fn is_overdue_on(&self, today: NaiveDate) -> bool {
        self.status.is_open()
            && self.due_date.is_some_and(|due| due < today)
            && self
                .balance_due()
                .is_ok_and(|balance| balance > Money::ZERO)
    }
}

impl Record for Invoice {
    const KIND: &'static str = "invoice";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

impl Document for Invoice {
    fn content(&self) -> &DocumentContent {
        &self.content
    }

    fn content_mut(&mut self) -> &mut DocumentContent {
        &mut self.content
    }

    fn issuing_entity_id(&self) -> Uuid {
        self.issuing_entity_id
    }

    fn customer_id(&self) -> Uuid {
        self.customer_id
    }

    fn base_rate(&self) -> Option<BaseRate> {
        self.exchange_rate_to_base
    }

    fn status_label(&self) -> String {
        self.status.to_string()
    }

    fn is_editable(&self) -> bool {
        self.status == InvoiceStatus::Draft
    }
}
