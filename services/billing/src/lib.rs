//! Quotes, invoices and their money
//!
//! Documents are priced in their own currency and normalised into the
//! configured base currency for reporting. Conversions go through the shared
//! [`fx_rates::ExchangeRateResolver`]; issued documents freeze the rate they
//! went out with so historical figures stay put when the feed moves.

pub mod catalog;
pub mod dashboard;
pub mod document;
pub mod entities;
pub mod error;
pub mod numbering;
pub mod service;
pub mod store;
pub mod totals;

pub use catalog::Product;
pub use dashboard::{CustomerRevenue, DashboardKpis};
pub use document::{
    BaseRate, Document, DocumentContent, Invoice, InvoiceStatus, Payment, Quote, QuoteStatus,
};
pub use entities::{Address, Customer, IssuingEntity, PaymentMethod, PaymentSource};
pub use error::{BillingError, BillingResult};
pub use numbering::{DocumentKind, DocumentNumberer};
pub use service::{BillingService, DocumentRef};
pub use store::{Record, RecordMeta, Table};
pub use totals::{Discount, DocumentTotals, LineItem};
