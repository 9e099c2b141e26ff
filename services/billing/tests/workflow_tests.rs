//! Quote and invoice workflow tests
//!
//! Tests cover:
//! - Quote → invoice → payment lifecycle and numbering
//! - Currency defaults and catalogue pricing
//! - Status guards (locked content, overpayment, cancellation, expiry)
//! - Payment source ownership and currency restrictions
//! - Rates frozen at issue time

use async_trait::async_trait;
use billing::{
    BillingError, BillingService, Customer, Discount, DocumentRef, InvoiceStatus, IssuingEntity,
    LineItem, Payment, PaymentMethod, PaymentSource, Product, QuoteStatus, Record,
};
use chrono::NaiveDate;
use common::{Currency, Money, Percent, Qty, Rate};
use fx_rates::{ExchangeRateResolver, FxResult, RateDate, RateSnapshot, RateSource};
use parking_lot::RwLock;
use pretty_assertions::assert_eq;
use rstest::*;
use rustc_hash::FxHashMap;
use services_common::AppConfig;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn money(s: &str) -> Money {
    s.parse().expect("valid money")
}

fn qty(s: &str) -> Qty {
    s.parse().expect("valid qty")
}

fn pct(s: &str) -> Percent {
    s.parse().expect("valid percent")
}

fn rate(s: &str) -> Rate {
    s.parse().expect("valid rate")
}

fn day(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).expect("valid date")
}

/// EUR-pivot quotes whose USD rate can be moved mid-test
#[derive(Debug)]
struct ShiftingSource {
    usd: RwLock<Rate>,
}

#[async_trait]
impl RateSource for ShiftingSource {
    async fn fetch(&self, date: RateDate) -> FxResult<RateSnapshot> {
        let mut rates = FxHashMap::default();
        rates.insert(Currency::USD, *self.usd.read());
        rates.insert(Currency::GBP, rate("0.8"));
        Ok(RateSnapshot {
            pivot: Currency::EUR,
            observed: match date {
                RateDate::On(d) => d,
                RateDate::Latest => day(6, 28),
            },
            rates,
        })
    }

    fn name(&self) -> &str {
        "shifting"
    }
}

struct Fixture {
    service: BillingService,
    source: Arc<ShiftingSource>,
    entity: Uuid,
    customer: Uuid,
    usd_customer: Uuid,
}

impl Fixture {
    /// Draft in EUR with one 100.00 line at the entity's 20% tax
    fn eur_invoice(&self) -> Uuid {
        let id = self
            .service
            .create_invoice(self.entity, self.customer, None)
            .expect("invoice");
        self.service
            .add_line(
                DocumentRef::Invoice(id),
                LineItem::new("Support", qty("1"), money("100")),
            )
            .expect("line");
        id
    }
}

#[fixture]
fn fx() -> Fixture {
    let source = Arc::new(ShiftingSource {
        usd: RwLock::new(rate("1.25")),
    });
    let resolver =
        ExchangeRateResolver::new(source.clone(), Currency::EUR, Duration::from_secs(3600));
    let config = AppConfig {
        quote_validity_days: 14,
        ..AppConfig::default()
    };
    let service = BillingService::new(config, Arc::new(resolver));

    let entity = service
        .issuing_entities()
        .insert(IssuingEntity::new("Studio GmbH", Currency::EUR, pct("20")).expect("entity"))
        .expect("insert entity");
    let customer = service
        .customers()
        .insert(Customer::new("Acme").expect("customer"))
        .expect("insert customer");
    let usd_customer = service
        .customers()
        .insert(
            Customer::new("Globex")
                .expect("customer")
                .with_preferred_currency(Currency::USD),
        )
        .expect("insert customer");

    Fixture {
        service,
        source,
        entity,
        customer,
        usd_customer,
    }
}

#[rstest]
#[tokio::test]
async fn test_quote_to_paid_invoice(fx: Fixture) {
    let svc = &fx.service;
    let quote = svc.create_quote(fx.entity, fx.customer, None).expect("quote");
    let doc = DocumentRef::Quote(quote);
    svc.add_line(doc, LineItem::new("Design", qty("10"), money("95")))
        .expect("line");
    svc.add_line(doc, LineItem::new("Hosting", qty("1"), money("250")))
        .expect("line");
    svc.set_discount(doc, Discount::Fixed(money("200"))).expect("discount");

    let number = svc.send_quote(quote, day(1, 8)).await.expect("send");
    assert_eq!(number, "QUO-2024-0001");
    let sent = svc.quotes().get(quote).expect("quote");
    assert_eq!(sent.valid_until, Some(day(1, 22)));
    assert_eq!(sent.status, QuoteStatus::Sent);

    svc.accept_quote(quote, day(1, 10)).expect("accept");
    let invoice = svc.convert_quote_to_invoice(quote).expect("convert");
    let converted = svc.quotes().get(quote).expect("quote");
    assert_eq!(converted.status, QuoteStatus::Converted);
    assert_eq!(converted.invoice_id, Some(invoice));

    let number = svc.issue_invoice(invoice, day(1, 12), None).await.expect("issue");
    assert_eq!(number, "INV-2024-0001");

    // (950 + 250 − 200) × 1.2
    let totals = svc.totals(DocumentRef::Invoice(invoice)).expect("totals");
    assert_eq!(totals.taxable, money("1000"));
    assert_eq!(totals.total, money("1200"));

    let status = svc
        .record_payment(invoice, Payment::new(money("500"), day(1, 20)))
        .expect("payment");
    assert_eq!(status, InvoiceStatus::PartiallyPaid);
    let status = svc
        .record_payment(
            invoice,
            Payment::new(money("700"), day(2, 1)).with_reference("wire 42"),
        )
        .expect("payment");
    assert_eq!(status, InvoiceStatus::Paid);

    let paid = svc.invoices().get(invoice).expect("invoice");
    assert_eq!(paid.quote_id, Some(quote));
    assert_eq!(paid.due_date, Some(day(2, 11)));
    assert_eq!(paid.balance_due().expect("balance"), Money::ZERO);
}

#[rstest]
fn test_converting_unaccepted_quote_fails(fx: Fixture) {
    let quote = fx
        .service
        .create_quote(fx.entity, fx.customer, None)
        .expect("quote");
    let err = fx.service.convert_quote_to_invoice(quote).unwrap_err();
    assert!(matches!(err, BillingError::InvalidTransition { kind: "quote", .. }));
    assert!(fx.service.invoices().list_active().is_empty());
}

#[rstest]
fn test_document_currency_defaults(fx: Fixture) {
    let svc = &fx.service;
    let usd = svc.create_invoice(fx.entity, fx.usd_customer, None).expect("invoice");
    let gbp = svc
        .create_invoice(fx.entity, fx.usd_customer, Some(Currency::GBP))
        .expect("invoice");
    let eur = svc.create_invoice(fx.entity, fx.customer, None).expect("invoice");

    let currency = |id| svc.invoices().get(id).expect("invoice").content.currency;
    assert_eq!(currency(usd), Currency::USD);
    assert_eq!(currency(gbp), Currency::GBP);
    assert_eq!(currency(eur), Currency::EUR);
    assert_eq!(svc.invoices().get(eur).expect("invoice").content.tax_rate, pct("20"));
}

#[rstest]
fn test_deleted_customer_cannot_get_new_documents(fx: Fixture) {
    fx.service.customers().soft_delete(fx.customer).expect("delete");
    let err = fx
        .service
        .create_quote(fx.entity, fx.customer, None)
        .unwrap_err();
    assert!(matches!(err, BillingError::NotFound { kind: "customer", .. }));
}

#[rstest]
#[tokio::test]
async fn test_product_lines_use_document_currency(fx: Fixture) {
    let svc = &fx.service;
    let mut product = Product::new("Licence", money("100"), Currency::EUR).expect("product");
    product.set_price(Currency::GBP, money("79")).expect("pin");
    let product = svc.products().insert(product).expect("insert");

    let usd = svc.create_invoice(fx.entity, fx.usd_customer, None).expect("invoice");
    let gbp = svc
        .create_invoice(fx.entity, fx.customer, Some(Currency::GBP))
        .expect("invoice");
    svc.add_product_line(DocumentRef::Invoice(usd), product, qty("2"), Percent::ZERO)
        .await
        .expect("usd line");
    svc.add_product_line(DocumentRef::Invoice(gbp), product, qty("1"), pct("10"))
        .await
        .expect("gbp line");

    let usd_invoice = svc.invoices().get(usd).expect("invoice");
    let usd_line = &usd_invoice.content.items[0];
    assert_eq!(usd_line.unit_price, money("125"));
    assert_eq!(usd_line.product_id, Some(product));
    assert_eq!(usd_line.description, "Licence");

    let gbp_invoice = svc.invoices().get(gbp).expect("invoice");
    let gbp_line = &gbp_invoice.content.items[0];
    assert_eq!(gbp_line.unit_price, money("79"));
    assert_eq!(gbp_line.discount, pct("10"));
}

#[rstest]
#[tokio::test]
async fn test_issued_invoice_is_locked(fx: Fixture) {
    let invoice = fx.eur_invoice();
    fx.service
        .issue_invoice(invoice, day(3, 1), None)
        .await
        .expect("issue");

    let doc = DocumentRef::Invoice(invoice);
    let err = fx
        .service
        .add_line(doc, LineItem::new("Extra", qty("1"), money("1")))
        .unwrap_err();
    assert!(matches!(err, BillingError::NotEditable { kind: "invoice", .. }));
    assert!(fx.service.set_tax_rate(doc, Percent::ZERO).is_err());
    assert!(fx.service.issue_invoice(invoice, day(3, 2), None).await.is_err());
}

#[rstest]
#[tokio::test]
async fn test_empty_invoice_cannot_be_issued(fx: Fixture) {
    let invoice = fx
        .service
        .create_invoice(fx.entity, fx.customer, None)
        .expect("invoice");
    let err = fx.service.issue_invoice(invoice, day(3, 1), None).await.unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));
    assert_eq!(
        fx.service.invoices().get(invoice).expect("invoice").status,
        InvoiceStatus::Draft
    );
}

#[rstest]
#[tokio::test]
async fn test_overpayment_rejected(fx: Fixture) {
    let invoice = fx.eur_invoice();
    fx.service
        .issue_invoice(invoice, day(3, 1), None)
        .await
        .expect("issue");

    let err = fx
        .service
        .record_payment(invoice, Payment::new(money("120.01"), day(3, 5)))
        .unwrap_err();
    match err {
        BillingError::Overpayment { balance, attempted } => {
            assert_eq!(balance, money("120"));
            assert_eq!(attempted, money("120.01"));
        }
        other => panic!("expected overpayment, got {other:?}"),
    }
    assert!(
        fx.service
            .record_payment(invoice, Payment::new(Money::ZERO, day(3, 5)))
            .is_err()
    );

    let stored = fx.service.invoices().get(invoice).expect("invoice");
    assert_eq!(stored.status, InvoiceStatus::Issued);
    assert!(stored.payments.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_payment_below_minor_unit_rejected(fx: Fixture) {
    let invoice = fx.eur_invoice();
    fx.service
        .issue_invoice(invoice, day(3, 1), None)
        .await
        .expect("issue");

    let err = fx
        .service
        .record_payment(invoice, Payment::new(money("0.004"), day(3, 5)))
        .unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));

    let stored = fx.service.invoices().get(invoice).expect("invoice");
    assert_eq!(stored.status, InvoiceStatus::Issued);
    assert!(stored.payments.is_empty());
    fx.service.cancel_invoice(invoice).expect("still cancellable");

    // Half a cent rounds up to a real payment
    let other = fx.eur_invoice();
    fx.service
        .issue_invoice(other, day(3, 1), None)
        .await
        .expect("issue");
    let status = fx
        .service
        .record_payment(other, Payment::new(money("0.005"), day(3, 5)))
        .expect("payment");
    assert_eq!(status, InvoiceStatus::PartiallyPaid);
    let stored = fx.service.invoices().get(other).expect("invoice");
    assert_eq!(stored.payments[0].amount, money("0.01"));
}

#[rstest]
#[tokio::test]
async fn test_zero_total_invoice_is_settled_on_issue(fx: Fixture) {
    let invoice = fx.eur_invoice();
    let doc = DocumentRef::Invoice(invoice);
    fx.service
        .set_discount(doc, Discount::Percent(pct("100")))
        .expect("discount");
    assert_eq!(fx.service.totals(doc).expect("totals").total, Money::ZERO);

    fx.service
        .issue_invoice(invoice, day(3, 1), None)
        .await
        .expect("issue");

    let stored = fx.service.invoices().get(invoice).expect("invoice");
    assert_eq!(stored.status, InvoiceStatus::Paid);
    assert!(stored.number.is_some());
    assert!(!stored.is_overdue_on(day(12, 31)));
    assert!(
        fx.service
            .record_payment(invoice, Payment::new(money("1"), day(3, 5)))
            .is_err()
    );
}

#[rstest]
#[tokio::test]
async fn test_cancellation_rules(fx: Fixture) {
    let draft = fx.eur_invoice();
    fx.service.cancel_invoice(draft).expect("cancel draft");
    assert_eq!(
        fx.service.invoices().get(draft).expect("invoice").status,
        InvoiceStatus::Cancelled
    );

    let paid = fx.eur_invoice();
    fx.service.issue_invoice(paid, day(3, 1), None).await.expect("issue");
    fx.service
        .record_payment(paid, Payment::new(money("20"), day(3, 2)))
        .expect("payment");
    let err = fx.service.cancel_invoice(paid).unwrap_err();
    assert!(matches!(err, BillingError::InvalidTransition { .. }));
}

#[rstest]
#[tokio::test]
async fn test_lapsed_quote_expires(fx: Fixture) {
    let svc = &fx.service;
    let late = svc.create_quote(fx.entity, fx.customer, None).expect("quote");
    let swept = svc.create_quote(fx.entity, fx.customer, None).expect("quote");
    for id in [late, swept] {
        svc.add_line(
            DocumentRef::Quote(id),
            LineItem::new("Audit", qty("1"), money("300")),
        )
        .expect("line");
        svc.send_quote(id, day(1, 1)).await.expect("send");
    }

    assert!(svc.accept_quote(late, day(1, 20)).is_err());
    assert_eq!(svc.quotes().get(late).expect("quote").status, QuoteStatus::Expired);

    assert_eq!(svc.expire_quotes(day(1, 15)).expect("sweep"), 0);
    assert_eq!(svc.expire_quotes(day(1, 16)).expect("sweep"), 1);
    assert_eq!(svc.quotes().get(swept).expect("quote").status, QuoteStatus::Expired);
    assert!(svc.reject_quote(swept).is_err());
}

#[rstest]
#[tokio::test]
async fn test_numbers_are_sequential_per_year(fx: Fixture) {
    let a = fx.eur_invoice();
    let b = fx.eur_invoice();
    let c = fx.eur_invoice();
    let svc = &fx.service;
    assert_eq!(svc.issue_invoice(a, day(12, 30), None).await.expect("issue"), "INV-2024-0001");
    assert_eq!(svc.issue_invoice(b, day(12, 31), None).await.expect("issue"), "INV-2024-0002");
    let next_year = NaiveDate::from_ymd_opt(2025, 1, 2).expect("date");
    assert_eq!(svc.issue_invoice(c, next_year, None).await.expect("issue"), "INV-2025-0001");
}

#[rstest]
#[tokio::test]
async fn test_payment_source_must_match_issuer_and_currency(fx: Fixture) {
    let svc = &fx.service;
    let other_entity = svc
        .issuing_entities()
        .insert(IssuingEntity::new("Other Ltd", Currency::GBP, Percent::ZERO).expect("entity"))
        .expect("insert");
    let foreign = svc
        .add_payment_source(
            PaymentSource::new(
                other_entity,
                "Other bank",
                PaymentMethod::Other {
                    details: "cash".to_string(),
                },
            )
            .expect("source"),
        )
        .expect("insert");
    let usd_only = svc
        .add_payment_source(
            PaymentSource::new(
                fx.entity,
                "USD account",
                PaymentMethod::BankTransfer {
                    iban: "DE89 3704 0044 0532 0130 00".to_string(),
                    bic: None,
                },
            )
            .expect("source")
            .with_currency(Currency::USD),
        )
        .expect("insert");

    let invoice = fx.eur_invoice();
    let err = svc.issue_invoice(invoice, day(4, 1), Some(foreign)).await.unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));
    let err = svc.issue_invoice(invoice, day(4, 1), Some(usd_only)).await.unwrap_err();
    assert!(matches!(
        err,
        BillingError::CurrencyMismatch {
            expected: Currency::USD,
            actual: Currency::EUR
        }
    ));

    let orphan = PaymentSource::new(
        Uuid::new_v4(),
        "Nobody",
        PaymentMethod::Other {
            details: "n/a".to_string(),
        },
    )
    .expect("source");
    assert!(svc.add_payment_source(orphan).is_err());
}

#[rstest]
#[tokio::test]
async fn test_issued_rate_is_frozen(fx: Fixture) {
    let svc = &fx.service;
    let issued = svc.create_invoice(fx.entity, fx.usd_customer, None).expect("invoice");
    let draft = svc.create_invoice(fx.entity, fx.usd_customer, None).expect("invoice");
    for id in [issued, draft] {
        let doc = DocumentRef::Invoice(id);
        svc.add_line(doc, LineItem::new("Retainer", qty("1"), money("100")))
            .expect("line");
        svc.set_tax_rate(doc, Percent::ZERO).expect("tax");
    }
    svc.issue_invoice(issued, day(1, 10), None).await.expect("issue");

    let frozen = svc
        .invoices()
        .get(issued)
        .expect("invoice")
        .exchange_rate_to_base
        .expect("rate captured");
    assert_eq!(frozen.currency, Currency::EUR);
    assert_eq!(frozen.rate, rate("0.8"));

    // The feed moves; issued figures must not
    *fx.source.usd.write() = rate("2");
    svc.resolver().clear();

    let base = svc.totals_in_base(DocumentRef::Invoice(issued)).await.expect("base");
    assert_eq!(base.currency, Currency::EUR);
    assert_eq!(base.total, money("80"));

    let base = svc.totals_in_base(DocumentRef::Invoice(draft)).await.expect("base");
    assert_eq!(base.total, money("50"));
}

#[rstest]
fn test_soft_deleted_documents_can_be_restored(fx: Fixture) {
    let invoice = fx.eur_invoice();
    let doc = DocumentRef::Invoice(invoice);
    assert!(fx.service.delete_document(doc).expect("delete"));
    assert!(fx.service.totals(doc).is_err());
    assert!(
        fx.service
            .invoices()
            .get_including_deleted(invoice)
            .expect("kept")
            .meta
            .deleted_at
            .is_some()
    );

    assert!(fx.service.restore_document(doc).expect("restore"));
    assert_eq!(fx.service.totals(doc).expect("totals").total, money("120"));
    assert_eq!(fx.service.invoices().get(invoice).expect("invoice").id(), invoice);
}
