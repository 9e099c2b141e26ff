//! Dashboard KPI tests
//!
//! One issuer, two customers, a handful of documents in EUR and USD, and a
//! static EUR-pivot feed (1 EUR = 1.25 USD).

use billing::{
    BillingService, CustomerRevenue, Customer, DashboardKpis, DocumentRef, IssuingEntity,
    LineItem, Payment,
};
use chrono::NaiveDate;
use common::{Currency, Money, Percent, Qty, Rate};
use fx_rates::{ExchangeRateResolver, StaticSource};
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

fn pct(s: &str) -> Percent {
    s.parse().expect("valid percent")
}

fn day(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).expect("valid date")
}

struct Book {
    service: BillingService,
    acme: Uuid,
    globex: Uuid,
}

impl Book {
    fn draft(&self, customer: Uuid, price: &str) -> Uuid {
        let id = self
            .service
            .create_invoice(self.entity(), customer, None)
            .expect("invoice");
        self.service
            .add_line(
                DocumentRef::Invoice(id),
                LineItem::new("Work", Qty::ONE, money(price)),
            )
            .expect("line");
        id
    }

    fn quote(&self, price: &str) -> Uuid {
        let id = self
            .service
            .create_quote(self.entity(), self.acme, None)
            .expect("quote");
        self.service
            .add_line(
                DocumentRef::Quote(id),
                LineItem::new("Proposal", Qty::ONE, money(price)),
            )
            .expect("line");
        id
    }

    fn entity(&self) -> Uuid {
        self.service.issuing_entities().list_active()[0].meta.id
    }
}

#[fixture]
fn book() -> Book {
    let mut rates = FxHashMap::default();
    rates.insert(Currency::USD, "1.25".parse::<Rate>().expect("rate"));
    let resolver = ExchangeRateResolver::new(
        Arc::new(StaticSource::new(Currency::EUR, rates)),
        Currency::EUR,
        Duration::from_secs(3600),
    );
    let config = AppConfig {
        payment_terms_days: 30,
        quote_validity_days: 14,
        ..AppConfig::default()
    };
    let service = BillingService::new(config, Arc::new(resolver));
    service
        .issuing_entities()
        .insert(IssuingEntity::new("Studio", Currency::EUR, pct("20")).expect("entity"))
        .expect("insert");
    let acme = service
        .customers()
        .insert(Customer::new("Acme").expect("customer"))
        .expect("insert");
    let globex = service
        .customers()
        .insert(
            Customer::new("Globex")
                .expect("customer")
                .with_preferred_currency(Currency::USD),
        )
        .expect("insert");
    Book {
        service,
        acme,
        globex,
    }
}

/// Ledger used by most tests, evaluated on 12 February
async fn populate(book: &Book) {
    let svc = &book.service;

    // 1000 + 20% tax, issued 10 Jan, due 9 Feb, 200 paid
    let eur = book.draft(book.acme, "1000");
    svc.issue_invoice(eur, day(1, 10), None).await.expect("issue");
    svc.record_payment(eur, Payment::new(money("200"), day(1, 20)))
        .expect("payment");

    // 100 USD untaxed, issued 15 Jan, due 14 Feb
    let usd = book.draft(book.globex, "100");
    svc.set_tax_rate(DocumentRef::Invoice(usd), Percent::ZERO)
        .expect("tax");
    svc.issue_invoice(usd, day(1, 15), None).await.expect("issue");

    // Never counted: a draft, a cancelled and a deleted invoice
    book.draft(book.acme, "500");
    let cancelled = book.draft(book.acme, "700");
    svc.cancel_invoice(cancelled).expect("cancel");
    let deleted = book.draft(book.acme, "300");
    svc.issue_invoice(deleted, day(2, 1), None).await.expect("issue");
    svc.delete_document(DocumentRef::Invoice(deleted)).expect("delete");

    // Quotes: one open, one accepted, one rejected, one draft
    let open = book.quote("50");
    svc.send_quote(open, day(2, 1)).await.expect("send");
    let accepted = book.quote("80");
    svc.send_quote(accepted, day(1, 5)).await.expect("send");
    svc.accept_quote(accepted, day(1, 6)).expect("accept");
    let rejected = book.quote("90");
    svc.send_quote(rejected, day(1, 5)).await.expect("send");
    svc.reject_quote(rejected).expect("reject");
    book.quote("999");
}

#[rstest]
#[tokio::test]
async fn test_headline_figures(book: Book) {
    populate(&book).await;
    let kpis = book.service.dashboard(day(2, 12)).await.expect("dashboard");

    assert_eq!(kpis.base_currency, Currency::EUR);
    assert_eq!(kpis.invoice_count, 2);
    // 1200 EUR + 100 USD at 0.8
    assert_eq!(kpis.total_invoiced, money("1280"));
    assert_eq!(kpis.total_paid, money("200"));
    assert_eq!(kpis.outstanding, money("1080"));
    assert_eq!(kpis.overdue_count, 1);
    assert_eq!(kpis.overdue_amount, money("1000"));
    assert_eq!(kpis.open_quotes_count, 1);
    assert_eq!(kpis.open_quotes_value, money("60"));
    assert_eq!(kpis.quote_conversion_rate, Some(pct("50")));
}

#[rstest]
#[tokio::test]
async fn test_breakdowns(book: Book) {
    populate(&book).await;
    let kpis = book.service.dashboard(day(2, 12)).await.expect("dashboard");

    assert_eq!(kpis.revenue_by_month.len(), 1);
    assert_eq!(kpis.revenue_by_month.get("2024-01"), Some(&money("1280")));
    assert_eq!(
        kpis.top_customers,
        vec![
            CustomerRevenue {
                customer_id: book.acme,
                name: "Acme".to_string(),
                invoiced: money("1200"),
            },
            CustomerRevenue {
                customer_id: book.globex,
                name: "Globex".to_string(),
                invoiced: money("80"),
            },
        ]
    );
}

#[rstest]
#[tokio::test]
async fn test_outstanding_matches_invoiced_minus_paid(book: Book) {
    populate(&book).await;
    for today in [day(1, 31), day(2, 12), day(3, 31)] {
        let kpis = book.service.dashboard(today).await.expect("dashboard");
        assert_eq!(
            kpis.outstanding,
            kpis.total_invoiced.checked_sub(kpis.total_paid).expect("no overflow")
        );
        assert!(kpis.overdue_amount <= kpis.outstanding);
    }

    // After both due dates everything open is overdue
    let late = book.service.dashboard(day(3, 31)).await.expect("dashboard");
    assert_eq!(late.overdue_count, 2);
    assert_eq!(late.overdue_amount, late.outstanding);
}

#[rstest]
#[tokio::test]
async fn test_lapsed_quotes_leave_the_pipeline(book: Book) {
    populate(&book).await;
    // The open quote lapses after 15 February
    let kpis = book.service.dashboard(day(2, 16)).await.expect("dashboard");
    assert_eq!(kpis.open_quotes_count, 0);
    assert_eq!(kpis.open_quotes_value, Money::ZERO);
    // accepted / (accepted + rejected + lapsed)
    assert_eq!(kpis.quote_conversion_rate, Percent::ratio(1, 3));
}

#[rstest]
#[tokio::test]
async fn test_restored_invoice_counts_again(book: Book) {
    populate(&book).await;
    let deleted = book
        .service
        .invoices()
        .list_all()
        .into_iter()
        .find(|inv| !inv.meta.is_active())
        .expect("deleted invoice");
    book.service
        .restore_document(DocumentRef::Invoice(deleted.meta.id))
        .expect("restore");

    let kpis = book.service.dashboard(day(2, 12)).await.expect("dashboard");
    assert_eq!(kpis.invoice_count, 3);
    assert_eq!(kpis.total_invoiced, money("1640"));
    assert_eq!(kpis.revenue_by_month.get("2024-02"), Some(&money("360")));
}

#[rstest]
#[tokio::test]
async fn test_empty_book(book: Book) {
    let kpis = book.service.dashboard(day(2, 12)).await.expect("dashboard");
    assert_eq!(kpis.invoice_count, 0);
    assert_eq!(kpis.total_invoiced, Money::ZERO);
    assert_eq!(kpis.quote_conversion_rate, None);
    assert!(kpis.top_customers.is_empty());
    let json = serde_json::to_value(&kpis).expect("serialize");
    assert_eq!(json["base_currency"], "EUR");
}

#[rstest]
#[tokio::test]
async fn test_compute_falls_back_to_resolver_without_frozen_rate(book: Book) {
    populate(&book).await;
    let mut invoices = book.service.invoices().list_active();
    for invoice in &mut invoices {
        invoice.exchange_rate_to_base = None;
    }
    let kpis = DashboardKpis::compute(
        &invoices,
        &[],
        &book.service.customers().list_all(),
        book.service.resolver(),
        Currency::EUR,
        day(2, 12),
    )
    .await
    .expect("dashboard");
    assert_eq!(kpis.total_invoiced, money("1280"));
    assert_eq!(kpis.quote_conversion_rate, None);
}
