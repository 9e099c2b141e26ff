//! Invoicer CLI
//!
//! Usage:
//!   invoicer convert --amount 100 --from USD --to EUR [--date 2024-01-05]
//!   invoicer totals --file document.json [--base EUR]
//!   invoicer rates [--date 2024-01-05]
//!   invoicer dashboard --file book.json [--today 2024-02-12]

mod input;

use anyhow::{Context, Result, bail};
use billing::DashboardKpis;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use common::{Currency, Money, Rate};
use fx_rates::{ExchangeRateResolver, RateDate};
use input::{BookInput, DocumentInput};
use serde::Serialize;
use services_common::AppConfig;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(name = "invoicer")]
#[command(about = "Multi-currency invoicing tools", version)]
struct Cli {
    /// TOML configuration file (INVOICER__* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use fx.static_rates instead of the rate feed
    #[arg(long, global = true)]
    offline: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an amount between currencies
    Convert {
        #[arg(long)]
        amount: Money,
        #[arg(long)]
        from: Currency,
        #[arg(long)]
        to: Currency,
        /// Publication date (defaults to the latest)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Compute totals of a JSON document, in its currency and the base currency
    Totals {
        #[arg(long)]
        file: PathBuf,
        /// Reporting currency (defaults to the configured base currency)
        #[arg(long)]
        base: Option<Currency>,
    },
    /// Show the rate snapshot the resolver would use
    Rates {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Compute dashboard KPIs from exported customers, quotes and invoices
    Dashboard {
        #[arg(long)]
        file: PathBuf,
        /// Evaluation date for overdue and open quotes (defaults to today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    services_common::init_tracing("invoicer")?;
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if cli.offline {
        if config.fx.static_rates.is_empty() {
            bail!("--offline needs fx.static_rates in the configuration");
        }
    } else {
        config.fx.static_rates.clear();
    }
    let resolver = ExchangeRateResolver::from_config(&config.fx)?;

    match cli.command {
        Commands::Convert {
            amount,
            from,
            to,
            date,
        } => convert(&resolver, amount, from, to, date.into(), cli.json).await,
        Commands::Totals { file, base } => {
            let base = base.unwrap_or(config.base_currency);
            totals(&resolver, &DocumentInput::from_path(&file)?, base, cli.json).await
        }
        Commands::Rates { date } => rates(&resolver, date.into(), cli.json).await,
        Commands::Dashboard { file, today } => {
            let today = today.unwrap_or_else(|| Utc::now().date_naive());
            let book = BookInput::from_path(&file)?;
            let kpis = DashboardKpis::compute(
                &book.invoices,
                &book.quotes,
                &book.customers,
                &resolver,
                config.base_currency,
                today,
            )
            .await?;
            print_dashboard(&kpis, cli.json)
        }
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct Conversion {
    from: Currency,
    to: Currency,
    amount: Money,
    converted: Money,
    rate: Rate,
    date: RateDate,
    observed: Option<NaiveDate>,
}

async fn convert(
    resolver: &ExchangeRateResolver,
    amount: Money,
    from: Currency,
    to: Currency,
    date: RateDate,
    json: bool,
) -> Result<()> {
    let rate = resolver.rate(from, to, date).await?;
    let converted = rate
        .convert(amount)?
        .round_to_minor(to)
        .context("converted amount is out of range")?;
    let result = Conversion {
        from,
        to,
        amount,
        converted,
        rate,
        date,
        observed: resolver.observed_date(date),
    };
    debug!(%from, %to, %rate, "Converted");
    if json {
        return print_json(&result);
    }
    let observed = result
        .observed
        .map_or_else(String::new, |d| format!(", published {d}"));
    println!(
        "{} = {} (rate {rate}{observed})",
        amount.display_in(from),
        converted.display_in(to)
    );
    Ok(())
}

async fn totals(
    resolver: &ExchangeRateResolver,
    document: &DocumentInput,
    base: Currency,
    json: bool,
) -> Result<()> {
    let content = document.content()?;
    let totals = content.totals()?;
    let rate = resolver
        .rate(content.currency, base, document.date.into())
        .await?;
    let in_base = totals.convert(rate, base)?;

    if json {
        return print_json(&serde_json::json!({
            "document": totals,
            "base": in_base,
            "rate": rate,
        }));
    }
    println!("{:<10} {:>18} {:>18}", "", content.currency.as_str(), base.as_str());
    for (label, own, converted) in [
        ("Subtotal", totals.subtotal, in_base.subtotal),
        ("Discount", totals.discount, in_base.discount),
        ("Taxable", totals.taxable, in_base.taxable),
        ("Tax", totals.tax, in_base.tax),
        ("Total", totals.total, in_base.total),
    ] {
        println!(
            "{label:<10} {:>18} {:>18}",
            own.display_in(content.currency),
            converted.display_in(base)
        );
    }
    println!("Rate {} → {}: {rate}", content.currency, base);
    Ok(())
}

async fn rates(resolver: &ExchangeRateResolver, date: RateDate, json: bool) -> Result<()> {
    let snapshot = resolver.prefetch(date).await?;
    if json {
        return print_json(&snapshot);
    }
    println!(
        "{} rates against {} ({} requested, published {})",
        snapshot.rates.len(),
        snapshot.pivot,
        date,
        snapshot.observed
    );
    for currency in snapshot.currencies() {
        if let Some(rate) = snapshot.quote(currency) {
            println!("{currency} {rate}");
        }
    }
    Ok(())
}

fn print_dashboard(kpis: &DashboardKpis, json: bool) -> Result<()> {
    if json {
        return print_json(kpis);
    }
    let base = kpis.base_currency;
    println!("Invoices           {}", kpis.invoice_count);
    println!("Invoiced           {}", kpis.total_invoiced.display_in(base));
    println!("Paid               {}", kpis.total_paid.display_in(base));
    println!("Outstanding        {}", kpis.outstanding.display_in(base));
    println!(
        "Overdue            {} ({} invoices)",
        kpis.overdue_amount.display_in(base),
        kpis.overdue_count
    );
    println!(
        "Open quotes        {} ({} quotes)",
        kpis.open_quotes_value.display_in(base),
        kpis.open_quotes_count
    );
    match kpis.quote_conversion_rate {
        Some(rate) => println!("Quote conversion   {rate}"),
        None => println!("Quote conversion   n/a"),
    }
    if !kpis.revenue_by_month.is_empty() {
        println!("\nRevenue by month");
        for (month, revenue) in &kpis.revenue_by_month {
            println!("  {month}  {}", revenue.display_in(base));
        }
    }
    if !kpis.top_customers.is_empty() {
        println!("\nTop customers");
        for customer in &kpis.top_customers {
            println!("  {:<30} {}", customer.name, customer.invoiced.display_in(base));
        }
    }
    Ok(())
}
