//! Customers, issuing entities and payment sources

use crate::error::{BillingError, BillingResult};
use crate::store::{Record, RecordMeta};
use common::{Currency, Percent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Postal address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    pub line2: Option<String>,
    pub postal_code: String,
    pub city: String,
    /// ISO-3166 alpha-2
    pub country: String,
}

/// Someone documents are addressed to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub meta: RecordMeta,
    pub name: String,
    pub email: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<Address>,
    /// Currency new documents default to
    pub preferred_currency: Option<Currency>,
    pub notes: Option<String>,
}

impl Customer {
    pub fn new(name: impl Into<String>) -> BillingResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BillingError::validation("customer name must not be empty"));
        }
        Ok(Self {
            meta: RecordMeta::new(),
            name,
            email: None,
            tax_id: None,
            address: None,
            preferred_currency: None,
            notes: None,
        })
    }

    pub fn with_email(mut self, email: impl Into<String>) -> BillingResult<Self> {
        let email = email.into();
        let valid = email
            .split_once('@')
            .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'));
        if !valid {
            return Err(BillingError::validation(format!("invalid email address: {email:?}")));
        }
        self.email = Some(email);
        Ok(self)
    }

    #[must_use]
    pub fn with_preferred_currency(mut self, currency: Currency) -> Self {
        self.preferred_currency = Some(currency);
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    #[must_use]
    pub fn with_tax_id(mut self, tax_id: impl Into<String>) -> Self {
        self.tax_id = Some(tax_id.into());
        self
    }
}

impl Record for Customer {
    const KIND: &'static str = "customer";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

/// The business that issues quotes and invoices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuingEntity {
    pub meta: RecordMeta,
    pub name: String,
    pub tax_id: Option<String>,
    pub address: Option<Address>,
    pub default_currency: Currency,
    /// Tax rate new documents start with
    pub default_tax_rate: Percent,
}

impl IssuingEntity {
    pub fn new(
        name: impl Into<String>,
        default_currency: Currency,
        default_tax_rate: Percent,
    ) -> BillingResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BillingError::validation("issuing entity name must not be empty"));
        }
        if !default_tax_rate.is_fraction() {
            return Err(BillingError::validation(format!(
                "default tax rate {default_tax_rate} is outside 0%..100%"
            )));
        }
        Ok(Self {
            meta: RecordMeta::new(),
            name,
            tax_id: None,
            address: None,
            default_currency,
            default_tax_rate,
        })
    }
}

impl Record for IssuingEntity {
    const KIND: &'static str = "issuing entity";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

/// How a payment reaches the issuing entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer { iban: String, bic: Option<String> },
    PaymentLink { url: String },
    Other { details: String },
}

/// Payment details printed on invoices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSource {
    pub meta: RecordMeta,
    pub issuing_entity_id: Uuid,
    pub label: String,
    pub method: PaymentMethod,
    /// Restricts the source to documents in this currency
    pub currency: Option<Currency>,
}

impl PaymentSource {
    pub fn new(
        issuing_entity_id: Uuid,
        label: impl Into<String>,
        method: PaymentMethod,
    ) -> BillingResult<Self> {
        let method = match method {
            PaymentMethod::BankTransfer { iban, bic } => PaymentMethod::BankTransfer {
                iban: normalize_iban(&iban)?,
                bic,
            },
            PaymentMethod::PaymentLink { url } => {
                if !url.starts_with("https://") {
                    return Err(BillingError::validation(format!(
                        "payment link must use https: {url:?}"
                    )));
                }
                PaymentMethod::PaymentLink { url }
            }
            other @ PaymentMethod::Other { .. } => other,
        };
        Ok(Self {
            meta: RecordMeta::new(),
            issuing_entity_id,
            label: label.into(),
            method,
            currency: None,
        })
    }

    #[must_use]
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }

    /// Whether invoices in `currency` may point at this source
    #[must_use]
    pub fn accepts(&self, currency: Currency) -> bool {
        self.currency.is_none_or(|c| c == currency)
    }
}

impl Record for PaymentSource {
    const KIND: &'static str = "payment source";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

/// Strip spaces, uppercase, and verify the ISO-13616 mod-97 checksum
pub fn normalize_iban(raw: &str) -> BillingResult<String> {
    let iban: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let invalid = || BillingError::validation(format!("invalid IBAN: {raw:?}"));

    let bytes = iban.as_bytes();
    if !(15..=34).contains(&bytes.len())
        || !bytes[..2].iter().all(u8::is_ascii_uppercase)
        || !bytes[2..4].iter().all(u8::is_ascii_digit)
        || !bytes.iter().all(u8::is_ascii_alphanumeric)
    {
        return Err(invalid());
    }

    // Move the country code and check digits to the end, letters become 10..35
    let remainder = bytes[4..]
        .iter()
        .chain(&bytes[..4])
        .fold(0_u32, |acc, &b| {
            if b.is_ascii_digit() {
                (acc * 10 + u32::from(b - b'0')) % 97
            } else {
                (acc * 100 + u32::from(b - b'A' + 10)) % 97
            }
        });
    if remainder == 1 { Ok(iban) } else { Err(invalid()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iban_checksum() {
        assert_eq!(
            normalize_iban("de89 3704 0044 0532 0130 00").ok().as_deref(),
            Some("DE89370400440532013000")
        );
        assert!(normalize_iban("GB82 WEST 1234 5698 7654 32").is_ok());
        assert!(normalize_iban("DE89 3704 0044 0532 0130 01").is_err());
        assert!(normalize_iban("DE89").is_err());
    }

    #[test]
    fn test_customer_validation() {
        assert!(Customer::new("  ").is_err());
        let customer = Customer::new("Acme").expect("customer");
        assert!(customer.clone().with_email("billing@acme.io").is_ok());
        assert!(customer.with_email("acme.io").is_err());
    }

    #[test]
    fn test_payment_source_currency_restriction() {
        let source = PaymentSource::new(
            Uuid::new_v4(),
            "USD account",
            PaymentMethod::Other {
                details: "cheque".to_string(),
            },
        )
        .expect("source")
        .with_currency(Currency::USD);
        assert!(source.accepts(Currency::USD));
        assert!(!source.accepts(Currency::EUR));
    }
}
