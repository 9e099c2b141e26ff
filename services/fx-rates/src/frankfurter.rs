//! Central-bank reference rates over HTTP
//!
//! Speaks the Frankfurter API, which republishes the ECB daily reference
//! rates as JSON:
//!
//! ```text
//! GET {base}/latest?from=EUR
//! GET {base}/2024-01-05?from=EUR
//! {"amount":1.0,"base":"EUR","date":"2024-01-05","rates":{"USD":1.0921,...}}
//! ```

use crate::error::{FxError, FxResult};
use crate::{RateDate, RateSnapshot, RateSource};
use async_trait::async_trait;
use chrono::NaiveDate;
use common::{Currency, Rate};
use reqwest::Client;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use services_common::FxConfig;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Wire format of a Frankfurter publication
#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default = "unit_amount")]
    amount: f64,
    base: String,
    date: NaiveDate,
    rates: BTreeMap<String, f64>,
}

const fn unit_amount() -> f64 {
    1.0
}

/// Frankfurter-compatible rate feed client
#[derive(Debug, Clone)]
pub struct FrankfurterSource {
    client: Client,
    base_url: String,
    pivot: Currency,
    timeout: Duration,
}

impl FrankfurterSource {
    pub fn new(base_url: impl Into<String>, pivot: Currency, timeout: Duration) -> FxResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("invoicer/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pivot,
            timeout,
        })
    }

    pub fn from_config(config: &FxConfig) -> FxResult<Self> {
        Self::new(
            config.feed_url.clone(),
            config.pivot_currency,
            config.request_timeout(),
        )
    }

    fn url(&self, date: RateDate) -> String {
        format!("{}/{date}", self.base_url)
    }

    fn decode(&self, body: FeedResponse) -> FxResult<RateSnapshot> {
        let base = Currency::parse(&body.base)
            .map_err(|e| FxError::Decode(format!("base: {e}")))?;
        if base != self.pivot {
            return Err(FxError::PivotMismatch {
                expected: self.pivot,
                actual: base,
            });
        }
        if !(body.amount.is_finite() && body.amount > 0.0) {
            return Err(FxError::Decode(format!("amount must be positive, got {}", body.amount)));
        }

        let mut rates = FxHashMap::default();
        for (code, value) in body.rates {
            let currency = Currency::parse(&code)
                .map_err(|e| FxError::Decode(format!("rates: {e}")))?;
            let rate = Rate::from_f64(value / body.amount)
                .map_err(|e| FxError::Decode(format!("rates.{code}: {e}")))?;
            rates.insert(currency, rate);
        }

        Ok(RateSnapshot {
            pivot: base,
            observed: body.date,
            rates,
        })
    }
}

#[async_trait]
impl RateSource for FrankfurterSource {
    async fn fetch(&self, date: RateDate) -> FxResult<RateSnapshot> {
        let url = self.url(date);
        debug!(%url, pivot = %self.pivot, "Fetching reference rates");

        let response = self
            .client
            .get(&url)
            .query(&[("from", self.pivot.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FxError::Timeout(self.timeout)
                } else {
                    FxError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "Rate feed returned error status");
            return Err(FxError::Upstream {
                status: status.as_u16(),
            });
        }

        let body: FeedResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                FxError::Timeout(self.timeout)
            } else {
                FxError::Decode(e.to_string())
            }
        })?;
        self.decode(body)
    }

    fn name(&self) -> &str {
        "frankfurter"
    }
}
