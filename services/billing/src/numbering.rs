//! Sequential document numbers
//!
//! One sequence per issuing entity, document kind and calendar year:
//! `INV-2024-0001`, `INV-2024-0002`, ... Numbers are handed out once and
//! never reused, even if the document is later cancelled or deleted.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::NumberingConfig;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Quote,
    Invoice,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quote => f.write_str("quote"),
            Self::Invoice => f.write_str("invoice"),
        }
    }
}

type SequenceKey = (Uuid, DocumentKind, i32);

/// Hands out document numbers
#[derive(Debug)]
pub struct DocumentNumberer {
    config: NumberingConfig,
    sequences: Mutex<FxHashMap<SequenceKey, u32>>,
}

impl DocumentNumberer {
    #[must_use]
    pub fn new(config: NumberingConfig) -> Self {
        Self {
            config,
            sequences: Mutex::new(FxHashMap::default()),
        }
    }

    /// Reserve the next number
    pub fn next(&self, issuer: Uuid, kind: DocumentKind, year: i32) -> String {
        let seq = {
            let mut sequences = self.sequences.lock();
            let counter = sequences.entry((issuer, kind, year)).or_insert(0);
            *counter += 1;
            *counter
        };
        self.format(kind, year, seq)
    }

    /// Continue a sequence after `last` (e.g. numbers issued before a restart)
    pub fn resume(&self, issuer: Uuid, kind: DocumentKind, year: i32, last: u32) {
        let mut sequences = self.sequences.lock();
        let counter = sequences.entry((issuer, kind, year)).or_insert(0);
        *counter = (*counter).max(last);
    }

    /// Last number handed out, if any
    #[must_use]
    pub fn last(&self, issuer: Uuid, kind: DocumentKind, year: i32) -> Option<u32> {
        self.sequences.lock().get(&(issuer, kind, year)).copied()
    }

    fn prefix(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Quote => &self.config.quote_prefix,
            DocumentKind::Invoice => &self.config.invoice_prefix,
        }
    }

    #[must_use]
    pub fn format(&self, kind: DocumentKind, year: i32, seq: u32) -> String {
        format!(
            "{}-{year}-{seq:0width$}",
            self.prefix(kind),
            width = self.config.pad_width
        )
    }

    /// Recover `(year, seq)` from a number this numberer produced
    #[must_use]
    pub fn parse(&self, kind: DocumentKind, number: &str) -> Option<(i32, u32)> {
        let rest = number.strip_prefix(self.prefix(kind))?.strip_prefix('-')?;
        let (year, seq) = rest.split_once('-')?;
        Some((year.parse().ok()?, seq.parse().ok()?))
    }
}
