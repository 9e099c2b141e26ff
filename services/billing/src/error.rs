//! Error types for billing operations

use common::{Currency, Money, ValueError};
use fx_rates::FxError;
use thiserror::Error;
use uuid::Uuid;

/// Billing-specific error types
#[derive(Debug, Error)]
pub enum BillingError {
    /// Record missing or soft-deleted
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind ("customer", "invoice", ...)
        kind: &'static str,
        /// Requested identifier
        id: Uuid,
    },

    /// Record with this identifier already stored
    #[error("{kind} already exists: {id}")]
    Duplicate {
        /// Record kind
        kind: &'static str,
        /// Conflicting identifier
        id: Uuid,
    },

    /// Input rejected before any state changed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Status change not allowed from the current status
    #[error("{kind} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Document kind
        kind: &'static str,
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Content edits are only allowed on drafts
    #[error("{kind} {id} is {status} and can no longer be edited")]
    NotEditable {
        /// Document kind
        kind: &'static str,
        /// Document identifier
        id: Uuid,
        /// Current status
        status: String,
    },

    /// Payment larger than what is still owed
    #[error("Payment of {attempted} exceeds balance due of {balance}")]
    Overpayment {
        /// Remaining balance
        balance: Money,
        /// Rejected payment amount
        attempted: Money,
    },

    /// Amount expressed in a currency the document does not use
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch {
        /// Document currency
        expected: Currency,
        /// Supplied currency
        actual: Currency,
    },

    /// Money arithmetic left the representable range
    #[error("Arithmetic overflow while computing {0}")]
    ArithmeticOverflow(&'static str),

    /// Exchange-rate resolution failed
    #[error(transparent)]
    Fx(#[from] FxError),

    /// Value construction failed
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Type alias for billing results
pub type BillingResult<T> = Result<T, BillingError>;

impl BillingError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Turn a checked-arithmetic `None` into an overflow error naming the quantity
pub(crate) trait OrOverflow<T> {
    fn or_overflow(self, what: &'static str) -> BillingResult<T>;
}

impl<T> OrOverflow<T> for Option<T> {
    fn or_overflow(self, what: &'static str) -> BillingResult<T> {
        self.ok_or(BillingError::ArithmeticOverflow(what))
    }
}
