//! Shared configuration, errors and telemetry for Invoicer services

pub mod config;
pub mod constants;
pub mod errors;
pub mod telemetry;

pub use self::config::*;
pub use constants::*;
pub use errors::*;
pub use telemetry::init_tracing;

pub use common::{Currency, Money, Percent, Qty, Rate, Ts, ValueError};
