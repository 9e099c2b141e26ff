//! Core value types for Invoicer
//!
//! All monetary arithmetic is fixed-point. Floats only appear at the edges
//! (parsing user input, talking to the rate feed).

pub mod constants;
pub mod currency;
pub mod types;

pub use constants::*;
pub use currency::Currency;
pub use types::{Money, Percent, Qty, Rate, Ts, ValueError};
