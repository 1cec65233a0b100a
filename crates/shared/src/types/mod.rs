//! Common types used across the application.

pub mod money;

pub use money::{CurrencyCode, MINOR_UNIT_SCALE};
