//! Core business logic for Cofound.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! The expense lifecycle rules, their error taxonomy and the domain events
//! they emit all live here.
//!
//! # Modules
//!
//! - `expense` - Expense lifecycle state machine, quorum and authorization
//! - `events` - Domain events, event bus and notification dispatch
//! - `clock` - Injectable time source

pub mod clock;
pub mod events;
pub mod expense;

pub use clock::{Clock, FixedClock, SystemClock};
pub use events::{EventBus, EventKind, ExpenseEvent, NotificationDispatcher};
