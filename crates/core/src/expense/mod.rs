//! Co-founder expense lifecycle.
//!
//! This module implements the expense state machine and the policies it
//! consults on every decision.
//!
//! # Modules
//!
//! - `types` - Domain types (ExpenseStatus, Role, Command)
//! - `error` - Lifecycle error taxonomy
//! - `authorization` - Authorization gate and its action table
//! - `ledger` - Append-only approval ledgers
//! - `quorum` - Quorum policy over the live roster
//! - `service` - State transition logic
//! - `nudge` - Owner reminders with cooldown
//! - `validation` - Payload validation

pub mod authorization;
pub mod error;
pub mod ledger;
pub mod nudge;
pub mod quorum;
pub mod service;
pub mod types;
pub mod validation;

#[cfg(test)]
mod quorum_props;
#[cfg(test)]
mod service_props;

pub use authorization::{Action, AuthorizationGate, Decision, DenyReason};
pub use error::{ErrorKind, ExpenseError};
pub use ledger::{ApprovalLedger, LedgerEntry, Phase};
pub use nudge::{NudgeOutcome, NudgePolicy, NudgeRequest};
pub use quorum::QuorumPolicy;
pub use service::{DecisionContext, ExpenseStateMachine, Submission, Transition};
pub use types::{Actor, Command, ExpenseRef, ExpenseStatus, Rejection, Role, RosterEntry};
pub use validation::{ExpenseDraft, ExpensePatch, ValidPatch};
