//! Expense lifecycle error types.
//!
//! Every business-rule violation is a recoverable, reportable value. Only
//! `Database` represents an infrastructure failure.

use chrono::{DateTime, Utc};
use cofound_shared::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::expense::authorization::Action;
use crate::expense::ledger::Phase;
use crate::expense::types::ExpenseStatus;

/// Errors that can occur during expense lifecycle operations.
#[derive(Debug, Error)]
pub enum ExpenseError {
    /// No valid actor identity.
    #[error("Authentication required")]
    Unauthenticated,

    /// The resource does not exist, or lives in another company.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of resource looked up.
        entity: &'static str,
        /// The id that was looked up.
        id: Uuid,
    },

    /// The actor lacks the role or ownership the action requires.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The expense is not in the status the action requires.
    #[error("Cannot {action} an expense in status {status}")]
    InvalidState {
        /// Current status of the expense.
        status: ExpenseStatus,
        /// The attempted action.
        action: Action,
    },

    /// The actor already recorded a decision for this phase.
    #[error("User {approver_id} already approved this expense in the {phase} phase")]
    DuplicateDecision {
        /// The founder who tried to approve again.
        approver_id: Uuid,
        /// Ledger phase the duplicate targeted.
        phase: Phase,
    },

    /// Malformed payload.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Nudge attempted before the cooldown elapsed.
    #[error("Nudge cooldown active, retry after {retry_after}")]
    RateLimited {
        /// Earliest instant at which a nudge will be accepted.
        retry_after: DateTime<Utc>,
    },

    /// A concurrent writer changed the expense first.
    #[error("Expense {0} was modified concurrently, please retry")]
    ConcurrencyConflict(Uuid),

    /// Store unreachable or failed.
    #[error("Database error: {0}")]
    Database(String),
}

/// Transport-independent classification of an `ExpenseError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No valid actor identity.
    Unauthenticated,
    /// Missing or cross-tenant resource.
    NotFound,
    /// Role or ownership missing.
    Forbidden,
    /// Wrong lifecycle status.
    InvalidState,
    /// Second decision by the same founder.
    DuplicateDecision,
    /// Malformed payload.
    Validation,
    /// Cooldown active.
    RateLimited,
    /// Lost a race against another writer.
    ConcurrencyConflict,
    /// Infrastructure failure.
    Infrastructure,
}

impl ExpenseError {
    /// Shorthand for an expense that does not exist for the caller.
    #[must_use]
    pub const fn expense_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "Expense",
            id,
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::DuplicateDecision { .. } => ErrorKind::DuplicateDecision,
            Self::Validation(_) => ErrorKind::Validation,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::ConcurrencyConflict(_) => ErrorKind::ConcurrencyConflict,
            Self::Database(_) => ErrorKind::Infrastructure,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidState
            | ErrorKind::DuplicateDecision
            | ErrorKind::ConcurrencyConflict => 409,
            ErrorKind::Validation => 422,
            ErrorKind::RateLimited => 429,
            ErrorKind::Infrastructure => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::DuplicateDecision => "DUPLICATE_DECISION",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            ErrorKind::Infrastructure => "DATABASE_ERROR",
        }
    }

    /// Returns the retry-after instant for rate-limited errors.
    #[must_use]
    pub const fn retry_after(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<ExpenseError> for AppError {
    fn from(err: ExpenseError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Unauthenticated => Self::Unauthorized(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Forbidden => Self::Forbidden(message),
            ErrorKind::InvalidState
            | ErrorKind::DuplicateDecision
            | ErrorKind::ConcurrencyConflict => Self::Conflict(message),
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::RateLimited => Self::TooManyRequests(message),
            ErrorKind::Infrastructure => Self::Database(message),
        }
    }
}
