//! Expense lifecycle domain types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a user inside their company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// May approve, reject and countersign withdrawals of others' expenses.
    Founder,
    /// May submit and view expenses only.
    Member,
}

impl Role {
    /// Returns the string representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Founder => "FOUNDER",
            Self::Member => "MEMBER",
        }
    }

    /// Parses a role from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "FOUNDER" => Some(Self::Founder),
            "MEMBER" => Some(Self::Member),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expense status in the lifecycle.
///
/// The valid transitions are:
/// - PendingApproval → Approved (approve, quorum reached)
/// - PendingApproval → Rejected (reject)
/// - Approved → WithdrawalRequested (request withdrawal)
/// - Approved → WithdrawalApproved (request withdrawal, no other founder)
/// - WithdrawalRequested → WithdrawalApproved (approve withdrawal, quorum reached)
/// - WithdrawalRequested → WithdrawalRejected (reject withdrawal)
/// - WithdrawalApproved → Received (confirm receipt)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseStatus {
    /// Submitted and waiting for founder approvals.
    PendingApproval,
    /// Approved by quorum.
    Approved,
    /// Owner asked for the funds; waiting for founder countersignatures.
    WithdrawalRequested,
    /// Withdrawal countersigned by quorum.
    WithdrawalApproved,
    /// Owner confirmed the funds arrived (terminal).
    Received,
    /// Rejected by a founder (terminal).
    Rejected,
    /// Withdrawal rejected by a founder (terminal).
    WithdrawalRejected,
}

impl ExpenseStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::PendingApproval,
        Self::Approved,
        Self::WithdrawalRequested,
        Self::WithdrawalApproved,
        Self::Received,
        Self::Rejected,
        Self::WithdrawalRejected,
    ];

    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::WithdrawalRequested => "WITHDRAWAL_REQUESTED",
            Self::WithdrawalApproved => "WITHDRAWAL_APPROVED",
            Self::Received => "RECEIVED",
            Self::Rejected => "REJECTED",
            Self::WithdrawalRejected => "WITHDRAWAL_REJECTED",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
    }

    /// Returns true if no transition leaves this status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Received | Self::Rejected | Self::WithdrawalRejected
        )
    }

    /// Returns true if the owner may still edit the expense details.
    #[must_use]
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::PendingApproval | Self::Approved)
    }

    /// Returns true if the owner may still delete the expense.
    #[must_use]
    pub fn is_deletable(&self) -> bool {
        matches!(self, Self::PendingApproval)
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller, as resolved from the live roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// The acting user.
    pub user_id: Uuid,
    /// The company the user belongs to.
    pub company_id: Uuid,
    /// The user's current role.
    pub role: Role,
}

/// A company member as seen by the quorum policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterEntry {
    /// The member's user id.
    pub user_id: Uuid,
    /// The member's current role.
    pub role: Role,
}

/// Who a lifecycle decision is about: the expense's tenant and owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpenseRef {
    /// The expense being acted on.
    pub expense_id: Uuid,
    /// The owning company.
    pub company_id: Uuid,
    /// The user who submitted the expense.
    pub owner_id: Uuid,
}

/// Recorded rejection of an expense or of its withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// The founder who rejected.
    pub rejected_by: Uuid,
    /// When the rejection happened.
    pub rejected_at: DateTime<Utc>,
    /// Trimmed reason, 1-500 characters.
    pub reason: String,
}

/// Payload-carrying decision a caller asks the state machine to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Founder approves a pending expense.
    Approve,
    /// Founder rejects a pending expense.
    Reject {
        /// Raw reason as submitted.
        reason: String,
    },
    /// Owner asks for the approved funds.
    RequestWithdrawal,
    /// Founder countersigns a withdrawal.
    ApproveWithdrawal,
    /// Founder rejects a withdrawal.
    RejectWithdrawal {
        /// Raw reason as submitted.
        reason: String,
    },
    /// Owner confirms the funds arrived.
    ConfirmReceipt,
}

impl Command {
    /// Returns the authorization action for this command.
    #[must_use]
    pub fn action(&self) -> crate::expense::authorization::Action {
        use crate::expense::authorization::Action;
        match self {
            Self::Approve => Action::Approve,
            Self::Reject { .. } => Action::Reject,
            Self::RequestWithdrawal => Action::RequestWithdrawal,
            Self::ApproveWithdrawal => Action::ApproveWithdrawal,
            Self::RejectWithdrawal { .. } => Action::RejectWithdrawal,
            Self::ConfirmReceipt => Action::ConfirmReceipt,
        }
    }
}
