//! Authorization gate.
//!
//! One table maps every action to the role and ownership it requires. The
//! gate consults it once per operation after the authentication and tenant
//! checks, so no transition re-derives its own role logic.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::expense::error::ExpenseError;
use crate::expense::types::{Actor, ExpenseRef, Role};

/// Everything a caller can attempt against an expense or its company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Create a new expense.
    Submit,
    /// Read an expense and its ledgers.
    View,
    /// Change amount, category, date or description.
    Edit,
    /// Remove a not-yet-approved expense.
    Delete,
    /// Approve a pending expense.
    Approve,
    /// Reject a pending expense.
    Reject,
    /// Ask for the approved funds.
    RequestWithdrawal,
    /// Countersign a withdrawal.
    ApproveWithdrawal,
    /// Reject a withdrawal.
    RejectWithdrawal,
    /// Confirm the funds arrived.
    ConfirmReceipt,
    /// Remind founders who have not decided yet.
    Nudge,
    /// Change company settings or the roster.
    ManageCompany,
}

impl Action {
    /// Human-readable verb phrase used in error messages.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::View => "view",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RequestWithdrawal => "request withdrawal of",
            Self::ApproveWithdrawal => "approve the withdrawal of",
            Self::RejectWithdrawal => "reject the withdrawal of",
            Self::ConfirmReceipt => "confirm receipt of",
            Self::Nudge => "nudge founders about",
            Self::ManageCompany => "manage",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// How the actor must relate to the expense owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Only the owner.
    OwnerOnly,
    /// Anyone except the owner.
    NotOwner,
    /// No ownership constraint.
    Any,
}

/// Role and ownership required for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    /// Required role, `None` when any member qualifies.
    pub role: Option<Role>,
    /// Required relation to the owner.
    pub ownership: Ownership,
}

/// The authorization table.
#[must_use]
pub const fn requirement(action: Action) -> Requirement {
    match action {
        Action::Submit | Action::View => Requirement {
            role: None,
            ownership: Ownership::Any,
        },
        Action::Edit
        | Action::Delete
        | Action::RequestWithdrawal
        | Action::ConfirmReceipt
        | Action::Nudge => Requirement {
            role: None,
            ownership: Ownership::OwnerOnly,
        },
        Action::Approve
        | Action::Reject
        | Action::ApproveWithdrawal
        | Action::RejectWithdrawal => Requirement {
            role: Some(Role::Founder),
            ownership: Ownership::NotOwner,
        },
        Action::ManageCompany => Requirement {
            role: Some(Role::Founder),
            ownership: Ownership::Any,
        },
    }
}

/// Why the gate refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// No actor identity.
    Unauthenticated,
    /// Target missing or in another company.
    NotFound,
    /// Role or ownership missing.
    Forbidden(String),
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The action may proceed.
    Allowed,
    /// The action is refused.
    Denied(DenyReason),
}

impl Decision {
    /// Converts the decision into a `Result`, naming `target` on not-found.
    pub fn into_result(self, target: &ExpenseRef) -> Result<(), ExpenseError> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied(DenyReason::Unauthenticated) => Err(ExpenseError::Unauthenticated),
            Self::Denied(DenyReason::NotFound) => {
                Err(ExpenseError::expense_not_found(target.expense_id))
            }
            Self::Denied(DenyReason::Forbidden(reason)) => Err(ExpenseError::Forbidden(reason)),
        }
    }
}

/// Stateless authorization gate.
pub struct AuthorizationGate;

impl AuthorizationGate {
    /// Decides whether `actor` may perform `action` on `expense`.
    ///
    /// Rules, in order: authenticated, same company, then the action's
    /// role and ownership requirement.
    #[must_use]
    pub fn authorize(actor: Option<&Actor>, expense: &ExpenseRef, action: Action) -> Decision {
        let Some(actor) = actor else {
            return Decision::Denied(DenyReason::Unauthenticated);
        };

        if actor.company_id != expense.company_id {
            return Decision::Denied(DenyReason::NotFound);
        }

        Self::check_requirement(actor, Some(expense.owner_id), action, "an expense")
    }

    /// Decides whether `actor` may perform a company-level `action` in
    /// `company_id`, e.g. managing members or submitting an expense.
    pub fn authorize_company(
        actor: Option<&Actor>,
        company_id: Uuid,
        action: Action,
    ) -> Result<(), ExpenseError> {
        let Some(actor) = actor else {
            return Err(ExpenseError::Unauthenticated);
        };

        if actor.company_id != company_id {
            return Err(ExpenseError::NotFound {
                entity: "Company",
                id: company_id,
            });
        }

        match Self::check_requirement(actor, None, action, "this company") {
            Decision::Allowed => Ok(()),
            Decision::Denied(DenyReason::Forbidden(reason)) => Err(ExpenseError::Forbidden(reason)),
            Decision::Denied(_) => Err(ExpenseError::Unauthenticated),
        }
    }

    fn check_requirement(
        actor: &Actor,
        owner_id: Option<Uuid>,
        action: Action,
        target: &str,
    ) -> Decision {
        let required = requirement(action);

        if let Some(role) = required.role
            && actor.role != role
        {
            return Decision::Denied(DenyReason::Forbidden(format!(
                "only a {role} may {action} {target}"
            )));
        }

        let is_owner = owner_id == Some(actor.user_id);
        match required.ownership {
            Ownership::OwnerOnly if !is_owner => Decision::Denied(DenyReason::Forbidden(format!(
                "only the expense owner may {action} {target}"
            ))),
            Ownership::NotOwner if is_owner => Decision::Denied(DenyReason::Forbidden(format!(
                "the expense owner may not {action} their own expense"
            ))),
            _ => Decision::Allowed,
        }
    }
}
